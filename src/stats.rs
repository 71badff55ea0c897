use crate::config::HistogramLayout;

/// Running sums over accepted samples. Variance uses `E[X^2] - E[X]^2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStats {
    pub count: u64,
    pub sum: u64,
    pub sum_of_squares: u128,
    min: u64,
    max: u64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            sum_of_squares: 0,
            min: u64::MAX,
            max: 0,
        }
    }
}

impl RunningStats {
    pub fn add(&mut self, ns: u64) {
        self.count += 1;
        self.sum = self.sum.saturating_add(ns);
        self.sum_of_squares = self
            .sum_of_squares
            .saturating_add(u128::from(ns) * u128::from(ns));
        self.min = self.min.min(ns);
        self.max = self.max.max(ns);
    }

    pub fn min(&self) -> Option<u64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<u64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum as f64 / self.count as f64
    }

    /// Population variance, clamped at zero against rounding.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self.sum_of_squares as f64 / self.count as f64 - mean * mean;
        var.max(0.0)
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// One bucket as reported: inclusive `[min, max]` bounds in ns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub min: u64,
    pub max: u64,
    pub count: u64,
}

/// Fixed-width latency histogram with open-ended edge buckets.
///
/// Counts every processed sample, including outliers excluded from
/// [`RunningStats`], and tracks its own observed min/max so the edge buckets
/// can report real bounds.
#[derive(Debug, Clone)]
pub struct Histogram {
    layout: HistogramLayout,
    counts: Vec<u64>,
    total: u64,
    lowest: u64,
    highest: u64,
}

impl Histogram {
    pub fn new(layout: HistogramLayout) -> Self {
        Self {
            layout,
            counts: vec![0; layout.bucket_count()],
            total: 0,
            lowest: u64::MAX,
            highest: 0,
        }
    }

    pub fn add(&mut self, ns: u64) {
        self.counts[self.layout.bucket_of(ns)] += 1;
        self.total += 1;
        self.lowest = self.lowest.min(ns);
        self.highest = self.highest.max(ns);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Reportable buckets in order. Edge buckets whose bounds would be
    /// inverted are empty and get skipped.
    pub fn buckets(&self) -> Vec<Bucket> {
        let last = self.counts.len() - 1;
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(i, &count)| {
                let (min, max) = if i == 0 {
                    (self.lowest, self.layout.min.saturating_sub(1))
                } else if i == last {
                    (self.layout.max, self.highest)
                } else {
                    let lo = self.layout.min + (i as u64 - 1) * self.layout.step;
                    (lo, lo + self.layout.step - 1)
                };
                if min > max || (i == 0 && self.layout.min == 0) {
                    None
                } else {
                    Some(Bucket { min, max, count })
                }
            })
            .collect()
    }
}
