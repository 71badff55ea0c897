//! Outlier models frozen from the calibration window.
//!
//! Two policies exist and they do not agree on what an outlier does to the
//! statistics:
//!
//! - Gaussian interval: `[mean - z*stddev, mean + z*stddev]` with `z = 3.291`.
//!   Outliers are only counted. `cstats` still covers every sample.
//! - Multiplicative threshold: anything above `k * mean` is an outlier and is
//!   left out of `cstats`.
//!
//! Both still land in the histogram.

use std::fmt;

use crate::config::{OutlierPolicy, GAUSSIAN_Z};
use crate::stats::RunningStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Inlier,
    Outlier,
}

/// Bounds a model classifies against, in ns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Interval { low: f64, high: f64 },
    Ceiling(f64),
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bounds::Interval { low, high } => write!(f, "[{low:.4}, {high:.4}] ns"),
            Bounds::Ceiling(limit) => write!(f, "> {limit:.4} ns"),
        }
    }
}

pub trait OutlierModel: fmt::Debug {
    fn classify(&self, ns: u64) -> Classification;

    /// Whether outliers are kept out of [`RunningStats`].
    fn excludes_outliers(&self) -> bool;

    fn bounds(&self) -> Bounds;
}

#[derive(Debug, Clone, Copy)]
pub struct GaussianInterval {
    low: f64,
    high: f64,
}

impl GaussianInterval {
    pub fn from_stats(stats: &RunningStats) -> Self {
        let mean = stats.mean();
        let spread = GAUSSIAN_Z * stats.stddev();
        Self {
            low: mean - spread,
            high: mean + spread,
        }
    }
}

impl OutlierModel for GaussianInterval {
    fn classify(&self, ns: u64) -> Classification {
        let x = ns as f64;
        if x < self.low || x > self.high {
            Classification::Outlier
        } else {
            Classification::Inlier
        }
    }

    fn excludes_outliers(&self) -> bool {
        false
    }

    fn bounds(&self) -> Bounds {
        Bounds::Interval {
            low: self.low,
            high: self.high,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdFactor {
    limit: f64,
}

impl ThresholdFactor {
    pub fn from_stats(stats: &RunningStats, factor: f64) -> Self {
        Self {
            limit: factor * stats.mean(),
        }
    }
}

impl OutlierModel for ThresholdFactor {
    fn classify(&self, ns: u64) -> Classification {
        if ns as f64 > self.limit {
            Classification::Outlier
        } else {
            Classification::Inlier
        }
    }

    fn excludes_outliers(&self) -> bool {
        true
    }

    fn bounds(&self) -> Bounds {
        Bounds::Ceiling(self.limit)
    }
}

impl OutlierPolicy {
    /// Freeze a model from the stats gathered so far. `None` for [`OutlierPolicy::Off`].
    pub fn freeze(&self, stats: &RunningStats) -> Option<Box<dyn OutlierModel>> {
        match *self {
            OutlierPolicy::Off => None,
            OutlierPolicy::Gaussian => Some(Box::new(GaussianInterval::from_stats(stats))),
            OutlierPolicy::Threshold { factor } => {
                Some(Box::new(ThresholdFactor::from_stats(stats, factor)))
            }
        }
    }
}
