use std::path::PathBuf;

use crate::error::BenchError;

pub const DEFAULT_HIST_MIN: u64 = 100;
pub const DEFAULT_HIST_STEP: u64 = 10;
pub const DEFAULT_HIST_MAX: u64 = 2000;

pub const DEFAULT_CALIBRATION_WINDOW: u64 = 1000;
pub const DEFAULT_THRESHOLD_FACTOR: f64 = 10.0;
pub const DEFAULT_WARN_PERCENT: f64 = 5.0;

/// z-score of a two-sided 99.9% confidence interval.
pub const GAUSSIAN_Z: f64 = 3.291;

const WARMUP_DIVISOR: u64 = 5;

/// Upper bound on fixed-width histogram buckets.
pub const MAX_HIST_BUCKETS: u64 = 1 << 20;

/// Fixed-width histogram layout over `[min, max)` nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramLayout {
    pub min: u64,
    pub step: u64,
    pub max: u64,
}

impl Default for HistogramLayout {
    fn default() -> Self {
        Self {
            min: DEFAULT_HIST_MIN,
            step: DEFAULT_HIST_STEP,
            max: DEFAULT_HIST_MAX,
        }
    }
}

impl HistogramLayout {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.step == 0 {
            return Err(BenchError::InvalidConfig("histogram step must be > 0".into()));
        }
        if self.max <= self.min {
            return Err(BenchError::InvalidConfig(format!(
                "histogram max ({}) must be greater than min ({})",
                self.max, self.min
            )));
        }
        if (self.max - self.min) % self.step != 0 {
            return Err(BenchError::InvalidConfig(format!(
                "histogram range {}..{} is not a multiple of step {}",
                self.min, self.max, self.step
            )));
        }
        let buckets = (self.max - self.min) / self.step;
        if buckets > MAX_HIST_BUCKETS {
            return Err(BenchError::InvalidConfig(format!(
                "histogram range {}..{} with step {} needs {buckets} buckets, at most {MAX_HIST_BUCKETS} allowed",
                self.min, self.max, self.step
            )));
        }
        Ok(())
    }

    /// Fixed-width buckets plus the two open-ended edge buckets.
    ///
    /// Saturates for layouts that [`validate`](Self::validate) rejects.
    pub fn bucket_count(&self) -> usize {
        let fixed = self.max.saturating_sub(self.min) / self.step.max(1);
        usize::try_from(fixed)
            .ok()
            .and_then(|n| n.checked_add(2))
            .unwrap_or(usize::MAX)
    }

    pub fn bucket_of(&self, ns: u64) -> usize {
        if ns < self.min {
            0
        } else if ns >= self.max {
            self.bucket_count() - 1
        } else {
            ((ns - self.min) / self.step) as usize + 1
        }
    }
}

/// How samples are classified once the calibration window is full.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutlierPolicy {
    Off,
    /// `[mean - z*stddev, mean + z*stddev]`; outliers are counted, not excluded.
    #[default]
    Gaussian,
    /// `sample > factor * mean`; outliers are counted and excluded from stats.
    Threshold { factor: f64 },
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub ntimes: u64,
    pub expected_errno: i32,
    pub path: PathBuf,
    pub verbose: bool,
    pub outliers: OutlierPolicy,
    pub calibration_window: u64,
    pub warn_percent: f64,
    pub histogram: HistogramLayout,
    pub cpu: Option<usize>,
    pub lock_memory: bool,
}

impl BenchConfig {
    pub fn new(ntimes: u64, expected_errno: i32, path: impl Into<PathBuf>) -> Self {
        Self {
            ntimes,
            expected_errno,
            path: path.into(),
            verbose: false,
            outliers: OutlierPolicy::default(),
            calibration_window: DEFAULT_CALIBRATION_WINDOW,
            warn_percent: DEFAULT_WARN_PERCENT,
            histogram: HistogramLayout::default(),
            cpu: None,
            lock_memory: false,
        }
    }

    pub fn warmup(&self) -> u64 {
        self.ntimes / WARMUP_DIVISOR
    }

    /// Whether calibration can ever complete for this run.
    pub fn detection_enabled(&self) -> bool {
        self.outliers != OutlierPolicy::Off && self.ntimes >= self.calibration_window
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.ntimes == 0 {
            return Err(BenchError::InvalidConfig("ntimes must be positive".into()));
        }
        if self.expected_errno < 0 {
            return Err(BenchError::InvalidConfig(format!(
                "expected errno must be >= 0, got {}",
                self.expected_errno
            )));
        }
        if self.calibration_window == 0 {
            return Err(BenchError::InvalidConfig(
                "calibration window must be >= 1".into(),
            ));
        }
        if let OutlierPolicy::Threshold { factor } = self.outliers {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(BenchError::InvalidConfig(format!(
                    "threshold factor must be a positive number, got {factor}"
                )));
            }
        }
        if !(self.warn_percent.is_finite() && self.warn_percent >= 0.0) {
            return Err(BenchError::InvalidConfig(format!(
                "warn percent must be >= 0, got {}",
                self.warn_percent
            )));
        }
        self.histogram.validate()
    }
}
