use tracing::debug;

use crate::config::{BenchConfig, OutlierPolicy};
use crate::outlier::{Bounds, Classification, OutlierModel};
use crate::stats::{Histogram, RunningStats};

#[derive(Debug)]
enum State {
    /// Every sample is accepted. With `window: None` the state is terminal.
    Calibrating { window: Option<u64> },
    Calibrated { model: Box<dyn OutlierModel> },
}

/// Outlier counters, present once a model was frozen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierSummary {
    pub outliers: u64,
    pub classified: u64,
    pub bounds: Bounds,
    pub excluded: bool,
}

impl OutlierSummary {
    pub fn percent(&self) -> f64 {
        if self.classified == 0 {
            0.0
        } else {
            self.outliers as f64 / self.classified as f64 * 100.0
        }
    }
}

/// Single-pass aggregator over the measured samples.
#[derive(Debug)]
pub struct Aggregator {
    policy: OutlierPolicy,
    state: State,
    stats: RunningStats,
    histogram: Histogram,
    outliers: u64,
    classified: u64,
}

impl Aggregator {
    pub fn new(config: &BenchConfig) -> Self {
        let window = config
            .detection_enabled()
            .then_some(config.calibration_window);
        Self {
            policy: config.outliers,
            state: State::Calibrating { window },
            stats: RunningStats::default(),
            histogram: Histogram::new(config.histogram),
            outliers: 0,
            classified: 0,
        }
    }

    pub fn push(&mut self, ns: u64) {
        self.histogram.add(ns);

        match &self.state {
            State::Calibrating { window } => {
                self.stats.add(ns);
                if *window == Some(self.stats.count) {
                    self.calibrate();
                }
            }
            State::Calibrated { model } => {
                self.classified += 1;
                match model.classify(ns) {
                    Classification::Inlier => self.stats.add(ns),
                    Classification::Outlier => {
                        self.outliers += 1;
                        if !model.excludes_outliers() {
                            self.stats.add(ns);
                        }
                    }
                }
            }
        }
    }

    fn calibrate(&mut self) {
        match self.policy.freeze(&self.stats) {
            Some(model) => {
                debug!(
                    samples = self.stats.count,
                    bounds = %model.bounds(),
                    "outlier model calibrated"
                );
                self.state = State::Calibrated { model };
            }
            None => self.state = State::Calibrating { window: None },
        }
    }

    /// Bounds of the frozen model, if calibration has happened.
    pub fn bounds(&self) -> Option<Bounds> {
        match &self.state {
            State::Calibrated { model } => Some(model.bounds()),
            State::Calibrating { .. } => None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, State::Calibrated { .. })
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn outlier_summary(&self) -> Option<OutlierSummary> {
        match &self.state {
            State::Calibrated { model } => Some(OutlierSummary {
                outliers: self.outliers,
                classified: self.classified,
                bounds: model.bounds(),
                excluded: model.excludes_outliers(),
            }),
            State::Calibrating { .. } => None,
        }
    }
}
