//! Structured output and operator-facing narration.
//!
//! Records go out one JSON object per line:
//!
//! ```text
//! {"type":"cstats","ntimes":..,"mean":..,"stddev":..,"min":..,"max":..,"sum_of_squares":..}
//! {"type":"chist","buckets":[{"min":..,"max":..,"count":..},..]}
//! ```
//!
//! Verbose narration lines start with `[#] ` so consumers can drop them.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;
use tracing::warn;

use crate::aggregate::{Aggregator, OutlierSummary};
use crate::error::BenchError;
use crate::outlier::Bounds;
use crate::stats::Bucket;

pub const NARRATION_PREFIX: &str = "[#] ";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRecord {
    pub ntimes: u64,
    pub mean: f64,
    pub stddev: f64,
    pub min: u64,
    pub max: u64,
    pub sum_of_squares: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketRecord {
    pub min: u64,
    pub max: u64,
    pub count: u64,
}

impl From<Bucket> for BucketRecord {
    fn from(b: Bucket) -> Self {
        Self {
            min: b.min,
            max: b.max,
            count: b.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Record {
    #[serde(rename = "cstats")]
    Stats(StatsRecord),
    #[serde(rename = "chist")]
    Histogram { buckets: Vec<BucketRecord> },
}

/// Raised when too many post-calibration samples fell outside the bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierWarning {
    pub outliers: u64,
    pub classified: u64,
    pub percent: f64,
    pub limit_percent: f64,
    pub bounds: Bounds,
    pub excluded: bool,
}

impl OutlierWarning {
    fn check(summary: &OutlierSummary, limit_percent: f64) -> Option<Self> {
        let percent = summary.percent();
        (summary.classified > 0 && percent > limit_percent).then_some(Self {
            outliers: summary.outliers,
            classified: summary.classified,
            percent,
            limit_percent,
            bounds: summary.bounds,
            excluded: summary.excluded,
        })
    }
}

impl fmt::Display for OutlierWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} samples after calibration were outliers ({:.2}% > {:.2}%), bounds {}{}",
            self.outliers,
            self.classified,
            self.percent,
            self.limit_percent,
            self.bounds,
            if self.excluded {
                ", excluded from stats"
            } else {
                ""
            }
        )
    }
}

/// Final output of one run.
#[derive(Debug, Clone)]
pub struct Report {
    stats: StatsRecord,
    buckets: Vec<BucketRecord>,
    warning: Option<OutlierWarning>,
}

impl Report {
    pub fn new(aggregator: &Aggregator, warn_percent: f64) -> Self {
        let stats = aggregator.stats();
        let warning = aggregator
            .outlier_summary()
            .and_then(|s| OutlierWarning::check(&s, warn_percent));
        Self {
            stats: StatsRecord {
                ntimes: stats.count,
                mean: stats.mean(),
                stddev: stats.stddev(),
                min: stats.min().unwrap_or(0),
                max: stats.max().unwrap_or(0),
                sum_of_squares: stats.sum_of_squares,
            },
            buckets: aggregator
                .histogram()
                .buckets()
                .into_iter()
                .map(BucketRecord::from)
                .collect(),
            warning,
        }
    }

    pub fn cstats(&self) -> &StatsRecord {
        &self.stats
    }

    pub fn histogram_total(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    pub fn warning(&self) -> Option<&OutlierWarning> {
        self.warning.as_ref()
    }

    pub fn records(&self) -> [Record; 2] {
        [
            Record::Stats(self.stats.clone()),
            Record::Histogram {
                buckets: self.buckets.clone(),
            },
        ]
    }

    /// Log the outlier warning, if any, then write both records.
    pub fn emit<W: Write>(&self, out: &mut W) -> Result<(), BenchError> {
        if let Some(w) = &self.warning {
            warn!(
                outliers = w.outliers,
                classified = w.classified,
                bounds = %w.bounds,
                "{w}"
            );
        }
        for record in self.records() {
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Prints `[#]`-prefixed progress lines to stdout when verbose.
#[derive(Debug, Clone, Copy)]
pub struct Narrator {
    verbose: bool,
}

impl Narrator {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn say(&self, args: fmt::Arguments<'_>) -> Result<(), BenchError> {
        if self.verbose {
            narrate(&mut io::stdout().lock(), args)?;
        }
        Ok(())
    }
}

fn narrate<W: Write>(out: &mut W, args: fmt::Arguments<'_>) -> io::Result<()> {
    writeln!(out, "{NARRATION_PREFIX}{args}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BenchConfig, HistogramLayout, OutlierPolicy};

    fn aggregate(config: &BenchConfig, samples: &[u64]) -> Aggregator {
        let mut agg = Aggregator::new(config);
        for &ns in samples {
            agg.push(ns);
        }
        agg
    }

    fn small_config(ntimes: u64, policy: OutlierPolicy, window: u64) -> BenchConfig {
        let mut config = BenchConfig::new(ntimes, 0, "/");
        config.outliers = policy;
        config.calibration_window = window;
        config.histogram = HistogramLayout { min: 100, step: 50, max: 200 };
        config
    }

    fn emit_lines(report: &Report) -> Vec<serde_json::Value> {
        let mut buf = Vec::new();
        report.emit(&mut buf).unwrap();
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_narration_prefix() {
        let mut buf = Vec::new();
        narrate(&mut buf, format_args!("ntimes: {}", 10)).unwrap();
        assert_eq!(buf, b"[#] ntimes: 10\n");
    }

    #[test]
    fn test_narration_write_failure_is_reported() {
        let err = narrate(&mut ClosedPipe, format_args!("Done warming up.")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_emit_write_failure_is_reported() {
        let config = small_config(1, OutlierPolicy::Off, 1);
        let report = Report::new(&aggregate(&config, &[150]), 5.0);
        assert!(report.emit(&mut ClosedPipe).is_err());
    }

    #[test]
    fn test_quiet_narrator_writes_nothing() {
        assert!(Narrator::new(false).say(format_args!("ignored")).is_ok());
    }

    #[test]
    fn test_record_format() {
        let config = small_config(4, OutlierPolicy::Off, 1);
        let report = Report::new(&aggregate(&config, &[90, 120, 160, 250]), 5.0);
        let mut buf = Vec::new();
        report.emit(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            r#"{"type":"cstats","ntimes":4,"mean":155.0,"stddev":60.207972893961475,"min":90,"max":250,"sum_of_squares":110600}"#
        );
        assert_eq!(
            lines.next().unwrap(),
            concat!(
                r#"{"type":"chist","buckets":["#,
                r#"{"min":90,"max":99,"count":1},"#,
                r#"{"min":100,"max":149,"count":1},"#,
                r#"{"min":150,"max":199,"count":1},"#,
                r#"{"min":200,"max":250,"count":1}]}"#
            )
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_histogram_sums_to_samples_with_exclusions() {
        let config = small_config(20, OutlierPolicy::Threshold { factor: 2.0 }, 10);
        let mut samples = vec![120; 10];
        samples.extend([120, 120, 120, 120, 120, 120, 10, 9000, 9000, 9000]);
        let report = Report::new(&aggregate(&config, &samples), 5.0);

        assert_eq!(report.histogram_total(), 20);
        assert_eq!(report.cstats().ntimes, 17);
        assert_eq!(report.cstats().min, 10);
        assert_eq!(report.cstats().max, 120);

        let lines = emit_lines(&report);
        let buckets = lines[1]["buckets"].as_array().unwrap();
        assert_eq!(buckets.last().unwrap()["max"], 9000);
        assert_eq!(buckets.first().unwrap()["min"], 10);
    }

    #[test]
    fn test_warning_above_limit() {
        let config = small_config(30, OutlierPolicy::Threshold { factor: 2.0 }, 10);
        let mut samples = vec![100; 10];
        // 2 of 20 = 10%
        samples.extend([100; 18]);
        samples.extend([500, 600]);
        let report = Report::new(&aggregate(&config, &samples), 5.0);

        let warning = report.warning().unwrap();
        assert_eq!(warning.outliers, 2);
        assert_eq!(warning.classified, 20);
        assert_eq!(warning.bounds, Bounds::Ceiling(200.0));
        let text = warning.to_string();
        assert!(text.contains("2 of 20"));
        assert!(text.contains("> 200.0000 ns"));
    }

    #[test]
    fn test_no_warning_at_or_below_limit() {
        let config = small_config(30, OutlierPolicy::Threshold { factor: 2.0 }, 10);
        let mut samples = vec![100; 29];
        // 1 of 20 = 5%, not above the limit
        samples.push(500);
        let report = Report::new(&aggregate(&config, &samples), 5.0);
        assert!(report.warning().is_none());
        assert_eq!(report.cstats().ntimes, 29);
    }

    #[test]
    fn test_no_warning_without_calibration() {
        let config = small_config(5, OutlierPolicy::Gaussian, 10);
        let report = Report::new(&aggregate(&config, &[1, 1_000_000, 1, 1_000_000, 1]), 5.0);
        assert!(report.warning().is_none());
        assert_eq!(report.cstats().ntimes, 5);
    }

    #[test]
    fn test_gaussian_warning_reports_interval() {
        let config = small_config(20, OutlierPolicy::Gaussian, 10);
        let mut samples = vec![100; 10];
        samples.extend([100; 9]);
        samples.push(101);
        let report = Report::new(&aggregate(&config, &samples), 5.0);
        let warning = report.warning().unwrap();
        assert_eq!(warning.outliers, 1);
        assert_eq!(
            warning.bounds,
            Bounds::Interval { low: 100.0, high: 100.0 }
        );
        assert!(!warning.excluded);
        assert_eq!(report.cstats().ntimes, 20);
    }
}
