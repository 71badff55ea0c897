//! Syscall latency microbenchmark.
//!
//! Repeatedly opens one path read-only, times every `open(2)` with the
//! monotonic clock, and reduces the samples online into running statistics,
//! a fixed-resolution histogram and an outlier count.

pub mod aggregate;
pub mod bench;
pub mod config;
pub mod error;
pub mod outlier;
pub mod report;
pub mod stats;
pub mod system;

pub use aggregate::Aggregator;
pub use bench::{run, Sampler};
pub use config::{BenchConfig, HistogramLayout, OutlierPolicy};
pub use error::BenchError;
pub use report::Report;
