use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("path {0:?} contains an interior NUL byte")]
    InvalidPath(PathBuf),

    #[error("clock_gettime: {0}")]
    Clock(#[source] io::Error),

    #[error("monotonic clock went backwards ({start} ns -> {end} ns)")]
    ClockWentBackwards { start: u64, end: u64 },

    #[error("unexpected success opening {path:?} (expected errno {expected})")]
    UnexpectedSuccess { path: PathBuf, expected: i32 },

    #[error("unexpected error opening {path:?} (expected errno {expected}): {actual}")]
    UnexpectedErrno {
        path: PathBuf,
        expected: i32,
        #[source]
        actual: io::Error,
    },

    #[error("failed to pin to CPU {cpu}: {source}")]
    Affinity {
        cpu: usize,
        #[source]
        source: io::Error,
    },

    #[error("mlockall: {0}")]
    MemoryLock(#[source] io::Error),

    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}
