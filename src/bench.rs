use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::report::{Narrator, Report};
use crate::system;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

fn now_ns() -> Result<u64, BenchError> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return Err(BenchError::Clock(io::Error::last_os_error()));
    }
    Ok(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
}

fn elapsed_ns(start: u64, end: u64) -> Result<u64, BenchError> {
    end.checked_sub(start)
        .ok_or(BenchError::ClockWentBackwards { start, end })
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Times `open(path, O_RDONLY)` and checks the outcome against an expected errno.
#[derive(Debug)]
pub struct Sampler {
    path: PathBuf,
    c_path: CString,
    expected_errno: i32,
}

impl Sampler {
    pub fn new(path: &Path, expected_errno: i32) -> Result<Self, BenchError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| BenchError::InvalidPath(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            c_path,
            expected_errno,
        })
    }

    /// One attempt; returns the elapsed time of the `open` call alone.
    pub fn sample(&self) -> Result<u64, BenchError> {
        let t0 = now_ns()?;
        let fd = unsafe { libc::open(self.c_path.as_ptr(), libc::O_RDONLY) };
        let t1 = now_ns();
        let outcome = if fd < 0 {
            Err(io::Error::last_os_error())
        } else {
            // closed on drop, after the timed window
            Ok(unsafe { OwnedFd::from_raw_fd(fd) })
        };
        let t1 = t1?;

        self.check(outcome)?;
        elapsed_ns(t0, t1)
    }

    fn check(&self, outcome: io::Result<OwnedFd>) -> Result<(), BenchError> {
        match outcome {
            Ok(_fd) if self.expected_errno == 0 => Ok(()),
            Ok(_fd) => Err(BenchError::UnexpectedSuccess {
                path: self.path.clone(),
                expected: self.expected_errno,
            }),
            Err(e) if e.raw_os_error() == Some(self.expected_errno) => Ok(()),
            Err(e) => Err(BenchError::UnexpectedErrno {
                path: self.path.clone(),
                expected: self.expected_errno,
                actual: e,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// Warm up, then feed `ntimes` measured samples into a fresh aggregator.
///
/// Any failed iteration aborts the whole run; no partial report is produced.
pub fn run(config: &BenchConfig) -> Result<Report, BenchError> {
    config.validate()?;
    let narrator = Narrator::new(config.verbose);
    let sampler = Sampler::new(&config.path, config.expected_errno)?;
    let warmup = config.warmup();

    narrator.say(format_args!("ntimes: {}", config.ntimes))?;
    narrator.say(format_args!(
        "running open for {warmup} times to warm up first."
    ))?;
    narrator.say(format_args!("expected errno: {}", config.expected_errno))?;
    narrator.say(format_args!("path: {}", config.path.display()))?;

    if let Some(cpu) = config.cpu {
        system::pin_to_cpu(cpu)?;
        debug!(cpu, "pinned to CPU");
    }
    if config.lock_memory {
        system::lock_memory()?;
        debug!("memory locked");
    }

    for _ in 0..warmup {
        sampler.sample()?;
    }

    let mut aggregator = Aggregator::new(config);
    let start = now_ns()?;
    narrator.say(format_args!("Done warming up."))?;

    for _ in 0..config.ntimes {
        let was_calibrated = aggregator.is_calibrated();
        aggregator.push(sampler.sample()?);
        if !was_calibrated {
            if let Some(bounds) = aggregator.bounds() {
                narrator.say(format_args!("outlier bounds calibrated: {bounds}"))?;
            }
        }
    }

    let total = elapsed_ns(start, now_ns()?)?;
    narrator.say(format_args!(
        "Total time: {total} ns => {:.4} avg",
        total as f64 / config.ntimes as f64
    ))?;
    info!(
        ntimes = config.ntimes,
        accepted = aggregator.stats().count,
        "sampling finished"
    );

    Ok(Report::new(&aggregator, config.warn_percent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_clock_is_monotonic() {
        let a = now_ns().unwrap();
        let b = now_ns().unwrap();
        assert!(elapsed_ns(a, b).is_ok());
    }

    #[test]
    fn test_backwards_clock_is_an_error() {
        assert!(matches!(
            elapsed_ns(10, 5),
            Err(BenchError::ClockWentBackwards { start: 10, end: 5 })
        ));
        assert_eq!(elapsed_ns(5, 10).unwrap(), 5);
    }

    #[test]
    fn test_expected_success() {
        let file = NamedTempFile::new().unwrap();
        let sampler = Sampler::new(file.path(), 0).unwrap();
        for _ in 0..100 {
            sampler.sample().unwrap();
        }
    }

    #[test]
    fn test_expected_enoent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let sampler = Sampler::new(&missing, libc::ENOENT).unwrap();
        sampler.sample().unwrap();
    }

    #[test]
    fn test_unexpected_success() {
        let file = NamedTempFile::new().unwrap();
        let sampler = Sampler::new(file.path(), libc::ENOENT).unwrap();
        assert!(matches!(
            sampler.sample(),
            Err(BenchError::UnexpectedSuccess { expected, .. }) if expected == libc::ENOENT
        ));
    }

    #[test]
    fn test_unexpected_errno() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = Sampler::new(&dir.path().join("missing"), 0).unwrap();
        match sampler.sample() {
            Err(BenchError::UnexpectedErrno { actual, .. }) => {
                assert_eq!(actual.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_nul_in_path() {
        assert!(matches!(
            Sampler::new(Path::new("a\0b"), 0),
            Err(BenchError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_no_descriptor_leak() {
        let file = NamedTempFile::new().unwrap();
        let sampler = Sampler::new(file.path(), 0).unwrap();
        let before = std::fs::read_dir("/proc/self/fd").map(|d| d.count()).ok();
        for _ in 0..1000 {
            sampler.sample().unwrap();
        }
        let after = std::fs::read_dir("/proc/self/fd").map(|d| d.count()).ok();
        if let (Some(before), Some(after)) = (before, after) {
            // other test threads may hold a few descriptors of their own
            assert!(after < before + 50);
        }
    }

    #[test]
    fn test_run_counts_every_sample() {
        let file = NamedTempFile::new().unwrap();
        let mut config = BenchConfig::new(1000, 0, file.path());
        config.calibration_window = 100;
        let report = run(&config).unwrap();
        assert_eq!(report.histogram_total(), 1000);
        let ntimes = report.cstats().ntimes;
        assert!((1..=1000).contains(&ntimes));
    }

    #[test]
    fn test_run_aborts_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig::new(10, 0, dir.path().join("missing"));
        assert!(matches!(
            run(&config),
            Err(BenchError::UnexpectedErrno { .. })
        ));
    }

    #[test]
    fn test_run_rejects_zero_ntimes() {
        let config = BenchConfig::new(0, 0, "/");
        assert!(matches!(run(&config), Err(BenchError::InvalidConfig(_))));
    }
}
