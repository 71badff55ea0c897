use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use open_ntimes::config::{
    DEFAULT_CALIBRATION_WINDOW, DEFAULT_HIST_MAX, DEFAULT_HIST_MIN, DEFAULT_HIST_STEP,
    DEFAULT_THRESHOLD_FACTOR, DEFAULT_WARN_PERCENT,
};
use open_ntimes::{BenchConfig, BenchError, HistogramLayout, OutlierPolicy};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutlierMode {
    Off,
    Gaussian,
    Threshold,
}

#[derive(Parser, Debug)]
#[command(
    name = "open-ntimes",
    version,
    about = "Time NTIMES open(2) calls on PATH and print latency stats as JSON lines"
)]
struct Cli {
    /// Number of measured open calls (a further NTIMES/5 are run as warm-up)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    ntimes: u64,

    /// Expected errno of every call, 0 if each open must succeed
    #[arg(value_parser = clap::value_parser!(i32).range(0..))]
    errno: i32,

    /// Path to open read-only
    path: PathBuf,

    /// Print "[#]"-prefixed progress lines (also enabled by VERBOSE != 0)
    #[arg(short, long)]
    verbose: bool,

    /// Outlier detection policy applied after calibration
    #[arg(long, value_enum, default_value_t = OutlierMode::Gaussian)]
    outliers: OutlierMode,

    /// Multiplier over the calibration mean for --outliers threshold
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_FACTOR)]
    threshold_factor: f64,

    /// Samples used to calibrate outlier bounds
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_WINDOW)]
    calibration: u64,

    /// Warn when more than this percentage of classified samples are outliers
    #[arg(long, default_value_t = DEFAULT_WARN_PERCENT)]
    warn_percent: f64,

    /// Lower edge of the histogram in ns
    #[arg(long, default_value_t = DEFAULT_HIST_MIN)]
    hist_min: u64,

    /// Histogram bucket width in ns
    #[arg(long, default_value_t = DEFAULT_HIST_STEP)]
    hist_step: u64,

    /// Upper edge of the histogram in ns
    #[arg(long, default_value_t = DEFAULT_HIST_MAX)]
    hist_max: u64,

    /// Pin the process to this CPU before sampling
    #[arg(long)]
    cpu: Option<usize>,

    /// Lock memory with mlockall before sampling
    #[arg(long)]
    mlock: bool,
}

impl Cli {
    fn into_config(self, verbose_env: bool) -> BenchConfig {
        let outliers = match self.outliers {
            OutlierMode::Off => OutlierPolicy::Off,
            OutlierMode::Gaussian => OutlierPolicy::Gaussian,
            OutlierMode::Threshold => OutlierPolicy::Threshold {
                factor: self.threshold_factor,
            },
        };
        BenchConfig {
            ntimes: self.ntimes,
            expected_errno: self.errno,
            path: self.path,
            verbose: self.verbose || verbose_env,
            outliers,
            calibration_window: self.calibration,
            warn_percent: self.warn_percent,
            histogram: HistogramLayout {
                min: self.hist_min,
                step: self.hist_step,
                max: self.hist_max,
            },
            cpu: self.cpu,
            lock_memory: self.mlock,
        }
    }
}

fn verbose_from_env() -> bool {
    env::var_os("VERBOSE").is_some_and(|v| v != "0")
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "open_ntimes=debug"
    } else {
        "open_ntimes=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
        Err(e) => e.exit(),
    };
    let config = cli.into_config(verbose_from_env());
    init_logging(config.verbose);

    match bench(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn bench(config: &BenchConfig) -> Result<(), BenchError> {
    let report = open_ntimes::run(config)?;
    report.emit(&mut io::stdout().lock())
}
