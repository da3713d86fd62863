use clap::{ArgAction, Parser};
use log::LevelFilter;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ValidationError;
use crate::probe::ProbeOptions;
use crate::types::ScanTarget;

/// port-scan-rs — bounded-concurrency TCP port scanner with plain and TLS banner grabbing.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-scan-rs",
    version,
    about = "Bounded-concurrency TCP port scanner with plain and TLS banner grabbing.",
    long_about = None
)]
pub struct Cli {
    /// Hostname or IP address to scan.
    pub target: String,

    /// First port of the range (inclusive).
    pub start_port: u16,

    /// Last port of the range (inclusive).
    pub end_port: u16,

    /// Per-connection timeout in seconds (fractions allowed).
    #[arg(short = 't', long, value_name = "SECONDS", default_value_t = 1.0)]
    pub timeout: f64,

    /// Maximum banner length to capture, in bytes.
    #[arg(short = 'b', long = "banner", value_name = "LENGTH", default_value_t = 1024)]
    pub banner: usize,

    /// Wrap well-known encrypted-service ports (443, 465, 636, 993, 995, 8443) in TLS.
    #[arg(short = 's', long = "ssl", default_value_t = false)]
    pub ssl: bool,

    /// Maximum number of simultaneous probes.
    #[arg(short = 'c', long, value_name = "N", default_value_t = 100)]
    pub concurrency: usize,

    /// Banner read deadline in milliseconds, separate from the connect timeout.
    #[arg(long = "banner-timeout-ms", value_name = "MS", default_value_t = 500)]
    pub banner_timeout_ms: u64,

    /// Print results and summary as JSON lines.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Do not draw the progress indicator.
    #[arg(long = "no-progress", default_value_t = false)]
    pub no_progress: bool,

    /// Also print closed and failed ports.
    #[arg(long, default_value_t = false)]
    pub closed: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Exit status for a failed parse: help and version are successes, any other
/// argument problem is a usage error.
pub fn exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn connect_timeout(&self) -> Result<Duration, ValidationError> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Duration::try_from_secs_f64(self.timeout).map_err(|_| ValidationError::InvalidTimeout)
    }

    /// Validate everything except the host and build the scan description.
    pub fn scan_target(&self, addr: IpAddr) -> Result<ScanTarget, ValidationError> {
        ScanTarget::new(
            self.target.trim(),
            addr,
            self.start_port,
            self.end_port,
            self.concurrency,
            self.connect_timeout()?,
            self.banner,
            self.ssl,
        )
    }

    pub fn probe_options(&self, target: &ScanTarget) -> ProbeOptions {
        ProbeOptions::from_target(target)
            .with_banner_timeout(Duration::from_millis(self.banner_timeout_ms))
    }
}
