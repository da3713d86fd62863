use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ValidationError;

/// Immutable description of one scan: where, which ports, and how hard to push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    /// Host string exactly as supplied by the user (used for the HTTP Host header and TLS SNI).
    pub host: String,
    pub addr: IpAddr,
    pub start_port: u16,
    pub end_port: u16,
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_banner_len: usize,
    pub tls: bool,
}

/// Upper bound on simultaneous probes regardless of what was requested.
pub const MAX_CONCURRENCY: usize = 5_000;

impl ScanTarget {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: impl Into<String>,
        addr: IpAddr,
        start_port: u16,
        end_port: u16,
        concurrency: usize,
        timeout: Duration,
        max_banner_len: usize,
        tls: bool,
    ) -> Result<Self, ValidationError> {
        if start_port == 0 || start_port > end_port {
            return Err(ValidationError::InvalidPortRange {
                start: start_port,
                end: end_port,
            });
        }
        if concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if timeout.is_zero() {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(Self {
            host: host.into(),
            addr,
            start_port,
            end_port,
            concurrency: concurrency.min(MAX_CONCURRENCY),
            timeout,
            max_banner_len,
            tls,
        })
    }

    /// Number of ports in the inclusive range.
    pub fn port_count(&self) -> u64 {
        u64::from(self.end_port) - u64::from(self.start_port) + 1
    }

    pub fn ports(&self) -> std::ops::RangeInclusive<u16> {
        self.start_port..=self.end_port
    }
}

/// Why a connection did not complete.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnreachableReason {
    Refused,
    TimedOut,
    Other(String),
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableReason::Refused => f.write_str("refused"),
            UnreachableReason::TimedOut => f.write_str("timed out"),
            UnreachableReason::Other(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PortState {
    Open {
        service: String,
        banner: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tls_subject: Option<String>,
    },
    Unreachable {
        reason: UnreachableReason,
    },
    Error {
        reason: String,
    },
}

/// Outcome of probing a single port. Produced once per admitted port.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    #[serde(flatten)]
    pub state: PortState,
    pub latency_ms: u64,
}

impl PortResult {
    pub fn open(port: u16, service: impl Into<String>, banner: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Open {
                service: service.into(),
                banner: banner.into(),
                tls_subject: None,
            },
            latency_ms: 0,
        }
    }

    pub fn unreachable(port: u16, reason: UnreachableReason) -> Self {
        Self {
            port,
            state: PortState::Unreachable { reason },
            latency_ms: 0,
        }
    }

    pub fn error(port: u16, reason: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Error {
                reason: reason.into(),
            },
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PortState::Open { .. })
    }
}

impl fmt::Display for PortResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            PortState::Open {
                service,
                banner,
                tls_subject,
            } => {
                write!(f, "Port {}: Open ({}) - {}", self.port, service, banner)?;
                if let Some(subject) = tls_subject {
                    write!(f, " [tls: {subject}]")?;
                }
                Ok(())
            }
            PortState::Unreachable { reason } => {
                write!(f, "Port {}: Closed ({})", self.port, reason)
            }
            PortState::Error { reason } => write!(f, "Port {}: Error - {}", self.port, reason),
        }
    }
}

/// Aggregate counters reported at the end of a scan.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub open_count: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            writeln!(
                f,
                "Scan interrupted by user: {} of {} ports attempted",
                self.scanned_done, self.scanned_total
            )?;
        }
        write!(
            f,
            "Scan complete: {} open ports in {:.2} seconds",
            self.open_count,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}
