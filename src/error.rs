use thiserror::Error;

/// Problems detected before any scanning starts. All of them are fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid port range: {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("invalid IP address or hostname: {0}")]
    UnresolvableHost(String),

    #[error("timeout must be a positive number of seconds")]
    InvalidTimeout,

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("failed to initialise TLS: {0}")]
    Tls(String),
}
