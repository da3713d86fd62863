use async_trait::async_trait;
use log::{debug, trace};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::{self, Instant};
use tokio_native_tls::{TlsConnector, TlsStream};

use crate::banner::{self, DEFAULT_READ_TIMEOUT};
use crate::error::ValidationError;
use crate::services::{self, TLS_PORTS};
use crate::types::{PortResult, PortState, ScanTarget, UnreachableReason};

/// Banner text used when the TLS handshake does not complete.
pub const TLS_HANDSHAKE_FAILED: &str = "TLS handshake failed";

/// Anything that can run one full probe of a single port.
///
/// Implementations own every socket they open and must release it before
/// returning. The coordinator only sees the finished [`PortResult`].
#[async_trait]
pub trait PortProber: Send + Sync + 'static {
    async fn probe(&self, addr: IpAddr, port: u16) -> PortResult;
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Host string for the HTTP Host header and TLS SNI.
    pub host: String,
    pub connect_timeout: Duration,
    pub banner_timeout: Duration,
    pub max_banner_len: usize,
    pub tls: bool,
    /// Ports that get a TLS handshake when `tls` is set.
    pub tls_ports: Vec<u16>,
}

impl ProbeOptions {
    pub fn from_target(target: &ScanTarget) -> Self {
        Self {
            host: target.host.clone(),
            connect_timeout: target.timeout,
            banner_timeout: DEFAULT_READ_TIMEOUT,
            max_banner_len: target.max_banner_len,
            tls: target.tls,
            tls_ports: TLS_PORTS.to_vec(),
        }
    }

    pub fn with_banner_timeout(mut self, banner_timeout: Duration) -> Self {
        self.banner_timeout = banner_timeout;
        self
    }
}

/// TCP connect probe with optional TLS wrapping and banner grab.
pub struct TcpProber {
    opts: ProbeOptions,
    tls: Option<TlsConnector>,
}

impl TcpProber {
    /// Builds the TLS connector up front so a broken TLS backend is a startup error.
    pub fn new(opts: ProbeOptions) -> Result<Self, ValidationError> {
        let tls = if opts.tls {
            let sni = opts.host.parse::<IpAddr>().is_err();
            // Banner grabbing, not validation: accept whatever the peer presents.
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .use_sni(sni)
                .build()
                .map_err(|e| ValidationError::Tls(e.to_string()))?;
            Some(TlsConnector::from(connector))
        } else {
            None
        };
        Ok(Self { opts, tls })
    }

    fn wants_tls(&self, port: u16) -> Option<&TlsConnector> {
        self.tls
            .as_ref()
            .filter(|_| self.opts.tls_ports.contains(&port))
    }

    async fn probe_port(&self, addr: IpAddr, port: u16) -> PortResult {
        let sa = SocketAddr::new(addr, port);
        let socket = match new_socket(&sa) {
            Ok(s) => s,
            Err(e) => return PortResult::error(port, format!("socket allocation failed: {e}")),
        };

        let start = Instant::now();
        let stream = match time::timeout(self.opts.connect_timeout, socket.connect(sa)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                trace!("{sa}: connect failed: {e}");
                return PortResult::unreachable(port, classify_connect_error(&e))
                    .with_latency(start.elapsed());
            }
            Err(_) => {
                return PortResult::unreachable(port, UnreachableReason::TimedOut)
                    .with_latency(start.elapsed());
            }
        };
        let latency = start.elapsed();
        let service = services::service_name(port);

        let state = match self.wants_tls(port) {
            Some(connector) => self.probe_tls(connector, stream, port, service).await,
            None => {
                let mut stream = stream;
                let banner = banner::grab_banner(
                    &mut stream,
                    port,
                    self.opts.max_banner_len,
                    &self.opts.host,
                    self.opts.banner_timeout,
                )
                .await;
                PortState::Open {
                    service: service.to_string(),
                    banner,
                    tls_subject: None,
                }
            }
        };
        debug!("{sa}: open ({service}) in {}ms", latency.as_millis());

        PortResult {
            port,
            state,
            latency_ms: 0,
        }
        .with_latency(latency)
    }

    async fn probe_tls(
        &self,
        connector: &TlsConnector,
        stream: TcpStream,
        port: u16,
        service: &str,
    ) -> PortState {
        let handshake = time::timeout(
            self.opts.connect_timeout,
            connector.connect(&self.opts.host, stream),
        )
        .await;

        match handshake {
            Ok(Ok(mut tls_stream)) => {
                let tls_subject = peer_subject(&tls_stream);
                let banner = banner::grab_banner(
                    &mut tls_stream,
                    port,
                    self.opts.max_banner_len,
                    &self.opts.host,
                    self.opts.banner_timeout,
                )
                .await;
                PortState::Open {
                    service: service.to_string(),
                    banner,
                    tls_subject,
                }
            }
            Ok(Err(e)) => {
                debug!("port {port}: TLS handshake error: {e}");
                tls_failed(service)
            }
            Err(_) => {
                debug!("port {port}: TLS handshake timed out");
                tls_failed(service)
            }
        }
    }
}

#[async_trait]
impl PortProber for TcpProber {
    async fn probe(&self, addr: IpAddr, port: u16) -> PortResult {
        self.probe_port(addr, port).await
    }
}

fn tls_failed(service: &str) -> PortState {
    PortState::Open {
        service: service.to_string(),
        banner: TLS_HANDSHAKE_FAILED.to_string(),
        tls_subject: None,
    }
}

fn new_socket(sa: &SocketAddr) -> io::Result<TcpSocket> {
    if sa.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}

fn classify_connect_error(e: &io::Error) -> UnreachableReason {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => UnreachableReason::Refused,
        io::ErrorKind::TimedOut => UnreachableReason::TimedOut,
        _ => UnreachableReason::Other(e.to_string()),
    }
}

/// Subject DN of the peer's leaf certificate, if one was presented and parses.
fn peer_subject(stream: &TlsStream<TcpStream>) -> Option<String> {
    let cert = stream.get_ref().peer_certificate().ok().flatten()?;
    let der = cert.to_der().ok()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der).ok()?;
    let subject = parsed.subject().to_string();
    (!subject.is_empty()).then_some(subject)
}
