use log::trace;
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

/// Returned when a service sends nothing we can show.
pub const NO_BANNER: &str = "No banner";
/// Appended to banners cut at the length limit.
pub const TRUNCATION_MARKER: &str = "...";
/// Replaces every run of line endings so a banner fits on one line.
pub const LINE_DELIMITER: &str = " | ";
/// Read deadline for banners, independent of the connect timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// What to send once a connection is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// The server greets first; only read.
    Greeting,
    /// Fixed request bytes.
    Static(&'static str),
    /// `HEAD /` with the target host in the Host header.
    HttpHead,
}

impl Payload {
    /// Bytes to write for this payload, if any.
    pub fn render(&self, host: &str) -> Option<Vec<u8>> {
        match self {
            Payload::Greeting => None,
            Payload::Static(s) => Some(s.as_bytes().to_vec()),
            Payload::HttpHead => {
                let host = if host.parse::<Ipv6Addr>().is_ok() {
                    format!("[{host}]")
                } else {
                    host.to_string()
                };
                Some(
                    format!("HEAD / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
                        .into_bytes(),
                )
            }
        }
    }
}

/// One row of the probe table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSpec {
    pub protocol: &'static str,
    pub ports: &'static [u16],
    pub payload: Payload,
}

/// Protocol probes keyed by port. Ports not listed are treated as greeting-first.
pub const PROBES: &[ProbeSpec] = &[
    ProbeSpec {
        protocol: "http",
        ports: &[80, 8080, 443, 8443],
        payload: Payload::HttpHead,
    },
    ProbeSpec {
        protocol: "smtp",
        ports: &[25, 587],
        payload: Payload::Static("EHLO portscanner\r\n"),
    },
    ProbeSpec {
        protocol: "pop3",
        ports: &[110],
        payload: Payload::Static("CAPA\r\n"),
    },
    ProbeSpec {
        protocol: "imap",
        ports: &[143],
        payload: Payload::Static("A001 CAPABILITY\r\n"),
    },
    ProbeSpec {
        protocol: "ftp",
        ports: &[21],
        payload: Payload::Greeting,
    },
    ProbeSpec {
        protocol: "ssh",
        ports: &[22],
        payload: Payload::Greeting,
    },
];

pub fn probe_for(port: u16) -> Option<&'static ProbeSpec> {
    PROBES.iter().find(|spec| spec.ports.contains(&port))
}

/// Send the port's probe payload (if any) and read back up to `max_len` bytes.
///
/// Every wait shares one deadline of `read_timeout`. Reading stops at EOF, at
/// the byte limit, at the deadline, or as soon as the reply so far ends in a
/// line break. Write failures, read errors and silence all end in
/// [`NO_BANNER`]; this never fails.
pub async fn grab_banner<S>(
    stream: &mut S,
    port: u16,
    max_len: usize,
    host: &str,
    read_timeout: Duration,
) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if max_len == 0 {
        return NO_BANNER.to_string();
    }
    let deadline = Instant::now() + read_timeout;

    let payload = probe_for(port).and_then(|spec| spec.payload.render(host));
    if let Some(bytes) = payload {
        match time::timeout_at(deadline, stream.write_all(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                trace!("port {port}: probe write failed: {e}");
                return NO_BANNER.to_string();
            }
            Err(_) => return NO_BANNER.to_string(),
        }
    }

    // One byte past the limit tells us whether the service had more to say.
    let limit = max_len.saturating_add(1);
    let mut captured: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    while captured.len() < limit {
        let want = chunk.len().min(limit - captured.len());
        match time::timeout_at(deadline, stream.read(&mut chunk[..want])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                captured.extend_from_slice(&chunk[..n]);
                if captured.ends_with(b"\n") {
                    break;
                }
            }
            Ok(Err(e)) => {
                trace!("port {port}: banner read failed: {e}");
                break;
            }
            Err(_) => break,
        }
    }

    let overflow = captured.len() > max_len;
    captured.truncate(max_len);
    sanitize_banner(&captured, max_len, overflow)
}

/// Make raw service bytes printable on a single line and enforce the length limit.
///
/// `already_truncated` forces the marker when the caller dropped bytes itself.
pub fn sanitize_banner(raw: &[u8], max_len: usize, already_truncated: bool) -> String {
    let raw = if already_truncated {
        trim_partial_char(raw)
    } else {
        raw
    };
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();

    let mut out = String::with_capacity(text.len());
    let mut in_break = false;
    for c in text.chars() {
        if c == '\r' || c == '\n' {
            if !in_break {
                out.push_str(LINE_DELIMITER);
                in_break = true;
            }
            continue;
        }
        in_break = false;
        if c.is_control() && c != '\t' {
            out.push('.');
        } else {
            out.push(c);
        }
    }

    if out.is_empty() {
        return NO_BANNER.to_string();
    }

    let mut truncated = already_truncated;
    if let Some((cut, _)) = out.char_indices().nth(max_len) {
        out.truncate(cut);
        truncated = true;
    }
    if truncated {
        out.push_str(TRUNCATION_MARKER);
    }
    out
}

/// Drop a UTF-8 sequence left incomplete by a byte-level cut.
fn trim_partial_char(raw: &[u8]) -> &[u8] {
    let tail_start = raw.len().saturating_sub(3);
    for i in (tail_start..raw.len()).rev() {
        let b = raw[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let needed = match b {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if raw.len() - i < needed { &raw[..i] } else { raw };
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn table_lookup() {
        assert_eq!(probe_for(8443).unwrap().payload, Payload::HttpHead);
        assert_eq!(probe_for(587).unwrap().protocol, "smtp");
        assert_eq!(probe_for(22).unwrap().payload, Payload::Greeting);
        assert!(probe_for(6379).is_none());
    }

    #[test]
    fn http_payload_carries_host() {
        let bytes = Payload::HttpHead.render("example.org").unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.starts_with("HEAD / HTTP/1.1\r\n"));
        assert!(s.contains("Host: example.org\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
        assert!(Payload::Greeting.render("x").is_none());
    }

    #[test]
    fn http_payload_brackets_ipv6_host() {
        let s = String::from_utf8(Payload::HttpHead.render("::1").unwrap()).unwrap();
        assert!(s.contains("Host: [::1]\r\n"), "{s}");
        let s = String::from_utf8(Payload::HttpHead.render("192.0.2.7").unwrap()).unwrap();
        assert!(s.contains("Host: 192.0.2.7\r\n"), "{s}");
    }

    #[test]
    fn cut_inside_multibyte_char_is_dropped() {
        let cut = &"abc€".as_bytes()[..4];
        assert_eq!(sanitize_banner(cut, 4, true), "abc...");
        let cut = &"a€".as_bytes()[..3];
        assert_eq!(sanitize_banner(cut, 3, true), "a...");
        // Complete sequences at the edge survive.
        assert_eq!(sanitize_banner("ab€".as_bytes(), 5, true), "ab€...");
    }

    #[test]
    fn collapses_line_endings() {
        let s = sanitize_banner(b"220 mail ESMTP\r\n250-PIPELINING\n\n250 OK\r\n", 1024, false);
        assert_eq!(s, "220 mail ESMTP | 250-PIPELINING | 250 OK");
    }

    #[test]
    fn empty_or_blank_is_no_banner() {
        assert_eq!(sanitize_banner(b"", 10, false), NO_BANNER);
        assert_eq!(sanitize_banner(b"\r\n \r\n", 10, false), NO_BANNER);
    }

    #[test]
    fn truncates_with_marker() {
        let s = sanitize_banner(b"abcdefghij", 4, false);
        assert_eq!(s, "abcd...");
        let s = sanitize_banner(b"abcd", 4, true);
        assert_eq!(s, "abcd...");
        let s = sanitize_banner(b"abcd", 4, false);
        assert_eq!(s, "abcd");
    }

    #[test]
    fn control_bytes_and_invalid_utf8_are_printable() {
        let s = sanitize_banner(b"ok\x00\x1b[31m\xffend", 64, false);
        assert!(!s.chars().any(|c| c.is_control()));
        assert!(s.starts_with("ok.."));
        assert!(s.ends_with("end"));
    }

    #[tokio::test]
    async fn http_probe_sends_head_and_reads_reply() {
        let (mut client, mut server) = duplex(8192);
        let srv = tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let n = server.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            server
                .write_all(b"HTTP/1.1 200 OK\r\nServer: test\r\n\r\n")
                .await
                .unwrap();
            req
        });

        let banner = grab_banner(&mut client, 80, 1024, "10.1.1.1", DEFAULT_READ_TIMEOUT).await;
        let req = srv.await.unwrap();
        assert!(req.contains("Host: 10.1.1.1"));
        assert_eq!(banner, "HTTP/1.1 200 OK | Server: test");
    }

    #[tokio::test]
    async fn greeting_service_is_read_only() {
        let (mut client, mut server) = duplex(1024);
        server.write_all(b"SSH-2.0-Test\r\n").await.unwrap();
        let started = Instant::now();
        let banner = grab_banner(&mut client, 22, 1024, "h", DEFAULT_READ_TIMEOUT).await;
        assert_eq!(banner, "SSH-2.0-Test");
        // A complete greeting line ends the read without waiting out the deadline.
        assert!(started.elapsed() < DEFAULT_READ_TIMEOUT / 2, "{:?}", started.elapsed());
        drop(client);
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "nothing should be written for greeting-first services");
    }

    #[tokio::test]
    async fn silent_peer_hits_read_deadline() {
        let (mut client, _server) = duplex(1024);
        let started = Instant::now();
        let banner = grab_banner(&mut client, 9999, 1024, "h", Duration::from_millis(100)).await;
        assert_eq!(banner, NO_BANNER);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn long_reply_is_cut_at_limit() {
        let (mut client, mut server) = duplex(8192);
        server.write_all(&[b'x'; 300]).await.unwrap();
        let banner = grab_banner(&mut client, 9999, 16, "h", DEFAULT_READ_TIMEOUT).await;
        assert_eq!(banner, format!("{}{}", "x".repeat(16), TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn zero_limit_skips_io() {
        let (mut client, _server) = duplex(64);
        assert_eq!(grab_banner(&mut client, 80, 0, "h", DEFAULT_READ_TIMEOUT).await, NO_BANNER);
    }
}
