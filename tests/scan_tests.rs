use port_scan_rs::probe::{ProbeOptions, TcpProber};
use port_scan_rs::scanner::{scan_all, ScanContext};
use port_scan_rs::types::{PortState, ScanTarget};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

async fn greeter(greeting: &'static [u8]) -> (u16, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = sock.write_all(greeting).await;
                tokio::time::sleep(Duration::from_millis(500)).await;
            });
        }
    });
    (port, handle)
}

fn localhost_target(start: u16, end: u16) -> ScanTarget {
    ScanTarget::new(
        "127.0.0.1",
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        start,
        end,
        16,
        Duration::from_millis(500),
        256,
        false,
    )
    .expect("valid target")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn localhost_range_finds_listener() {
    let (port, srv) = greeter(b"220 test ready\r\n").await;
    let start = port.saturating_sub(2).max(1);
    let end = port.saturating_add(2);
    let target = localhost_target(start, end);

    let opts = ProbeOptions::from_target(&target).with_banner_timeout(Duration::from_millis(200));
    let prober = Arc::new(TcpProber::new(opts).expect("prober"));
    let ctx = ScanContext::new();
    let (results, summary) = scan_all(&target, prober, ctx).await;

    let expected = usize::from(end - start) + 1;
    assert_eq!(results.len(), expected);
    let unique: HashSet<u16> = results.iter().map(|r| r.port).collect();
    assert_eq!(unique.len(), expected);
    assert_eq!(summary.scanned_done, expected as u64);
    assert!(summary.open_count >= 1);

    let ours = results.iter().find(|r| r.port == port).expect("listener port present");
    match &ours.state {
        PortState::Open { banner, .. } => assert_eq!(banner, "220 test ready"),
        other => panic!("expected open, got {other:?}"),
    }
    let line = ours.to_string();
    assert!(line.starts_with(&format!("Port {port}: Open (")));
    assert!(line.ends_with(" - 220 test ready"));
    srv.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_listeners_counted_as_open() {
    let (a, srv_a) = greeter(b"A\r\n").await;
    let (b, srv_b) = greeter(b"B\r\n").await;

    let ctx = ScanContext::new();
    let mut open = 0;
    for port in [a, b] {
        let target = localhost_target(port, port);
        let prober = Arc::new(TcpProber::new(ProbeOptions::from_target(&target)).expect("prober"));
        let (results, _) = scan_all(&target, prober, ctx.clone()).await;
        assert_eq!(results.len(), 1);
        open += results.iter().filter(|r| r.is_open()).count();
    }
    assert_eq!(open, 2);
    assert_eq!(ctx.open(), 2);
    assert_eq!(ctx.attempted(), 2);
    srv_a.abort();
    srv_b.abort();
}
