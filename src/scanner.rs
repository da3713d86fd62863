use crate::probe::PortProber;
use crate::types::{PortResult, ScanSummary, ScanTarget};
use log::{debug, info, warn};
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Progress counters and the cancellation flag shared by the coordinator,
/// every probe task and any observers. One per scan.
#[derive(Debug, Default)]
pub struct ScanContext {
    attempted: AtomicU64,
    open: AtomicU64,
    cancel: CancellationToken,
}

impl ScanContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ports whose probe has completed.
    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    /// Ports confirmed open so far.
    pub fn open(&self) -> u64 {
        self.open.load(Ordering::Relaxed)
    }

    /// Stop admitting new ports. Idempotent; never resets.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn record(&self, result: &PortResult) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        if result.is_open() {
            self.open.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Ctrl-C cancels the scan owned by `ctx`.
pub fn cancel_on_ctrl_c(ctx: Arc<ScanContext>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight probes");
            ctx.cancel();
        }
    });
}

/// Results of a running scan, in completion order.
pub struct ScanStream {
    rx: mpsc::Receiver<PortResult>,
}

impl ScanStream {
    /// Next finished port, or `None` once every admitted probe has reported.
    pub async fn next(&mut self) -> Option<PortResult> {
        self.rx.recv().await
    }

    pub async fn collect(mut self) -> Vec<PortResult> {
        let mut out = Vec::new();
        while let Some(r) = self.next().await {
            out.push(r);
        }
        out
    }
}

/// Start scanning `target` in the background and return the result stream.
///
/// - At most `target.concurrency` probes run at once, gated by a `Semaphore`.
/// - The cancellation flag is checked before each admission; in-flight probes
///   are never aborted and still report.
/// - A probe that panics is reported as an `Error` result for its port.
/// - Dropping the stream stops admission of further ports.
///
/// Must be called from within a tokio runtime.
pub fn run_scan<P: PortProber>(
    target: &ScanTarget,
    prober: Arc<P>,
    ctx: Arc<ScanContext>,
) -> ScanStream {
    let (tx, rx) = mpsc::channel(target.concurrency.max(1));
    tokio::spawn(drive(
        target.addr,
        target.ports(),
        target.concurrency,
        prober,
        ctx,
        tx,
    ));
    ScanStream { rx }
}

async fn drive<P: PortProber>(
    addr: IpAddr,
    ports: RangeInclusive<u16>,
    concurrency: usize,
    prober: Arc<P>,
    ctx: Arc<ScanContext>,
    tx: mpsc::Sender<PortResult>,
) {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let cancel = ctx.cancellation_token();
    let mut set = JoinSet::new();
    let mut admitted = 0u64;

    for port in ports {
        if cancel.is_cancelled() || tx.is_closed() {
            break;
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            p = sem.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        if cancel.is_cancelled() {
            break;
        }
        admitted += 1;

        let prober = prober.clone();
        let ctx = ctx.clone();
        let tx = tx.clone();
        set.spawn(async move {
            // Held until the result is handed off so a slow consumer throttles admission.
            let _permit = permit;
            let result = match tokio::spawn(async move { prober.probe(addr, port).await }).await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("probe task for port {port} failed: {e}");
                    PortResult::error(port, format!("probe task failed: {e}"))
                }
            };
            ctx.record(&result);
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    if cancel.is_cancelled() {
        info!("scan cancelled after admitting {admitted} ports");
    }
    while set.join_next().await.is_some() {}
    debug!("scan driver finished: {admitted} admitted, {} completed", ctx.attempted());
}

/// Run a whole scan and gather every result plus summary counters.
pub async fn scan_all<P: PortProber>(
    target: &ScanTarget,
    prober: Arc<P>,
    ctx: Arc<ScanContext>,
) -> (Vec<PortResult>, ScanSummary) {
    let started = Instant::now();
    let results = run_scan(target, prober, ctx.clone()).collect().await;
    let summary = summarize(target, &ctx, started);
    (results, summary)
}

/// Snapshot the context counters into a summary.
pub fn summarize(target: &ScanTarget, ctx: &ScanContext, started: Instant) -> ScanSummary {
    ScanSummary {
        scanned_total: target.port_count(),
        scanned_done: ctx.attempted(),
        open_count: ctx.open(),
        cancelled: ctx.is_cancelled(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
