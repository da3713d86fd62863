use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scanner::ScanContext;

const REFRESH: Duration = Duration::from_millis(100);

/// Single-line percentage indicator that polls the scan counters.
///
/// The reporter never touches probe state; it only reads the atomics in
/// [`ScanContext`]. Output lines should go through [`ProgressReporter::println`]
/// so they are not overwritten by the bar.
pub struct ProgressReporter {
    bar: ProgressBar,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start polling `ctx` until [`ProgressReporter::finish`] is called.
    pub fn start(ctx: Arc<ScanContext>, total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(progress_style());
        Self::spawn(bar, ctx)
    }

    /// A reporter that draws nothing, for quiet or JSON output.
    pub fn hidden(ctx: Arc<ScanContext>, total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
        Self::spawn(bar, ctx)
    }

    fn spawn(bar: ProgressBar, ctx: Arc<ScanContext>) -> Self {
        let stop = CancellationToken::new();
        let task = {
            let bar = bar.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(REFRESH);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tick.tick() => {
                            bar.set_position(ctx.attempted());
                            bar.set_message(format!("{} open", ctx.open()));
                        }
                    }
                }
                bar.set_position(ctx.attempted());
            })
        };
        Self {
            bar,
            stop,
            task: Some(task),
        }
    }

    /// Print a line above the indicator.
    pub fn println(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.suspend(|| println!("{line}"));
        }
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Stop polling and erase the indicator.
    pub async fn finish(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.bar.finish_and_clear();
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("Progress: {percent:>3}% ({pos}/{len}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
