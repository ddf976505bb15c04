use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Shortest period `run_periodic` will tick at; shorter ones are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Handle to background loops started by `spawn`.
///
/// Dropping the handle leaves the loops running; `shutdown` stops them once
/// any in-flight cycle has finished.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub(crate) fn new(shutdown: watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { shutdown, tasks }
    }

    /// Join two handles so one `shutdown` stops both.
    pub fn merge(mut self, other: SyncHandle) -> Self {
        // Forward our signal to the other loops
        let mut rx = self.shutdown.subscribe();
        let other_tx = other.shutdown;
        self.tasks.push(tokio::spawn(async move {
            let _ = rx.changed().await;
            let _ = other_tx.send(true);
        }));
        self.tasks.extend(other.tasks);
        self
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                debug!(error = %e, "Background task ended abnormally");
            }
        }
    }
}

/// Run `cycle` after `first_delay`, then every `period` until shutdown is signalled.
///
/// A cycle that is running when shutdown arrives is allowed to complete.
pub(crate) async fn run_periodic<F, Fut>(
    name: &'static str,
    first_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(first_delay) => {}
        _ = shutdown.changed() => {
            debug!(task = name, "Stopped before first cycle");
            return;
        }
    }
    cycle().await;

    let period = period.max(MIN_PERIOD);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => cycle().await,
            _ = shutdown.changed() => break,
        }
    }
    debug!(task = name, "Stopped");
}
