use std::{sync::Arc, time::Duration};

use bitcoin::BlockHash;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch, Notify,
    },
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::{
    error::TrackerError, source::ChainSource, status::TrackerStatus, tracker::BlockTracker,
};

/// Everything the worker needs besides the tracker itself.
#[derive(Debug)]
pub(crate) struct TrackerCtx {
    pub(crate) poll_interval: Duration,

    /// Single-permit wakeup; any number of requests made during a step
    /// collapse into one extra run.
    pub(crate) trigger: Arc<Notify>,

    /// Ends the loop between steps. A running step is left to finish.
    pub(crate) shutdown: CancellationToken,

    /// Passed to every step; cancelling it abandons the step in flight.
    pub(crate) abort: CancellationToken,

    pub(crate) status_tx: watch::Sender<TrackerStatus>,
}

/// Drives the tracker until shut down or aborted.
pub(crate) async fn block_tracker_task<S: ChainSource>(
    tracker: BlockTracker<S>,
    announcements: Option<broadcast::Receiver<BlockHash>>,
    ctx: TrackerCtx,
) {
    info!(poll_interval = ?ctx.poll_interval, "started block tracker task");

    let forward = async {
        if let Some(rx) = announcements {
            forward_announcements(rx, &ctx.trigger, &ctx.shutdown).await;
        }
    };
    tokio::join!(forward, poll_loop(tracker, &ctx));

    info!("block tracker task exited");
}

async fn poll_loop<S: ChainSource>(mut tracker: BlockTracker<S>, ctx: &TrackerCtx) {
    let mut ticker = time::interval(ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = FailureLog::default();

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            _ = ctx.trigger.notified() => {
                trace!("tracker step requested");
            }
            _ = ticker.tick() => {}
        }

        match tracker.step(&ctx.abort).await {
            Ok(best) => failures.on_success(best),
            Err(TrackerError::Cancelled) => break,
            Err(err) => failures.on_error(&err),
        }

        ctx.status_tx.send_replace(tracker.status());
    }
}

/// Turns block announcements into step requests.
///
/// Returning drops the receiver, which deregisters from the announcer.
async fn forward_announcements(
    mut rx: broadcast::Receiver<BlockHash>,
    trigger: &Notify,
    shutdown: &CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = rx.recv() => match res {
                Ok(hash) => {
                    trace!(%hash, "block announced");
                    trigger.notify_one();
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%skipped, "missed block announcements");
                    trigger.notify_one();
                }
                Err(RecvError::Closed) => {
                    debug!("block announcer closed");
                    break;
                }
            }
        }
    }
}

/// Logs step failures without flooding: a new error is a warning, the same
/// error again is only a debug line until a step succeeds.
#[derive(Debug, Default)]
struct FailureLog {
    last: Option<String>,
    repeats: u64,
}

impl FailureLog {
    fn on_error(&mut self, err: &TrackerError) {
        let msg = err.to_string();
        if self.last.as_deref() == Some(msg.as_str()) {
            self.repeats += 1;
            debug!(%err, repeats = self.repeats, "tracker step still failing");
        } else {
            warn!(%err, recoverable = err.is_recoverable(), "tracker step failed");
            self.last = Some(msg);
            self.repeats = 0;
        }
    }

    fn on_success(&mut self, best: BlockHash) {
        if let Some(err) = self.last.take() {
            info!(%best, %err, repeats = self.repeats, "tracker step recovered");
            self.repeats = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{source::ChainSourceError, test_utils::make_hash};

    fn rpc_err(msg: &str) -> TrackerError {
        TrackerError::Source(ChainSourceError::rpc(msg))
    }

    #[test]
    fn test_failure_log_counts_repeats() {
        let mut log = FailureLog::default();

        log.on_error(&rpc_err("connection refused"));
        log.on_error(&rpc_err("connection refused"));
        log.on_error(&rpc_err("connection refused"));
        assert_eq!(log.repeats, 2);

        log.on_error(&rpc_err("timeout"));
        assert_eq!(log.repeats, 0);
        assert_eq!(log.last.as_deref(), Some("chain source: rpc: timeout"));
    }

    #[test]
    fn test_failure_log_resets_on_success() {
        let mut log = FailureLog::default();
        log.on_error(&rpc_err("connection refused"));
        log.on_error(&rpc_err("connection refused"));

        log.on_success(make_hash(1));

        assert!(log.last.is_none());
        assert_eq!(log.repeats, 0);
    }

    #[tokio::test]
    async fn test_forwarder_exits_on_closed_announcer() {
        let (tx, rx) = broadcast::channel(4);
        let trigger = Notify::new();
        let cancel = CancellationToken::new();

        tx.send(make_hash(1)).unwrap();
        drop(tx);
        forward_announcements(rx, &trigger, &cancel).await;

        // The announcement before close left a permit behind.
        trigger.notified().await;
    }

    #[tokio::test]
    async fn test_forwarder_treats_lag_as_trigger() {
        let (tx, rx) = broadcast::channel(1);
        let trigger = Notify::new();
        let cancel = CancellationToken::new();

        for id in 0..4 {
            tx.send(make_hash(id)).unwrap();
        }
        drop(tx);
        forward_announcements(rx, &trigger, &cancel).await;

        trigger.notified().await;
    }
}
