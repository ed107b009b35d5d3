use std::{sync::Arc, time::Duration};

use tipwatch_config::btcio::DEFAULT_CLIENT_POLL_DUR_MS;
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::{
    announce::BlockAnnouncer,
    source::ChainSource,
    status::TrackerStatus,
    task::{block_tracker_task, TrackerCtx},
    tracker::BlockTracker,
};

/// Handle to a running block tracker.
#[derive(Debug)]
pub struct BlockTrackerHandle {
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    status_rx: watch::Receiver<TrackerStatus>,
    task: JoinHandle<()>,
}

impl BlockTrackerHandle {
    /// Requests a step as soon as the worker is free.
    ///
    /// Requests made while a step is running collapse into one extra step.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Returns a watcher for the status published after every step.
    pub fn status_watcher(&self) -> watch::Receiver<TrackerStatus> {
        self.status_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// A step in flight runs to completion and its events are published
    /// before this returns. The announcer subscription is released too.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.join().await;
    }

    /// Like [`stop`](Self::stop), but abandons a step in flight at its next
    /// fetch. The abandoned step changes nothing and publishes nothing.
    pub async fn abort(self) {
        self.abort.cancel();
        self.shutdown.cancel();
        self.join().await;
    }

    async fn join(self) {
        if let Err(err) = self.task.await {
            if err.is_panic() {
                error!(%err, "block tracker task panicked");
            }
        }
        info!("block tracker stopped");
    }
}

/// Builder for starting a [`BlockTracker`] on its own task.
#[derive(Debug)]
pub struct BlockTrackerBuilder<S> {
    tracker: BlockTracker<S>,
    poll_interval: Option<Duration>,
    announcer: Option<BlockAnnouncer>,
}

impl<S: ChainSource> BlockTrackerBuilder<S> {
    pub fn new(tracker: BlockTracker<S>) -> Self {
        Self {
            tracker,
            poll_interval: None,
            announcer: None,
        }
    }

    /// Sets the time between periodic steps.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Steps early whenever a block is announced here.
    pub fn with_announcer(mut self, announcer: &BlockAnnouncer) -> Self {
        self.announcer = Some(announcer.clone());
        self
    }

    /// Spawns the worker on the current tokio runtime.
    ///
    /// The first step runs immediately.
    pub fn start(self) -> BlockTrackerHandle {
        let (status_tx, status_rx) = watch::channel(self.tracker.status());
        let trigger = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();

        let ctx = TrackerCtx {
            poll_interval: self
                .poll_interval
                .unwrap_or(Duration::from_millis(DEFAULT_CLIENT_POLL_DUR_MS as u64)),
            trigger: trigger.clone(),
            shutdown: shutdown.clone(),
            abort: abort.clone(),
            status_tx,
        };
        let announcements = self.announcer.as_ref().map(BlockAnnouncer::subscribe);
        let task = tokio::spawn(block_tracker_task(self.tracker, announcements, ctx));

        BlockTrackerHandle {
            trigger,
            shutdown,
            abort,
            status_rx,
            task,
        }
    }
}
