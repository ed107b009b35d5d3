use std::sync::Arc;

use bitcoin::{hashes::Hash, Block, BlockHash};
use tipwatch_config::btcio::DEFAULT_MAX_REORG_DEPTH;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::{
    error::{Result, TrackerError},
    event::ChainEvent,
    source::ChainSource,
    status::TrackerStatus,
    window::ChainWindow,
};

/// How the window changes in response to a newly observed best block.
///
/// Planned after every fetch of a step has completed and applied in one go, so
/// a failed or cancelled step never leaves the window half updated.
#[derive(Debug)]
enum WindowUpdate {
    /// Nothing to do, the block is already tracked.
    Noop,

    /// Truncate back to `fork_point` (if any), then append `blocks` oldest first.
    Extend {
        fork_point: Option<BlockHash>,
        blocks: Vec<Block>,
    },

    /// No common ancestor within reach; drop the whole window.
    Flush { collected: usize },
}

/// Follows the node's best block and keeps a contiguous window of recent headers.
///
/// Each [`step`](Self::step) compares the node's current best block against the
/// window and publishes the resulting [`ChainEvent`]s, in order, to every
/// subscriber.
#[derive(Debug)]
pub struct BlockTracker<S> {
    source: S,
    genesis_hash: BlockHash,
    max_reorg_depth: usize,
    window: ChainWindow,
    last_seen: Option<BlockHash>,
    subscribers: Vec<mpsc::UnboundedSender<ChainEvent>>,
    blocks_added: u64,
    blocks_reorged: u64,
    deep_reorg_flushes: u64,
}

impl<S: ChainSource> BlockTracker<S> {
    /// Creates a tracker with an empty window.
    ///
    /// The node reporting `genesis_hash` as its best block is never treated as
    /// a chain change.
    pub fn new(source: S, genesis_hash: BlockHash) -> Self {
        Self {
            source,
            genesis_hash,
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
            window: ChainWindow::new(),
            last_seen: None,
            subscribers: Vec::new(),
            blocks_added: 0,
            blocks_reorged: 0,
            deep_reorg_flushes: 0,
        }
    }

    /// Sets how many blocks, the new best one included, a step may collect
    /// while looking for a fork point.
    pub fn with_max_reorg_depth(mut self, depth: usize) -> Self {
        self.max_reorg_depth = depth;
        self
    }

    /// Registers a new event consumer.
    ///
    /// The receiver sees every event published after this call, in order.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChainEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            last_seen: self.last_seen,
            tip: self.window.tip_hash(),
            window_len: self.window.len(),
            blocks_added: self.blocks_added,
            blocks_reorged: self.blocks_reorged,
            deep_reorg_flushes: self.deep_reorg_flushes,
        }
    }

    /// Hashes currently in the window, oldest first.
    pub fn window_hashes(&self) -> Vec<BlockHash> {
        self.window.iter_hashes().collect()
    }

    /// Runs one tracking step and returns the node's best block hash.
    ///
    /// On error nothing is committed: the window, the last observed hash and
    /// the subscribers are left as they were.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<BlockHash> {
        let best = self.fetch_best_hash(cancel).await?;

        if self.last_seen == Some(best) {
            trace!(%best, "best block unchanged");
            return Ok(best);
        }

        if best == self.genesis_hash {
            debug!(%best, "node is at genesis, nothing to track");
            self.last_seen = Some(best);
            return Ok(best);
        }

        let update = self.plan_update(best, cancel).await?;
        self.apply_update(best, update);
        self.last_seen = Some(best);

        Ok(best)
    }

    async fn plan_update(
        &self,
        best: BlockHash,
        cancel: &CancellationToken,
    ) -> Result<WindowUpdate> {
        let arrived = self.fetch_block(&best, cancel).await?;
        let hash = arrived.block_hash();
        let parent = arrived.header.prev_blockhash;

        if self.window.is_empty() {
            info!(%hash, "seeding window with first observed block");
            return Ok(WindowUpdate::Extend {
                fork_point: None,
                blocks: vec![arrived],
            });
        }

        if self.window.contains(&hash) {
            debug!(%hash, "best block already in window");
            return Ok(WindowUpdate::Noop);
        }

        // Covers both a plain extension of the tip and a short reorg.
        if self.window.contains(&parent) {
            return Ok(WindowUpdate::Extend {
                fork_point: Some(parent),
                blocks: vec![arrived],
            });
        }

        debug!(%hash, %parent, "parent not in window, walking back");
        let mut missed = vec![arrived];
        let mut cursor = parent;
        loop {
            if self.window.contains(&cursor) {
                missed.reverse();
                return Ok(WindowUpdate::Extend {
                    fork_point: Some(cursor),
                    blocks: missed,
                });
            }

            if cursor == BlockHash::all_zeros() {
                warn!(
                    %best,
                    collected = missed.len(),
                    "walk-back reached genesis without meeting the window"
                );
                return Ok(WindowUpdate::Flush {
                    collected: missed.len(),
                });
            }

            let block = self.fetch_block(&cursor, cancel).await?;
            cursor = block.header.prev_blockhash;
            missed.push(block);

            // The arrived block counts towards the depth.
            if missed.len() > self.max_reorg_depth {
                return Ok(WindowUpdate::Flush {
                    collected: missed.len(),
                });
            }
        }
    }

    fn apply_update(&mut self, best: BlockHash, update: WindowUpdate) {
        let mut events = Vec::new();

        match update {
            WindowUpdate::Noop => {}

            WindowUpdate::Extend { fork_point, blocks } => {
                if let Some(fork_point) = fork_point {
                    let removed = self.window.truncate_after(&fork_point);
                    if !removed.is_empty() {
                        warn!(
                            %fork_point,
                            depth = removed.len(),
                            added = blocks.len(),
                            "chain reorganized"
                        );
                    }
                    self.blocks_reorged += removed.len() as u64;
                    events.extend(removed.into_iter().map(ChainEvent::Reorged));
                }

                for block in blocks {
                    debug!(hash = %block.block_hash(), "block added");
                    self.window.push(block.header);
                    self.blocks_added += 1;
                    events.push(ChainEvent::BlockAdded(Arc::new(block)));
                }
            }

            WindowUpdate::Flush { collected } => {
                let flushed = self.window.flush();
                error!(
                    %best,
                    %collected,
                    max_reorg_depth = self.max_reorg_depth,
                    flushed = flushed.len(),
                    "no common ancestor within reorg depth, dropping tracked window"
                );
                self.blocks_reorged += flushed.len() as u64;
                self.deep_reorg_flushes += 1;
                events.extend(flushed.into_iter().map(ChainEvent::Reorged));
            }
        }

        debug_assert!(self.window.is_contiguous());
        self.publish(events);
    }

    /// Sends events to every live subscriber, dropping the ones that went away.
    fn publish(&mut self, events: Vec<ChainEvent>) {
        if events.is_empty() {
            return;
        }

        self.subscribers.retain(|tx| {
            for event in &events {
                if tx.send(event.clone()).is_err() {
                    return false;
                }
            }
            true
        });
    }

    async fn fetch_best_hash(&self, cancel: &CancellationToken) -> Result<BlockHash> {
        if cancel.is_cancelled() {
            return Err(TrackerError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            res = self.source.best_block_hash() => Ok(res?),
        }
    }

    async fn fetch_block(&self, hash: &BlockHash, cancel: &CancellationToken) -> Result<Block> {
        if cancel.is_cancelled() {
            return Err(TrackerError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            res = self.source.block_by_hash(hash) => Ok(res?),
        }
    }
}
