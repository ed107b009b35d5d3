use bitcoin::BlockHash;
use tipwatch_config::btcio::DEFAULT_ANNOUNCEMENT_CAPACITY;
use tokio::sync::broadcast;

/// Fan-out point for "new block announced" signals from the network layer.
///
/// Announcements only prompt the driver to poll again, so dropping some under
/// load is harmless.
#[derive(Clone, Debug)]
pub struct BlockAnnouncer {
    tx: broadcast::Sender<BlockHash>,
}

impl BlockAnnouncer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announces a block. Returns how many listeners were notified.
    pub fn announce(&self, hash: BlockHash) -> usize {
        self.tx.send(hash).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockHash> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BlockAnnouncer {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOUNCEMENT_CAPACITY)
    }
}
