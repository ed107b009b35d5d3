use bitcoin::BlockHash;
use serde::Serialize;

/// Snapshot of the tracker, published after every completed step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    /// Best block hash reported by the node on the last successful step.
    pub last_seen: Option<BlockHash>,

    /// Hash of the newest header in the window.
    pub tip: Option<BlockHash>,

    pub window_len: usize,

    /// Total headers appended since startup.
    pub blocks_added: u64,

    /// Total headers removed by reorgs, including flushes.
    pub blocks_reorged: u64,

    /// Times the window was dropped because no common ancestor was found in reach.
    pub deep_reorg_flushes: u64,
}
