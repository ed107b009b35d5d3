use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between best-block polls.
pub const DEFAULT_CLIENT_POLL_DUR_MS: u32 = 5_000;

/// Deepest reorg the reader will walk back before giving up on its window.
pub const DEFAULT_MAX_REORG_DEPTH: usize = 100;

/// Buffered block announcements per listener before older ones are dropped.
pub const DEFAULT_ANNOUNCEMENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BtcioConfig {
    #[serde(default)]
    pub reader: ReaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// How often to poll the bitcoin client for its best block, in ms.
    #[serde(default = "default_client_poll_dur_ms")]
    pub client_poll_dur_ms: u32,

    /// Maximum number of blocks walked back while looking for a common ancestor.
    #[serde(default = "default_max_reorg_depth")]
    pub max_reorg_depth: usize,

    #[serde(default = "default_announcement_capacity")]
    pub announcement_capacity: usize,
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.client_poll_dur_ms as u64)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            client_poll_dur_ms: DEFAULT_CLIENT_POLL_DUR_MS,
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
            announcement_capacity: DEFAULT_ANNOUNCEMENT_CAPACITY,
        }
    }
}

fn default_client_poll_dur_ms() -> u32 {
    DEFAULT_CLIENT_POLL_DUR_MS
}

fn default_max_reorg_depth() -> usize {
    DEFAULT_MAX_REORG_DEPTH
}

fn default_announcement_capacity() -> usize {
    DEFAULT_ANNOUNCEMENT_CAPACITY
}
