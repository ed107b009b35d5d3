use std::sync::Arc;

use bitcoin::{block::Header, Block};

/// Change to the tracked chain, delivered to subscribers in the order it happened.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// Block appended to the tracked chain.
    BlockAdded(Arc<Block>),

    /// Header removed from the tracked chain by a reorg.
    Reorged(Header),
}

