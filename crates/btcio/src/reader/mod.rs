//! Tracks the node's chain tip and reports extensions and reorgs.

mod announce;
mod error;
mod event;
mod handle;
mod source;
mod status;
mod task;
mod tracker;
mod window;

#[cfg(test)]
mod test_utils;

pub use announce::BlockAnnouncer;
pub use error::TrackerError;
pub use event::ChainEvent;
pub use handle::{BlockTrackerBuilder, BlockTrackerHandle};
#[cfg(any(test, feature = "test_utils"))]
pub use source::MockChainSource;
pub use source::{ChainSource, ChainSourceError};
pub use status::TrackerStatus;
pub use tracker::BlockTracker;
