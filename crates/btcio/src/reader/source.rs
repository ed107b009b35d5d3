use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::{Block, BlockHash};
use bitcoind_async_client::{traits::Reader, Client};
use thiserror::Error;

/// Errors from fetching chain data.
///
/// All of these are treated as transient by the tracker; the step that hit
/// one is abandoned and retried from scratch on the next poll.
#[derive(Debug, Clone, Error)]
pub enum ChainSourceError {
    /// The RPC call itself failed (connection, HTTP, JSON-RPC error).
    #[error("rpc: {0}")]
    Rpc(String),

    /// The node answered with something we could not interpret.
    #[error("decode: {0}")]
    Decode(String),

    /// The node does not know the requested block.
    #[error("block not found: {0}")]
    BlockNotFound(BlockHash),
}

impl ChainSourceError {
    pub fn rpc(msg: impl ToString) -> Self {
        Self::Rpc(msg.to_string())
    }
}

/// Where the tracker reads the chain from.
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
#[async_trait]
pub trait ChainSource: Send + Sync + 'static {
    /// Returns the hash the node currently reports as its best block.
    async fn best_block_hash(&self) -> Result<BlockHash, ChainSourceError>;

    /// Fetches the full block with the given hash.
    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, ChainSourceError>;
}

#[async_trait]
impl ChainSource for Client {
    async fn best_block_hash(&self) -> Result<BlockHash, ChainSourceError> {
        let chain_info = self
            .get_blockchain_info()
            .await
            .map_err(ChainSourceError::rpc)?;
        Ok(chain_info.best_block_hash)
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, ChainSourceError> {
        self.get_block(hash).await.map_err(ChainSourceError::rpc)
    }
}

#[async_trait]
impl<T: ChainSource> ChainSource for Arc<T> {
    async fn best_block_hash(&self) -> Result<BlockHash, ChainSourceError> {
        self.as_ref().best_block_hash().await
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, ChainSourceError> {
        self.as_ref().block_by_hash(hash).await
    }
}
