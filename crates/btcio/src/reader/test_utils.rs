use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use bitcoin::{
    block::{Header, Version},
    hashes::Hash,
    Block, BlockHash, CompactTarget, TxMerkleNode,
};

use super::source::{ChainSource, ChainSourceError};

const BASE_TIME: u32 = 1_700_000_000;

pub(crate) fn make_hash(id: u8) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[0] = id;
    bytes[1] = 1; // Ensure non-null even when id=0
    BlockHash::from_byte_array(bytes)
}

pub(crate) fn make_block(prev_blockhash: BlockHash, time: u32, nonce: u32) -> Block {
    Block {
        header: Header {
            version: Version::ONE,
            prev_blockhash,
            merkle_root: TxMerkleNode::all_zeros(),
            time,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce,
        },
        txdata: vec![],
    }
}

/// Builds a chain of `count` blocks hanging off `parent`.
///
/// `salt` goes into every nonce so two runs from the same parent diverge.
pub(crate) fn build_branch(
    parent: BlockHash,
    start_time: u32,
    count: usize,
    salt: u32,
) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(count);
    let mut prev = parent;
    for i in 0..count {
        let block = make_block(prev, start_time + i as u32, salt);
        prev = block.block_hash();
        blocks.push(block);
    }
    blocks
}

/// In-memory linear chain of real blocks with linked `prev_blockhash`.
#[derive(Clone, Debug)]
pub(crate) struct TestChain {
    blocks: Vec<Block>,
}

impl TestChain {
    pub(crate) fn new(len: usize) -> Self {
        Self::new_with_seed(len, 0)
    }

    pub(crate) fn new_with_seed(len: usize, seed: u8) -> Self {
        Self {
            blocks: build_branch(make_hash(seed), BASE_TIME, len, seed as u32),
        }
    }

    pub(crate) fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn block_at(&self, idx: usize) -> &Block {
        &self.blocks[idx]
    }

    pub(crate) fn hash_at(&self, idx: usize) -> BlockHash {
        self.blocks[idx].block_hash()
    }

    pub(crate) fn hashes(&self) -> Vec<BlockHash> {
        self.blocks.iter().map(Block::block_hash).collect()
    }

    pub(crate) fn tip_hash(&self) -> BlockHash {
        self.hash_at(self.blocks.len() - 1)
    }

    /// A block whose parent is the block at `idx`, distinct from the chain's own child.
    pub(crate) fn child_of(&self, idx: usize, fork_seed: u32) -> Block {
        make_block(
            self.hash_at(idx),
            BASE_TIME + idx as u32 + 1,
            0x8000_0000 | fork_seed,
        )
    }

    /// `count` blocks forking off the block at `idx`.
    pub(crate) fn fork_at(&self, idx: usize, count: usize, fork_seed: u32) -> Vec<Block> {
        build_branch(
            self.hash_at(idx),
            BASE_TIME + idx as u32 + 1,
            count,
            0x8000_0000 | fork_seed,
        )
    }

    /// Appends `count` more blocks to the chain tip.
    pub(crate) fn extend(&mut self, count: usize) {
        let start_time = BASE_TIME + self.blocks.len() as u32;
        let more = build_branch(self.tip_hash(), start_time, count, 0);
        self.blocks.extend(more);
    }
}

/// [`ChainSource`] backed by a block map and a settable best hash.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    blocks: Mutex<HashMap<BlockHash, Block>>,
    best: Mutex<Option<BlockHash>>,
    block_fetches: AtomicUsize,
}

impl InMemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_blocks<'a>(&self, blocks: impl IntoIterator<Item = &'a Block>) {
        let mut map = self.blocks.lock().unwrap();
        for block in blocks {
            map.insert(block.block_hash(), block.clone());
        }
    }

    pub(crate) fn set_best(&self, hash: BlockHash) {
        *self.best.lock().unwrap() = Some(hash);
    }

    /// Makes `block` known and reports it as the best block.
    pub(crate) fn advance_to(&self, block: &Block) {
        self.insert_blocks([block]);
        self.set_best(block.block_hash());
    }

    pub(crate) fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainSource for InMemorySource {
    async fn best_block_hash(&self) -> Result<BlockHash, ChainSourceError> {
        self.best
            .lock()
            .unwrap()
            .ok_or_else(|| ChainSourceError::rpc("no best block set"))
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, ChainSourceError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        self.blocks
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or(ChainSourceError::BlockNotFound(*hash))
    }
}
