use bitcoin::{block::Header, BlockHash};

/// A header together with its hash, computed once when it enters the window.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct WindowEntry {
    hash: BlockHash,
    header: Header,
}

impl WindowEntry {
    pub(crate) fn new(header: Header) -> Self {
        Self {
            hash: header.block_hash(),
            header,
        }
    }

    pub(crate) fn hash(&self) -> BlockHash {
        self.hash
    }

    pub(crate) fn parent(&self) -> BlockHash {
        self.header.prev_blockhash
    }

    pub(crate) fn into_header(self) -> Header {
        self.header
    }
}

/// Contiguous run of recently accepted headers, oldest first.
///
/// Every header's `prev_blockhash` is the hash of the entry before it. The
/// window only grows by appending; it shrinks by truncating back to an
/// ancestor or by being flushed entirely.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChainWindow {
    entries: Vec<WindowEntry>,
}

impl ChainWindow {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn tip_hash(&self) -> Option<BlockHash> {
        self.entries.last().map(WindowEntry::hash)
    }

    /// Index of the entry with the given hash.
    ///
    /// Scans from the tip since recent blocks are the likely hits.
    pub(crate) fn position(&self, hash: &BlockHash) -> Option<usize> {
        self.entries.iter().rposition(|e| e.hash() == *hash)
    }

    pub(crate) fn contains(&self, hash: &BlockHash) -> bool {
        self.position(hash).is_some()
    }

    pub(crate) fn iter_hashes(&self) -> impl DoubleEndedIterator<Item = BlockHash> + '_ {
        self.entries.iter().map(WindowEntry::hash)
    }

    /// Appends a header that must extend the current tip.
    pub(crate) fn push(&mut self, header: Header) {
        let entry = WindowEntry::new(header);
        debug_assert!(
            self.tip_hash().map_or(true, |tip| tip == entry.parent()),
            "window: appended header {} does not extend tip {:?}",
            entry.hash(),
            self.tip_hash()
        );
        self.entries.push(entry);
    }

    /// Removes every entry after `ancestor`, returning them newest first.
    ///
    /// Returns an empty vec if `ancestor` is the tip or is not in the window.
    pub(crate) fn truncate_after(&mut self, ancestor: &BlockHash) -> Vec<Header> {
        let Some(idx) = self.position(ancestor) else {
            return Vec::new();
        };

        let mut removed: Vec<Header> = self
            .entries
            .drain(idx + 1..)
            .map(WindowEntry::into_header)
            .collect();
        removed.reverse();

        debug_assert!(self.is_contiguous());
        removed
    }

    /// Empties the window, returning every header oldest first.
    pub(crate) fn flush(&mut self) -> Vec<Header> {
        self.entries
            .drain(..)
            .map(WindowEntry::into_header)
            .collect()
    }

    /// Checks that each entry's parent is the hash of the entry before it.
    pub(crate) fn is_contiguous(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[1].parent() == pair[0].hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_utils::TestChain;

    fn window_of(chain: &TestChain) -> ChainWindow {
        let mut window = ChainWindow::new();
        for block in chain.blocks() {
            window.push(block.header);
        }
        window
    }

    #[test]
    fn test_push_keeps_contiguity() {
        let chain = TestChain::new(4);
        let window = window_of(&chain);

        assert_eq!(window.len(), 4);
        assert!(window.is_contiguous());
        assert_eq!(window.tip_hash(), Some(chain.hash_at(3)));
    }

    #[test]
    #[should_panic(expected = "does not extend tip")]
    #[cfg(debug_assertions)]
    fn test_push_rejects_gap() {
        let chain = TestChain::new(3);
        let mut window = ChainWindow::new();
        window.push(chain.block_at(0).header);
        window.push(chain.block_at(2).header);
    }

    #[test]
    fn test_truncate_after_returns_newest_first() {
        let chain = TestChain::new(4);
        let mut window = window_of(&chain);

        let removed = window.truncate_after(&chain.hash_at(1));

        let removed: Vec<_> = removed.iter().map(Header::block_hash).collect();
        assert_eq!(removed, vec![chain.hash_at(3), chain.hash_at(2)]);
        assert_eq!(window.len(), 2);
        assert_eq!(window.tip_hash(), Some(chain.hash_at(1)));
    }

    #[test]
    fn test_truncate_after_tip_is_noop() {
        let chain = TestChain::new(3);
        let mut window = window_of(&chain);

        assert!(window.truncate_after(&chain.hash_at(2)).is_empty());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_truncate_after_unknown_is_noop() {
        let chain = TestChain::new(3);
        let other = TestChain::new_with_seed(2, 99);
        let mut window = window_of(&chain);

        assert!(window.truncate_after(&other.hash_at(1)).is_empty());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_flush_returns_oldest_first() {
        let chain = TestChain::new(3);
        let mut window = window_of(&chain);

        let flushed: Vec<_> = window.flush().iter().map(Header::block_hash).collect();

        assert_eq!(flushed, chain.hashes());
        assert!(window.is_empty());
        assert_eq!(window.tip_hash(), None);
    }

    #[test]
    fn test_contains_any_position() {
        let chain = TestChain::new(5);
        let window = window_of(&chain);

        for i in 0..5 {
            assert!(window.contains(&chain.hash_at(i)));
        }
        assert_eq!(window.position(&chain.hash_at(0)), Some(0));
        assert!(!window.contains(&chain.child_of(4, 1).block_hash()));
    }
}
