//! Read-only view of chain state.
//!
//! Validation never touches global state: callers pass a [`ChainView`]
//! explicitly. Every read made during one validation call must observe the
//! same snapshot, so callers hold their chain-wide read lock for the whole
//! call (e.g. validate against the target of a `RwLockReadGuard`). The view
//! itself does no locking.

use std::collections::HashMap;

use auditchain_core::{block_hash, Block, BlockHash, BlockHeader, CoreError};
use thiserror::Error;

/// Failure to read chain state. Operational, not a consensus verdict.
#[derive(Debug, Error)]
pub enum ChainViewError {
    /// No block at this height on the active chain.
    #[error("no block at height {0} on the active chain")]
    MissingHeight(u32),

    /// No index entry for this hash.
    #[error("no index entry for {0}")]
    MissingIndex(BlockHash),

    /// Index entry exists but its body cannot be read.
    #[error("body of block {0} unavailable")]
    MissingBody(BlockHash),

    /// Underlying store failed.
    #[error("block store read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One indexed block: its identity, position and header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIndexEntry {
    /// Header identity hash.
    pub hash: BlockHash,
    /// Height in the chain the entry belongs to.
    pub height: u32,
    /// Block header.
    pub header: BlockHeader,
    /// Index-level parent pointer. Audit headers carry the sentinel instead
    /// of a parent hash, so the index records the parent separately.
    pub parent: Option<BlockHash>,
}

impl BlockIndexEntry {
    /// Block timestamp.
    pub fn time(&self) -> u32 {
        self.header.time
    }
}

/// Read-only chain state required by the consensus rules.
pub trait ChainView {
    /// Height of the active tip, `None` for an empty chain.
    fn tip_height(&self) -> Option<u32>;

    /// Entry at `height` on the active chain.
    fn entry_at(&self, height: u32) -> Option<BlockIndexEntry>;

    /// Entry for `hash` on any branch.
    fn entry_by_hash(&self, hash: &BlockHash) -> Option<BlockIndexEntry>;

    /// Load a block body.
    fn read_block(&self, entry: &BlockIndexEntry) -> Result<Block, ChainViewError>;

    /// True when `entry` lies on the active chain.
    fn is_active(&self, entry: &BlockIndexEntry) -> bool {
        self.entry_at(entry.height)
            .is_some_and(|active| active.hash == entry.hash)
    }

    /// Entry at `height`, treating absence as a store failure.
    fn require_at(&self, height: u32) -> Result<BlockIndexEntry, ChainViewError> {
        self.entry_at(height)
            .ok_or(ChainViewError::MissingHeight(height))
    }

    /// Parent of `entry`, `None` for genesis.
    fn parent_of(&self, entry: &BlockIndexEntry) -> Result<Option<BlockIndexEntry>, ChainViewError> {
        match entry.parent {
            None => Ok(None),
            Some(hash) => self
                .entry_by_hash(&hash)
                .map(Some)
                .ok_or(ChainViewError::MissingIndex(hash)),
        }
    }
}

impl<C: ChainView + ?Sized> ChainView for &C {
    fn tip_height(&self) -> Option<u32> {
        (**self).tip_height()
    }

    fn entry_at(&self, height: u32) -> Option<BlockIndexEntry> {
        (**self).entry_at(height)
    }

    fn entry_by_hash(&self, hash: &BlockHash) -> Option<BlockIndexEntry> {
        (**self).entry_by_hash(hash)
    }

    fn read_block(&self, entry: &BlockIndexEntry) -> Result<Block, ChainViewError> {
        (**self).read_block(entry)
    }
}

/// In-memory chain with a single active branch plus side entries.
///
/// Used as a fixture and by callers that assemble chains outside storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryChain {
    active: Vec<BlockHash>,
    index: HashMap<BlockHash, BlockIndexEntry>,
    bodies: HashMap<BlockHash, Block>,
}

impl MemoryChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks on the active chain.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// True when the active chain is empty.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Entry at the active tip.
    pub fn tip(&self) -> Option<BlockIndexEntry> {
        self.active.last().and_then(|h| self.index.get(h).cloned())
    }

    /// Append `block` to the active tip and return its index entry.
    pub fn push(&mut self, block: Block) -> Result<BlockIndexEntry, CoreError> {
        let hash = block_hash(&block.header)?;
        let height = u32::try_from(self.active.len())
            .map_err(|_| CoreError::InvalidValue("chain height exceeds u32"))?;
        let entry = BlockIndexEntry {
            hash,
            height,
            header: block.header.clone(),
            parent: self.active.last().copied(),
        };
        self.active.push(hash);
        self.index.insert(hash, entry.clone());
        self.bodies.insert(hash, block);
        Ok(entry)
    }

    /// Drop active blocks above `height` (a reorganization back to it).
    ///
    /// Dropped blocks stay indexed as side entries.
    pub fn truncate(&mut self, height: u32) {
        self.active.truncate(height as usize + 1);
    }

    /// Forget a block body while keeping its index entry.
    pub fn forget_body(&mut self, hash: &BlockHash) -> Option<Block> {
        self.bodies.remove(hash)
    }
}

impl ChainView for MemoryChain {
    fn tip_height(&self) -> Option<u32> {
        self.active
            .len()
            .checked_sub(1)
            .and_then(|h| u32::try_from(h).ok())
    }

    fn entry_at(&self, height: u32) -> Option<BlockIndexEntry> {
        self.active
            .get(height as usize)
            .and_then(|h| self.index.get(h))
            .cloned()
    }

    fn entry_by_hash(&self, hash: &BlockHash) -> Option<BlockIndexEntry> {
        self.index.get(hash).cloned()
    }

    fn read_block(&self, entry: &BlockIndexEntry) -> Result<Block, ChainViewError> {
        self.bodies
            .get(&entry.hash)
            .cloned()
            .ok_or(ChainViewError::MissingBody(entry.hash))
    }
}
