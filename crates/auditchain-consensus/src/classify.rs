//! Block kind classification.
//!
//! Exactly one of proof-of-work, proof-of-stake and proof-of-audit holds for
//! any block: audit is decided by the header alone, stake by a coinstake in
//! the second transaction of a non-audit block, and work is the remainder.

use auditchain_core::{Block, BlockHeader};

/// The three mutually exclusive block kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Legacy proof-of-work block.
    ProofOfWork,
    /// Proof-of-stake block.
    ProofOfStake,
    /// Proof-of-audit block.
    ProofOfAudit,
}

/// True for proof-of-audit headers (sentinel in the previous-block slot).
pub fn is_poa(header: &BlockHeader) -> bool {
    header.is_audit()
}

/// Header-only audit test used by chain scans; same rule as [`is_poa`].
pub fn is_poa_by_version(header: &BlockHeader) -> bool {
    is_poa(header)
}

/// True for proof-of-stake blocks.
pub fn is_pos(block: &Block) -> bool {
    !is_poa(&block.header) && block.has_coinstake()
}

/// True for proof-of-work blocks.
pub fn is_pow(block: &Block) -> bool {
    !is_poa(&block.header) && !is_pos(block)
}

/// Classify a block.
pub fn block_kind(block: &Block) -> BlockKind {
    if is_poa(&block.header) {
        BlockKind::ProofOfAudit
    } else if is_pos(block) {
        BlockKind::ProofOfStake
    } else {
        BlockKind::ProofOfWork
    }
}
