// Consensus-critical. Changes require a protocol review + tests.
//! Block-level validation entry point.
//!
//! Classifies a block and runs the rules for its kind. Stake kernels,
//! signatures and transaction validity are checked by the caller.

use auditchain_core::Block;
use tracing::trace;

use crate::audit::validate_audit_block;
use crate::chain::{BlockIndexEntry, ChainView, ChainViewError};
use crate::classify::{block_kind, BlockKind};
use crate::difficulty::check_difficulty;
use crate::error::ConsensusError;
use crate::params::ConsensusParams;
use crate::pow::validate_pow;

/// Validate `block` against `chain` and return its kind.
///
/// `insertion` only applies to audit blocks (see [`validate_audit_block`]);
/// regular blocks are checked against the parent their header names.
pub fn validate_block<C: ChainView + ?Sized>(
    chain: &C,
    block: &Block,
    insertion: Option<u32>,
    params: &ConsensusParams,
) -> Result<BlockKind, ConsensusError> {
    block.validate_sanity()?;

    let kind = block_kind(block);
    trace!(?kind, time = block.header.time, "validating block");

    match kind {
        BlockKind::ProofOfAudit => {
            validate_audit_block(chain, block, insertion, params)?;
        }
        BlockKind::ProofOfStake => {
            let parent = header_parent(chain, block)?;
            check_difficulty(chain, parent.as_ref(), &block.header, params)?;
        }
        BlockKind::ProofOfWork => {
            let parent = header_parent(chain, block)?;
            check_difficulty(chain, parent.as_ref(), &block.header, params)?;
            validate_pow(&block.header, params)?;
        }
    }
    Ok(kind)
}

// Genesis (null parent) has no entry; any other unknown parent is an orphan
// the caller must fetch first.
fn header_parent<C: ChainView + ?Sized>(
    chain: &C,
    block: &Block,
) -> Result<Option<BlockIndexEntry>, ConsensusError> {
    match block.header.prev_block() {
        Some(prev) if prev.is_zero() => Ok(None),
        Some(prev) => chain
            .entry_by_hash(&prev)
            .map(Some)
            .ok_or_else(|| ChainViewError::MissingIndex(prev).into()),
        None => Err(ConsensusError::InvalidBlock("audit header has no parent hash")),
    }
}
