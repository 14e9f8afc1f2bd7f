// Consensus-critical. Changes require a protocol review + tests.
//! Proof-of-work checking.
//!
//! The condition is `hash_as_u256 <= target(bits)` with `target(bits)`
//! positive, non-overflowing and no easier than the network ceiling.
//! Regular blocks check their identity hash; audit blocks check their mined
//! hash (see `audit`).

use auditchain_core::{block_hash, BlockHeader, Hash32};

use crate::error::{ConsensusError, PowError};
use crate::params::ConsensusParams;
use crate::target::{decode_compact, hash_meets_target};

/// Check `hash` against compact `bits`.
///
/// `params.skip_pow_check` short-circuits to success.
pub fn check_proof_of_work(
    hash: &Hash32,
    bits: u32,
    params: &ConsensusParams,
) -> Result<(), PowError> {
    if params.skip_pow_check {
        return Ok(());
    }

    let decoded = decode_compact(bits);
    if !decoded.is_valid() || decoded.target > params.pow_limit() {
        return Err(PowError::BelowMinimumWork { bits });
    }
    if !hash_meets_target(hash, &decoded.target) {
        return Err(PowError::HashExceedsTarget { bits });
    }
    Ok(())
}

/// Validate proof-of-work for a regular header (identity hash <= target).
pub fn validate_pow(header: &BlockHeader, params: &ConsensusParams) -> Result<(), ConsensusError> {
    let hash = block_hash(header)?;
    check_proof_of_work(&hash, header.bits, params)?;
    Ok(())
}
