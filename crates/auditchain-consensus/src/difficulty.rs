// Consensus-critical. Changes require a protocol review + tests.
//! Difficulty retargeting.
//!
//! Two eras, split at `last_pow_height`:
//!
//! - Proof-of-work era: a 24-block moving average of past targets scaled
//!   by actual/expected timespan, with the timespan clamped to a factor of
//!   three either way.
//! - Proof-of-stake era: a per-block exponential retarget toward 60s
//!   spacing over a 40-block interval.
//!
//! Both clamp into `(0, pow_limit]`. Results are deterministic for a given
//! chain state.

use auditchain_core::BlockHeader;
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::trace;

use crate::chain::{BlockIndexEntry, ChainView, ChainViewError};
use crate::error::ConsensusError;
use crate::params::ConsensusParams;
use crate::target::{decode_compact, encode_compact};

/// Blocks averaged by the proof-of-work retarget; also the minimum height
/// before any retargeting happens.
pub const PAST_BLOCKS: u32 = 24;

/// Proof-of-stake target spacing in seconds.
pub const POS_TARGET_SPACING: i64 = 60;

/// Proof-of-stake retarget timespan in seconds.
pub const POS_TARGET_TIMESPAN: i64 = 40 * 60;

/// Compute the compact target required for the block after `tip`.
///
/// `tip` is `None` when nothing has been accepted yet. The only error is a
/// chain view that cannot supply an ancestor.
pub fn next_required_target<C: ChainView + ?Sized>(
    chain: &C,
    tip: Option<&BlockIndexEntry>,
    params: &ConsensusParams,
) -> Result<u32, ConsensusError> {
    let pow_limit = params.pow_limit();
    let tip = match tip {
        Some(tip) if tip.height >= PAST_BLOCKS => tip,
        _ => return Ok(encode_compact(&pow_limit)),
    };

    let next = if tip.height > params.last_pow_height {
        pos_retarget(chain, tip, &pow_limit)?
    } else {
        pow_retarget(chain, tip, params, &pow_limit)?
    };
    Ok(encode_compact(&next))
}

/// Verify a proof-of-work or proof-of-stake header carries the required bits.
///
/// `parent` is the entry the header extends.
pub fn check_difficulty<C: ChainView + ?Sized>(
    chain: &C,
    parent: Option<&BlockIndexEntry>,
    header: &BlockHeader,
    params: &ConsensusParams,
) -> Result<(), ConsensusError> {
    let expected = next_required_target(chain, parent, params)?;
    if header.bits != expected {
        return Err(ConsensusError::BadDifficultyBits {
            expected,
            found: header.bits,
        });
    }
    Ok(())
}

fn pos_retarget<C: ChainView + ?Sized>(
    chain: &C,
    tip: &BlockIndexEntry,
    pow_limit: &BigUint,
) -> Result<BigUint, ConsensusError> {
    let parent = chain
        .parent_of(tip)?
        .ok_or(ChainViewError::MissingHeight(tip.height.saturating_sub(1)))?;

    let actual_spacing = (i64::from(tip.time()) - i64::from(parent.time())).max(1);
    let interval = POS_TARGET_TIMESPAN / POS_TARGET_SPACING;
    let numerator = (interval - 1) * POS_TARGET_SPACING + 2 * actual_spacing;
    let denominator = (interval + 1) * POS_TARGET_SPACING;

    let old = decode_compact(tip.header.bits).target;
    // Both factors are positive: actual_spacing >= 1.
    let mut next = old * numerator.unsigned_abs() / denominator.unsigned_abs();
    if next.is_zero() || next > *pow_limit {
        next = pow_limit.clone();
    }

    trace!(
        height = tip.height,
        actual_spacing,
        bits = tip.header.bits,
        "pos retarget"
    );
    Ok(next)
}

fn pow_retarget<C: ChainView + ?Sized>(
    chain: &C,
    tip: &BlockIndexEntry,
    params: &ConsensusParams,
    pow_limit: &BigUint,
) -> Result<BigUint, ConsensusError> {
    let mut count: u32 = 0;
    let mut average = BigUint::zero();
    let mut actual_timespan: i64 = 0;
    let mut last_time: Option<i64> = None;
    let mut reading = Some(tip.clone());

    while let Some(entry) = reading {
        if entry.height == 0 || count >= PAST_BLOCKS {
            break;
        }
        count += 1;

        let target = decode_compact(entry.header.bits).target;
        average = if count == 1 {
            target
        } else {
            (average * count + target) / (count + 1)
        };

        let time = i64::from(entry.time());
        if let Some(last) = last_time {
            actual_timespan += last - time;
        }
        last_time = Some(time);

        reading = chain.parent_of(&entry)?;
    }

    let target_timespan = i64::from(count) * i64::from(params.target_spacing);
    let actual_timespan = actual_timespan.clamp(target_timespan / 3, target_timespan * 3);

    trace!(
        height = tip.height,
        count,
        actual_timespan,
        target_timespan,
        "pow retarget"
    );

    if target_timespan <= 0 {
        return Ok(pow_limit.clone());
    }

    let mut next = average * actual_timespan.unsigned_abs() / target_timespan.unsigned_abs();
    if next.is_zero() || next > *pow_limit {
        next = pow_limit.clone();
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use auditchain_core::{Block, Hash32, HeaderKind, OutPoint, Transaction, TxIn, TxOut};

    fn block(prev: Hash32, time: u32, bits: u32) -> Block {
        Block {
            header: BlockHeader {
                version: 4,
                kind: HeaderKind::Chained { prev_block: prev },
                merkle_root: Hash32::zero(),
                time,
                bits,
                nonce: 0,
                accumulator_checkpoint: Hash32::zero(),
            },
            txs: vec![Transaction {
                version: 1,
                inputs: vec![TxIn {
                    prevout: OutPoint::null(),
                    script_sig: time.to_le_bytes().to_vec(),
                }],
                outputs: vec![TxOut {
                    value: 1,
                    script_pubkey: vec![],
                }],
                lock_time: 0,
            }],
            audited: vec![],
            signature: vec![],
        }
    }

    fn chain_with_spacing(len: u32, spacing: u32, bits: u32) -> MemoryChain {
        let mut chain = MemoryChain::new();
        let mut prev = Hash32::zero();
        for i in 0..len {
            prev = chain
                .push(block(prev, 1_600_000_000 + i * spacing, bits))
                .unwrap()
                .hash;
        }
        chain
    }

    fn params() -> ConsensusParams {
        ConsensusParams {
            last_pow_height: 100,
            start_poa_height: 120,
            ..ConsensusParams::regtest()
        }
    }

    const MID_BITS: u32 = 0x1e00_ffff;

    #[test]
    fn short_chain_gets_pow_limit() {
        let params = params();
        let limit_bits = encode_compact(&params.pow_limit());
        let chain = chain_with_spacing(10, 60, MID_BITS);
        assert_eq!(next_required_target(&chain, None, &params).unwrap(), limit_bits);
        let tip = chain.tip();
        assert_eq!(
            next_required_target(&chain, tip.as_ref(), &params).unwrap(),
            limit_bits
        );
    }

    #[test]
    fn pow_era_stable_on_target() {
        let params = params();
        let chain = chain_with_spacing(40, params.target_spacing, MID_BITS);
        let next = next_required_target(&chain, chain.tip().as_ref(), &params).unwrap();
        let next_target = decode_compact(next).target;
        let prev_target = decode_compact(MID_BITS).target;
        let upper = &prev_target * 105u32 / 100u32;
        let lower = &prev_target * 95u32 / 100u32;
        assert!(next_target >= lower && next_target <= upper);
    }

    #[test]
    fn pow_era_hardens_on_fast_blocks_with_clamp() {
        let params = params();
        // Instant blocks: timespan clamps at a third of the expected one.
        let chain = chain_with_spacing(40, 0, MID_BITS);
        let next = next_required_target(&chain, chain.tip().as_ref(), &params).unwrap();
        let next_target = decode_compact(next).target;
        let prev_target = decode_compact(MID_BITS).target;
        assert!(next_target < prev_target);
        assert!(next_target >= &prev_target / 3u32 - 1u32);
    }

    #[test]
    fn pow_era_never_exceeds_limit() {
        let params = params();
        let limit_bits = encode_compact(&params.pow_limit());
        let chain = chain_with_spacing(40, 100_000, limit_bits);
        let next = next_required_target(&chain, chain.tip().as_ref(), &params).unwrap();
        assert!(decode_compact(next).target <= params.pow_limit());
    }

    #[test]
    fn pos_era_moves_toward_spacing() {
        let params = params();
        let prev_target = decode_compact(MID_BITS).target;

        let fast = chain_with_spacing(110, 10, MID_BITS);
        let next = next_required_target(&fast, fast.tip().as_ref(), &params).unwrap();
        // old * (39*60 + 20) / (41*60)
        assert_eq!(decode_compact(next).target, encode_roundtrip(&prev_target * 2360u32 / 2460u32));

        let slow = chain_with_spacing(110, 600, MID_BITS);
        let next = next_required_target(&slow, slow.tip().as_ref(), &params).unwrap();
        assert!(decode_compact(next).target > prev_target);
    }

    #[test]
    fn pos_era_non_positive_spacing_counts_as_one_second() {
        let params = params();
        let backwards = chain_with_spacing(110, 0, MID_BITS);
        let next = next_required_target(&backwards, backwards.tip().as_ref(), &params).unwrap();
        let prev_target = decode_compact(MID_BITS).target;
        assert_eq!(decode_compact(next).target, encode_roundtrip(prev_target * 2342u32 / 2460u32));
    }

    #[test]
    fn pos_era_falls_back_to_limit() {
        let params = params();
        let limit_bits = encode_compact(&params.pow_limit());
        let chain = chain_with_spacing(110, 100_000, limit_bits);
        let next = next_required_target(&chain, chain.tip().as_ref(), &params).unwrap();
        assert_eq!(next, limit_bits);
    }

    #[test]
    fn check_difficulty_compares_bits() {
        let params = params();
        let chain = chain_with_spacing(10, 60, MID_BITS);
        let tip = chain.tip().unwrap();
        let limit_bits = encode_compact(&params.pow_limit());
        let good = block(tip.hash, 2_000_000_000, limit_bits);
        check_difficulty(&chain, Some(&tip), &good.header, &params).unwrap();

        let bad = block(tip.hash, 2_000_000_000, MID_BITS);
        assert!(matches!(
            check_difficulty(&chain, Some(&tip), &bad.header, &params),
            Err(ConsensusError::BadDifficultyBits { expected, found })
                if expected == limit_bits && found == MID_BITS
        ));
    }

    fn encode_roundtrip(target: BigUint) -> BigUint {
        decode_compact(encode_compact(&target)).target
    }
}
