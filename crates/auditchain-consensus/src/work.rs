// Consensus-critical. Changes require a protocol review + tests.
//! Work calculation helpers (heaviest-chain selection).

use auditchain_core::Hash32;
use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::target::decode_compact;

/// Compute per-block work from compact `bits`.
///
/// Work is `floor(2^256 / (target + 1))`, evaluated as
/// `(!target / (target + 1)) + 1` over 256 bits so `2^256` is never formed.
/// Invalid targets (negative, zero, overflowing) carry no work.
pub fn block_proof(bits: u32) -> BigUint {
    let Some(target) = decode_compact(bits).into_valid() else {
        return BigUint::zero();
    };
    let max = (BigUint::one() << 256u32) - BigUint::one();
    if target > max {
        return BigUint::zero();
    }
    let complement = &max - &target;
    complement / (target + BigUint::one()) + BigUint::one()
}

/// Cumulative work after appending a block with `bits` to a chain with `parent_work`.
pub fn cumulative_work(parent_work: &BigUint, bits: u32) -> BigUint {
    parent_work + block_proof(bits)
}

/// Return true if tip A is strictly better (heavier) than tip B, tie-breaking on hash.
pub fn tip_is_better(a_work: &BigUint, a_hash: &Hash32, b_work: &BigUint, b_hash: &Hash32) -> bool {
    if a_work != b_work {
        a_work > b_work
    } else {
        a_hash.as_bytes() < b_hash.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_matches_definition() {
        for bits in [0x1d00_ffffu32, 0x207f_ffff, 0x0312_3456] {
            let target = decode_compact(bits).target;
            let expected = (BigUint::one() << 256u32) / (target + BigUint::one());
            assert_eq!(block_proof(bits), expected, "{bits:#x}");
        }
    }

    #[test]
    fn invalid_targets_carry_no_work() {
        assert!(block_proof(0).is_zero());
        assert!(block_proof(0x0480_0001).is_zero());
        assert!(block_proof(0xff12_3456).is_zero());
    }

    #[test]
    fn work_monotonic_vs_target() {
        let easy = block_proof(0x207f_ffff);
        let harder = block_proof(0x1e00_ffff);
        assert!(harder > easy, "harder target must yield more work");
    }

    #[test]
    fn cumulative_accumulates() {
        let one = cumulative_work(&BigUint::zero(), 0x1d00_ffff);
        let two = cumulative_work(&one, 0x1d00_ffff);
        assert_eq!(two, &one * 2u32);
    }

    #[test]
    fn tip_comparison() {
        let h1 = Hash32([0u8; 32]);
        let h2 = Hash32([1u8; 32]);
        let w1 = block_proof(0x207f_ffff);
        let w2 = block_proof(0x1e00_ffff);

        assert!(tip_is_better(&w2, &h2, &w1, &h1));
        assert!(!tip_is_better(&w1, &h2, &w2, &h1));

        // Tie breaks on hash (lower hash wins).
        assert!(tip_is_better(&w1, &h1, &w1, &h2));
    }
}
