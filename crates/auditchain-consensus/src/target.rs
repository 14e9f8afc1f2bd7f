// Consensus-critical. Changes require a protocol review + tests.
//! Compact target ("nBits") encoding.
//!
//! `bits = (size << 24) | mantissa`, where `size` is the byte length of the
//! target and the low 23 bits are the top bytes of its value:
//!
//! - size <= 3: target = mantissa >> 8*(3 - size)
//! - size > 3:  target = mantissa << 8*(size - 3)
//!
//! Bit 23 is a sign bit. Decoding reports negative and overflowing
//! encodings instead of rejecting them, so callers decide how strict to be.
//! No floats anywhere.

use auditchain_core::Hash32;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decoded compact target plus the encoding flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactTarget {
    /// Decoded magnitude.
    pub target: BigUint,
    /// Sign bit set on a non-zero mantissa.
    pub negative: bool,
    /// Value does not fit in 256 bits.
    pub overflow: bool,
}

impl CompactTarget {
    /// True when the target is usable: positive, non-zero and in range.
    pub fn is_valid(&self) -> bool {
        !self.negative && !self.overflow && !self.target.is_zero()
    }

    /// The target if usable.
    pub fn into_valid(self) -> Option<BigUint> {
        self.is_valid().then_some(self.target)
    }
}

/// Decode compact `bits`.
pub fn decode_compact(bits: u32) -> CompactTarget {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        BigUint::from(word)
    } else {
        BigUint::from(word) << (8 * (size - 3))
    };

    let negative = word != 0 && (bits & SIGN_BIT) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    CompactTarget {
        target,
        negative,
        overflow,
    }
}

/// Encode a target into normalized compact form.
///
/// Keeps the top three significant bytes; if the mantissa would set the sign
/// bit it is shifted down a byte and the size bumped.
pub fn encode_compact(target: &BigUint) -> u32 {
    let mut size = u32::try_from(target.bits().div_ceil(8)).unwrap_or(u32::MAX);

    let mut compact = if size <= 3 {
        target.to_u32().unwrap_or(0) << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3))).to_u32().unwrap_or(0)
    };

    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size = size.saturating_add(1);
    }

    compact | (size << 24)
}

/// Read a 32-byte hash as a big-endian unsigned integer.
pub fn hash_to_uint(hash: &Hash32) -> BigUint {
    BigUint::from_bytes_be(hash.as_bytes())
}

/// Returns `true` if `hash <= target`.
pub fn hash_meets_target(hash: &Hash32, target: &BigUint) -> bool {
    hash_to_uint(hash) <= *target
}
