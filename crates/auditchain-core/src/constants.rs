//! Protocol-wide constants.

/// Length in bytes of a 32-byte hash.
pub const HASH32_LEN: usize = 32;

/// Current block header version.
///
/// Headers with `version > 3` carry the accumulator checkpoint field.
pub const CURRENT_BLOCK_VERSION: i32 = 4;

/// Lowest header version that serializes the accumulator checkpoint.
pub const ACCUMULATOR_CHECKPOINT_MIN_VERSION: i32 = 4;

/// Reserved previous-block-hash value that marks a proof-of-audit header.
///
/// Serialized form of the 256-bit integer `0x11` (little-endian byte order),
/// i.e. `0x11` followed by 31 zero bytes.
pub const POA_SENTINEL_BYTES: [u8; HASH32_LEN] = {
    let mut bytes = [0u8; HASH32_LEN];
    bytes[0] = 0x11;
    bytes
};

/// Serialized size of a `PoSBlockSummary` (hash + time + height).
pub const POS_BLOCK_SUMMARY_LEN: usize = HASH32_LEN + 4 + 4;

/// Domain separator used when computing the proof-of-audit mined hash.
///
/// Keeps the work puzzle disjoint from the header identity hash.
pub const DS_POA_MINED_HASH: &[u8] = b"AUDITCHAIN::POA_MINED_HASH::V1";
