//! Consensus error types.
//!
//! Every rule violation is a typed variant so callers can log it and decide
//! whether to punish the peer that relayed the block. Chain-view failures are
//! kept apart: they mean "could not decide", never "block invalid".

use auditchain_core::{BlockHash, CoreError};
use thiserror::Error;

use crate::chain::ChainViewError;

/// Proof-of-work target violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PowError {
    /// Compact target is negative, zero, overflowing, or easier than the limit.
    #[error("bits {bits:#010x} below minimum work")]
    BelowMinimumWork {
        /// Offending compact target.
        bits: u32,
    },

    /// Hash is numerically above the decoded target.
    #[error("hash does not meet bits {bits:#010x}")]
    HashExceedsTarget {
        /// Compact target the hash was checked against.
        bits: u32,
    },
}

/// Proof-of-audit rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The audited list does not match the chain window it must cover.
    #[error("audit coverage mismatch at height {height}: {reason}")]
    AuditCoverageMismatch {
        /// Chain height where the divergence was detected.
        height: u32,
        /// What diverged.
        reason: &'static str,
    },

    /// `prev_poa` does not name the preceding audit block.
    #[error("broken audit chain: expected prev_poa {expected}, found {found}")]
    BrokenAuditChain {
        /// Hash of the preceding audit block (null if none).
        expected: BlockHash,
        /// Hash carried by the candidate.
        found: BlockHash,
    },

    /// An audited entry points at an audit block.
    #[error("audited entry at height {height} references audit block {hash}")]
    AuditReferencesAuditBlock {
        /// Height recorded in the offending entry.
        height: u32,
        /// Hash recorded in the offending entry.
        hash: BlockHash,
    },

    /// An audited entry was already audited by the preceding audit block.
    #[error("height {height} already audited by {prior}")]
    DuplicateAudit {
        /// Height of the duplicated entry.
        height: u32,
        /// Preceding audit block that already covers it.
        prior: BlockHash,
    },

    /// Candidate arrived too soon after the preceding audit block.
    #[error("audit block too soon: {elapsed}s since previous, {required}s required")]
    AuditTooSoon {
        /// Seconds since the preceding audit block (negative if earlier).
        elapsed: i64,
        /// Minimum spacing.
        required: u32,
    },

    /// Fewer audited entries than the network minimum.
    #[error("audit size {len} below minimum {min}")]
    InsufficientAuditSize {
        /// Number of entries in the candidate.
        len: usize,
        /// Network minimum.
        min: usize,
    },

    /// Header Merkle root does not commit to the audited list.
    #[error("audited merkle root mismatch: computed {computed}, header {header}")]
    AuditMerkleMismatch {
        /// Root recomputed from the list.
        computed: BlockHash,
        /// Root carried by the header.
        header: BlockHash,
    },

    /// Mined hash does not satisfy the header's target.
    #[error("audit block work insufficient: {0}")]
    PoAWorkInsufficient(PowError),

    /// Block is not a well-formed audit block (wrong kind or placement).
    #[error("malformed audit block: {0}")]
    MalformedAuditBlock(&'static str),
}

/// Errors returned by consensus validation and difficulty code.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Proof-of-work rule violated.
    #[error(transparent)]
    Pow(#[from] PowError),

    /// Proof-of-audit rule violated.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Header `bits` differ from the retarget result.
    #[error("bad difficulty bits: expected {expected:#010x}, found {found:#010x}")]
    BadDifficultyBits {
        /// Required compact target.
        expected: u32,
        /// Compact target in the header.
        found: u32,
    },

    /// Header or block failed structural checks.
    #[error("invalid block: {0}")]
    InvalidBlock(&'static str),

    /// Chain state could not be read; validation was not completed.
    #[error("block store unavailable: {0}")]
    BlockStoreUnavailable(#[from] ChainViewError),
}

impl ConsensusError {
    /// True when the block broke a consensus rule. False for local failures
    /// that must not be blamed on the peer.
    pub fn is_consensus_violation(&self) -> bool {
        !matches!(self, Self::BlockStoreUnavailable(_))
    }
}

impl From<CoreError> for ConsensusError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidValue(msg) => Self::InvalidBlock(msg),
            CoreError::InvalidHex(_) | CoreError::InvalidHexLength { .. } => {
                Self::InvalidBlock("malformed hash encoding")
            }
        }
    }
}
