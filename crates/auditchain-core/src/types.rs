// Consensus-critical. Changes require a protocol review + tests.
//! Canonical protocol types.
//!
//! This module defines the consensus-visible block data model: headers,
//! blocks, the minimal transaction shape needed to recognise coinstakes, and
//! the compact `PoSBlockSummary` pointers embedded in proof-of-audit blocks.

use crate::constants::*;
use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors related to parsing, validation, or construction of core protocol types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid hex length: expected {expected} bytes, got {got} bytes")]
    InvalidHexLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// A value violated protocol constraints.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// Fixed-size 32-byte hash used throughout the protocol.
///
/// Bytes are kept in serialized order. When a hash is compared against a
/// difficulty target it is read as a big-endian unsigned integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hash32(pub [u8; HASH32_LEN]);

impl Hash32 {
    /// Returns an all-zero (null) hash.
    pub const fn zero() -> Self {
        Self([0u8; HASH32_LEN])
    }

    /// Returns the reserved proof-of-audit previous-block sentinel.
    pub const fn poa_sentinel() -> Self {
        Self(POA_SENTINEL_BYTES)
    }

    /// Returns true for the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH32_LEN]
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; HASH32_LEN] {
        &self.0
    }
}

impl Default for Hash32 {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; HASH32_LEN]> for Hash32 {
    fn from(value: [u8; HASH32_LEN]) -> Self {
        Self(value)
    }
}

impl From<Hash32> for [u8; HASH32_LEN] {
    fn from(value: Hash32) -> Self {
        value.0
    }
}

impl FromStr for Hash32 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != HASH32_LEN {
            return Err(CoreError::InvalidHexLength {
                expected: HASH32_LEN,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH32_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Block hash type.
pub type BlockHash = Hash32;

/// Transaction identifier type.
pub type TxId = Hash32;

/// Reference to a previous transaction output.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutPoint {
    /// Transaction containing the referenced output.
    pub txid: TxId,
    /// Output index within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub const fn null() -> Self {
        Self {
            txid: Hash32::zero(),
            index: u32::MAX,
        }
    }

    /// Returns true for the null outpoint.
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

/// Transaction input.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TxIn {
    /// Output being spent.
    pub prevout: OutPoint,
    /// Unlocking script (opaque to this crate).
    pub script_sig: Vec<u8>,
}

/// Transaction output.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TxOut {
    /// Output value in atoms.
    pub value: i64,
    /// Locking script (opaque to this crate).
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// An empty output marks the first output of a coinstake.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// Transaction container.
///
/// Only the shape needed to tell coinbase and coinstake transactions apart
/// is consensus-visible here; scripts and amounts are opaque.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transaction {
    /// Transaction version.
    pub version: i32,
    /// Inputs.
    pub inputs: Vec<TxIn>,
    /// Outputs.
    pub outputs: Vec<TxOut>,
    /// Lock time.
    pub lock_time: u32,
}

impl Transaction {
    /// Coinbase: a single input spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Coinstake: first input spends a real output, at least two outputs,
    /// and the first output is empty.
    pub fn is_coinstake(&self) -> bool {
        match (self.inputs.first(), self.outputs.first()) {
            (Some(input), Some(first_out)) => {
                !input.prevout.is_null() && self.outputs.len() >= 2 && first_out.is_empty()
            }
            _ => false,
        }
    }
}

/// Compact, verifiable pointer to one previously accepted non-audit block.
///
/// Equality is structural over all three fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoSBlockSummary {
    /// Identity hash of the audited block.
    pub hash: BlockHash,
    /// Timestamp of the audited block.
    pub time: u32,
    /// Height of the audited block.
    pub height: u32,
}

/// Linkage carried by a header: either a regular parent pointer or the
/// proof-of-audit fields.
///
/// On the wire an `Audit` header writes the reserved sentinel in the
/// previous-block-hash slot followed by its two extra hashes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HeaderKind {
    /// Proof-of-work or proof-of-stake header.
    Chained {
        /// Hash of the previous block.
        prev_block: BlockHash,
    },
    /// Proof-of-audit header.
    Audit {
        /// Hash of the preceding proof-of-audit block (null for the first one).
        prev_poa: BlockHash,
        /// Merkle root over the audited `PoSBlockSummary` list.
        pos_audited_merkle_root: Hash32,
    },
}

/// Block header containing consensus-critical metadata.
///
/// Serialization is hand-written (see `serialization`) to keep the legacy
/// byte layout, where optional fields are gated by the sentinel and by
/// `version`.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockHeader {
    /// Header version.
    pub version: i32,
    /// Parent linkage or proof-of-audit fields.
    pub kind: HeaderKind,
    /// Merkle root of transaction identifiers.
    pub merkle_root: Hash32,
    /// Block timestamp (Unix seconds).
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Nonce.
    pub nonce: u32,
    /// Zerocoin accumulator checkpoint, serialized only when `version > 3`.
    pub accumulator_checkpoint: Hash32,
}

impl BlockHeader {
    /// True when this is a proof-of-audit header.
    pub fn is_audit(&self) -> bool {
        matches!(self.kind, HeaderKind::Audit { .. })
    }

    /// The value written in the previous-block-hash slot on the wire.
    pub fn wire_prev_block(&self) -> BlockHash {
        match self.kind {
            HeaderKind::Chained { prev_block } => prev_block,
            HeaderKind::Audit { .. } => Hash32::poa_sentinel(),
        }
    }

    /// Previous-block hash for regular headers.
    pub fn prev_block(&self) -> Option<BlockHash> {
        match self.kind {
            HeaderKind::Chained { prev_block } => Some(prev_block),
            HeaderKind::Audit { .. } => None,
        }
    }

    /// Previous proof-of-audit hash for audit headers.
    pub fn prev_poa(&self) -> Option<BlockHash> {
        match self.kind {
            HeaderKind::Audit { prev_poa, .. } => Some(prev_poa),
            HeaderKind::Chained { .. } => None,
        }
    }

    /// Audited-summary Merkle root for audit headers.
    pub fn pos_audited_merkle_root(&self) -> Option<Hash32> {
        match self.kind {
            HeaderKind::Audit {
                pos_audited_merkle_root,
                ..
            } => Some(pos_audited_merkle_root),
            HeaderKind::Chained { .. } => None,
        }
    }

    /// Whether the accumulator checkpoint is part of the serialized header.
    pub fn has_accumulator_checkpoint(&self) -> bool {
        self.version >= ACCUMULATOR_CHECKPOINT_MIN_VERSION
    }

    /// Performs basic structural validation.
    pub fn validate_sanity(&self) -> Result<(), CoreError> {
        if let HeaderKind::Chained { prev_block } = self.kind {
            // Would decode back as an audit header.
            if prev_block == Hash32::poa_sentinel() {
                return Err(CoreError::InvalidValue(
                    "regular header uses the audit sentinel as parent",
                ));
            }
        }
        if self.bits == 0 {
            return Err(CoreError::InvalidValue("header bits must be non-zero"));
        }
        Ok(())
    }
}

/// Full block.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions included in this block.
    pub txs: Vec<Transaction>,
    /// Audited summaries, sorted by ascending height. Non-empty iff the block
    /// is a proof-of-audit block.
    pub audited: Vec<PoSBlockSummary>,
    /// Stake signature; serialized only for blocks carrying a coinstake.
    pub signature: Vec<u8>,
}

impl Block {
    /// True when `txs[1]` is a coinstake (the legacy signature-presence rule).
    pub fn has_coinstake(&self) -> bool {
        self.txs.get(1).is_some_and(Transaction::is_coinstake)
    }

    /// Performs basic structural validation.
    pub fn validate_sanity(&self) -> Result<(), CoreError> {
        self.header.validate_sanity()?;
        match self.txs.first() {
            None => return Err(CoreError::InvalidValue("block has no transactions")),
            Some(first) if !first.is_coinbase() => {
                return Err(CoreError::InvalidValue("first transaction is not a coinbase"));
            }
            Some(_) => {}
        }
        if self.txs.iter().skip(1).any(Transaction::is_coinbase) {
            return Err(CoreError::InvalidValue("more than one coinbase"));
        }
        if !self.signature.is_empty() && !self.has_coinstake() {
            return Err(CoreError::InvalidValue("block signature without a coinstake"));
        }

        if !self.header.is_audit() {
            if !self.audited.is_empty() {
                return Err(CoreError::InvalidValue(
                    "audited summaries on a non-audit block",
                ));
            }
            return Ok(());
        }

        if self.audited.is_empty() {
            return Err(CoreError::InvalidValue("audit block audits nothing"));
        }
        if self
            .audited
            .windows(2)
            .any(|pair| pair[0].height >= pair[1].height)
        {
            return Err(CoreError::InvalidValue(
                "audited summaries not strictly ascending by height",
            ));
        }
        Ok(())
    }
}
