// Consensus-critical. Changes require a protocol review + tests.
//! Canonical serialization and hashing.
//!
//! Rule: every consensus-critical object is encoded with Borsh. Fixed-width
//! integers are little-endian and hashes are raw 32-byte arrays, so the
//! hand-written header encoding below reproduces the legacy header layout
//! byte for byte:
//!
//! ```text
//! version:i32 | prev_block:32 | [prev_poa:32 | pos_audited_merkle_root:32]
//! | merkle_root:32 | time:u32 | bits:u32 | nonce:u32 | [accumulator_checkpoint:32]
//! ```
//!
//! The bracketed proof-of-audit pair is present iff `prev_block` is the
//! sentinel; the checkpoint is present iff `version > 3`.
//!
//! Two distinct header hashes exist:
//! - [`block_hash`]: identity / chain linkage, double SHA-256.
//! - [`mined_hash`]: proof-of-audit work puzzle, domain-separated BLAKE3.

use std::io::{Read, Write};

use crate::constants::*;
use crate::types::{Block, BlockHeader, CoreError, Hash32, HeaderKind, Transaction};
use borsh::{to_vec, BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

impl BorshSerialize for BlockHeader {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.version.serialize(writer)?;
        match &self.kind {
            HeaderKind::Chained { prev_block } => prev_block.serialize(writer)?,
            HeaderKind::Audit {
                prev_poa,
                pos_audited_merkle_root,
            } => {
                Hash32::poa_sentinel().serialize(writer)?;
                prev_poa.serialize(writer)?;
                pos_audited_merkle_root.serialize(writer)?;
            }
        }
        self.merkle_root.serialize(writer)?;
        self.time.serialize(writer)?;
        self.bits.serialize(writer)?;
        self.nonce.serialize(writer)?;
        if self.has_accumulator_checkpoint() {
            self.accumulator_checkpoint.serialize(writer)?;
        }
        Ok(())
    }
}

impl BorshDeserialize for BlockHeader {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let version = i32::deserialize_reader(reader)?;
        let prev_block = Hash32::deserialize_reader(reader)?;
        let kind = if prev_block == Hash32::poa_sentinel() {
            HeaderKind::Audit {
                prev_poa: Hash32::deserialize_reader(reader)?,
                pos_audited_merkle_root: Hash32::deserialize_reader(reader)?,
            }
        } else {
            HeaderKind::Chained { prev_block }
        };
        let merkle_root = Hash32::deserialize_reader(reader)?;
        let time = u32::deserialize_reader(reader)?;
        let bits = u32::deserialize_reader(reader)?;
        let nonce = u32::deserialize_reader(reader)?;
        let accumulator_checkpoint = if version >= ACCUMULATOR_CHECKPOINT_MIN_VERSION {
            Hash32::deserialize_reader(reader)?
        } else {
            Hash32::zero()
        };
        Ok(Self {
            version,
            kind,
            merkle_root,
            time,
            bits,
            nonce,
            accumulator_checkpoint,
        })
    }
}

impl BorshSerialize for Block {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.header.serialize(writer)?;
        self.txs.serialize(writer)?;
        if self.has_coinstake() {
            self.signature.serialize(writer)?;
        }
        if self.header.is_audit() {
            self.audited.serialize(writer)?;
        }
        Ok(())
    }
}

impl BorshDeserialize for Block {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let header = BlockHeader::deserialize_reader(reader)?;
        let txs = Vec::<Transaction>::deserialize_reader(reader)?;
        let mut block = Self {
            header,
            txs,
            audited: Vec::new(),
            signature: Vec::new(),
        };
        if block.has_coinstake() {
            block.signature = Vec::deserialize_reader(reader)?;
        }
        if block.header.is_audit() {
            block.audited = Vec::deserialize_reader(reader)?;
        }
        Ok(block)
    }
}

/// Encode a value with canonical Borsh encoding.
pub fn to_bytes<T: BorshSerialize>(v: &T) -> Result<Vec<u8>, CoreError> {
    to_vec(v).map_err(|_| CoreError::InvalidValue("borsh serialization failed"))
}

/// Decode a value from its canonical Borsh encoding, rejecting trailing bytes.
pub fn from_bytes<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, CoreError> {
    T::try_from_slice(bytes).map_err(|_| CoreError::InvalidValue("borsh deserialization failed"))
}

/// Double SHA-256.
pub fn sha256d(bytes: &[u8]) -> Hash32 {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(&second);
    Hash32(arr)
}

/// Hash bytes with blake3 under a domain separator and return 32 bytes.
pub fn hash32(domain_sep: &[u8], bytes: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_sep);
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(out.as_bytes());
    Hash32(arr)
}

/// Header identity hash = SHA256d(serialized header).
///
/// This is the hash other blocks link to (`prev_block`, `prev_poa`) and the
/// one audited summaries record.
pub fn block_hash(h: &BlockHeader) -> Result<Hash32, CoreError> {
    let bytes = to_bytes(h)?;
    Ok(sha256d(&bytes))
}

/// Proof-of-audit mined hash = BLAKE3(DS_POA_MINED_HASH || serialized header).
///
/// Checked against the header's compact target. Never used for linkage.
pub fn mined_hash(h: &BlockHeader) -> Result<Hash32, CoreError> {
    let bytes = to_bytes(h)?;
    Ok(hash32(DS_POA_MINED_HASH, &bytes))
}
