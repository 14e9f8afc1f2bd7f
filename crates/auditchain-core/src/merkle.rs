// Consensus-critical. Changes require a protocol review + tests.
//! Binary Merkle roots and branches over audited summaries.
//!
//! Classic layout: leaves are paired left to right, an odd node at the end of
//! a level is paired with itself, and parents are `SHA256d(left || right)`.
//! An empty list has the null root.
//!
//! Duplicating the odd node makes `[a, b, c]` and `[a, b, c, c]` share a
//! root. Callers that need to reject such lists use the `mutated` flag, which
//! is set whenever two identical siblings are combined.

use crate::serialization::{sha256d, to_bytes};
use crate::types::{CoreError, Hash32, PoSBlockSummary};

/// Root of a Merkle tree plus whether an identical-sibling pair was seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MerkleRoot {
    /// Computed root.
    pub root: Hash32,
    /// True if two identical sibling nodes were combined on any level.
    pub mutated: bool,
}

/// Compute the Merkle root over already-hashed leaves.
pub fn merkle_root(leaves: Vec<Hash32>) -> MerkleRoot {
    let mut level = leaves;
    let mut mutated = false;

    while level.len() > 1 {
        if level.chunks_exact(2).any(|pair| pair[0] == pair[1]) {
            mutated = true;
        }
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks_exact(2)
            .map(|pair| parent_hash(&pair[0], &pair[1]))
            .collect();
    }

    MerkleRoot {
        root: level.first().copied().unwrap_or_else(Hash32::zero),
        mutated,
    }
}

/// Leaf hash of one audited summary: `SHA256d(hash || time || height)`.
pub fn summary_leaf(summary: &PoSBlockSummary) -> Result<Hash32, CoreError> {
    let bytes = to_bytes(summary)?;
    Ok(sha256d(&bytes))
}

/// Merkle root over an ordered audited-summary list.
pub fn audited_merkle_root(audited: &[PoSBlockSummary]) -> Result<MerkleRoot, CoreError> {
    let leaves = audited
        .iter()
        .map(summary_leaf)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(leaves))
}

/// Sibling hashes from leaf `index` up to the root, bottom level first.
///
/// A node without a right sibling is paired with itself, so its own hash is
/// the branch entry for that level.
pub fn merkle_branch(leaves: Vec<Hash32>, index: usize) -> Result<Vec<Hash32>, CoreError> {
    if index >= leaves.len() {
        return Err(CoreError::InvalidValue("merkle branch index out of range"));
    }
    let mut level = leaves;
    let mut index = index;
    let mut branch = Vec::new();

    while level.len() > 1 {
        let sibling = (index ^ 1).min(level.len() - 1);
        branch.push(level[sibling]);
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks_exact(2)
            .map(|pair| parent_hash(&pair[0], &pair[1]))
            .collect();
        index >>= 1;
    }
    Ok(branch)
}

/// Fold `leaf` up through `branch` and return the root it commits to.
pub fn check_merkle_branch(leaf: Hash32, branch: &[Hash32], index: usize) -> Hash32 {
    let mut hash = leaf;
    let mut index = index;
    for node in branch {
        hash = if index & 1 == 1 {
            parent_hash(node, &hash)
        } else {
            parent_hash(&hash, node)
        };
        index >>= 1;
    }
    hash
}

/// Inclusion proof for `audited[index]` against [`audited_merkle_root`].
pub fn audited_merkle_branch(
    audited: &[PoSBlockSummary],
    index: usize,
) -> Result<Vec<Hash32>, CoreError> {
    let leaves = audited
        .iter()
        .map(summary_leaf)
        .collect::<Result<Vec<_>, _>>()?;
    merkle_branch(leaves, index)
}

/// Compute parent hash for two child nodes.
fn parent_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(left.as_bytes());
    bytes[32..].copy_from_slice(right.as_bytes());
    sha256d(&bytes)
}
