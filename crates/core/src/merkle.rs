//! Merkle root and inclusion proofs over hex-encoded leaf hashes.
//!
//! # Pairing rule
//!
//! - Odd-length levels duplicate their last hash before pairing.
//! - A parent is `sha256_hex(left_hex + right_hex)`; the concatenation is of
//!   the hex *text*, not the raw digest bytes.
//! - An empty leaf set has the root `sha256_hex("empty_mesh")`.
//! - A single leaf is its own root.
//!
//! This must match legacy mesh blocks exactly, so do not "fix" it.

use crate::error::{CoreError, Result};
use crate::hashing::sha256_hex;
use serde::{Deserialize, Serialize};

/// Domain string hashed for the root of an empty leaf set.
pub const EMPTY_ROOT_PREIMAGE: &str = "empty_mesh";

/// One step of an inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash at this level
    pub sibling: String,
    /// Whether the sibling sits to the left of the running hash
    pub sibling_is_left: bool,
}

/// Merkle inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub leaf: String,
    /// Leaf position in the original list
    pub index: usize,
    /// Path from leaf level up to (excluding) the root
    pub steps: Vec<ProofStep>,
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    sha256_hex(combined)
}

fn next_level(level: &mut Vec<String>) -> Vec<String> {
    if level.len() % 2 != 0 {
        if let Some(last) = level.last().cloned() {
            level.push(last);
        }
    }
    level
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect()
}

/// Compute the Merkle root of `hashes`.
pub fn merkle_root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return sha256_hex(EMPTY_ROOT_PREIMAGE);
    }

    let mut level = hashes.to_vec();
    while level.len() > 1 {
        level = next_level(&mut level);
    }
    level.swap_remove(0)
}

/// Build an inclusion proof for `hashes[index]`.
///
/// # Errors
/// `CoreError::LeafIndexOutOfRange` when `index` does not address a leaf.
pub fn merkle_proof(hashes: &[String], index: usize) -> Result<MerkleProof> {
    if index >= hashes.len() {
        return Err(CoreError::LeafIndexOutOfRange {
            index,
            len: hashes.len(),
        });
    }

    let mut steps = Vec::new();
    let mut level = hashes.to_vec();
    let mut position = index;

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            if let Some(last) = level.last().cloned() {
                level.push(last);
            }
        }
        let sibling_index = position ^ 1;
        steps.push(ProofStep {
            sibling: level[sibling_index].clone(),
            sibling_is_left: sibling_index < position,
        });
        level = next_level(&mut level);
        position /= 2;
    }

    Ok(MerkleProof {
        leaf: hashes[index].clone(),
        index,
        steps,
    })
}

/// Check that `proof` leads from its leaf to `root`.
pub fn verify_merkle_proof(proof: &MerkleProof, root: &str) -> bool {
    let computed = proof.steps.iter().fold(proof.leaf.clone(), |acc, step| {
        if step.sibling_is_left {
            hash_pair(&step.sibling, &acc)
        } else {
            hash_pair(&acc, &step.sibling)
        }
    });
    computed == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("tx-{}", i))).collect()
    }

    #[test]
    fn test_empty_root() {
        assert_eq!(merkle_root(&[]), sha256_hex("empty_mesh"));
    }

    #[test]
    fn test_single_leaf_is_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l), l[0]);
    }

    #[test]
    fn test_two_leaves_concatenate_hex() {
        let l = leaves(2);
        let expected = sha256_hex(format!("{}{}", l[0], l[1]));
        assert_eq!(merkle_root(&l), expected);
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let l = leaves(3);
        let left = sha256_hex(format!("{}{}", l[0], l[1]));
        let right = sha256_hex(format!("{}{}", l[2], l[2]));
        let expected = sha256_hex(format!("{}{}", left, right));
        assert_eq!(merkle_root(&l), expected);
    }

    #[test]
    fn test_proof_out_of_range() {
        let l = leaves(2);
        assert!(matches!(
            merkle_proof(&l, 2),
            Err(CoreError::LeafIndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let l = leaves(5);
        let root = merkle_root(&l);
        let mut proof = merkle_proof(&l, 3).unwrap();
        proof.leaf = sha256_hex("forged");
        assert!(!verify_merkle_proof(&proof, &root));
    }

    proptest! {
        #[test]
        fn prop_every_leaf_proves_against_root(n in 1usize..40, pick in 0usize..40) {
            let l = leaves(n);
            let index = pick % n;
            let root = merkle_root(&l);
            let proof = merkle_proof(&l, index).unwrap();
            prop_assert!(verify_merkle_proof(&proof, &root));
        }
    }
}
