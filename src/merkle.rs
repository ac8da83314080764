//! Transparency log: a binary SHA-256 Merkle tree over the canonical
//! encoding of the accepted ballot set. Publishing the root lets any
//! observer confirm that no ballots were added or removed after the fact,
//! and inclusion proofs let a voter confirm their own ballot was counted.

use crate::*;
use sha2::{Digest, Sha256};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

#[derive(Debug, Clone)]
pub struct MerkleTree {
    // levels[0] is the leaf level, last level is the root
    levels: Vec<Vec<[u8; 32]>>,
}

/// One step of an inclusion proof: a sibling hash and whether it sits to the
/// right of the running hash
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProofStep {
    #[serde(with = "BytesHex")]
    pub sibling: Vec<u8>,
    pub sibling_on_right: bool,
}

impl MerkleTree {
    pub fn from_leaves<I, B>(leaves: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let leaf_level: Vec<[u8; 32]> = leaves
            .into_iter()
            .map(|leaf| hash_leaf(leaf.as_ref()))
            .collect();

        let mut levels = vec![leaf_level];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let below = levels.last().expect("level exists");
            let mut level = Vec::with_capacity((below.len() + 1) / 2);
            for pair in below.chunks(2) {
                // Odd node is paired with itself
                let right = pair.get(1).unwrap_or(&pair[0]);
                level.push(hash_node(&pair[0], right));
            }
            levels.push(level);
        }

        MerkleTree { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    /// The root commitment; all-zeroes for an empty tree
    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    /// Inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.len() {
            return None;
        }

        let mut steps = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = if position % 2 == 0 {
                position + 1
            } else {
                position - 1
            };
            let sibling = level.get(sibling_index).unwrap_or(&level[position]);
            steps.push(ProofStep {
                sibling: sibling.to_vec(),
                sibling_on_right: position % 2 == 0,
            });
            position /= 2;
        }
        Some(steps)
    }
}

/// Check an inclusion proof against a published root
pub fn verify_proof(root: &[u8; 32], leaf: &[u8], proof: &[ProofStep]) -> bool {
    let mut hash = hash_leaf(leaf);
    for step in proof {
        if step.sibling.len() != 32 {
            return false;
        }
        let mut sibling = [0u8; 32];
        sibling.copy_from_slice(&step.sibling);
        hash = if step.sibling_on_right {
            hash_node(&hash, &sibling)
        } else {
            hash_node(&sibling, &hash)
        };
    }
    hash == *root
}

fn hash_leaf(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}
