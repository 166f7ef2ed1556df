//! Order-independent keccak-256 Merkle engine.
//!
//! Leaves are byte strings of any (shared) length; the pair hash sorts its
//! operands lexicographically before hashing, so a proof carries sibling
//! hashes only and no left/right bits. An odd trailing element is promoted
//! to the next layer unchanged rather than duplicated.

use tiny_keccak::{Hasher, Keccak};

/// Compute a keccak-256 digest (the pre-NIST-SHA3 variant).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    keccak.update(data);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    out
}

/// Combine two nodes as `keccak256(min(a,b) || max(a,b))`.
pub fn hash_pair(a: &[u8], b: &[u8]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut keccak = Keccak::v256();
    keccak.update(lo);
    keccak.update(hi);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    out
}

/// A Merkle tree over byte-string leaves, layer 0 first.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    layers: Vec<Vec<Vec<u8>>>,
}

impl MerkleTree {
    /// Build the full layer stack bottom-up from the given leaves.
    ///
    /// Leaf order is the caller's; duplicates are allowed and never sorted.
    pub fn build(leaves: Vec<Vec<u8>>) -> Self {
        let mut layers = vec![leaves];
        while layers.last().map_or(false, |layer| layer.len() > 1) {
            let prev = layers.last().expect("stack is non-empty");
            let mut next = Vec::with_capacity((prev.len() + 1) / 2);
            for chunk in prev.chunks(2) {
                match chunk {
                    [left, right] => next.push(hash_pair(left, right).to_vec()),
                    [odd] => next.push(odd.clone()),
                    _ => unreachable!("chunks(2) yields one or two elements"),
                }
            }
            layers.push(next);
        }
        Self { layers }
    }

    /// Number of leaves in layer 0.
    pub fn leaf_count(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    /// The root digest; empty bytes for an empty tree.
    pub fn root(&self) -> Vec<u8> {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .cloned()
            .unwrap_or_default()
    }

    /// Sibling hashes along the path from leaf `index` to the root.
    ///
    /// Levels where the element is the odd man out contribute no sibling.
    /// Returns `None` for an out-of-range index.
    pub fn proof_for_index(&self, index: usize) -> Option<Vec<Vec<u8>>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut proof = Vec::new();
        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = if position % 2 == 0 {
                position + 1
            } else {
                position - 1
            };
            if sibling < layer.len() {
                proof.push(layer[sibling].clone());
            }
            position /= 2;
        }
        Some(proof)
    }
}

/// Recompute the root from `leaf` by folding in sibling hashes; true when
/// the result matches `root`.
pub fn validate_proof(proof: &[Vec<u8>], root: &[u8], leaf: &[u8]) -> bool {
    let mut acc = leaf.to_vec();
    for sibling in proof {
        acc = hash_pair(&acc, sibling).to_vec();
    }
    acc == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_leaves(n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|i| format!("{i}").into_bytes().repeat(32))
            .collect()
    }

    #[test]
    fn pair_hash_is_symmetric() {
        let a = b"left".to_vec();
        let b = b"right".to_vec();
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn every_leaf_proof_validates() {
        for n in [2, 3, 5, 7, 10, 16] {
            let leaves = sample_leaves(n);
            let tree = MerkleTree::build(leaves.clone());
            let root = tree.root();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof_for_index(i).unwrap();
                assert!(
                    validate_proof(&proof, &root, leaf),
                    "leaf {i} of {n} failed"
                );
            }
        }
    }

    #[test]
    fn single_leaf_tree_is_its_own_root() {
        let leaf = keccak256(b"only one").to_vec();
        let tree = MerkleTree::build(vec![leaf.clone()]);
        assert_eq!(tree.root(), leaf);
        let proof = tree.proof_for_index(0).unwrap();
        assert!(proof.is_empty());
        assert!(validate_proof(&proof, &tree.root(), &leaf));
    }

    #[test]
    fn empty_tree_has_empty_root() {
        let tree = MerkleTree::build(Vec::new());
        assert!(tree.root().is_empty());
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.proof_for_index(0).is_none());
    }

    #[test]
    fn odd_man_out_promotes_without_sibling() {
        let leaves = sample_leaves(3);
        let tree = MerkleTree::build(leaves.clone());
        // Leaf 2 has no sibling at level 0; its proof is shorter.
        let proof = tree.proof_for_index(2).unwrap();
        assert_eq!(proof.len(), 1);
        assert!(validate_proof(&proof, &tree.root(), &leaves[2]));
    }

    #[test]
    fn tampered_proof_fails() {
        let leaves = sample_leaves(8);
        let tree = MerkleTree::build(leaves.clone());
        let mut proof = tree.proof_for_index(3).unwrap();
        proof[0][0] ^= 0x01;
        assert!(!validate_proof(&proof, &tree.root(), &leaves[3]));
    }

    #[test]
    fn foreign_leaf_fails() {
        let leaves = sample_leaves(6);
        let tree = MerkleTree::build(leaves.clone());
        let proof = tree.proof_for_index(1).unwrap();
        let outsider = keccak256(b"never a member").to_vec();
        assert!(!validate_proof(&proof, &tree.root(), &outsider));
    }

    #[test]
    fn duplicate_leaves_each_validate_by_index() {
        let leaf = keccak256(b"twin").to_vec();
        let tree = MerkleTree::build(vec![leaf.clone(), leaf.clone()]);
        for i in 0..2 {
            let proof = tree.proof_for_index(i).unwrap();
            assert!(validate_proof(&proof, &tree.root(), &leaf));
        }
    }
}
