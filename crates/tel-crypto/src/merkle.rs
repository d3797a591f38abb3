use serde::{Deserialize, Serialize};
use tel_types::Digest;

use crate::hasher::ContentHasher;

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Internal node digest.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    ContentHasher::MERKLE.hash_parts(&[left.as_bytes(), right.as_bytes()])
}

/// Binary Merkle tree built in one pass over all leaves.
///
/// Left-packed: at each level nodes pair up left to right and a lone
/// right-most node is promoted unchanged. This is the shape
/// [`MerkleState`] accumulates incrementally, so both produce the same root.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    /// Level 0 = leaves, last level = `[root]`.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from leaf digests. No leaves gives the zero root.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        if leaves.is_empty() {
            return Self {
                root: Digest::zero(),
                levels: vec![],
            };
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => hash_pair(&pair[0], right),
                    None => pair[0],
                })
                .collect();
            levels.push(next);
        }

        let root = levels.last().and_then(|l| l.first()).copied().unwrap_or_default();
        Self { root, levels }
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaves = self.levels.first()?;
        let leaf = *leaves.get(index)?;

        let mut path = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            // A promoted node has no sibling at this level.
            if let Some(sibling) = level.get(sibling_idx) {
                let side = if idx % 2 == 0 { Side::Right } else { Side::Left };
                path.push((*sibling, side));
            }
            idx /= 2;
        }

        Some(MerkleProof {
            leaf_index: index as u64,
            leaf,
            path,
            root: self.root,
        })
    }
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: u64,
    pub leaf: Digest,
    /// (sibling, sibling side) pairs from leaf to root.
    pub path: Vec<(Digest, Side)>,
    pub root: Digest,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        for (sibling, side) in &self.path {
            current = match side {
                Side::Left => hash_pair(sibling, &current),
                Side::Right => hash_pair(&current, sibling),
            };
        }
        current == self.root
    }
}

/// Incremental Merkle accumulator.
///
/// Holds one peak per set bit of `leaf_count`, largest subtree first. Adding
/// a leaf merges equal-height peaks like a binary carry; the root folds the
/// peaks right to left. Both steps touch at most `log2(n) + 1` digests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMerkleState")]
pub struct MerkleState {
    leaf_count: u64,
    peaks: Vec<Digest>,
}

#[derive(Deserialize)]
struct RawMerkleState {
    leaf_count: u64,
    peaks: Vec<Digest>,
}

impl TryFrom<RawMerkleState> for MerkleState {
    type Error = String;

    fn try_from(raw: RawMerkleState) -> Result<Self, Self::Error> {
        let expected = raw.leaf_count.count_ones() as usize;
        if raw.peaks.len() != expected {
            return Err(format!(
                "{} leaves need {expected} peaks, found {}",
                raw.leaf_count,
                raw.peaks.len()
            ));
        }
        Ok(Self {
            leaf_count: raw.leaf_count,
            peaks: raw.peaks,
        })
    }
}

impl MerkleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate every digest in `leaves`, in order.
    pub fn from_leaves<'a>(leaves: impl IntoIterator<Item = &'a Digest>) -> Self {
        let mut state = Self::new();
        for leaf in leaves {
            state.extend(*leaf);
        }
        state
    }

    /// Fold in one more leaf and return the new root.
    pub fn extend(&mut self, leaf: Digest) -> Digest {
        let mut node = leaf;
        let mut carry = self.leaf_count;
        while carry & 1 == 1 {
            match self.peaks.pop() {
                Some(left) => node = hash_pair(&left, &node),
                None => break,
            }
            carry >>= 1;
        }
        self.peaks.push(node);
        self.leaf_count += 1;
        self.root()
    }

    /// Current root; the zero digest when empty.
    pub fn root(&self) -> Digest {
        let mut peaks = self.peaks.iter().rev();
        let Some(smallest) = peaks.next() else {
            return Digest::zero();
        };
        peaks.fold(*smallest, |acc, peak| hash_pair(peak, &acc))
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    pub fn peaks(&self) -> &[Digest] {
        &self.peaks
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(seed: u64) -> Digest {
        Digest::of(&seed.to_le_bytes())
    }

    fn leaves(n: u64) -> Vec<Digest> {
        (0..n).map(leaf).collect()
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let tree = MerkleTree::from_leaves(vec![]);
        assert!(tree.root().is_zero());
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.proof(0).is_none());
        assert!(MerkleState::new().root().is_zero());
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaf(1);
        assert_eq!(MerkleTree::from_leaves(vec![l]).root(), l);
        assert_eq!(MerkleState::new().extend(l), l);
    }

    #[test]
    fn lone_node_is_promoted_not_duplicated() {
        let ls = leaves(3);
        let expected = hash_pair(&hash_pair(&ls[0], &ls[1]), &ls[2]);
        assert_eq!(MerkleTree::from_leaves(ls).root(), expected);
    }

    #[test]
    fn accumulator_matches_tree_for_small_sizes() {
        let mut state = MerkleState::new();
        let all = leaves(300);
        for n in 1..=all.len() {
            let root = state.extend(all[n - 1]);
            assert_eq!(root, MerkleTree::from_leaves(all[..n].to_vec()).root(), "n={n}");
            assert_eq!(state.peaks().len(), (n as u64).count_ones() as usize);
        }
    }

    #[test]
    fn proof_verifies_for_all_leaves() {
        for n in [1u64, 2, 5, 7, 8, 13] {
            let ls = leaves(n);
            let tree = MerkleTree::from_leaves(ls.clone());
            for (i, l) in ls.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert_eq!(proof.leaf, *l);
                assert!(proof.verify(), "n={n} leaf={i}");
            }
        }
    }

    #[test]
    fn power_of_two_proofs_have_full_depth() {
        let tree = MerkleTree::from_leaves(leaves(8));
        for i in 0..8 {
            assert_eq!(tree.proof(i).unwrap().path.len(), 3);
        }
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let tree = MerkleTree::from_leaves(leaves(4));
        let mut proof = tree.proof(0).unwrap();
        proof.leaf = leaf(99);
        assert!(!proof.verify());
    }

    #[test]
    fn leaf_order_changes_root() {
        let ls = leaves(4);
        let mut swapped = ls.clone();
        swapped.swap(1, 2);
        assert_ne!(
            MerkleState::from_leaves(&ls).root(),
            MerkleState::from_leaves(&swapped).root()
        );
    }

    #[test]
    fn state_serde_roundtrip() {
        let state = MerkleState::from_leaves(&leaves(11));
        let json = serde_json::to_string(&state).unwrap();
        let parsed: MerkleState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
        assert_eq!(parsed.root(), state.root());
    }

    #[test]
    fn state_with_wrong_peak_count_is_rejected() {
        let mut value = serde_json::to_value(MerkleState::from_leaves(&leaves(3))).unwrap();
        value["leaf_count"] = serde_json::json!(4);
        assert!(serde_json::from_value::<MerkleState>(value).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn incremental_root_matches_rebuild(n in 1u64..10_000, salt in any::<u64>()) {
            let ls: Vec<Digest> = (0..n).map(|i| leaf(i ^ salt)).collect();
            let mut state = MerkleState::new();
            let mut last = Digest::zero();
            for l in &ls {
                last = state.extend(*l);
            }
            prop_assert_eq!(state.leaf_count(), n);
            prop_assert_eq!(last, MerkleTree::from_leaves(ls).root());
        }
    }
}
