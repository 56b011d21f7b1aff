//! Keccak256 Merkle commitment verification.
//!
//! A committed tree packs columns of several log sizes: each column's values
//! enter the node hashes at the layer matching its size, so one root covers
//! the whole column set. The verifier reconstructs only the nodes on the
//! paths of the queried positions; sibling hashes and values at positions the
//! queries do not cover come from the decommitment witness.

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::m31::M31;
use core::fmt::{self, Display};
use sha3::{Digest, Keccak256};

/// Hash output size in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte hash value
pub type Hash = [u8; HASH_SIZE];

/// Merkle verification failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MerkleError {
    /// Witness or value lengths disagree with the expected node walk.
    Shape,
    /// The reconstructed root differs from the committed root.
    RootMismatch,
    /// A query position exceeds its layer's size.
    IndexOutOfBounds,
}

impl Display for MerkleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape => write!(f, "merkle witness shape mismatch"),
            Self::RootMismatch => write!(f, "merkle root mismatch"),
            Self::IndexOutOfBounds => write!(f, "merkle query index out of bounds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MerkleError {}

/// Witness accompanying queried values: sibling hashes plus column values at
/// positions the queries alone cannot reconstruct.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleDecommitment {
    pub hash_witness: Vec<Hash>,
    pub column_witness: Vec<M31>,
}

/// Hash one tree node: children (when below the top of a column's subtree)
/// followed by the layer's column values, little-endian.
pub fn hash_node(children: Option<(Hash, Hash)>, column_values: &[M31]) -> Hash {
    let mut hasher = Keccak256::new();
    if let Some((left, right)) = children {
        hasher.update(left);
        hasher.update(right);
    }
    for value in column_values {
        hasher.update(value.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Verifier side of one committed tree.
#[derive(Clone, Debug)]
pub struct MerkleVerifier {
    pub root: Hash,
    pub column_log_sizes: Vec<u32>,
    /// Columns per log size, derived from `column_log_sizes`.
    pub n_columns_per_log_size: BTreeMap<u32, usize>,
}

impl MerkleVerifier {
    pub fn new(root: Hash, column_log_sizes: Vec<u32>) -> Self {
        let mut n_columns_per_log_size = BTreeMap::new();
        for &log_size in &column_log_sizes {
            *n_columns_per_log_size.entry(log_size).or_insert(0) += 1;
        }
        Self {
            root,
            column_log_sizes,
            n_columns_per_log_size,
        }
    }

    /// Verify a decommitment.
    ///
    /// * `queries_per_log_size` - sorted, deduplicated query positions per
    ///   layer log size.
    /// * `queried_values` - one vector per column (tree column order); each
    ///   aligned with its layer's query positions.
    /// * `decommitment` - sibling hashes and out-of-query column values, in
    ///   the exact order this walk consumes them.
    pub fn verify(
        &self,
        queries_per_log_size: &BTreeMap<u32, Vec<usize>>,
        queried_values: &[Vec<M31>],
        decommitment: &MerkleDecommitment,
    ) -> Result<(), MerkleError> {
        let Some(&max_log_size) = self.column_log_sizes.iter().max() else {
            return Ok(());
        };
        if queried_values.len() != self.column_log_sizes.len() {
            return Err(MerkleError::Shape);
        }

        // Column indices grouped by log size, preserving tree column order.
        let mut cols_by_log_size: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (col, &log_size) in self.column_log_sizes.iter().enumerate() {
            cols_by_log_size.entry(log_size).or_default().push(col);
        }

        let mut value_cursors: Vec<_> = queried_values.iter().map(|v| v.iter().copied()).collect();
        let mut hash_witness = decommitment.hash_witness.iter().copied();
        let mut column_witness = decommitment.column_witness.iter().copied();

        let empty_cols = Vec::new();
        let mut last_layer: Option<Vec<(usize, Hash)>> = None;

        for layer_log_size in (0..=max_log_size).rev() {
            let layer_cols = cols_by_log_size.get(&layer_log_size).unwrap_or(&empty_cols);
            let layer_queries = queries_per_log_size.get(&layer_log_size);
            if let Some(queries) = layer_queries {
                if queries.iter().any(|&q| q >= 1usize << layer_log_size) {
                    return Err(MerkleError::IndexOutOfBounds);
                }
            }
            let mut column_queries = layer_queries.into_iter().flatten().copied().peekable();
            let mut prev_hashes = last_layer
                .take()
                .map(|hashes| hashes.into_iter().peekable());

            let mut this_layer = Vec::new();
            loop {
                // Next node needing a hash: the parent of a surviving child
                // or a directly queried position, whichever is lower.
                let from_prev = prev_hashes
                    .as_mut()
                    .and_then(|prev| prev.peek().map(|&(q, _)| q / 2));
                let from_queries = column_queries.peek().copied();
                let node_index = match (from_prev, from_queries) {
                    (Some(a), Some(b)) => a.min(b),
                    (Some(a), None) => a,
                    (None, Some(b)) => b,
                    (None, None) => break,
                };

                let children = match prev_hashes.as_mut() {
                    Some(prev) => {
                        let mut child = |index: usize| -> Result<Hash, MerkleError> {
                            if prev.peek().map(|&(q, _)| q) == Some(index) {
                                Ok(prev.next().map(|(_, h)| h).unwrap_or_default())
                            } else {
                                hash_witness.next().ok_or(MerkleError::Shape)
                            }
                        };
                        Some((child(2 * node_index)?, child(2 * node_index + 1)?))
                    }
                    None => None,
                };

                let mut node_values = Vec::with_capacity(layer_cols.len());
                if column_queries.next_if_eq(&node_index).is_some() {
                    for &col in layer_cols {
                        node_values.push(value_cursors[col].next().ok_or(MerkleError::Shape)?);
                    }
                } else {
                    for _ in 0..layer_cols.len() {
                        node_values.push(column_witness.next().ok_or(MerkleError::Shape)?);
                    }
                }

                this_layer.push((node_index, hash_node(children, &node_values)));
            }
            last_layer = Some(this_layer);
        }

        // Everything supplied must have been consumed.
        if hash_witness.next().is_some() || column_witness.next().is_some() {
            return Err(MerkleError::Shape);
        }
        if value_cursors.iter_mut().any(|cursor| cursor.next().is_some()) {
            return Err(MerkleError::Shape);
        }

        match last_layer.unwrap_or_default().as_slice() {
            [(0, computed_root)] => {
                if *computed_root == self.root {
                    Ok(())
                } else {
                    Err(MerkleError::RootMismatch)
                }
            }
            _ => Err(MerkleError::Shape),
        }
    }
}
