//! Polynomial commitment scheme, verifier side.
//!
//! Holds the registry of committed trees: each `commit` mixes the root into
//! the channel and records the columns at their blown-up sizes. The degree
//! bounds handed to FRI are derived from the registry.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::channel::KeccakChannel;
use crate::circle::MAX_CIRCLE_DOMAIN_LOG_SIZE;
use crate::fri::{CirclePolyDegreeBound, FriConfig};
use crate::merkle::{Hash, MerkleVerifier};
use crate::types::VerifyError;
use itertools::Itertools;

/// Commitment scheme parameters: proof-of-work strength plus FRI shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PcsConfig {
    pub pow_bits: u32,
    pub fri_config: FriConfig,
}

impl PcsConfig {
    pub fn new(pow_bits: u32, fri_config: FriConfig) -> Self {
        Self {
            pow_bits,
            fri_config,
        }
    }

    /// Conjectured soundness contribution of PoW plus FRI queries.
    pub fn security_bits(&self) -> u32 {
        self.pow_bits + self.fri_config.security_bits()
    }
}

impl Default for PcsConfig {
    fn default() -> Self {
        Self {
            pow_bits: 5,
            fri_config: FriConfig::default(),
        }
    }
}

/// Registry of the committed trees of one proof.
pub struct CommitmentSchemeVerifier {
    pub trees: Vec<MerkleVerifier>,
    pub config: PcsConfig,
}

impl CommitmentSchemeVerifier {
    pub fn new(config: PcsConfig) -> Self {
        Self {
            trees: Vec::new(),
            config,
        }
    }

    /// Register a commitment: mix the root, record columns at their blown-up
    /// log sizes.
    pub fn commit(
        &mut self,
        root: Hash,
        column_log_sizes: &[u32],
        channel: &mut KeccakChannel,
    ) -> Result<(), VerifyError> {
        let blowup = self.config.fri_config.log_blowup_factor;
        if column_log_sizes
            .iter()
            .any(|&s| s + blowup > MAX_CIRCLE_DOMAIN_LOG_SIZE)
        {
            return Err(VerifyError::Shape("column log size exceeds domain cap"));
        }
        channel.mix_root(&root);
        let extended: Vec<u32> = column_log_sizes.iter().map(|&s| s + blowup).collect();
        tracing::trace!(
            root = %hex::encode(root),
            n_columns = extended.len(),
            "registered commitment tree"
        );
        self.trees.push(MerkleVerifier::new(root, extended));
        Ok(())
    }

    /// Blown-up column log sizes, per tree.
    pub fn column_log_sizes(&self) -> Vec<Vec<u32>> {
        self.trees
            .iter()
            .map(|tree| tree.column_log_sizes.clone())
            .collect()
    }

    /// Distinct circle-polynomial degree bounds over all committed columns,
    /// descending.
    pub fn calculate_bounds(&self) -> Vec<CirclePolyDegreeBound> {
        let blowup = self.config.fri_config.log_blowup_factor;
        self.trees
            .iter()
            .flat_map(|tree| tree.column_log_sizes.iter().copied())
            .sorted_by_key(|&s| core::cmp::Reverse(s))
            .dedup()
            .map(|s| CirclePolyDegreeBound::new(s - blowup))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_mixes_root_and_blows_up() {
        let mut channel = KeccakChannel::default();
        let mut scheme = CommitmentSchemeVerifier::new(PcsConfig::default());
        let before = channel.digest();
        scheme.commit([1u8; 32], &[4, 5], &mut channel).unwrap();
        assert_ne!(channel.digest(), before);

        let blowup = scheme.config.fri_config.log_blowup_factor;
        assert_eq!(scheme.trees[0].column_log_sizes, vec![4 + blowup, 5 + blowup]);
    }

    #[test]
    fn test_calculate_bounds_sorted_dedup() {
        let mut channel = KeccakChannel::default();
        let mut scheme = CommitmentSchemeVerifier::new(PcsConfig::default());
        scheme.commit([1u8; 32], &[4, 6], &mut channel).unwrap();
        scheme.commit([2u8; 32], &[6, 5, 4], &mut channel).unwrap();

        let bounds: Vec<u32> = scheme
            .calculate_bounds()
            .iter()
            .map(|b| b.log_degree_bound)
            .collect();
        assert_eq!(bounds, vec![6, 5, 4]);
    }

    #[test]
    fn test_commit_rejects_oversized_column() {
        let mut channel = KeccakChannel::default();
        let mut scheme = CommitmentSchemeVerifier::new(PcsConfig::default());
        let result = scheme.commit([1u8; 32], &[31], &mut channel);
        assert!(matches!(result, Err(VerifyError::Shape(_))));
    }
}
