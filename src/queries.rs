//! Query position sampling.

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeSet, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeSet;

use crate::channel::KeccakChannel;

/// Sorted, deduplicated query positions over a domain of size
/// `2^log_domain_size`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Queries {
    pub positions: Vec<usize>,
    pub log_domain_size: u32,
}

impl Queries {
    /// Draw `n_queries` uniform positions from the channel.
    ///
    /// Domain sizes are powers of two, so masking drawn words is already
    /// uniform; no rejection needed.
    pub fn generate(channel: &mut KeccakChannel, log_domain_size: u32, n_queries: usize) -> Self {
        assert!(log_domain_size <= 31);
        let mask = (1u64 << log_domain_size) - 1;
        let mut positions = BTreeSet::new();
        while positions.len() < n_queries {
            for word in channel.draw_u32s() {
                positions.insert((word as u64 & mask) as usize);
                if positions.len() == n_queries {
                    break;
                }
            }
        }
        Self {
            positions: positions.into_iter().collect(),
            log_domain_size,
        }
    }

    /// Positions after `n_folds` halvings of the domain.
    pub fn fold(&self, n_folds: u32) -> Self {
        assert!(n_folds <= self.log_domain_size);
        let mut positions: Vec<usize> = self.positions.iter().map(|p| p >> n_folds).collect();
        positions.dedup();
        Self {
            positions,
            log_domain_size: self.log_domain_size - n_folds,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }
}
