//! Component descriptors and mask sample points.
//!
//! The AIR itself is not evaluated here; a component descriptor only tells
//! the verifier where each committed column must be sampled relative to the
//! out-of-domain point.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::circle::{CanonicCoset, CirclePoint};
use crate::qm31::{QM31, SECURE_EXTENSION_DEGREE};
use crate::types::VerifyError;

/// Static description of one component's trace layout.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentInfo {
    pub max_constraint_log_degree_bound: u32,
    pub log_size: u32,
    /// Signed row offsets per trace tree (original, interaction, ...) per
    /// column.
    pub mask_offsets: Vec<Vec<Vec<i32>>>,
    /// Indices of the preprocessed columns this component reads.
    pub preprocessed_columns: Vec<u32>,
}

/// One component's public claim.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentParams {
    pub log_size: u32,
    pub claimed_sum: QM31,
    pub info: ComponentInfo,
}

/// Everything the verifier is told about the statement.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerificationParams {
    pub components: Vec<ComponentParams>,
    pub n_preprocessed_columns: usize,
    pub composition_log_degree_bound: u32,
}

/// Sample points for every committed column, tree-major:
/// preprocessed tree, trace trees, then the composition tree.
///
/// The trace-location allocation supports exactly one component; multiple
/// components would overlap allocations, so they are rejected up front.
pub fn sample_points(
    params: &VerificationParams,
    oods_point: CirclePoint<QM31>,
) -> Result<Vec<Vec<Vec<CirclePoint<QM31>>>>, VerifyError> {
    let [component] = params.components.as_slice() else {
        return Err(VerifyError::Shape("exactly one component is supported"));
    };
    let info = &component.info;
    if info.log_size != component.log_size {
        return Err(VerifyError::Shape("component log size disagrees with its info"));
    }
    if info.log_size == 0 || info.log_size > crate::circle::MAX_CIRCLE_DOMAIN_LOG_SIZE {
        return Err(VerifyError::Shape("component log size out of range"));
    }
    if info
        .preprocessed_columns
        .iter()
        .any(|&c| c as usize >= params.n_preprocessed_columns)
    {
        return Err(VerifyError::Shape("preprocessed column index out of range"));
    }

    let trace_step = CanonicCoset::new(info.log_size).step_size();

    let mut points = Vec::with_capacity(info.mask_offsets.len() + 2);
    // Every preprocessed column is sampled at the OODS point itself.
    points.push(vec![vec![oods_point]; params.n_preprocessed_columns]);
    for tree_offsets in &info.mask_offsets {
        points.push(
            tree_offsets
                .iter()
                .map(|column_offsets| {
                    column_offsets
                        .iter()
                        .map(|&offset| {
                            oods_point.add(trace_step.mul_signed(offset).to_point().into_ef())
                        })
                        .collect()
                })
                .collect(),
        );
    }
    // Four coordinate columns of the composition polynomial.
    points.push(vec![vec![oods_point]; SECURE_EXTENSION_DEGREE]);

    Ok(points)
}
