//! The verification pipeline.
//!
//! Channel mixes and draws happen in a fixed order; every step below is
//! sequenced against the transcript, and the first failure aborts the run.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::air::{sample_points, VerificationParams};
use crate::channel::KeccakChannel;
use crate::circle::CirclePoint;
use crate::fri::FriVerifier;
use crate::merkle::Hash;
use crate::pcs::CommitmentSchemeVerifier;
use crate::qm31::QM31;
use crate::quotients::{fri_answers, PointSample};
use crate::types::{StarkProof, VerifyError};
use tracing::debug;

/// Verify a parsed proof against the statement parameters.
///
/// * `tree_roots` - the registered pre-composition tree roots (preprocessed,
///   original, interaction); must equal the proof's commitment prefix.
/// * `tree_column_log_sizes` - per tree, the committed columns' log sizes
///   (before blowup).
/// * `initial_digest`, `initial_n_draws` - the channel state the proof was
///   produced against.
pub fn verify(
    proof: &StarkProof,
    params: &VerificationParams,
    tree_roots: &[Hash],
    tree_column_log_sizes: &[Vec<u32>],
    initial_digest: [u8; 32],
    initial_n_draws: u32,
) -> Result<(), VerifyError> {
    let mut channel = KeccakChannel::new(initial_digest, initial_n_draws);

    // Structural checks before any cryptographic work.
    if tree_roots.len() != tree_column_log_sizes.len() {
        return Err(VerifyError::Shape("tree root and layout counts differ"));
    }
    if proof.commitments.len() != tree_roots.len() + 1 {
        return Err(VerifyError::Shape("commitment count mismatch"));
    }
    if proof.commitments[..tree_roots.len()] != *tree_roots {
        return Err(VerifyError::Shape("tree roots disagree with proof commitments"));
    }
    let [component] = params.components.as_slice() else {
        return Err(VerifyError::Shape("exactly one component is supported"));
    };
    if tree_column_log_sizes.len() != 1 + component.info.mask_offsets.len() {
        return Err(VerifyError::Shape("tree count disagrees with component mask"));
    }
    if tree_column_log_sizes[0].len() != params.n_preprocessed_columns {
        return Err(VerifyError::Shape("preprocessed column count mismatch"));
    }
    for (sizes, offsets) in tree_column_log_sizes[1..]
        .iter()
        .zip(&component.info.mask_offsets)
    {
        if sizes.len() != offsets.len() {
            return Err(VerifyError::Shape("column count disagrees with mask"));
        }
    }
    if proof.composition_poly.log_size() != params.composition_log_degree_bound {
        return Err(VerifyError::Shape("composition poly size mismatch"));
    }
    if component.info.max_constraint_log_degree_bound != params.composition_log_degree_bound {
        return Err(VerifyError::Shape("constraint degree disagrees with composition bound"));
    }
    let blowup = proof.config.fri_config.log_blowup_factor;
    if tree_column_log_sizes
        .iter()
        .flatten()
        .chain(core::iter::once(&params.composition_log_degree_bound))
        .any(|&s| s + blowup > crate::circle::MAX_CIRCLE_DOMAIN_LOG_SIZE)
    {
        return Err(VerifyError::Shape("column log size exceeds domain cap"));
    }
    if proof.decommitments.len() != proof.commitments.len()
        || proof.queried_values.len() != proof.commitments.len()
    {
        return Err(VerifyError::Shape("per-tree proof section count mismatch"));
    }

    // Register the pre-composition trees; each commit mixes its root.
    let mut commitment_scheme = CommitmentSchemeVerifier::new(proof.config);
    for (&root, column_log_sizes) in tree_roots.iter().zip(tree_column_log_sizes) {
        commitment_scheme.commit(root, column_log_sizes, &mut channel)?;
    }

    // Constraint-combination randomness; the composition commitment is bound
    // to it by the transcript order.
    let _constraint_coeff = channel.draw_secure_felt()?;

    let composition_root = *proof.commitments.last().unwrap_or(&[0u8; 32]);
    let composition_log_sizes =
        vec![params.composition_log_degree_bound; crate::qm31::SECURE_EXTENSION_DEGREE];
    commitment_scheme.commit(composition_root, &composition_log_sizes, &mut channel)?;

    // Out-of-domain sampling.
    let oods_point = CirclePoint::get_random_point(&mut channel)?;
    let points = sample_points(params, oods_point)?;

    if proof.sampled_values.len() != points.len() {
        return Err(VerifyError::Shape("sampled value tree count mismatch"));
    }
    for (tree_points, tree_values) in points.iter().zip(&proof.sampled_values) {
        if tree_points.len() != tree_values.len() {
            return Err(VerifyError::Shape("sampled value column count mismatch"));
        }
        for (column_points, column_values) in tree_points.iter().zip(tree_values) {
            if column_points.len() != column_values.len() {
                return Err(VerifyError::Shape("sampled value count mismatch"));
            }
        }
    }

    // The composition polynomial must agree with its sampled evaluation.
    let composition_samples = proof
        .sampled_values
        .last()
        .ok_or(VerifyError::Shape("missing composition samples"))?;
    let composition_oods_eval = QM31::from_partial_evals([
        composition_samples[0][0],
        composition_samples[1][0],
        composition_samples[2][0],
        composition_samples[3][0],
    ]);
    if proof.composition_poly.eval_at_point(oods_point) != composition_oods_eval {
        return Err(VerifyError::OodsMismatch);
    }
    debug!("oods check passed");

    // Bind all sampled values, then draw the quotient combination coefficient.
    let flattened: Vec<QM31> = proof
        .sampled_values
        .iter()
        .flatten()
        .flatten()
        .copied()
        .collect();
    channel.mix_felts(&flattened);
    let random_coeff = channel.draw_secure_felt()?;

    // FRI commit phase over the committed degree bounds.
    let bounds = commitment_scheme.calculate_bounds();
    let fri_verifier = FriVerifier::commit(
        &mut channel,
        proof.config.fri_config,
        proof.fri_proof.clone(),
        bounds,
    )?;

    // Proof of work gates the queries.
    if !channel.verify_pow(proof.config.pow_bits, proof.proof_of_work) {
        return Err(VerifyError::PowFailed);
    }
    channel.mix_u64(proof.proof_of_work);

    let (query_positions_per_log_size, queries) =
        fri_verifier.sample_query_positions(&mut channel);
    debug!(n_queries = queries.len(), "query positions sampled");

    // Every tree must open to its committed root at the queried positions.
    for (tree, (queried_values, decommitment)) in commitment_scheme
        .trees
        .iter()
        .zip(proof.queried_values.iter().zip(&proof.decommitments))
    {
        tree.verify(&query_positions_per_log_size, queried_values, decommitment)?;
    }
    debug!("merkle decommitments verified");

    // Recompute the DEEP quotient answers and hand them to FRI.
    let samples = zip_samples(&points, &proof.sampled_values);
    let answers = fri_answers(
        &commitment_scheme.column_log_sizes(),
        &samples,
        random_coeff,
        &query_positions_per_log_size,
        &proof.queried_values,
    )?;

    fri_verifier.decommit(&queries, answers)?;
    debug!("fri decommitment verified");
    Ok(())
}

/// Decode and verify a serialized proof.
pub fn verify_bytes(
    proof_bytes: &[u8],
    params: &VerificationParams,
    tree_roots: &[Hash],
    tree_column_log_sizes: &[Vec<u32>],
    initial_digest: [u8; 32],
    initial_n_draws: u32,
) -> Result<(), VerifyError> {
    let proof = StarkProof::from_bytes(proof_bytes)?;
    verify(
        &proof,
        params,
        tree_roots,
        tree_column_log_sizes,
        initial_digest,
        initial_n_draws,
    )
}

/// Pair each column's sample points with its proof values.
fn zip_samples(
    points: &[Vec<Vec<CirclePoint<QM31>>>],
    sampled_values: &[Vec<Vec<QM31>>],
) -> Vec<Vec<Vec<PointSample>>> {
    points
        .iter()
        .zip(sampled_values)
        .map(|(tree_points, tree_values)| {
            tree_points
                .iter()
                .zip(tree_values)
                .map(|(column_points, column_values)| {
                    column_points
                        .iter()
                        .zip(column_values)
                        .map(|(&point, &value)| PointSample { point, value })
                        .collect()
                })
                .collect()
        })
        .collect()
}
