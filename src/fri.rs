//! FRI low-degree verification.
//!
//! The first layer commits the DEEP quotient columns by domain size; each
//! inner layer commits a fold of the previous one; the last layer is an
//! explicit low-degree polynomial. The verifier recomputes the answers at the
//! queried positions, checks every layer's Merkle decommitment, folds, and
//! compares against the last-layer polynomial.

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, collections::BTreeSet, vec, vec::Vec};
#[cfg(feature = "std")]
use std::collections::{BTreeMap, BTreeSet};

use crate::channel::KeccakChannel;
use crate::circle::{CanonicCoset, CircleDomain, Coset, LineDomain};
use crate::m31::{FieldExpOps, M31};
use crate::merkle::{Hash, MerkleDecommitment, MerkleVerifier};
use crate::poly::LinePoly;
use crate::qm31::{QM31, SECURE_EXTENSION_DEGREE};
use crate::queries::Queries;
use crate::types::VerifyError;
use crate::utils::bit_reverse_index;
use core::fmt::{self, Display};
use itertools::Itertools;

/// Log folding factor of the inner layers.
pub const FOLD_STEP: u32 = 1;

/// Log folding factor of the circle-to-line fold.
pub const CIRCLE_TO_LINE_FOLD_STEP: u32 = 1;

/// Multiplicative inverse of two: folds halve the pair sum.
const HALF: M31 = M31::from_u32_unchecked(1 << 30);

/// FRI protocol configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FriConfig {
    /// Log2 ratio between evaluation domain and degree bound.
    pub log_blowup_factor: u32,
    /// Log2 degree bound of the last layer polynomial.
    pub log_last_layer_degree_bound: u32,
    /// Number of queries for soundness.
    pub n_queries: usize,
}

impl FriConfig {
    pub fn new(log_blowup_factor: u32, log_last_layer_degree_bound: u32, n_queries: usize) -> Self {
        Self {
            log_blowup_factor,
            log_last_layer_degree_bound,
            n_queries,
        }
    }

    /// Conjectured soundness of the query phase.
    pub fn security_bits(&self) -> u32 {
        self.log_blowup_factor * self.n_queries as u32
    }
}

impl Default for FriConfig {
    fn default() -> Self {
        Self {
            log_blowup_factor: 1,
            log_last_layer_degree_bound: 0,
            n_queries: 16,
        }
    }
}

/// Degree bound of a committed circle polynomial, in log2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CirclePolyDegreeBound {
    pub log_degree_bound: u32,
}

impl CirclePolyDegreeBound {
    pub fn new(log_degree_bound: u32) -> Self {
        Self { log_degree_bound }
    }

    /// The bound of the univariate polynomial one circle fold yields.
    pub fn fold_to_line(&self) -> LinePolyDegreeBound {
        LinePolyDegreeBound {
            log_degree_bound: self.log_degree_bound - 1,
        }
    }
}

/// Degree bound of a line polynomial, in log2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinePolyDegreeBound {
    pub log_degree_bound: u32,
}

impl LinePolyDegreeBound {
    /// `None` when the bound cannot fold that many times.
    pub fn fold(self, n_folds: u32) -> Option<Self> {
        if self.log_degree_bound < n_folds {
            return None;
        }
        Some(Self {
            log_degree_bound: self.log_degree_bound - n_folds,
        })
    }
}

/// Commitment, witness values and Merkle witness of one FRI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FriLayerProof {
    /// Evaluations at decommitment positions the queries do not cover.
    pub fri_witness: Vec<QM31>,
    pub decommitment: MerkleDecommitment,
    pub commitment: Hash,
}

/// The FRI section of a proof.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FriProof {
    pub first_layer: FriLayerProof,
    pub inner_layers: Vec<FriLayerProof>,
    pub last_layer_poly: LinePoly,
}

/// FRI verification failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FriError {
    /// A layer's Merkle decommitment does not match its commitment.
    CommitmentMismatch,
    /// A folded evaluation disagrees with the last layer polynomial.
    LastLayerMismatch,
    /// Witness lengths or layer counts disagree with the configuration.
    InvalidProofShape,
    /// The last layer polynomial exceeds its degree bound.
    InsufficientDegree,
}

impl Display for FriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommitmentMismatch => write!(f, "fri layer commitment mismatch"),
            Self::LastLayerMismatch => write!(f, "fri last layer evaluation mismatch"),
            Self::InvalidProofShape => write!(f, "fri proof shape invalid"),
            Self::InsufficientDegree => write!(f, "fri last layer degree too high"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FriError {}

/// A line evaluation in bit-reversed order.
#[derive(Clone, Debug)]
pub struct LineEvaluation {
    pub domain: LineDomain,
    pub values: Vec<QM31>,
}

impl LineEvaluation {
    pub fn new(domain: LineDomain, values: Vec<QM31>) -> Self {
        assert_eq!(values.len(), domain.size());
        Self { domain, values }
    }

    pub fn new_zero(domain: LineDomain) -> Self {
        let size = domain.size();
        Self {
            domain,
            values: vec![QM31::ZERO; size],
        }
    }
}

/// A secure-field circle evaluation in bit-reversed order.
#[derive(Clone, Debug)]
pub struct SecureEvaluation {
    pub domain: CircleDomain,
    pub values: Vec<QM31>,
}

impl SecureEvaluation {
    pub fn new(domain: CircleDomain, values: Vec<QM31>) -> Self {
        assert_eq!(values.len(), domain.size());
        Self { domain, values }
    }
}

/// Fold a +/-x evaluation pair: ((f(x) + f(-x)) + alpha * (f(x) - f(-x)) / x) / 2.
#[inline]
fn fold_line_pair(f_x: QM31, f_neg_x: QM31, x: M31, alpha: QM31) -> QM31 {
    let f0 = f_x + f_neg_x;
    let f1 = (f_x - f_neg_x).mul_m31(x.inverse());
    (f0 + f1 * alpha).mul_m31(HALF)
}

/// Fold a +/-p circle pair onto the line using the y-coordinate.
#[inline]
fn fold_circle_pair(f_p: QM31, f_neg_p: QM31, y: M31, alpha: QM31) -> QM31 {
    let f0 = f_p + f_neg_p;
    let f1 = (f_p - f_neg_p).mul_m31(y.inverse());
    (f0 + f1 * alpha).mul_m31(HALF)
}

/// Fold a full line evaluation onto the doubled (halved-size) domain.
pub fn fold_line(eval: &LineEvaluation, alpha: QM31) -> LineEvaluation {
    let n = eval.values.len();
    assert!(n >= 2, "evaluation too small to fold");
    let log_size = eval.domain.log_size();

    let folded = eval
        .values
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let x = eval.domain.at(bit_reverse_index(i << FOLD_STEP, log_size));
            fold_line_pair(pair[0], pair[1], x, alpha)
        })
        .collect();
    LineEvaluation::new(eval.domain.double(), folded)
}

/// Fold a circle evaluation into a line evaluation buffer, accumulating with
/// alpha^2.
pub fn fold_circle_into_line(dst: &mut LineEvaluation, src: &SecureEvaluation, alpha: QM31) {
    assert_eq!(src.values.len() >> CIRCLE_TO_LINE_FOLD_STEP, dst.values.len());
    let log_size = src.domain.log_size();
    let alpha_sq = alpha.square();

    for (i, pair) in src.values.chunks_exact(2).enumerate() {
        let p = src
            .domain
            .at(bit_reverse_index(i << CIRCLE_TO_LINE_FOLD_STEP, log_size));
        let f_prime = fold_circle_pair(pair[0], pair[1], p.y, alpha);
        dst.values[i] = dst.values[i] * alpha_sq + f_prime;
    }
}

/// Accumulate folded column evaluations into the running layer evaluations.
fn accumulate_line(layer_query_evals: &mut [QM31], column_query_evals: &[QM31], alpha: QM31) {
    debug_assert_eq!(layer_query_evals.len(), column_query_evals.len());
    let alpha_sq = alpha.square();
    for (curr, col) in layer_query_evals.iter_mut().zip(column_query_evals) {
        *curr = *curr * alpha_sq + *col;
    }
}

/// Evaluations over the fold subsets touched by a query set, with each
/// subset's natural-order starting domain index.
struct SparseEvaluation {
    subset_evals: Vec<Vec<QM31>>,
    subset_domain_initial_indexes: Vec<usize>,
}

impl SparseEvaluation {
    fn fold_line(&self, alpha: QM31, domain: &LineDomain) -> Vec<QM31> {
        self.subset_evals
            .iter()
            .zip(&self.subset_domain_initial_indexes)
            .map(|(evals, &index)| fold_line_pair(evals[0], evals[1], domain.at(index), alpha))
            .collect()
    }

    fn fold_circle(&self, alpha: QM31, domain: &CircleDomain) -> Vec<QM31> {
        self.subset_evals
            .iter()
            .zip(&self.subset_domain_initial_indexes)
            .map(|(evals, &index)| fold_circle_pair(evals[0], evals[1], domain.at(index).y, alpha))
            .collect()
    }

    /// Flatten into the four base-field coordinate columns, subset order.
    fn to_base_columns(&self) -> [Vec<M31>; SECURE_EXTENSION_DEGREE] {
        let mut columns: [Vec<M31>; SECURE_EXTENSION_DEGREE] = Default::default();
        for value in self.subset_evals.iter().flatten() {
            for (column, coord) in columns.iter_mut().zip(value.to_m31_array()) {
                column.push(coord);
            }
        }
        columns
    }
}

/// Group queries into fold subsets, filling un-queried subset positions from
/// the witness. Returns the full decommitment position list and the rebuilt
/// evaluations.
fn compute_decommitment_positions_and_rebuild_evals(
    queries: &Queries,
    query_evals: &[QM31],
    witness_evals: &mut impl Iterator<Item = QM31>,
    fold_step: u32,
) -> Result<(Vec<usize>, SparseEvaluation), FriError> {
    if query_evals.len() != queries.len() {
        return Err(FriError::InvalidProofShape);
    }
    let fold_size = 1usize << fold_step;
    let mut query_evals_iter = query_evals.iter().copied();
    let mut query_positions = queries.iter().peekable();

    let mut decommitment_positions = Vec::new();
    let mut subset_evals = Vec::new();
    let mut subset_domain_initial_indexes = Vec::new();

    while let Some(&next_query) = query_positions.peek() {
        let subset_start = (next_query >> fold_step) << fold_step;
        let mut evals = Vec::with_capacity(fold_size);
        for position in subset_start..subset_start + fold_size {
            decommitment_positions.push(position);
            let eval = if query_positions.next_if_eq(&position).is_some() {
                query_evals_iter.next().ok_or(FriError::InvalidProofShape)?
            } else {
                witness_evals.next().ok_or(FriError::InvalidProofShape)?
            };
            evals.push(eval);
        }
        subset_evals.push(evals);
        subset_domain_initial_indexes.push(bit_reverse_index(subset_start, queries.log_domain_size));
    }

    Ok((
        decommitment_positions,
        SparseEvaluation {
            subset_evals,
            subset_domain_initial_indexes,
        },
    ))
}

struct FriFirstLayerVerifier {
    /// Column degree bounds, descending.
    column_bounds: Vec<CirclePolyDegreeBound>,
    /// Commitment domain per column, aligned with `column_bounds`.
    column_commitment_domains: Vec<CircleDomain>,
    folding_alpha: QM31,
    proof: FriLayerProof,
}

impl FriFirstLayerVerifier {
    /// Rebuild every column's subset evaluations, then check the combined
    /// Merkle decommitment.
    fn verify(
        &self,
        queries: &Queries,
        query_evals_by_column: Vec<Vec<QM31>>,
    ) -> Result<Vec<SparseEvaluation>, FriError> {
        if query_evals_by_column.len() != self.column_commitment_domains.len() {
            return Err(FriError::InvalidProofShape);
        }

        let mut fri_witness = self.proof.fri_witness.iter().copied();
        let mut decommitment_positions_by_log_size = BTreeMap::new();
        let mut column_log_sizes = Vec::new();
        let mut column_values: Vec<Vec<M31>> = Vec::new();
        let mut sparse_evals = Vec::new();

        for (column_domain, query_evals) in self
            .column_commitment_domains
            .iter()
            .zip(query_evals_by_column)
        {
            let column_queries = queries.fold(queries.log_domain_size - column_domain.log_size());
            let (column_decommitment_positions, sparse_eval) =
                compute_decommitment_positions_and_rebuild_evals(
                    &column_queries,
                    &query_evals,
                    &mut fri_witness,
                    CIRCLE_TO_LINE_FOLD_STEP,
                )?;

            decommitment_positions_by_log_size
                .insert(column_domain.log_size(), column_decommitment_positions);
            column_log_sizes
                .extend(core::iter::repeat(column_domain.log_size()).take(SECURE_EXTENSION_DEGREE));
            column_values.extend(sparse_eval.to_base_columns());
            sparse_evals.push(sparse_eval);
        }

        if fri_witness.next().is_some() {
            return Err(FriError::InvalidProofShape);
        }

        let merkle_verifier = MerkleVerifier::new(self.proof.commitment, column_log_sizes);
        merkle_verifier
            .verify(
                &decommitment_positions_by_log_size,
                &column_values,
                &self.proof.decommitment,
            )
            .map_err(|_| FriError::CommitmentMismatch)?;

        Ok(sparse_evals)
    }
}

struct FriInnerLayerVerifier {
    degree_bound: LinePolyDegreeBound,
    domain: LineDomain,
    folding_alpha: QM31,
    proof: FriLayerProof,
}

impl FriInnerLayerVerifier {
    /// Check the layer's decommitment at the queried positions and fold onto
    /// the next layer.
    fn verify_and_fold(
        &self,
        queries: &Queries,
        evals_at_queries: Vec<QM31>,
    ) -> Result<(Queries, Vec<QM31>), FriError> {
        let mut fri_witness = self.proof.fri_witness.iter().copied();
        let (decommitment_positions, sparse_evaluation) =
            compute_decommitment_positions_and_rebuild_evals(
                queries,
                &evals_at_queries,
                &mut fri_witness,
                FOLD_STEP,
            )?;

        if fri_witness.next().is_some() {
            return Err(FriError::InvalidProofShape);
        }

        let merkle_verifier = MerkleVerifier::new(
            self.proof.commitment,
            vec![self.domain.log_size(); SECURE_EXTENSION_DEGREE],
        );
        merkle_verifier
            .verify(
                &BTreeMap::from([(self.domain.log_size(), decommitment_positions)]),
                &sparse_evaluation.to_base_columns(),
                &self.proof.decommitment,
            )
            .map_err(|_| FriError::CommitmentMismatch)?;

        let folded_queries = queries.fold(FOLD_STEP);
        let folded_evals = sparse_evaluation.fold_line(self.folding_alpha, &self.domain);
        Ok((folded_queries, folded_evals))
    }
}

/// The FRI verifier state after the commit phase.
pub struct FriVerifier {
    config: FriConfig,
    first_layer: FriFirstLayerVerifier,
    inner_layers: Vec<FriInnerLayerVerifier>,
    last_layer_domain: LineDomain,
    last_layer_poly: LinePoly,
}

impl FriVerifier {
    /// Run the commit phase: mix every layer commitment, draw the folding
    /// alphas, and validate the layer/bound structure.
    ///
    /// `column_bounds` are the committed circle-polynomial degree bounds,
    /// strictly descending.
    pub fn commit(
        channel: &mut KeccakChannel,
        config: FriConfig,
        proof: FriProof,
        column_bounds: Vec<CirclePolyDegreeBound>,
    ) -> Result<Self, VerifyError> {
        if column_bounds.is_empty()
            || !column_bounds.windows(2).all(|w| w[0] > w[1])
        {
            return Err(VerifyError::Shape("column bounds not strictly descending"));
        }

        channel.mix_root(&proof.first_layer.commitment);
        let first_layer_folding_alpha = channel.draw_secure_felt()?;

        let column_commitment_domains = column_bounds
            .iter()
            .map(|bound| {
                CanonicCoset::new(bound.log_degree_bound + config.log_blowup_factor).circle_domain()
            })
            .collect_vec();

        let first_layer = FriFirstLayerVerifier {
            column_bounds: column_bounds.clone(),
            column_commitment_domains,
            folding_alpha: first_layer_folding_alpha,
            proof: proof.first_layer,
        };

        let max_column_bound = column_bounds[0];
        let mut layer_bound = max_column_bound.fold_to_line();
        let mut layer_domain = LineDomain::new(Coset::half_odds(
            layer_bound.log_degree_bound + config.log_blowup_factor,
        ));

        let mut inner_layers = Vec::with_capacity(proof.inner_layers.len());
        for layer_proof in proof.inner_layers {
            channel.mix_root(&layer_proof.commitment);
            let folding_alpha = channel.draw_secure_felt()?;

            inner_layers.push(FriInnerLayerVerifier {
                degree_bound: layer_bound,
                domain: layer_domain,
                folding_alpha,
                proof: layer_proof,
            });

            layer_bound = layer_bound
                .fold(FOLD_STEP)
                .ok_or(VerifyError::Fri(FriError::InvalidProofShape))?;
            layer_domain = layer_domain.double();
        }

        if layer_bound.log_degree_bound != config.log_last_layer_degree_bound {
            return Err(VerifyError::Fri(FriError::InvalidProofShape));
        }
        if proof.last_layer_poly.len() > 1 << config.log_last_layer_degree_bound {
            return Err(VerifyError::Fri(FriError::InsufficientDegree));
        }
        channel.mix_felts(proof.last_layer_poly.coeffs());

        tracing::debug!(
            n_inner_layers = inner_layers.len(),
            last_layer_log_size = layer_domain.log_size(),
            "fri commit phase done"
        );

        Ok(Self {
            config,
            first_layer,
            inner_layers,
            last_layer_domain: layer_domain,
            last_layer_poly: proof.last_layer_poly,
        })
    }

    /// Draw the query positions for every distinct column log size.
    ///
    /// Returns the positions per log size and the underlying query set to
    /// hand back to [`Self::decommit`].
    pub fn sample_query_positions(
        &self,
        channel: &mut KeccakChannel,
    ) -> (BTreeMap<u32, Vec<usize>>, Queries) {
        let column_log_sizes: BTreeSet<u32> = self
            .first_layer
            .column_commitment_domains
            .iter()
            .map(|domain| domain.log_size())
            .collect();
        let max_column_log_size = *column_log_sizes.iter().next_back().unwrap_or(&0);
        let queries = Queries::generate(channel, max_column_log_size, self.config.n_queries);
        let positions = column_log_sizes
            .into_iter()
            .map(|log_size| {
                (
                    log_size,
                    queries.fold(queries.log_domain_size - log_size).positions,
                )
            })
            .collect();
        (positions, queries)
    }

    /// Verify all layer decommitments against the recomputed first-layer
    /// evaluations (one vector per column, descending size).
    pub fn decommit(
        self,
        queries: &Queries,
        first_layer_query_evals: Vec<Vec<QM31>>,
    ) -> Result<(), FriError> {
        let first_layer_sparse_evals = self.first_layer.verify(queries, first_layer_query_evals)?;
        let (last_layer_queries, last_layer_query_evals) =
            self.decommit_inner_layers(queries, first_layer_sparse_evals)?;
        self.decommit_last_layer(last_layer_queries, last_layer_query_evals)
    }

    fn decommit_inner_layers(
        &self,
        queries: &Queries,
        first_layer_sparse_evals: Vec<SparseEvaluation>,
    ) -> Result<(Queries, Vec<QM31>), FriError> {
        let first_layer_alpha = self.first_layer.folding_alpha;

        let mut layer_queries = queries.fold(CIRCLE_TO_LINE_FOLD_STEP);
        let mut layer_query_evals = vec![QM31::ZERO; layer_queries.len()];

        let mut first_layer_sparse_evals = first_layer_sparse_evals.into_iter();
        let mut first_layer_column_bounds = self.first_layer.column_bounds.iter().peekable();
        let mut first_layer_column_domains = self.first_layer.column_commitment_domains.iter();

        for layer in &self.inner_layers {
            // Fold in the first-layer columns that land on this layer.
            while first_layer_column_bounds
                .next_if(|b| b.fold_to_line() == layer.degree_bound)
                .is_some()
            {
                let column_domain = first_layer_column_domains
                    .next()
                    .ok_or(FriError::InvalidProofShape)?;
                let sparse_eval = first_layer_sparse_evals
                    .next()
                    .ok_or(FriError::InvalidProofShape)?;
                let folded_column_evals = sparse_eval.fold_circle(first_layer_alpha, column_domain);
                accumulate_line(&mut layer_query_evals, &folded_column_evals, first_layer_alpha);
            }

            (layer_queries, layer_query_evals) =
                layer.verify_and_fold(&layer_queries, layer_query_evals)?;
        }

        // Every committed column must fold into some inner layer.
        if first_layer_column_bounds.next().is_some() {
            return Err(FriError::InvalidProofShape);
        }

        Ok((layer_queries, layer_query_evals))
    }

    fn decommit_last_layer(
        &self,
        queries: Queries,
        query_evals: Vec<QM31>,
    ) -> Result<(), FriError> {
        let domain = self.last_layer_domain;
        for (query, eval) in queries.iter().zip(query_evals) {
            let x = domain.at(bit_reverse_index(query, domain.log_size()));
            if eval != self.last_layer_poly.eval_at_point(x.into()) {
                return Err(FriError::LastLayerMismatch);
            }
        }
        Ok(())
    }
}
