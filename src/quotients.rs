//! DEEP quotient computation: the verifier-side FRI answers.
//!
//! Every committed column was sampled at out-of-domain points. At each
//! queried domain position the verifier forms the quotient
//! `(f(q) - line(q)) / v(q)` where `line` interpolates the sampled value and
//! its complex conjugate and `v` is the pair-vanishing denominator. Columns
//! sampled at the same point are batched with powers of the random
//! coefficient.

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::circle::{CanonicCoset, CirclePoint};
use crate::cm31::CM31;
use crate::m31::{batch_inverse, FieldExpOps, M31};
use crate::qm31::QM31;
use crate::types::VerifyError;
use crate::utils::bit_reverse_index;
use itertools::{izip, Itertools};

/// A sampled value of one column at one out-of-domain point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointSample {
    pub point: CirclePoint<QM31>,
    pub value: QM31,
}

/// A batch of column samplings at a shared out-of-domain point.
#[derive(Clone, Debug)]
pub struct ColumnSampleBatch {
    /// The point at which the columns are sampled.
    pub point: CirclePoint<QM31>,
    /// The sampled column indices and their values at the point.
    pub columns_and_values: Vec<(usize, QM31)>,
}

impl ColumnSampleBatch {
    /// Group column samples by their sample point, preserving first-seen
    /// point order. Column indices are positions within `samples`.
    pub fn new_vec(samples: &[&Vec<PointSample>]) -> Vec<Self> {
        let mut batches: Vec<Self> = Vec::new();
        for (column_index, column_samples) in samples.iter().enumerate() {
            for sample in column_samples.iter() {
                match batches.iter_mut().find(|b| b.point == sample.point) {
                    Some(batch) => batch.columns_and_values.push((column_index, sample.value)),
                    None => batches.push(Self {
                        point: sample.point,
                        columns_and_values: [(column_index, sample.value)].into(),
                    }),
                }
            }
        }
        batches
    }
}

/// Precomputed constants shared by every row of one log size.
#[derive(Clone, Debug)]
pub struct QuotientConstants {
    /// Line coefficients per quotient numerator term.
    pub line_coeffs: Vec<Vec<(QM31, QM31, QM31)>>,
    /// Random coefficient per batch, for the Horner combination.
    pub batch_random_coeffs: Vec<QM31>,
}

/// Coefficients of the line through a sample and its complex conjugate,
/// scaled by `alpha`.
pub fn complex_conjugate_line_coeffs(sample: &PointSample, alpha: QM31) -> (QM31, QM31, QM31) {
    debug_assert_ne!(
        sample.point.y,
        sample.point.y.complex_conjugate(),
        "sample point is its own conjugate"
    );
    let a = sample.value.complex_conjugate() - sample.value;
    let c = sample.point.y.complex_conjugate() - sample.point.y;
    let b = sample.value * c - a * sample.point.y;
    (alpha * a, alpha * b, alpha * c)
}

/// Line coefficients for every column of every batch, with a running alpha
/// power per column.
pub fn column_line_coeffs(
    sample_batches: &[ColumnSampleBatch],
    random_coeff: QM31,
) -> Vec<Vec<(QM31, QM31, QM31)>> {
    sample_batches
        .iter()
        .map(|sample_batch| {
            let mut alpha = QM31::ONE;
            sample_batch
                .columns_and_values
                .iter()
                .map(|(_, sampled_value)| {
                    alpha *= random_coeff;
                    let sample = PointSample {
                        point: sample_batch.point,
                        value: *sampled_value,
                    };
                    complex_conjugate_line_coeffs(&sample, alpha)
                })
                .collect()
        })
        .collect()
}

/// The coefficient combining each batch into the row accumulator:
/// `random_coeff^batch_size`.
pub fn batch_random_coeffs(sample_batches: &[ColumnSampleBatch], random_coeff: QM31) -> Vec<QM31> {
    sample_batches
        .iter()
        .map(|sb| random_coeff.pow(sb.columns_and_values.len() as u128))
        .collect()
}

/// Bundle the per-log-size constants.
pub fn quotient_constants(
    sample_batches: &[ColumnSampleBatch],
    random_coeff: QM31,
) -> QuotientConstants {
    QuotientConstants {
        line_coeffs: column_line_coeffs(sample_batches, random_coeff),
        batch_random_coeffs: batch_random_coeffs(sample_batches, random_coeff),
    }
}

/// Pair-vanishing denominator of a batch at a domain point, CM31-valued.
fn denominator(sample_batch: &ColumnSampleBatch, domain_point: CirclePoint<M31>) -> CM31 {
    let prx = sample_batch.point.x.0;
    let pry = sample_batch.point.y.0;
    let pix = sample_batch.point.x.1;
    let piy = sample_batch.point.y.1;
    (prx - CM31::from(domain_point.x)) * piy - (pry - CM31::from(domain_point.y)) * pix
}

/// One row's accumulated quotient value.
pub fn accumulate_row_quotients(
    sample_batches: &[ColumnSampleBatch],
    queried_values_at_row: &[M31],
    quotient_constants: &QuotientConstants,
    domain_point: CirclePoint<M31>,
    denominator_inverses: &[CM31],
) -> QM31 {
    let mut row_accumulator = QM31::ZERO;
    for (sample_batch, line_coeffs, batch_coeff, denominator_inverse) in izip!(
        sample_batches,
        &quotient_constants.line_coeffs,
        &quotient_constants.batch_random_coeffs,
        denominator_inverses
    ) {
        let mut numerator = QM31::ZERO;
        for ((column_index, _), (a, b, c)) in
            sample_batch.columns_and_values.iter().zip_eq(line_coeffs)
        {
            let value = c.mul_m31(queried_values_at_row[*column_index]);
            let linear_term = a.mul_m31(domain_point.y) + *b;
            numerator += value - linear_term;
        }
        row_accumulator = row_accumulator * *batch_coeff + numerator.mul_cm31(*denominator_inverse);
    }
    row_accumulator
}

/// Compute the FRI first-layer answers: one vector of quotient evaluations
/// per distinct column log size, descending.
///
/// * `column_log_sizes` - blown-up column log sizes, per tree.
/// * `samples` - out-of-domain samples, per tree per column.
/// * `query_positions_per_log_size` - sorted query positions per log size.
/// * `queried_values` - committed values at the query positions, per tree per
///   column.
pub fn fri_answers(
    column_log_sizes: &[Vec<u32>],
    samples: &[Vec<Vec<PointSample>>],
    random_coeff: QM31,
    query_positions_per_log_size: &BTreeMap<u32, Vec<usize>>,
    queried_values: &[Vec<Vec<M31>>],
) -> Result<Vec<Vec<QM31>>, VerifyError> {
    if samples.len() != column_log_sizes.len() || queried_values.len() != column_log_sizes.len() {
        return Err(VerifyError::Shape("tree count mismatch in fri answers"));
    }
    for (tree_sizes, (tree_samples, tree_values)) in
        column_log_sizes.iter().zip(samples.iter().zip(queried_values))
    {
        if tree_samples.len() != tree_sizes.len() || tree_values.len() != tree_sizes.len() {
            return Err(VerifyError::Shape("column count mismatch in fri answers"));
        }
    }

    // Flatten tree-major, column-major, then bucket by log size.
    let flat: Vec<(u32, &Vec<PointSample>, &Vec<M31>)> = izip!(
        column_log_sizes.iter().flatten(),
        samples.iter().flatten(),
        queried_values.iter().flatten()
    )
    .map(|(&size, samples, values)| (size, samples, values))
    .collect();

    let mut answers = Vec::new();
    for log_size in flat
        .iter()
        .map(|(size, ..)| *size)
        .sorted_by_key(|&size| core::cmp::Reverse(size))
        .dedup()
    {
        let group: Vec<_> = flat.iter().filter(|(size, ..)| *size == log_size).collect();
        let group_samples: Vec<&Vec<PointSample>> = group.iter().map(|(_, s, _)| *s).collect();
        let group_values: Vec<&Vec<M31>> = group.iter().map(|(_, _, v)| *v).collect();
        let query_positions = query_positions_per_log_size
            .get(&log_size)
            .ok_or(VerifyError::Shape("missing query positions for log size"))?;

        answers.push(fri_answers_for_log_size(
            log_size,
            &group_samples,
            random_coeff,
            query_positions,
            &group_values,
        )?);
    }
    Ok(answers)
}

fn fri_answers_for_log_size(
    log_size: u32,
    samples: &[&Vec<PointSample>],
    random_coeff: QM31,
    query_positions: &[usize],
    queried_values: &[&Vec<M31>],
) -> Result<Vec<QM31>, VerifyError> {
    for values in queried_values {
        if values.len() != query_positions.len() {
            return Err(VerifyError::Shape("queried value count mismatch"));
        }
    }

    let sample_batches = ColumnSampleBatch::new_vec(samples);
    let constants = quotient_constants(&sample_batches, random_coeff);
    let commitment_domain = CanonicCoset::new(log_size).circle_domain();

    let domain_points: Vec<CirclePoint<M31>> = query_positions
        .iter()
        .map(|&position| commitment_domain.at(bit_reverse_index(position, log_size)))
        .collect();

    // One batched inversion for every denominator of this log size.
    let denominators: Vec<CM31> = domain_points
        .iter()
        .flat_map(|&point| sample_batches.iter().map(move |batch| denominator(batch, point)))
        .collect();
    let denominator_inverses = batch_inverse(&denominators).map_err(VerifyError::Field)?;

    let mut quotient_evals = Vec::with_capacity(query_positions.len());
    for (row, &domain_point) in domain_points.iter().enumerate() {
        let row_values: Vec<M31> = queried_values.iter().map(|col| col[row]).collect();
        let row_inverses =
            &denominator_inverses[row * sample_batches.len()..(row + 1) * sample_batches.len()];
        quotient_evals.push(accumulate_row_quotients(
            &sample_batches,
            &row_values,
            &constants,
            domain_point,
            row_inverses,
        ));
    }
    Ok(quotient_evals)
}
