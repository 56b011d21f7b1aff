//! Test-side proof construction.
//!
//! A minimal honest prover over the crate's own primitives: it commits trace
//! and composition columns, replays the transcript, folds the FRI layers and
//! emits decommitments in the exact order the verifier consumes them.

#![allow(dead_code)]

use std::collections::BTreeMap;

use circle_stark_verifier::air::{
    sample_points, ComponentInfo, ComponentParams, VerificationParams,
};
use circle_stark_verifier::channel::KeccakChannel;
use circle_stark_verifier::circle::{CanonicCoset, CirclePoint, Coset, LineDomain};
use circle_stark_verifier::fri::{
    fold_circle_into_line, fold_line, FriConfig, FriLayerProof, FriProof, LineEvaluation,
    SecureEvaluation,
};
use circle_stark_verifier::m31::{batch_inverse, M31};
use circle_stark_verifier::merkle::{hash_node, Hash, MerkleDecommitment};
use circle_stark_verifier::pcs::PcsConfig;
use circle_stark_verifier::poly::{CirclePoly, LinePoly, SecureCirclePoly};
use circle_stark_verifier::qm31::{QM31, SECURE_EXTENSION_DEGREE};
use circle_stark_verifier::queries::Queries;
use circle_stark_verifier::quotients::{
    accumulate_row_quotients, quotient_constants, ColumnSampleBatch, PointSample,
};
use circle_stark_verifier::types::StarkProof;
use circle_stark_verifier::utils::bit_reverse_index;

/// Full layer hashes of one committed tree, bottom (largest) layer first.
pub struct CommittedTree {
    pub root: Hash,
    pub column_log_sizes: Vec<u32>,
    pub columns: Vec<Vec<M31>>,
    layers: Vec<Vec<Hash>>,
}

/// Commit columns of possibly different log sizes into one tree.
pub fn commit_columns(column_log_sizes: &[u32], columns: &[Vec<M31>]) -> CommittedTree {
    assert_eq!(column_log_sizes.len(), columns.len());
    for (&size, column) in column_log_sizes.iter().zip(columns) {
        assert_eq!(column.len(), 1 << size);
    }
    let max_log_size = *column_log_sizes.iter().max().unwrap();

    let mut layers: Vec<Vec<Hash>> = Vec::new();
    let mut prev: Option<Vec<Hash>> = None;
    for layer_log_size in (0..=max_log_size).rev() {
        let layer_cols: Vec<&Vec<M31>> = column_log_sizes
            .iter()
            .zip(columns)
            .filter(|(&s, _)| s == layer_log_size)
            .map(|(_, c)| c)
            .collect();
        let mut layer = Vec::with_capacity(1usize << layer_log_size);
        for node in 0..1usize << layer_log_size {
            let children = prev.as_ref().map(|p| (p[2 * node], p[2 * node + 1]));
            let values: Vec<M31> = layer_cols.iter().map(|c| c[node]).collect();
            layer.push(hash_node(children, &values));
        }
        layers.push(layer.clone());
        prev = Some(layer);
    }

    CommittedTree {
        root: layers.last().unwrap()[0],
        column_log_sizes: column_log_sizes.to_vec(),
        columns: columns.to_vec(),
        layers,
    }
}

impl CommittedTree {
    /// Produce the witness for a query map, in verifier consumption order,
    /// along with the queried values per column.
    pub fn decommit(
        &self,
        queries_per_log_size: &BTreeMap<u32, Vec<usize>>,
    ) -> (MerkleDecommitment, Vec<Vec<M31>>) {
        let max_log_size = *self.column_log_sizes.iter().max().unwrap();

        let queried_values: Vec<Vec<M31>> = self
            .column_log_sizes
            .iter()
            .zip(&self.columns)
            .map(|(&size, column)| {
                queries_per_log_size
                    .get(&size)
                    .map(|queries| queries.iter().map(|&q| column[q]).collect())
                    .unwrap_or_default()
            })
            .collect();

        let mut decommitment = MerkleDecommitment::default();
        let mut last_indices: Vec<usize> = Vec::new();
        for (depth, layer_log_size) in (0..=max_log_size).rev().enumerate() {
            let layer_cols: Vec<&Vec<M31>> = self
                .column_log_sizes
                .iter()
                .zip(&self.columns)
                .filter(|(&s, _)| s == layer_log_size)
                .map(|(_, c)| c)
                .collect();
            let column_queries = queries_per_log_size
                .get(&layer_log_size)
                .cloned()
                .unwrap_or_default();

            let mut node_indices: Vec<usize> = last_indices
                .iter()
                .map(|&q| q / 2)
                .chain(column_queries.iter().copied())
                .collect();
            node_indices.sort_unstable();
            node_indices.dedup();

            for &node in &node_indices {
                if depth > 0 {
                    for child in [2 * node, 2 * node + 1] {
                        if !last_indices.contains(&child) {
                            decommitment.hash_witness.push(self.layers[depth - 1][child]);
                        }
                    }
                }
                if !column_queries.contains(&node) {
                    for column in &layer_cols {
                        decommitment.column_witness.push(column[node]);
                    }
                }
            }
            last_indices = node_indices;
        }

        (decommitment, queried_values)
    }
}

/// Evaluate a circle polynomial over the canonic domain of `log_size`, in
/// bit-reversed order, as base-field values.
pub fn eval_on_domain(poly: &CirclePoly, log_size: u32) -> Vec<M31> {
    let domain = CanonicCoset::new(log_size).circle_domain();
    (0..domain.size())
        .map(|i| {
            let point = domain.at(bit_reverse_index(i, log_size)).into_ef::<QM31>();
            poly.eval_at_point(point).to_m31_array()[0]
        })
        .collect()
}

fn split_coordinates(values: &[QM31]) -> Vec<Vec<M31>> {
    let mut columns = vec![Vec::with_capacity(values.len()); SECURE_EXTENSION_DEGREE];
    for value in values {
        for (column, coord) in columns.iter_mut().zip(value.to_m31_array()) {
            column.push(coord);
        }
    }
    columns
}

/// The full quotient evaluation of one log-size group over its domain.
fn quotient_evaluation(
    log_size: u32,
    group_samples: &[&Vec<PointSample>],
    group_columns: &[&Vec<M31>],
    random_coeff: QM31,
) -> SecureEvaluation {
    let domain = CanonicCoset::new(log_size).circle_domain();
    let sample_batches = ColumnSampleBatch::new_vec(group_samples);
    let constants = quotient_constants(&sample_batches, random_coeff);

    let values = (0..domain.size())
        .map(|i| {
            let domain_point = domain.at(bit_reverse_index(i, log_size));
            let denominators: Vec<_> = sample_batches
                .iter()
                .map(|batch| {
                    let prx = batch.point.x.0;
                    let pry = batch.point.y.0;
                    let pix = batch.point.x.1;
                    let piy = batch.point.y.1;
                    (prx - domain_point.x.into()) * piy - (pry - domain_point.y.into()) * pix
                })
                .collect();
            let inverses = batch_inverse(&denominators).unwrap();
            let row_values: Vec<M31> = group_columns.iter().map(|c| c[i]).collect();
            accumulate_row_quotients(
                &sample_batches,
                &row_values,
                &constants,
                domain_point,
                &inverses,
            )
        })
        .collect();

    SecureEvaluation::new(domain, values)
}

/// Secure-column subset witness for a FRI layer: queried values are omitted,
/// the rest of each touched fold subset is included.
fn fri_layer_witness(values: &[QM31], queries: &Queries) -> Vec<QM31> {
    let mut witness = Vec::new();
    let mut query_positions = queries.positions.iter().copied().peekable();
    while let Some(&next_query) = query_positions.peek() {
        let subset_start = next_query & !1;
        for position in subset_start..subset_start + 2 {
            if query_positions.next_if_eq(&position).is_none() {
                witness.push(values[position]);
            }
        }
    }
    witness
}

fn fri_layer_positions(queries: &Queries) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut query_positions = queries.positions.iter().copied().peekable();
    while let Some(&next_query) = query_positions.peek() {
        let subset_start = next_query & !1;
        for position in subset_start..subset_start + 2 {
            query_positions.next_if_eq(&position);
            positions.push(position);
        }
    }
    positions
}

pub struct Fixture {
    pub proof: StarkProof,
    pub params: VerificationParams,
    pub tree_roots: Vec<Hash>,
    pub tree_column_log_sizes: Vec<Vec<u32>>,
    pub initial_digest: [u8; 32],
}

/// Build an honest proof for a small Fibonacci-flavoured statement:
/// one preprocessed column, two trace columns with a [0, 1] mask, one
/// interaction column, and a random composition polynomial consistent with
/// its own sampled values.
pub fn prove_fixture() -> Fixture {
    prove_fixture_impl(false)
}

/// Like [`prove_fixture`], but commits to a wrong last-layer constant.
///
/// The transcript stays self-consistent (the wrong constant is what gets
/// mixed), so every check up to the final fold comparison passes.
pub fn prove_fixture_bad_last_layer() -> Fixture {
    prove_fixture_impl(true)
}

fn prove_fixture_impl(tamper_last_layer: bool) -> Fixture {
    const LOG_SIZE: u32 = 4;
    let composition_log = LOG_SIZE + 1;
    let config = PcsConfig {
        pow_bits: 5,
        fri_config: FriConfig::new(1, 0, 16),
    };
    let blowup = config.fri_config.log_blowup_factor;
    let initial_digest = [0u8; 32];

    let params = VerificationParams {
        components: vec![ComponentParams {
            log_size: LOG_SIZE,
            claimed_sum: QM31::ZERO,
            info: ComponentInfo {
                max_constraint_log_degree_bound: composition_log,
                log_size: LOG_SIZE,
                mask_offsets: vec![vec![vec![0, 1], vec![0]], vec![vec![0]]],
                preprocessed_columns: vec![0],
            },
        }],
        n_preprocessed_columns: 1,
        composition_log_degree_bound: composition_log,
    };
    let tree_column_log_sizes = vec![
        vec![LOG_SIZE],
        vec![LOG_SIZE, LOG_SIZE],
        vec![LOG_SIZE],
    ];

    // Fibonacci-seeded coefficient columns.
    let fib_coeffs = |seed: u32, len: usize| -> Vec<M31> {
        let mut a = M31::new(seed);
        let mut b = M31::new(seed + 1);
        (0..len)
            .map(|_| {
                let c = a;
                (a, b) = (b, a + b);
                c
            })
            .collect()
    };
    let trace_polys: Vec<Vec<CirclePoly>> = vec![
        vec![CirclePoly::new(fib_coeffs(1, 1 << LOG_SIZE))],
        vec![
            CirclePoly::new(fib_coeffs(2, 1 << LOG_SIZE)),
            CirclePoly::new(fib_coeffs(3, 1 << LOG_SIZE)),
        ],
        vec![CirclePoly::new(fib_coeffs(5, 1 << LOG_SIZE))],
    ];
    let composition_poly = SecureCirclePoly([
        CirclePoly::new(fib_coeffs(8, 1 << composition_log)),
        CirclePoly::new(fib_coeffs(13, 1 << composition_log)),
        CirclePoly::new(fib_coeffs(21, 1 << composition_log)),
        CirclePoly::new(fib_coeffs(34, 1 << composition_log)),
    ]);

    // Commit the trace trees.
    let mut channel = KeccakChannel::new(initial_digest, 0);
    let mut trees: Vec<CommittedTree> = Vec::new();
    for (tree_polys, sizes) in trace_polys.iter().zip(&tree_column_log_sizes) {
        let columns: Vec<Vec<M31>> = tree_polys
            .iter()
            .map(|poly| eval_on_domain(poly, LOG_SIZE + blowup))
            .collect();
        let committed_sizes: Vec<u32> = sizes.iter().map(|&s| s + blowup).collect();
        let tree = commit_columns(&committed_sizes, &columns);
        channel.mix_root(&tree.root);
        trees.push(tree);
    }
    let tree_roots: Vec<Hash> = trees.iter().map(|t| t.root).collect();

    let _constraint_coeff = channel.draw_secure_felt().unwrap();

    // Commit the composition tree.
    let composition_columns: Vec<Vec<M31>> = composition_poly
        .0
        .iter()
        .map(|poly| eval_on_domain(poly, composition_log + blowup))
        .collect();
    let composition_tree = commit_columns(
        &vec![composition_log + blowup; SECURE_EXTENSION_DEGREE],
        &composition_columns,
    );
    channel.mix_root(&composition_tree.root);
    trees.push(composition_tree);

    // OODS sampling.
    let oods_point = CirclePoint::get_random_point(&mut channel).unwrap();
    let points = sample_points(&params, oods_point).unwrap();

    let all_polys: Vec<Vec<&CirclePoly>> = trace_polys
        .iter()
        .map(|tree| tree.iter().collect())
        .chain([composition_poly.0.iter().collect()])
        .collect();
    let sampled_values: Vec<Vec<Vec<QM31>>> = points
        .iter()
        .zip(&all_polys)
        .map(|(tree_points, tree_polys)| {
            tree_points
                .iter()
                .zip(tree_polys)
                .map(|(column_points, poly)| {
                    column_points
                        .iter()
                        .map(|&point| poly.eval_at_point(point))
                        .collect()
                })
                .collect()
        })
        .collect();

    let flattened: Vec<QM31> = sampled_values.iter().flatten().flatten().copied().collect();
    channel.mix_felts(&flattened);
    let random_coeff = channel.draw_secure_felt().unwrap();

    // Group the committed columns by blown-up log size, descending, in flat
    // tree-major order, and compute the quotient columns.
    let samples: Vec<Vec<Vec<PointSample>>> = points
        .iter()
        .zip(&sampled_values)
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
        .collect();

    let flat: Vec<(u32, &Vec<PointSample>, &Vec<M31>)> = trees
        .iter()
        .zip(&samples)
        .flat_map(|(tree, tree_samples)| {
            tree.column_log_sizes
                .iter()
                .zip(tree_samples)
                .zip(&tree.columns)
                .map(|((&size, samples), column)| (size, samples, column))
        })
        .collect();
    let mut group_sizes: Vec<u32> = flat.iter().map(|(s, ..)| *s).collect();
    group_sizes.sort_unstable_by_key(|&s| std::cmp::Reverse(s));
    group_sizes.dedup();

    let first_layer_evals: Vec<SecureEvaluation> = group_sizes
        .iter()
        .map(|&log_size| {
            let group: Vec<_> = flat.iter().filter(|(s, ..)| *s == log_size).collect();
            let group_samples: Vec<&Vec<PointSample>> = group.iter().map(|(_, s, _)| *s).collect();
            let group_columns: Vec<&Vec<M31>> = group.iter().map(|(_, _, c)| *c).collect();
            quotient_evaluation(log_size, &group_samples, &group_columns, random_coeff)
        })
        .collect();

    // FRI commit phase, prover side.
    let first_layer_columns: Vec<Vec<M31>> = first_layer_evals
        .iter()
        .flat_map(|eval| split_coordinates(&eval.values))
        .collect();
    let first_layer_sizes: Vec<u32> = group_sizes
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(SECURE_EXTENSION_DEGREE))
        .collect();
    let first_layer_tree = commit_columns(&first_layer_sizes, &first_layer_columns);
    channel.mix_root(&first_layer_tree.root);
    let first_layer_alpha = channel.draw_secure_felt().unwrap();

    let max_bound = group_sizes[0] - blowup;
    let last_bound = config.fri_config.log_last_layer_degree_bound;
    let mut layer_bound = max_bound - 1;
    let mut line_eval =
        LineEvaluation::new_zero(LineDomain::new(Coset::half_odds(layer_bound + blowup)));

    struct InnerLayer {
        tree: CommittedTree,
        values: Vec<QM31>,
        log_size: u32,
    }
    let mut inner_layers: Vec<InnerLayer> = Vec::new();
    let mut group_iter = group_sizes.iter().zip(&first_layer_evals).peekable();
    let last_layer_values;
    loop {
        while let Some((_, eval)) =
            group_iter.next_if(|&(&size, _)| size - blowup - 1 == layer_bound)
        {
            fold_circle_into_line(&mut line_eval, eval, first_layer_alpha);
        }

        let log_size = line_eval.domain.log_size();
        let tree = commit_columns(
            &vec![log_size; SECURE_EXTENSION_DEGREE],
            &split_coordinates(&line_eval.values),
        );
        channel.mix_root(&tree.root);
        let alpha = channel.draw_secure_felt().unwrap();
        let folded = fold_line(&line_eval, alpha);
        inner_layers.push(InnerLayer {
            tree,
            values: line_eval.values.clone(),
            log_size,
        });

        if layer_bound == last_bound + 1 {
            last_layer_values = folded.values;
            break;
        }
        layer_bound -= 1;
        line_eval = folded;
    }

    // A function of the last-layer degree bound is constant here.
    let mut last_layer_constant = last_layer_values[0];
    if tamper_last_layer {
        last_layer_constant += QM31::ONE;
    } else {
        for value in &last_layer_values {
            assert_eq!(*value, last_layer_constant);
        }
    }
    let last_layer_poly = LinePoly::new(vec![last_layer_constant]);
    channel.mix_felts(last_layer_poly.coeffs());

    // Proof of work, then query sampling.
    let mut proof_of_work = 0u64;
    while !channel.verify_pow(config.pow_bits, proof_of_work) {
        proof_of_work += 1;
    }
    channel.mix_u64(proof_of_work);

    let max_column_log_size = group_sizes[0];
    let queries = Queries::generate(&mut channel, max_column_log_size, config.fri_config.n_queries);
    let query_positions_per_log_size: BTreeMap<u32, Vec<usize>> = group_sizes
        .iter()
        .map(|&size| {
            (
                size,
                queries.fold(queries.log_domain_size - size).positions,
            )
        })
        .collect();

    // Tree decommitments at the query positions.
    let mut decommitments = Vec::new();
    let mut queried_values = Vec::new();
    for tree in &trees {
        let (decommitment, values) = tree.decommit(&query_positions_per_log_size);
        decommitments.push(decommitment);
        queried_values.push(values);
    }

    // First FRI layer proof: per column, witness for the untouched subset
    // positions, then one Merkle decommitment over the subset positions.
    let mut first_layer_witness = Vec::new();
    let mut first_layer_positions = BTreeMap::new();
    for (&size, eval) in group_sizes.iter().zip(&first_layer_evals) {
        let column_queries = queries.fold(queries.log_domain_size - size);
        first_layer_witness.extend(fri_layer_witness(&eval.values, &column_queries));
        first_layer_positions.insert(size, fri_layer_positions(&column_queries));
    }
    let (first_layer_decommitment, _) = first_layer_tree.decommit(&first_layer_positions);
    let first_layer_proof = FriLayerProof {
        fri_witness: first_layer_witness,
        decommitment: first_layer_decommitment,
        commitment: first_layer_tree.root,
    };

    // Inner layer proofs.
    let mut inner_layer_proofs = Vec::new();
    let mut layer_queries = queries.fold(1);
    for layer in &inner_layers {
        let witness = fri_layer_witness(&layer.values, &layer_queries);
        let positions = fri_layer_positions(&layer_queries);
        let (decommitment, _) = layer
            .tree
            .decommit(&BTreeMap::from([(layer.log_size, positions)]));
        inner_layer_proofs.push(FriLayerProof {
            fri_witness: witness,
            decommitment,
            commitment: layer.tree.root,
        });
        layer_queries = layer_queries.fold(1);
    }

    let proof = StarkProof {
        commitments: trees.iter().map(|t| t.root).collect(),
        sampled_values,
        decommitments,
        queried_values,
        proof_of_work,
        fri_proof: FriProof {
            first_layer: first_layer_proof,
            inner_layers: inner_layer_proofs,
            last_layer_poly,
        },
        composition_poly,
        config,
    };

    Fixture {
        proof,
        params,
        tree_roots,
        tree_column_log_sizes,
        initial_digest,
    }
}
