//! Proof structure, wire format, and the error taxonomy.
//!
//! The wire format is little-endian throughout: u32 length prefixes, 32-byte
//! hashes, field elements as u32 words, QM31 as four words.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::channel::ChannelError;
use crate::fri::{FriError, FriLayerProof, FriProof};
use crate::m31::{FieldError, M31, M31_PRIME};
use crate::merkle::{Hash, MerkleDecommitment, MerkleError, HASH_SIZE};
use crate::pcs::PcsConfig;
use crate::poly::{CirclePoly, LinePoly, SecureCirclePoly};
use crate::qm31::{QM31, SECURE_EXTENSION_DEGREE};
use core::fmt::{self, Display};

/// Terminal verification failures. The orchestrator surfaces the first one
/// and discards all state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// Structural mismatch: tree counts, column counts, sizes out of range,
    /// malformed wire data.
    Shape(&'static str),
    /// Field arithmetic failure (zero inversion).
    Field(FieldError),
    /// Channel rejection sampling hit its retry cap.
    ChannelExhausted,
    /// Composition polynomial disagrees with the sampled OODS value.
    OodsMismatch,
    /// The proof-of-work nonce does not meet the required bits.
    PowFailed,
    Merkle(MerkleError),
    Fri(FriError),
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(msg) => write!(f, "shape error: {}", msg),
            Self::Field(err) => write!(f, "field error: {}", err),
            Self::ChannelExhausted => write!(f, "channel exhausted"),
            Self::OodsMismatch => write!(f, "oods evaluation mismatch"),
            Self::PowFailed => write!(f, "proof of work insufficient"),
            Self::Merkle(err) => write!(f, "merkle error: {}", err),
            Self::Fri(err) => write!(f, "fri error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VerifyError {}

impl From<FieldError> for VerifyError {
    fn from(err: FieldError) -> Self {
        Self::Field(err)
    }
}

impl From<ChannelError> for VerifyError {
    fn from(_: ChannelError) -> Self {
        Self::ChannelExhausted
    }
}

impl From<MerkleError> for VerifyError {
    fn from(err: MerkleError) -> Self {
        Self::Merkle(err)
    }
}

impl From<FriError> for VerifyError {
    fn from(err: FriError) -> Self {
        Self::Fri(err)
    }
}

/// A parsed STARK proof.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StarkProof {
    /// Tree roots: preprocessed, original, interaction, composition.
    pub commitments: Vec<Hash>,
    /// Out-of-domain sampled values, `[tree][column][sample]`.
    pub sampled_values: Vec<Vec<Vec<QM31>>>,
    /// Merkle witnesses, one per tree.
    pub decommitments: Vec<MerkleDecommitment>,
    /// Committed values at the query positions, `[tree][column][query]`.
    pub queried_values: Vec<Vec<Vec<M31>>>,
    /// Proof-of-work nonce.
    pub proof_of_work: u64,
    pub fri_proof: FriProof,
    /// Composition polynomial coefficients, one vector per QM31 coordinate.
    pub composition_poly: SecureCirclePoly,
    pub config: PcsConfig,
}

// === Wire format ===

struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VerifyError> {
        if self.remaining() < n {
            return Err(VerifyError::Shape("proof bytes truncated"));
        }
        let slice = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, VerifyError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, VerifyError> {
        let lo = self.read_u32()? as u64;
        let hi = self.read_u32()? as u64;
        Ok(lo | (hi << 32))
    }

    /// A length prefix, bounded by the bytes actually left.
    fn read_len(&mut self, elem_size: usize) -> Result<usize, VerifyError> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() / elem_size {
            return Err(VerifyError::Shape("length prefix exceeds proof size"));
        }
        Ok(len)
    }

    fn read_hash(&mut self) -> Result<Hash, VerifyError> {
        let b = self.take(HASH_SIZE)?;
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(b);
        Ok(hash)
    }

    fn read_m31(&mut self) -> Result<M31, VerifyError> {
        let word = self.read_u32()?;
        if word >= M31_PRIME {
            return Err(VerifyError::Shape("field element not reduced"));
        }
        Ok(M31::from_u32_unchecked(word))
    }

    fn read_qm31(&mut self) -> Result<QM31, VerifyError> {
        let a = self.read_m31()?;
        let b = self.read_m31()?;
        let c = self.read_m31()?;
        let d = self.read_m31()?;
        Ok(QM31::from_m31(a, b, c, d))
    }

    fn read_m31_list(&mut self) -> Result<Vec<M31>, VerifyError> {
        let len = self.read_len(4)?;
        (0..len).map(|_| self.read_m31()).collect()
    }

    fn read_qm31_list(&mut self) -> Result<Vec<QM31>, VerifyError> {
        let len = self.read_len(16)?;
        (0..len).map(|_| self.read_qm31()).collect()
    }

    fn read_decommitment(&mut self) -> Result<MerkleDecommitment, VerifyError> {
        let n_hashes = self.read_len(HASH_SIZE)?;
        let hash_witness = (0..n_hashes)
            .map(|_| self.read_hash())
            .collect::<Result<_, _>>()?;
        let column_witness = self.read_m31_list()?;
        Ok(MerkleDecommitment {
            hash_witness,
            column_witness,
        })
    }

    fn read_fri_layer(&mut self) -> Result<FriLayerProof, VerifyError> {
        let fri_witness = self.read_qm31_list()?;
        let decommitment = self.read_decommitment()?;
        let commitment = self.read_hash()?;
        Ok(FriLayerProof {
            fri_witness,
            decommitment,
            commitment,
        })
    }
}

struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn write_len(&mut self, len: usize) {
        self.write_u32(len as u32);
    }

    fn write_m31_list(&mut self, values: &[M31]) {
        self.write_len(values.len());
        for value in values {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn write_qm31_list(&mut self, values: &[QM31]) {
        self.write_len(values.len());
        for value in values {
            self.bytes.extend_from_slice(&value.to_bytes());
        }
    }

    fn write_decommitment(&mut self, decommitment: &MerkleDecommitment) {
        self.write_len(decommitment.hash_witness.len());
        for hash in &decommitment.hash_witness {
            self.bytes.extend_from_slice(hash);
        }
        self.write_m31_list(&decommitment.column_witness);
    }

    fn write_fri_layer(&mut self, layer: &FriLayerProof) {
        self.write_qm31_list(&layer.fri_witness);
        self.write_decommitment(&layer.decommitment);
        self.bytes.extend_from_slice(&layer.commitment);
    }
}

impl StarkProof {
    /// Decode a proof from its wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerifyError> {
        let mut r = ByteReader::new(bytes);

        let n_commitments = r.read_len(HASH_SIZE)?;
        let commitments = (0..n_commitments)
            .map(|_| r.read_hash())
            .collect::<Result<Vec<_>, _>>()?;

        let n_trees = r.read_len(4)?;
        let mut sampled_values = Vec::with_capacity(n_trees);
        for _ in 0..n_trees {
            let n_columns = r.read_len(4)?;
            let mut columns = Vec::with_capacity(n_columns);
            for _ in 0..n_columns {
                columns.push(r.read_qm31_list()?);
            }
            sampled_values.push(columns);
        }

        let n_decommitments = r.read_len(4)?;
        let decommitments = (0..n_decommitments)
            .map(|_| r.read_decommitment())
            .collect::<Result<Vec<_>, _>>()?;

        let n_value_trees = r.read_len(4)?;
        let mut queried_values = Vec::with_capacity(n_value_trees);
        for _ in 0..n_value_trees {
            let n_columns = r.read_len(4)?;
            let mut columns = Vec::with_capacity(n_columns);
            for _ in 0..n_columns {
                columns.push(r.read_m31_list()?);
            }
            queried_values.push(columns);
        }

        let proof_of_work = r.read_u64()?;

        let first_layer = r.read_fri_layer()?;
        let n_inner = r.read_len(4)?;
        let inner_layers = (0..n_inner)
            .map(|_| r.read_fri_layer())
            .collect::<Result<Vec<_>, _>>()?;
        let last_layer_coeffs = r.read_qm31_list()?;
        if !last_layer_coeffs.len().is_power_of_two() {
            return Err(VerifyError::Shape("last layer length not a power of two"));
        }
        let fri_proof = FriProof {
            first_layer,
            inner_layers,
            last_layer_poly: LinePoly::new(last_layer_coeffs),
        };

        let mut coordinate_polys = Vec::with_capacity(SECURE_EXTENSION_DEGREE);
        for _ in 0..SECURE_EXTENSION_DEGREE {
            let coeffs = r.read_m31_list()?;
            if !coeffs.len().is_power_of_two() {
                return Err(VerifyError::Shape("composition coeff count not a power of two"));
            }
            coordinate_polys.push(CirclePoly::new(coeffs));
        }
        let composition_poly = SecureCirclePoly(
            coordinate_polys
                .try_into()
                .map_err(|_| VerifyError::Shape("composition poly arity"))?,
        );
        if composition_poly.0.iter().any(|p| p.log_size() != composition_poly.log_size()) {
            return Err(VerifyError::Shape("composition coordinate sizes differ"));
        }

        let config = PcsConfig {
            fri_config: crate::fri::FriConfig {
                log_blowup_factor: r.read_u32()?,
                log_last_layer_degree_bound: r.read_u32()?,
                n_queries: r.read_u32()? as usize,
            },
            pow_bits: r.read_u32()?,
        };

        if r.remaining() != 0 {
            return Err(VerifyError::Shape("trailing proof bytes"));
        }

        Ok(Self {
            commitments,
            sampled_values,
            decommitments,
            queried_values,
            proof_of_work,
            fri_proof,
            composition_poly,
            config,
        })
    }

    /// Encode to the wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();

        w.write_len(self.commitments.len());
        for commitment in &self.commitments {
            w.bytes.extend_from_slice(commitment);
        }

        w.write_len(self.sampled_values.len());
        for tree in &self.sampled_values {
            w.write_len(tree.len());
            for column in tree {
                w.write_qm31_list(column);
            }
        }

        w.write_len(self.decommitments.len());
        for decommitment in &self.decommitments {
            w.write_decommitment(decommitment);
        }

        w.write_len(self.queried_values.len());
        for tree in &self.queried_values {
            w.write_len(tree.len());
            for column in tree {
                w.write_m31_list(column);
            }
        }

        w.write_u32(self.proof_of_work as u32);
        w.write_u32((self.proof_of_work >> 32) as u32);

        w.write_fri_layer(&self.fri_proof.first_layer);
        w.write_len(self.fri_proof.inner_layers.len());
        for layer in &self.fri_proof.inner_layers {
            w.write_fri_layer(layer);
        }
        w.write_qm31_list(self.fri_proof.last_layer_poly.coeffs());

        for poly in &self.composition_poly.0 {
            w.write_m31_list(poly.coeffs());
        }

        w.write_u32(self.config.fri_config.log_blowup_factor);
        w.write_u32(self.config.fri_config.log_last_layer_degree_bound);
        w.write_u32(self.config.fri_config.n_queries as u32);
        w.write_u32(self.config.pow_bits);

        w.bytes
    }
}
