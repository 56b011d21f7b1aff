//! Circle STARK proof verification over M31.
//!
//! This crate implements the verifier side of a Circle STARK proof system:
//! given a parsed proof, the statement parameters and an initial transcript
//! state, [`verify`] returns accept or reject deterministically. Proof
//! production, witness generation and any on-chain dispatch live elsewhere.
//!
//! # Components
//!
//! - `m31`, `cm31`, `qm31` - the field tower up to the secure field
//! - `circle` - the circle group, cosets and evaluation domains
//! - `poly` - line and circle polynomials in coefficient form
//! - `channel` - the Keccak256 Fiat-Shamir transcript
//! - `merkle` - multi-column Merkle decommitment verification
//! - `pcs` - the committed-tree registry and degree bounds
//! - `queries` - query position sampling
//! - `fri` - the FRI low-degree test
//! - `quotients` - DEEP quotient answers
//! - `air` - component descriptors and mask sample points
//! - `types` - proof structures, wire format, error taxonomy
//! - `verifier` - the verification pipeline

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod air;
pub mod channel;
pub mod circle;
pub mod cm31;
pub mod fri;
pub mod m31;
pub mod merkle;
pub mod pcs;
pub mod poly;
pub mod qm31;
pub mod queries;
pub mod quotients;
pub mod types;
pub mod utils;
pub mod verifier;

// Re-exports for convenience
pub use air::{ComponentInfo, ComponentParams, VerificationParams};
pub use channel::KeccakChannel;
pub use circle::{CirclePoint, CirclePointIndex, CanonicCoset, CircleDomain, Coset};
pub use cm31::CM31;
pub use fri::{FriConfig, FriProof, FriVerifier};
pub use m31::{M31, M31_PRIME};
pub use merkle::{MerkleDecommitment, MerkleVerifier};
pub use pcs::{CommitmentSchemeVerifier, PcsConfig};
pub use qm31::{SecureField, QM31};
pub use types::{StarkProof, VerifyError};
pub use verifier::{verify, verify_bytes};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::air::VerificationParams;
    pub use crate::channel::KeccakChannel;
    pub use crate::m31::{M31, M31_PRIME};
    pub use crate::pcs::PcsConfig;
    pub use crate::qm31::{SecureField, QM31};
    pub use crate::types::{StarkProof, VerifyError};
    pub use crate::verifier::{verify, verify_bytes};
}
