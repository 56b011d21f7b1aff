//! Keccak256-based Fiat-Shamir channel.
//!
//! The channel state is a 32-byte digest plus a draw counter. Every prover
//! message is mixed into the digest (resetting the counter); every piece of
//! verifier randomness is derived from `(digest, n_draws)`. The sequencing of
//! mixes and draws is part of the protocol: any reordering changes every
//! subsequent value.
//!
//! All integers are serialized little-endian; a QM31 is 16 bytes (4 x u32 LE).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::m31::{M31, M31_PRIME};
use crate::qm31::QM31;
use core::fmt::{self, Display};
use sha3::{Digest, Keccak256};

/// Retry cap for rejection sampling in [`KeccakChannel::draw_base_felts`].
/// Exceeding it means a broken transcript, not bad luck.
pub const MAX_DRAW_RETRIES: usize = 100;

/// Number of u32 words per raw draw.
pub const U32S_PER_DRAW: usize = 8;

/// Channel failures. Terminal: the verifier surfaces them as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// Rejection sampling exceeded [`MAX_DRAW_RETRIES`].
    Exhausted,
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "channel rejection sampling exhausted"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ChannelError {}

/// The Fiat-Shamir transcript state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeccakChannel {
    digest: [u8; 32],
    n_draws: u32,
}

impl Default for KeccakChannel {
    fn default() -> Self {
        Self {
            digest: [0u8; 32],
            n_draws: 0,
        }
    }
}

fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

impl KeccakChannel {
    /// Resume a channel from an explicit state.
    pub fn new(digest: [u8; 32], n_draws: u32) -> Self {
        Self { digest, n_draws }
    }

    /// Current digest.
    #[inline]
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    /// Draws taken since the last mix.
    #[inline]
    pub fn n_draws(&self) -> u32 {
        self.n_draws
    }

    fn update(&mut self, digest: [u8; 32]) {
        self.digest = digest;
        self.n_draws = 0;
    }

    /// Mix a sequence of u32 words: digest <- Keccak(digest || LE words).
    pub fn mix_u32s(&mut self, data: &[u32]) {
        let mut hasher = Keccak256::new();
        hasher.update(self.digest);
        for word in data {
            hasher.update(word.to_le_bytes());
        }
        self.update(hasher.finalize().into());
    }

    /// Mix a u64 as its low and high u32 halves.
    pub fn mix_u64(&mut self, value: u64) {
        self.mix_u32s(&[value as u32, (value >> 32) as u32]);
    }

    /// Mix secure-field elements: digest <- Keccak(digest || 16 bytes each).
    pub fn mix_felts(&mut self, felts: &[QM31]) {
        let mut hasher = Keccak256::new();
        hasher.update(self.digest);
        for felt in felts {
            hasher.update(felt.to_bytes());
        }
        self.update(hasher.finalize().into());
    }

    /// Mix a commitment root: digest <- Keccak(digest || root).
    pub fn mix_root(&mut self, root: &[u8; 32]) {
        self.update(keccak(&[&self.digest, root]));
    }

    /// Draw 8 uniform u32 words: Keccak(digest || LE(n_draws) || 0x00).
    pub fn draw_u32s(&mut self) -> [u32; U32S_PER_DRAW] {
        let hash = keccak(&[&self.digest, &self.n_draws.to_le_bytes(), &[0u8]]);
        self.n_draws += 1;
        let mut words = [0u32; U32S_PER_DRAW];
        for (word, chunk) in words.iter_mut().zip(hash.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }

    /// Draw 8 base-field elements by rejection sampling.
    ///
    /// A draw is accepted only when all eight words are below 2p, keeping the
    /// reduced outputs uniform.
    pub fn draw_base_felts(&mut self) -> Result<[M31; U32S_PER_DRAW], ChannelError> {
        for _ in 0..MAX_DRAW_RETRIES {
            let words = self.draw_u32s();
            if words.iter().all(|&w| w < 2 * M31_PRIME) {
                return Ok(words.map(M31::partial_reduce));
            }
        }
        Err(ChannelError::Exhausted)
    }

    /// Draw one secure-field element.
    pub fn draw_secure_felt(&mut self) -> Result<QM31, ChannelError> {
        let felts = self.draw_base_felts()?;
        Ok(QM31::from_m31(felts[0], felts[1], felts[2], felts[3]))
    }

    /// Draw `n` secure-field elements, packing base-felt batches and starting
    /// a fresh batch whenever fewer than 4 felts remain.
    pub fn draw_secure_felts(&mut self, n: usize) -> Result<Vec<QM31>, ChannelError> {
        let mut res = Vec::with_capacity(n);
        let mut pool: Vec<M31> = Vec::new();
        for _ in 0..n {
            if pool.len() < 4 {
                pool = self.draw_base_felts()?.to_vec();
            }
            let felt = QM31::from_m31(pool[0], pool[1], pool[2], pool[3]);
            pool.drain(0..4);
            res.push(felt);
        }
        Ok(res)
    }

    /// Check a proof-of-work nonce against the current digest.
    ///
    /// prefix  = Keccak(LE32(0x12345678) || [0u8; 24] || digest || LE32(n_bits))
    /// final   = Keccak(prefix || LE64(nonce))
    ///
    /// Accepts iff `final`, read as a little-endian 256-bit integer, has at
    /// least `n_bits` trailing zero bits. The 24-byte zero pad is part of the
    /// wire contract.
    pub fn verify_pow(&self, n_bits: u32, nonce: u64) -> bool {
        let prefix = keccak(&[
            &0x12345678u32.to_le_bytes(),
            &[0u8; 24],
            &self.digest,
            &n_bits.to_le_bytes(),
        ]);
        let final_digest = keccak(&[&prefix, &nonce.to_le_bytes()]);
        trailing_zero_bits_le(&final_digest) >= n_bits
    }
}

/// Trailing zero bits of a byte string read as a little-endian integer.
fn trailing_zero_bits_le(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in bytes {
        if byte == 0 {
            count += 8;
        } else {
            return count + byte.trailing_zeros();
        }
    }
    count
}
