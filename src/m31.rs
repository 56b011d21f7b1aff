//! M31 (Mersenne-31) base field.
//!
//! The Mersenne-31 prime: p = 2^31 - 1 = 2147483647
//!
//! All verifier arithmetic bottoms out here. Stored values are always fully
//! reduced to [0, p); the reduction laws below state the admissible input
//! ranges.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use bytemuck::{Pod, Zeroable};
use core::fmt::{self, Display};
use core::iter::{Product, Sum};
use core::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use num_traits::{One, Zero};

/// The Mersenne-31 prime: 2^31 - 1
pub const M31_PRIME: u32 = (1 << 31) - 1;

/// Number of bits in the modulus
pub const MODULUS_BITS: u32 = 31;

/// Inverting zero (directly or inside a batch) is a proof defect, not a bug.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldError {
    ZeroInverse,
}

impl Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInverse => write!(f, "attempted to invert zero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FieldError {}

/// An element of the M31 field, fully reduced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct M31(pub u32);

impl M31 {
    /// Zero element
    pub const ZERO: Self = Self(0);

    /// One element (multiplicative identity)
    pub const ONE: Self = Self(1);

    /// Create a new M31 element from any u32, reducing modulo p
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self::reduce(value as u64)
    }

    /// Create from u32 without reducing (value must be < p)
    #[inline]
    pub const fn from_u32_unchecked(value: u32) -> Self {
        Self(value)
    }

    /// Full reduction, valid for any x < p^2.
    ///
    /// Folded-shift identity:
    ///   s1 = (x >> 31) + x + 1
    ///   s2 = (s1 >> 31) + x
    ///   result = s2 & p
    #[inline]
    pub const fn reduce(x: u64) -> Self {
        let s1 = (x >> MODULUS_BITS) + x + 1;
        let s2 = (s1 >> MODULUS_BITS) + x;
        Self((s2 & (M31_PRIME as u64)) as u32)
    }

    /// Partial reduction, valid for values in [0, 2p).
    #[inline]
    pub const fn partial_reduce(val: u32) -> Self {
        let reduced = val.wrapping_sub(M31_PRIME);
        Self(if val >= M31_PRIME { reduced } else { val })
    }

    /// Addition in M31
    #[inline]
    pub const fn add(self, other: Self) -> Self {
        Self::partial_reduce(self.0 + other.0)
    }

    /// Subtraction in M31
    #[inline]
    pub const fn sub(self, other: Self) -> Self {
        Self::partial_reduce(self.0 + M31_PRIME - other.0)
    }

    /// Multiplication in M31
    #[inline]
    pub const fn mul(self, other: Self) -> Self {
        Self::reduce((self.0 as u64) * (other.0 as u64))
    }

    /// Square
    #[inline]
    pub const fn square(self) -> Self {
        self.mul(self)
    }

    /// Double (add self to self)
    #[inline]
    pub const fn double(self) -> Self {
        self.add(self)
    }

    /// Negation in M31
    #[inline]
    pub const fn neg(self) -> Self {
        if self.0 == 0 {
            self
        } else {
            Self(M31_PRIME - self.0)
        }
    }

    /// Check if zero
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Get the inner value
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Convert to bytes (little-endian)
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Convert from bytes (little-endian)
    #[inline]
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self::new(u32::from_le_bytes(bytes))
    }
}

/// Optimized inverse computation: v^(2^31 - 3).
///
/// Addition chain of 37 squarings and 9 multiplications.
pub fn pow2147483645<T: FieldExpOps>(v: T) -> T {
    let t0 = sqn::<2, T>(v) * v;
    let t1 = sqn::<1, T>(t0) * t0;
    let t2 = sqn::<3, T>(t1) * t0;
    let t3 = sqn::<1, T>(t2) * t0;
    let t4 = sqn::<8, T>(t3) * t3;
    let t5 = sqn::<8, T>(t4) * t3;
    sqn::<7, T>(t5) * t2
}

/// Square n times
#[inline]
fn sqn<const N: usize, T: FieldExpOps>(mut v: T) -> T {
    for _ in 0..N {
        v = v.square();
    }
    v
}

/// Shared exponentiation and inversion surface for the field tower.
pub trait FieldExpOps: Copy + PartialEq + Zero + One + Mul<Output = Self> {
    #[inline]
    fn square(self) -> Self {
        self * self
    }

    /// Compute self^exp using square-and-multiply
    fn pow(self, mut exp: u128) -> Self {
        let mut base = self;
        let mut result = Self::one();
        while exp > 0 {
            if exp & 1 == 1 {
                result = result * base;
            }
            base = base.square();
            exp >>= 1;
        }
        result
    }

    /// Multiplicative inverse; `None` for zero.
    fn try_inverse(self) -> Option<Self>;

    /// Multiplicative inverse of a known-nonzero element.
    ///
    /// Only for values that are nonzero by construction (domain coordinates);
    /// proof-controlled values go through [`batch_inverse`].
    #[inline]
    fn inverse(self) -> Self {
        debug_assert!(!self.is_zero(), "cannot invert zero");
        match self.try_inverse() {
            Some(inv) => inv,
            None => Self::zero(),
        }
    }
}

impl FieldExpOps for M31 {
    #[inline]
    fn try_inverse(self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        Some(pow2147483645(self))
    }
}

/// Batch inverse using Montgomery's trick.
///
/// One inversion plus 3(n-1) multiplications. Any zero input fails the whole
/// batch with `FieldError::ZeroInverse`.
pub fn batch_inverse<F: FieldExpOps>(values: &[F]) -> Result<Vec<F>, FieldError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let n = values.len();
    let mut prefix = vec![F::one(); n];
    prefix[0] = values[0];
    for i in 1..n {
        prefix[i] = prefix[i - 1] * values[i];
    }

    let mut inv_prod = prefix[n - 1].try_inverse().ok_or(FieldError::ZeroInverse)?;

    let mut result = vec![F::zero(); n];
    for i in (1..n).rev() {
        result[i] = prefix[i - 1] * inv_prod;
        inv_prod = inv_prod * values[i];
    }
    result[0] = inv_prod;

    Ok(result)
}

// === Operator implementations ===

impl Display for M31 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for M31 {
    #[inline]
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<M31> for u32 {
    #[inline]
    fn from(value: M31) -> Self {
        value.0
    }
}

impl From<i32> for M31 {
    fn from(value: i32) -> Self {
        if value < 0 {
            let abs = value.unsigned_abs();
            Self::new(abs).neg()
        } else {
            Self::new(value as u32)
        }
    }
}

impl Add for M31 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        M31::add(self, other)
    }
}

impl Sub for M31 {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        M31::sub(self, other)
    }
}

impl Mul for M31 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        M31::mul(self, rhs)
    }
}

impl Neg for M31 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        M31::neg(self)
    }
}

impl AddAssign for M31 {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for M31 {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl MulAssign for M31 {
    #[inline]
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl Zero for M31 {
    #[inline]
    fn zero() -> Self {
        Self::ZERO
    }
    #[inline]
    fn is_zero(&self) -> bool {
        M31::is_zero(*self)
    }
}

impl One for M31 {
    #[inline]
    fn one() -> Self {
        Self::ONE
    }
}

impl Sum for M31 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(M31::ZERO, |a, b| a + b)
    }
}

impl Product for M31 {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(M31::ONE, |a, b| a * b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(M31_PRIME, 2147483647);
        assert_eq!(M31_PRIME, (1 << 31) - 1);
    }

    #[test]
    fn test_basic_arithmetic() {
        let a = M31::new(100);
        let b = M31::new(200);

        assert_eq!((a + b).value(), 300);
        assert_eq!((b - a).value(), 100);
        assert_eq!((a * b).value(), 20000);
    }

    #[test]
    fn test_reduction() {
        // 2^31 = p + 1 reduces to 1
        assert_eq!(M31::reduce(1 << 31).value(), 1);

        assert_eq!(M31::new(M31_PRIME).value(), 0);
        assert_eq!(M31::new(M31_PRIME - 1).value(), M31_PRIME - 1);

        // Largest admissible input: (p-1)^2
        let max = (M31_PRIME as u64 - 1) * (M31_PRIME as u64 - 1);
        assert_eq!(M31::reduce(max).value(), 1);

        assert_eq!(M31::reduce(2 * M31_PRIME as u64).value(), 0);
        assert_eq!(M31::partial_reduce(M31_PRIME + 5).value(), 5);
    }

    #[test]
    fn test_known_product() {
        let prod = M31::new(1234567) * M31::new(7654321);
        assert_eq!(prod.value(), 703538258);
    }

    #[test]
    fn test_inverse() {
        // p - 1 is its own inverse
        let minus_one = M31::new(M31_PRIME - 1);
        assert_eq!(minus_one.try_inverse(), Some(minus_one));

        for val in [1, 2, 42, 1000, 999999, M31_PRIME - 1] {
            let x = M31::new(val);
            let x_inv = x.try_inverse().unwrap();
            assert_eq!((x * x_inv).value(), 1, "failed for value {}", val);
        }

        assert_eq!(M31::ZERO.try_inverse(), None);
    }

    #[test]
    fn test_batch_inverse() {
        let values: Vec<M31> = (1..=100).map(M31::new).collect();
        let inverses = batch_inverse(&values).unwrap();

        for (i, (&val, &inv)) in values.iter().zip(inverses.iter()).enumerate() {
            assert_eq!((val * inv).value(), 1, "failed at index {}", i);
        }
    }

    #[test]
    fn test_batch_inverse_rejects_zero() {
        let values = vec![M31::new(3), M31::ZERO, M31::new(7)];
        assert_eq!(batch_inverse(&values), Err(FieldError::ZeroInverse));

        // Zero in the last slot must fail too.
        let values = vec![M31::new(3), M31::new(7), M31::ZERO];
        assert_eq!(batch_inverse(&values), Err(FieldError::ZeroInverse));
    }

    #[test]
    fn test_negation() {
        let a = M31::new(100);
        assert_eq!((a + (-a)).value(), 0);
        assert_eq!((-M31::ZERO).value(), 0);
        assert_eq!((-(-a)).value(), a.value());
    }

    #[test]
    fn test_pow() {
        let a = M31::new(2);
        assert_eq!(a.pow(0).value(), 1);
        assert_eq!(a.pow(10).value(), 1024);

        // Fermat: a^(p-1) = 1
        let b = M31::new(12345);
        assert_eq!(b.pow(M31_PRIME as u128 - 1).value(), 1);
    }

    #[test]
    fn test_from_i32() {
        assert_eq!(M31::from(5i32).value(), 5);
        assert_eq!((M31::from(-1i32) + M31::ONE).value(), 0);
        assert_eq!(M31::from(-5i32).value(), M31_PRIME - 5);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let a = M31::new(123456789);
        assert_eq!(M31::from_le_bytes(a.to_le_bytes()), a);
    }

    #[test]
    fn test_large_multiplication() {
        // (p-1)^2 mod p = 1
        let a = M31::new(M31_PRIME - 1);
        assert_eq!((a * a).value(), 1);
    }
}
