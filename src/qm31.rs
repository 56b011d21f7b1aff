//! QM31 - the secure field.
//!
//! QM31 = CM31[u] where u^2 = 2 + i. Elements are `first + second*u` with
//! CM31 components, equivalently four M31 coordinates (a, b, c, d) for
//! a + bi + (c + di)u.
//!
//! All transcript randomness, OODS sampling and FRI folding happens in this
//! field.

use crate::cm31::CM31;
use crate::m31::{FieldExpOps, M31};
use core::fmt::{self, Display};
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use num_traits::{One, Zero};

/// The irreducible element: u^2 = R = 2 + i.
pub const R: CM31 = CM31::from_u32(2, 1);

/// Number of M31 coordinates in a QM31.
pub const SECURE_EXTENSION_DEGREE: usize = 4;

/// QM31 extension field element: `first + second*u` with u^2 = 2 + i.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QM31(pub CM31, pub CM31);

/// The secure field, under the name the protocol literature uses.
pub type SecureField = QM31;

impl QM31 {
    /// Zero element
    pub const ZERO: Self = Self(CM31::ZERO, CM31::ZERO);

    /// One element
    pub const ONE: Self = Self(CM31::ONE, CM31::ZERO);

    /// Create from CM31 components
    #[inline]
    pub const fn new(first: CM31, second: CM31) -> Self {
        Self(first, second)
    }

    /// Create from the four M31 coordinates (a, b, c, d)
    #[inline]
    pub const fn from_m31(a: M31, b: M31, c: M31, d: M31) -> Self {
        Self(CM31::new(a, b), CM31::new(c, d))
    }

    /// Create from raw u32 coordinates, reducing each
    #[inline]
    pub const fn from_u32(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self(CM31::from_u32(a, b), CM31::from_u32(c, d))
    }

    /// View as four M31 coordinates
    #[inline]
    pub const fn to_m31_array(self) -> [M31; SECURE_EXTENSION_DEGREE] {
        [self.0 .0, self.0 .1, self.1 .0, self.1 .1]
    }

    /// Rebuild from four M31 coordinates
    #[inline]
    pub const fn from_m31_array(arr: [M31; SECURE_EXTENSION_DEGREE]) -> Self {
        Self::from_m31(arr[0], arr[1], arr[2], arr[3])
    }

    /// Compose a value from the four partial evaluations of its coordinate
    /// polynomials: e0 + e1*i + e2*u + e3*iu.
    pub fn from_partial_evals(evals: [Self; SECURE_EXTENSION_DEGREE]) -> Self {
        let mut res = evals[0];
        res += evals[1] * Self::from_u32(0, 1, 0, 0);
        res += evals[2] * Self::from_u32(0, 0, 1, 0);
        res += evals[3] * Self::from_u32(0, 0, 0, 1);
        res
    }

    /// Check if zero
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_zero() && self.1.is_zero()
    }

    /// The nontrivial automorphism over CM31: u -> -u.
    ///
    /// Fixes CM31 (and the base field), so a polynomial with base-field
    /// coefficients commutes with it. Conjugate sample points live under this
    /// map.
    #[inline]
    pub fn complex_conjugate(self) -> Self {
        Self(self.0, -self.1)
    }

    /// Double
    #[inline]
    pub fn double(self) -> Self {
        self + self
    }

    /// Multiply by a CM31 scalar
    #[inline]
    pub fn mul_cm31(self, rhs: CM31) -> Self {
        Self(self.0 * rhs, self.1 * rhs)
    }

    /// Multiply by a base-field scalar
    #[inline]
    pub fn mul_m31(self, rhs: M31) -> Self {
        Self(self.0.mul_m31(rhs), self.1.mul_m31(rhs))
    }

    /// Serialize to 16 bytes: four u32 coordinates, little-endian.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        for (chunk, coord) in bytes.chunks_exact_mut(4).zip(self.to_m31_array()) {
            chunk.copy_from_slice(&coord.to_le_bytes());
        }
        bytes
    }

    /// Deserialize from 16 little-endian bytes.
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let mut coords = [M31::ZERO; SECURE_EXTENSION_DEGREE];
        for (chunk, coord) in bytes.chunks_exact(4).zip(coords.iter_mut()) {
            *coord = M31::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self::from_m31_array(coords)
    }
}

impl Display for QM31 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) + ({})u", self.0, self.1)
    }
}

impl From<M31> for QM31 {
    #[inline]
    fn from(x: M31) -> Self {
        Self(CM31::from_m31(x), CM31::ZERO)
    }
}

impl From<CM31> for QM31 {
    #[inline]
    fn from(x: CM31) -> Self {
        Self(x, CM31::ZERO)
    }
}

impl Add for QM31 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0, self.1 + rhs.1)
    }
}

impl Sub for QM31 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0, self.1 - rhs.1)
    }
}

impl Neg for QM31 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self(-self.0, -self.1)
    }
}

impl Mul for QM31 {
    type Output = Self;

    /// (a + bu)(c + du) = (ac + R*bd) + (ad + bc)u
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(
            self.0 * rhs.0 + R * self.1 * rhs.1,
            self.0 * rhs.1 + self.1 * rhs.0,
        )
    }
}

impl Add<M31> for QM31 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: M31) -> Self {
        self + Self::from(rhs)
    }
}

impl Mul<M31> for QM31 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: M31) -> Self {
        self.mul_m31(rhs)
    }
}

impl AddAssign for QM31 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for QM31 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for QM31 {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Zero for QM31 {
    #[inline]
    fn zero() -> Self {
        Self::ZERO
    }
    #[inline]
    fn is_zero(&self) -> bool {
        QM31::is_zero(*self)
    }
}

impl One for QM31 {
    #[inline]
    fn one() -> Self {
        Self::ONE
    }
}

impl Sum for QM31 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(QM31::ZERO, |a, b| a + b)
    }
}

impl FieldExpOps for QM31 {
    /// (a + bu)^-1 = (a - bu) * (a^2 - R*b^2)^-1
    fn try_inverse(self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        let denom = self.0.square() - R * self.1.square();
        let denom_inv = denom.try_inverse()?;
        Some(Self(self.0 * denom_inv, -self.1 * denom_inv))
    }
}
