//! CM31 - complex extension of M31.
//!
//! CM31 = M31[i] where i^2 = -1. Elements are `re + im*i`.
//!
//! The DEEP quotient denominators live here: the pair-vanishing denominator
//! of a conjugate sample pair is CM31-valued, so batching its inverses in
//! CM31 instead of QM31 saves most of the inversion work.

use crate::m31::{pow2147483645, FieldExpOps, M31};
use core::fmt::{self, Display};
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use num_traits::{One, Zero};

/// CM31 extension field element: `re + im*i` with i^2 = -1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CM31(pub M31, pub M31);

impl CM31 {
    /// Zero element
    pub const ZERO: Self = Self(M31::ZERO, M31::ZERO);

    /// One element
    pub const ONE: Self = Self(M31::ONE, M31::ZERO);

    /// The imaginary unit i.
    pub const I: Self = Self(M31::ZERO, M31::ONE);

    /// Create a new CM31 element
    #[inline]
    pub const fn new(re: M31, im: M31) -> Self {
        Self(re, im)
    }

    /// Create from raw u32 values, reducing each
    #[inline]
    pub const fn from_u32(re: u32, im: u32) -> Self {
        Self(M31::new(re), M31::new(im))
    }

    /// Embed a base-field element as the real part
    #[inline]
    pub const fn from_m31(x: M31) -> Self {
        Self(x, M31::ZERO)
    }

    /// Real part
    #[inline]
    pub const fn re(self) -> M31 {
        self.0
    }

    /// Imaginary part
    #[inline]
    pub const fn im(self) -> M31 {
        self.1
    }

    /// Check if zero
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_zero() && self.1.is_zero()
    }

    /// Complex conjugate: `re - im*i`
    #[inline]
    pub fn conjugate(self) -> Self {
        Self(self.0, -self.1)
    }

    /// Double each component
    #[inline]
    pub fn double(self) -> Self {
        self + self
    }

    /// Squared norm `re^2 + im^2`, an M31 value.
    #[inline]
    pub fn norm(self) -> M31 {
        self.0.square() + self.1.square()
    }

    /// Multiply by a base-field scalar
    #[inline]
    pub fn mul_m31(self, rhs: M31) -> Self {
        Self(self.0 * rhs, self.1 * rhs)
    }
}

impl Display for CM31 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}i", self.0, self.1)
    }
}

impl From<M31> for CM31 {
    #[inline]
    fn from(x: M31) -> Self {
        Self::from_m31(x)
    }
}

impl Add for CM31 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0, self.1 + rhs.1)
    }
}

impl Sub for CM31 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0, self.1 - rhs.1)
    }
}

impl Neg for CM31 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self(-self.0, -self.1)
    }
}

impl Mul for CM31 {
    type Output = Self;

    /// (a + bi)(c + di) = (ac - bd) + (ad + bc)i
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(
            self.0 * rhs.0 - self.1 * rhs.1,
            self.0 * rhs.1 + self.1 * rhs.0,
        )
    }
}

impl AddAssign for CM31 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for CM31 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for CM31 {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Zero for CM31 {
    #[inline]
    fn zero() -> Self {
        Self::ZERO
    }
    #[inline]
    fn is_zero(&self) -> bool {
        CM31::is_zero(*self)
    }
}

impl One for CM31 {
    #[inline]
    fn one() -> Self {
        Self::ONE
    }
}

impl Sum for CM31 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CM31::ZERO, |a, b| a + b)
    }
}

impl FieldExpOps for CM31 {
    /// (a + bi)^-1 = (a - bi) / (a^2 + b^2)
    fn try_inverse(self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        let norm_inv = pow2147483645(self.norm());
        Some(self.conjugate().mul_m31(norm_inv))
    }
}
