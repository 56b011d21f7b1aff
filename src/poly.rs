//! Polynomial representations used by the verifier.
//!
//! `LinePoly` is the FRI last-layer polynomial over the line basis
//! {1, x, pi(x), x*pi(x), ...} with pi the x-doubling map. `CirclePoly` holds
//! a committed column's coefficients over the circle monomial basis
//! {1, y, x, xy, pi(x), ...}; `SecureCirclePoly` is one such polynomial per
//! QM31 coordinate.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::circle::CirclePoint;
use crate::m31::M31;
use crate::qm31::{QM31, SECURE_EXTENSION_DEGREE};
use crate::utils::fold;

/// A univariate polynomial in the line-IFFT basis, stored as coefficients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinePoly {
    coeffs: Vec<QM31>,
    log_size: u32,
}

impl LinePoly {
    /// Wrap a coefficient vector; the length must be a power of two.
    pub fn new(coeffs: Vec<QM31>) -> Self {
        assert!(coeffs.len().is_power_of_two());
        let log_size = coeffs.len().ilog2();
        Self { coeffs, log_size }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn coeffs(&self) -> &[QM31] {
        &self.coeffs
    }

    pub fn into_coeffs(self) -> Vec<QM31> {
        self.coeffs
    }

    /// Evaluate at a point of the (extension) line.
    pub fn eval_at_point(&self, x: QM31) -> QM31 {
        let mut doublings = Vec::with_capacity(self.log_size as usize);
        let mut point = x;
        for _ in 0..self.log_size {
            doublings.push(point);
            point = CirclePoint::<QM31>::double_x(point);
        }
        fold(&self.coeffs, &doublings)
    }
}

/// A circle polynomial over the base field, in the circle monomial basis.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CirclePoly {
    coeffs: Vec<M31>,
    log_size: u32,
}

impl CirclePoly {
    /// Wrap a coefficient vector; the length must be a power of two.
    pub fn new(coeffs: Vec<M31>) -> Self {
        assert!(coeffs.len().is_power_of_two());
        let log_size = coeffs.len().ilog2();
        Self { coeffs, log_size }
    }

    pub fn log_size(&self) -> u32 {
        self.log_size
    }

    pub fn coeffs(&self) -> &[M31] {
        &self.coeffs
    }

    /// Evaluate at a circle point with secure-field coordinates.
    pub fn eval_at_point(&self, point: CirclePoint<QM31>) -> QM31 {
        match self.log_size {
            0 => self.coeffs[0].into(),
            1 => QM31::from(self.coeffs[0]) + point.y * self.coeffs[1],
            _ => {
                let mut mappings = vec![point.y, point.x];
                let mut x = point.x;
                for _ in 2..self.log_size {
                    x = CirclePoint::<QM31>::double_x(x);
                    mappings.push(x);
                }
                mappings.reverse();
                fold(&self.coeffs, &mappings)
            }
        }
    }
}

/// The composition polynomial: one coordinate polynomial per QM31 basis
/// component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecureCirclePoly(pub [CirclePoly; SECURE_EXTENSION_DEGREE]);

impl SecureCirclePoly {
    pub fn log_size(&self) -> u32 {
        self.0[0].log_size()
    }

    /// Evaluate each coordinate polynomial and recompose.
    pub fn eval_at_point(&self, point: CirclePoint<QM31>) -> QM31 {
        QM31::from_partial_evals(self.eval_columns_at_point(point))
    }

    /// The four coordinate evaluations, in basis order.
    pub fn eval_columns_at_point(
        &self,
        point: CirclePoint<QM31>,
    ) -> [QM31; SECURE_EXTENSION_DEGREE] {
        [
            self.0[0].eval_at_point(point),
            self.0[1].eval_at_point(point),
            self.0[2].eval_at_point(point),
            self.0[3].eval_at_point(point),
        ]
    }
}
