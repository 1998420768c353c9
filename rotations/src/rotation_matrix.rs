use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;
use thiserror::Error;

use crate::RotationTrait;

/// Errors that can occur when creating a `RotationMatrix`.
#[derive(Debug, Error)]
pub enum RotationMatrixErrors {
    #[error("matrix is not orthonormal (error {0})")]
    NotOrthonormal(f64),
    #[error("matrix is a reflection, determinant is negative")]
    Reflection,
}

/// Direction cosine matrix [BA] mapping frame A components into frame B components.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationMatrix(pub Matrix3<f64>);

impl RotationMatrix {
    const TOLERANCE: f64 = 1e-9;

    /// Creates a new `RotationMatrix`, checking that it is a proper rotation.
    pub fn new(value: Matrix3<f64>) -> Result<Self, RotationMatrixErrors> {
        let error = (value.transpose() * value - Matrix3::identity()).norm();
        if !(error < Self::TOLERANCE) {
            return Err(RotationMatrixErrors::NotOrthonormal(error));
        }
        if value.determinant() < 0.0 {
            return Err(RotationMatrixErrors::Reflection);
        }
        Ok(Self(value))
    }

    /// Elementary transformation about the first axis.
    pub fn m1(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self(Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c))
    }

    /// Elementary transformation about the second axis.
    pub fn m2(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self(Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c))
    }

    /// Elementary transformation about the third axis.
    pub fn m3(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self(Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0))
    }

    pub fn value(&self) -> Matrix3<f64> {
        self.0
    }
}

impl Default for RotationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Matrix3<f64>> for RotationMatrix {
    fn from(value: Matrix3<f64>) -> Self {
        Self(value)
    }
}

impl Mul for RotationMatrix {
    type Output = Self;

    /// Composes two transformations, `[CA] = [CB] * [BA]`.
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl RotationTrait for RotationMatrix {
    fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.0.transpose() * v
    }

    fn transform(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.0 * v
    }

    fn inv(&self) -> Self {
        Self(self.0.transpose())
    }

    fn identity() -> Self {
        Self(Matrix3::identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_m3_transform() {
        // frame rotated +90 deg about z sees the inertial x axis along its -y axis
        let dcm = RotationMatrix::m3(FRAC_PI_2);
        let v = dcm.transform(&Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(v, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-15);
        let w = dcm.rotate(&Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(w, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-15);
    }

    #[test]
    fn test_new_checks() {
        assert!(RotationMatrix::new(RotationMatrix::m1(0.3).value()).is_ok());
        assert!(RotationMatrix::new(Matrix3::identity() * 2.0).is_err());
        assert!(matches!(
            RotationMatrix::new(-Matrix3::identity()),
            Err(RotationMatrixErrors::Reflection)
        ));
    }

    #[test]
    fn test_inverse_composition() {
        let dcm = RotationMatrix::m3(0.4) * RotationMatrix::m1(-1.1) * RotationMatrix::m2(2.0);
        let product = dcm * dcm.inv();
        assert_abs_diff_eq!(product.value(), Matrix3::identity(), epsilon = 1e-14);
    }
}
