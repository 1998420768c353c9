use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{RotationTrait, rotation_matrix::RotationMatrix, tilde};

/// Modified Rodrigues Parameters σ = ê tan(Φ/4).
///
/// Singular only at Φ = ±360°. The shadow set -σ/σᵀσ describes the same
/// attitude, so the norm can always be kept at or below one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Mrp(pub Vector3<f64>);

impl Mrp {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(Vector3::new(x, y, z))
    }

    pub fn value(&self) -> Vector3<f64> {
        self.0
    }

    pub fn norm_squared(&self) -> f64 {
        self.0.norm_squared()
    }

    pub fn needs_shadow(&self) -> bool {
        self.0.norm_squared() > 1.0
    }

    /// The alternate set -σ/σᵀσ. Undefined at σ = 0, which never needs shadowing.
    pub fn shadow(&self) -> Self {
        Self(-self.0 / self.0.norm_squared())
    }

    /// B(σ) = (1 - σᵀσ) I + 2[σ×] + 2σσᵀ
    pub fn b_matrix(&self) -> Matrix3<f64> {
        let s = &self.0;
        (1.0 - s.norm_squared()) * Matrix3::identity()
            + 2.0 * tilde(s)
            + 2.0 * s * s.transpose()
    }

    /// Kinematic rate σ̇ = ¼ B(σ) ω for body rate `omega` in body components.
    pub fn derivative(&self, omega: &Vector3<f64>) -> Vector3<f64> {
        0.25 * self.b_matrix() * omega
    }
}

impl From<&Mrp> for RotationMatrix {
    fn from(mrp: &Mrp) -> RotationMatrix {
        let s = &mrp.0;
        let s2 = s.norm_squared();
        let st = tilde(s);
        let denominator = (1.0 + s2) * (1.0 + s2);
        RotationMatrix(
            Matrix3::identity() + (8.0 * st * st - 4.0 * (1.0 - s2) * st) / denominator,
        )
    }
}

impl From<&RotationMatrix> for Mrp {
    /// Shepperd's method through the Euler parameters, returning the short set (σ ≤ 1).
    fn from(dcm: &RotationMatrix) -> Mrp {
        let c = &dcm.0;
        let trace = c.trace();
        let b2 = [
            (1.0 + trace) / 4.0,
            (1.0 + 2.0 * c[(0, 0)] - trace) / 4.0,
            (1.0 + 2.0 * c[(1, 1)] - trace) / 4.0,
            (1.0 + 2.0 * c[(2, 2)] - trace) / 4.0,
        ];
        let mut i = 0;
        for k in 1..4 {
            if b2[k] > b2[i] {
                i = k;
            }
        }
        let bi = b2[i].sqrt();
        let (c12, c21) = (c[(0, 1)], c[(1, 0)]);
        let (c13, c31) = (c[(0, 2)], c[(2, 0)]);
        let (c23, c32) = (c[(1, 2)], c[(2, 1)]);
        let mut b = match i {
            0 => [bi, (c23 - c32) / (4.0 * bi), (c31 - c13) / (4.0 * bi), (c12 - c21) / (4.0 * bi)],
            1 => [(c23 - c32) / (4.0 * bi), bi, (c12 + c21) / (4.0 * bi), (c31 + c13) / (4.0 * bi)],
            2 => [(c31 - c13) / (4.0 * bi), (c12 + c21) / (4.0 * bi), bi, (c23 + c32) / (4.0 * bi)],
            _ => [(c12 - c21) / (4.0 * bi), (c31 + c13) / (4.0 * bi), (c23 + c32) / (4.0 * bi), bi],
        };
        if b[0] < 0.0 {
            b.iter_mut().for_each(|x| *x = -*x);
        }
        Mrp::new(b[1], b[2], b[3]) * (1.0 / (1.0 + b[0]))
    }
}

impl std::ops::Mul<f64> for Mrp {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}

impl RotationTrait for Mrp {
    fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        RotationMatrix::from(self).rotate(v)
    }

    fn transform(&self, v: &Vector3<f64>) -> Vector3<f64> {
        RotationMatrix::from(self).transform(v)
    }

    fn inv(&self) -> Self {
        Self(-self.0)
    }

    fn identity() -> Self {
        Self(Vector3::zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    fn random_mrp(rng: &mut SmallRng, max_norm: f64) -> Mrp {
        let axis = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        )
        .normalize();
        Mrp(axis * rng.random_range(0.05..max_norm))
    }

    #[test]
    fn test_principal_rotation() {
        let angle: f64 = 1.2;
        let mrp = Mrp::new((angle / 4.0).tan(), 0.0, 0.0);
        let dcm = RotationMatrix::from(&mrp);
        assert_abs_diff_eq!(dcm.value(), RotationMatrix::m1(angle).value(), epsilon = 1e-14);
    }

    #[test]
    fn test_shadow_preserves_rotation() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..200 {
            let mrp = random_mrp(&mut rng, 3.0);
            let shadow = mrp.shadow();
            assert_abs_diff_eq!(
                RotationMatrix::from(&mrp).value(),
                RotationMatrix::from(&shadow).value(),
                epsilon = 1e-12
            );
            if mrp.needs_shadow() {
                assert!(shadow.norm_squared() < 1.0);
            }
        }
    }

    #[test]
    fn test_dcm_round_trip_short_set() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let mrp = random_mrp(&mut rng, 3.0);
            let recovered = Mrp::from(&RotationMatrix::from(&mrp));
            let expected = if mrp.needs_shadow() { mrp.shadow() } else { mrp };
            assert_abs_diff_eq!(recovered.value(), expected.value(), epsilon = 1e-10);
        }
    }

    #[test]
    fn test_derivative_matches_dcm_rate() {
        // [BN]' = -[ω×][BN]
        let mrp = Mrp::new(0.1, -0.3, 0.25);
        let omega = Vector3::new(0.02, -0.01, 0.05);
        let h = 1e-6;
        let plus = Mrp(mrp.0 + h * mrp.derivative(&omega));
        let minus = Mrp(mrp.0 - h * mrp.derivative(&omega));
        let dcm_rate =
            (RotationMatrix::from(&plus).value() - RotationMatrix::from(&minus).value()) / (2.0 * h);
        let expected = -tilde(&omega) * RotationMatrix::from(&mrp).value();
        assert_abs_diff_eq!(dcm_rate, expected, epsilon = 1e-9);
    }
}
