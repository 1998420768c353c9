use nalgebra::Vector3;
use rotations::prelude::{EulerAngles, EulerSequence, RotationMatrix};
use serde::{Deserialize, Serialize};

use crate::CelestialErrors;

const KEPLER_TOLERANCE: f64 = 1e-13;
const KEPLER_MAX_ITERATIONS: usize = 50;

/// Elliptic classical orbit elements. Angles in radians.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClassicalElements {
    /// semi-major axis [m]
    pub a: f64,
    pub e: f64,
    pub i: f64,
    /// right ascension of the ascending node
    pub raan: f64,
    /// argument of periapsis
    pub argp: f64,
    /// mean anomaly at epoch
    pub mean_anomaly: f64,
}

impl ClassicalElements {
    pub fn new(
        a: f64,
        e: f64,
        i: f64,
        raan: f64,
        argp: f64,
        mean_anomaly: f64,
    ) -> Result<Self, CelestialErrors> {
        let elements = Self {
            a,
            e,
            i,
            raan,
            argp,
            mean_anomaly,
        };
        elements.validate()?;
        Ok(elements)
    }

    pub fn validate(&self) -> Result<(), CelestialErrors> {
        if !(self.a > 0.0) {
            return Err(CelestialErrors::InvalidSemiMajorAxis(self.a));
        }
        if !(0.0..1.0).contains(&self.e) {
            return Err(CelestialErrors::InvalidEccentricity(self.e));
        }
        Ok(())
    }

    pub fn mean_motion(&self, mu: f64) -> f64 {
        (mu / self.a.powi(3)).sqrt()
    }

    /// Inertial position and velocity `dt` seconds after epoch.
    pub fn to_state(&self, mu: f64, dt: f64) -> Result<(Vector3<f64>, Vector3<f64>), CelestialErrors> {
        self.validate()?;
        let mean_anomaly = self.mean_anomaly + self.mean_motion(mu) * dt;
        let ecc_anomaly = solve_kepler(mean_anomaly, self.e)?;

        let (sin_e, cos_e) = ecc_anomaly.sin_cos();
        let beta = (1.0 - self.e * self.e).sqrt();
        let nu = (beta * sin_e).atan2(cos_e - self.e);
        let (sin_nu, cos_nu) = nu.sin_cos();
        let p = self.a * beta * beta;
        let r = self.a * (1.0 - self.e * cos_e);
        let vp = (mu / p).sqrt();

        let r_perifocal = Vector3::new(r * cos_nu, r * sin_nu, 0.0);
        let v_perifocal = Vector3::new(-vp * sin_nu, vp * (self.e + cos_nu), 0.0);

        // perifocal to inertial is the transpose of the 3-1-3 (raan, i, argp) DCM
        let dcm = RotationMatrix::from(&EulerAngles::new(
            self.raan,
            self.i,
            self.argp,
            EulerSequence::ZXZ,
        ))
        .value()
        .transpose();
        Ok((dcm * r_perifocal, dcm * v_perifocal))
    }
}

/// Eccentric anomaly from mean anomaly by Newton iteration.
pub fn solve_kepler(mean_anomaly: f64, e: f64) -> Result<f64, CelestialErrors> {
    let m = mean_anomaly.rem_euclid(std::f64::consts::TAU);
    let mut ecc_anomaly = if e < 0.8 { m } else { std::f64::consts::PI };
    for _ in 0..KEPLER_MAX_ITERATIONS {
        let delta = (ecc_anomaly - e * ecc_anomaly.sin() - m) / (1.0 - e * ecc_anomaly.cos());
        ecc_anomaly -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            return Ok(ecc_anomaly);
        }
    }
    Err(CelestialErrors::KeplerNotConverged(mean_anomaly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use utilities::assert_equal_reltol;

    const MU: f64 = 3.986004415e14;

    #[test]
    fn test_kepler_residual() {
        for &e in &[0.0, 0.1, 0.5, 0.9, 0.99] {
            for k in 0..12 {
                let m = -3.0 + 0.7 * k as f64;
                let big_e = solve_kepler(m, e).unwrap();
                let residual = big_e - e * big_e.sin() - m.rem_euclid(std::f64::consts::TAU);
                assert_abs_diff_eq!(residual, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_periapsis_state() {
        let elements = ClassicalElements::new(7e6, 0.1, 0.0, 0.0, 0.0, 0.0).unwrap();
        let (r, v) = elements.to_state(MU, 0.0).unwrap();
        assert_abs_diff_eq!(r, Vector3::new(6.3e6, 0.0, 0.0), epsilon = 1e-6);
        let vp = (MU * (1.0 + 0.1) / 6.3e6).sqrt();
        assert_equal_reltol(v[1], vp, 1e-12);
        assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inclined_node() {
        // at the ascending node the velocity is tilted out of the equator by i
        let i = 0.6;
        let elements = ClassicalElements::new(7e6, 0.0, i, 0.4, 0.0, 0.0).unwrap();
        let (r, v) = elements.to_state(MU, 0.0).unwrap();
        assert_abs_diff_eq!(r[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r.normalize(), Vector3::new(0.4f64.cos(), 0.4f64.sin(), 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!((v[2] / v.norm()).asin(), i, epsilon = 1e-12);
    }

    #[test]
    fn test_energy_and_momentum_constant() {
        let elements = ClassicalElements::new(2.4e7, 0.7, 0.5, 1.0, 2.0, 0.1).unwrap();
        let (r0, v0) = elements.to_state(MU, 0.0).unwrap();
        let energy0 = 0.5 * v0.norm_squared() - MU / r0.norm();
        let h0 = r0.cross(&v0);
        for k in 1..10 {
            let (r, v) = elements.to_state(MU, 1234.5 * k as f64).unwrap();
            assert_equal_reltol(0.5 * v.norm_squared() - MU / r.norm(), energy0, 1e-11);
            assert_abs_diff_eq!(r.cross(&v), h0, epsilon = 1e-9 * h0.norm());
        }
        assert_equal_reltol(energy0, -MU / (2.0 * 2.4e7), 1e-11);
    }

    #[test]
    fn test_rejects_non_elliptic() {
        assert!(matches!(
            ClassicalElements::new(7e6, 1.0, 0.0, 0.0, 0.0, 0.0),
            Err(CelestialErrors::InvalidEccentricity(_))
        ));
        assert!(matches!(
            ClassicalElements::new(-7e6, 0.5, 0.0, 0.0, 0.0, 0.0),
            Err(CelestialErrors::InvalidSemiMajorAxis(_))
        ));
    }
}
