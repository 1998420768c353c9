use legendre::{DerivedLegendre, Legendre, LegendreNormalization};
use nalgebra::Vector3;

use crate::{GravityCoefficients, SphericalHarmonicsErrors};

fn k(m: usize) -> f64 {
    if m == 0 { 1.0 } else { 2.0 }
}

/// Pines (singularity free) evaluator of the non-spherical gravity field.
///
/// Holds only scratch buffers, so one coefficient table can be shared by
/// several evaluators.
#[derive(Clone, Debug)]
pub struct SphericalHarmonics {
    degree: usize,
    derived: DerivedLegendre,
    legendre: Legendre,
    n_quot_1: Vec<Vec<f64>>,
    n_quot_2: Vec<Vec<f64>>,
    re: Vec<f64>,
    im: Vec<f64>,
}

impl Default for SphericalHarmonics {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SphericalHarmonics {
    pub fn new(degree: usize) -> Self {
        let size = degree + 2;
        let mut n_quot_1 = vec![vec![0.0; size]; size];
        let mut n_quot_2 = vec![vec![0.0; size]; size];
        for l in 0..size {
            let lf = l as f64;
            for m in 0..=l {
                let mf = m as f64;
                if m < l {
                    n_quot_1[l][m] = ((lf - mf) * k(m) * (lf + mf + 1.0) / k(m + 1)).sqrt();
                }
                n_quot_2[l][m] = ((lf + mf + 2.0) * (lf + mf + 1.0) * (2.0 * lf + 1.0) * k(m)
                    / ((2.0 * lf + 3.0) * k(m + 1)))
                    .sqrt();
            }
        }

        // degree and order are equal so this cannot fail
        let legendre = Legendre::new(degree, degree)
            .and_then(|l| l.with_normalization(LegendreNormalization::FourPi))
            .unwrap_or_default();

        Self {
            degree,
            derived: DerivedLegendre::new(degree),
            legendre,
            n_quot_1,
            n_quot_2,
            re: vec![0.0; size],
            im: vec![0.0; size],
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    fn check_degree(
        &self,
        coefficients: &GravityCoefficients,
        degree: usize,
    ) -> Result<(), SphericalHarmonicsErrors> {
        if degree > coefficients.max_degree() {
            return Err(SphericalHarmonicsErrors::DegreeExceedsTable {
                requested: degree,
                loaded: coefficients.max_degree(),
            });
        }
        if degree > self.degree {
            return Err(SphericalHarmonicsErrors::DegreeExceedsEvaluator {
                requested: degree,
                allocated: self.degree,
            });
        }
        Ok(())
    }

    /// Acceleration from degrees 1..=`degree` at planet-fixed position `r`.
    ///
    /// The point mass term is not included.
    pub fn calculate(
        &mut self,
        r: &Vector3<f64>,
        coefficients: &GravityCoefficients,
        degree: usize,
    ) -> Result<Vector3<f64>, SphericalHarmonicsErrors> {
        self.check_degree(coefficients, degree)?;
        let r_mag = r.norm();
        if r_mag < f64::EPSILON || !r_mag.is_finite() {
            return Err(SphericalHarmonicsErrors::ZeroPosition);
        }
        let s = r.x / r_mag;
        let t = r.y / r_mag;
        let u = (r.z / r_mag).clamp(-1.0, 1.0);

        self.derived.calculate(u)?;
        let a = &self.derived.a;

        // real and imaginary parts of (s + i t)^m
        self.re[0] = 1.0;
        self.im[0] = 0.0;
        for m in 1..=degree + 1 {
            self.re[m] = s * self.re[m - 1] - t * self.im[m - 1];
            self.im[m] = s * self.im[m - 1] + t * self.re[m - 1];
        }

        let radius = coefficients.reference_radius();
        let rho = radius / r_mag;
        let mut rho_l = coefficients.mu() / r_mag * rho;

        let (mut a1, mut a2, mut a3, mut a4) = (0.0, 0.0, 0.0, 0.0);
        for l in 1..=degree {
            rho_l *= rho;
            let (mut sum_a1, mut sum_a2, mut sum_a3, mut sum_a4) = (0.0, 0.0, 0.0, 0.0);
            for m in 0..=l {
                let c = coefficients.c(l, m);
                let s_nm = coefficients.s(l, m);
                let d = c * self.re[m] + s_nm * self.im[m];
                let (e, f) = if m == 0 {
                    (0.0, 0.0)
                } else {
                    (
                        c * self.re[m - 1] + s_nm * self.im[m - 1],
                        s_nm * self.re[m - 1] - c * self.im[m - 1],
                    )
                };
                let mf = m as f64;
                sum_a1 += mf * a[l][m] * e;
                sum_a2 += mf * a[l][m] * f;
                if m < l {
                    sum_a3 += self.n_quot_1[l][m] * a[l][m + 1] * d;
                }
                sum_a4 += self.n_quot_2[l][m] * a[l + 1][m + 1] * d;
            }
            let factor = rho_l / radius;
            a1 += factor * sum_a1;
            a2 += factor * sum_a2;
            a3 += factor * sum_a3;
            a4 -= factor * sum_a4;
        }

        Ok(Vector3::new(a1 + s * a4, a2 + t * a4, a3 + u * a4))
    }

    /// Disturbing potential from degrees 1..=`degree` (point mass excluded), positive convention.
    pub fn potential(
        &mut self,
        r: &Vector3<f64>,
        coefficients: &GravityCoefficients,
        degree: usize,
    ) -> Result<f64, SphericalHarmonicsErrors> {
        self.check_degree(coefficients, degree)?;
        let r_mag = r.norm();
        if r_mag < f64::EPSILON || !r_mag.is_finite() {
            return Err(SphericalHarmonicsErrors::ZeroPosition);
        }
        let sin_lat = (r.z / r_mag).clamp(-1.0, 1.0);
        let lon = r.y.atan2(r.x);
        self.legendre.calculate(sin_lat)?;
        let p = &self.legendre.p;

        let rho = coefficients.reference_radius() / r_mag;
        let mut rho_l = 1.0;
        let mut sum = 0.0;
        for l in 1..=degree {
            rho_l *= rho;
            for m in 0..=l {
                let mf = m as f64;
                sum += rho_l
                    * p[l][m]
                    * (coefficients.c(l, m) * (mf * lon).cos()
                        + coefficients.s(l, m) * (mf * lon).sin());
            }
        }
        Ok(coefficients.mu() / r_mag * sum)
    }
}
