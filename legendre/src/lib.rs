use thiserror::Error;
use utilities::factorial_ratio;

mod derived;
pub use derived::DerivedLegendre;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LegendreNormalization {
    /// Geodesy (4π) normalization used by published gravity coefficient tables.
    #[default]
    FourPi,
    Unnormalized,
}

#[derive(Error, Debug)]
pub enum LegendreErrors {
    #[error("order must be less than or equal to degree")]
    OrderGreaterThanDegree,
    #[error("value must be between -1 and 1 inclusive")]
    ValueOutOfRange,
}

/// Geodesy normalization factor N_nm = sqrt((2 - δ_m0)(2n + 1)(n - m)!/(n + m)!).
///
/// An unnormalized coefficient C_nm becomes the normalized C̄_nm = C_nm / N_nm.
pub fn normalization_factor(n: usize, m: usize) -> Result<f64, LegendreErrors> {
    if m > n {
        return Err(LegendreErrors::OrderGreaterThanDegree);
    }
    let delta = if m == 0 { 1.0 } else { 0.0 };
    Ok(((2.0 - delta) * (2.0 * n as f64 + 1.0) * factorial_ratio(n as u32, m as u32)).sqrt())
}

/// Associated Legendre functions P_nm(x) without the Condon-Shortley phase.
#[derive(Debug, Clone, Default)]
pub struct Legendre {
    pub p: Vec<Vec<f64>>,
    degree: usize,
    order: usize,
    normalization: LegendreNormalization,
    norm: Vec<Vec<f64>>,
}

impl Legendre {
    pub fn new(degree: usize, order: usize) -> Result<Self, LegendreErrors> {
        if order > degree {
            return Err(LegendreErrors::OrderGreaterThanDegree);
        }
        let mut p = vec![vec![0.0; order + 1]; degree + 1];
        p[0][0] = 1.0;
        let norm = vec![vec![1.0; order + 1]; degree + 1];

        Ok(Self {
            p,
            degree,
            order,
            normalization: LegendreNormalization::Unnormalized,
            norm,
        })
    }

    pub fn with_normalization(
        mut self,
        normalization: LegendreNormalization,
    ) -> Result<Self, LegendreErrors> {
        for l in 0..=self.degree {
            for m in 0..=l.min(self.order) {
                self.norm[l][m] = match normalization {
                    LegendreNormalization::Unnormalized => 1.0,
                    LegendreNormalization::FourPi => normalization_factor(l, m)?,
                };
            }
        }
        self.normalization = normalization;
        Ok(self)
    }

    pub fn normalization(&self) -> LegendreNormalization {
        self.normalization
    }

    pub fn calculate(&mut self, x: f64) -> Result<(), LegendreErrors> {
        if !(-1.0..=1.0).contains(&x) {
            return Err(LegendreErrors::ValueOutOfRange);
        }
        let cos_phi = (1.0 - x * x).sqrt();
        let p = &mut self.p;
        p[0][0] = 1.0;
        if self.degree == 0 {
            return Ok(());
        }
        p[1][0] = x;
        if self.order > 0 {
            p[1][1] = cos_phi;
        }

        for l in 2..=self.degree {
            let lf = l as f64;
            for m in 0..=l.min(self.order) {
                p[l][m] = if m == 0 {
                    ((2.0 * lf - 1.0) * x * p[l - 1][0] - (lf - 1.0) * p[l - 2][0]) / lf
                } else if m == l {
                    (2.0 * lf - 1.0) * cos_phi * p[l - 1][m - 1]
                } else {
                    p[l - 2][m] + (2.0 * lf - 1.0) * cos_phi * p[l - 1][m - 1]
                };
            }
        }

        for l in 0..=self.degree {
            for m in 0..=l.min(self.order) {
                p[l][m] *= self.norm[l][m];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utilities::assert_equal;

    #[test]
    fn test_legendre_unnormalized() {
        let mut legendre = Legendre::new(10, 10).unwrap();
        legendre.calculate(0.5).unwrap();

        assert_equal(legendre.p[0][0], 1.0);
        assert_equal(legendre.p[1][0], 0.5);
        assert_equal(legendre.p[1][1], 0.8660254037844386);
        assert_equal(legendre.p[2][0], -0.125);
        assert_equal(legendre.p[2][1], 1.299038105676658);
        assert_equal(legendre.p[2][2], 2.25);
        assert_equal(legendre.p[6][0], 0.3232421875);
        assert_equal(legendre.p[6][3], -12.787406352754603);
        assert_equal(legendre.p[10][0], -0.18822860717773438);
        assert_equal(legendre.p[10][3], 259.1875968441698);
        assert_equal(legendre.p[10][10], 1.55370278540039e8);
    }

    #[test]
    fn test_legendre_four_pi() {
        let mut legendre = Legendre::new(4, 4)
            .unwrap()
            .with_normalization(LegendreNormalization::FourPi)
            .unwrap();
        let x: f64 = 0.3;
        legendre.calculate(x).unwrap();

        assert_equal(legendre.p[0][0], 1.0);
        assert_equal(legendre.p[1][0], 3.0_f64.sqrt() * x);
        assert_equal(legendre.p[2][0], 5.0_f64.sqrt() * (3.0 * x * x - 1.0) / 2.0);
        // P22 = 3(1 - x^2), N22 = sqrt(2*5*0!/4!)
        assert_equal(legendre.p[2][2], (10.0_f64 / 24.0).sqrt() * 3.0 * (1.0 - x * x));
    }

    #[test]
    fn test_normalization_factor() {
        assert_equal(normalization_factor(0, 0).unwrap(), 1.0);
        assert_equal(normalization_factor(2, 0).unwrap(), 5.0_f64.sqrt());
        assert_equal(normalization_factor(2, 1).unwrap(), (10.0_f64 / 6.0).sqrt());
        assert!(normalization_factor(2, 3).is_err());
    }

    #[test]
    fn test_out_of_range() {
        let mut legendre = Legendre::new(3, 3).unwrap();
        assert!(legendre.calculate(1.5).is_err());
        assert!(Legendre::new(2, 3).is_err());
    }
}
