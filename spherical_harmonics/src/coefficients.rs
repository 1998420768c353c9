use std::io::Read;

use legendre::normalization_factor;
use serde::{Deserialize, Serialize};

use crate::SphericalHarmonicsErrors;

/// Fully normalized gravity coefficients C̄_nm, S̄_nm stored as lower triangular rows.
///
/// Row n holds orders 0..=n. Degree 0 is never evaluated by the harmonics;
/// the point mass term is computed separately by the gravity body.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GravityCoefficients {
    c: Vec<Vec<f64>>,
    s: Vec<Vec<f64>>,
    max_degree: usize,
    reference_radius: f64,
    mu: f64,
}

impl GravityCoefficients {
    /// Builds a table from already normalized coefficients.
    pub fn new(
        c: Vec<Vec<f64>>,
        s: Vec<Vec<f64>>,
        reference_radius: f64,
        mu: f64,
    ) -> Result<Self, SphericalHarmonicsErrors> {
        if mu <= 0.0 {
            return Err(SphericalHarmonicsErrors::NonPositiveMu);
        }
        if reference_radius <= 0.0 {
            return Err(SphericalHarmonicsErrors::NonPositiveRadius);
        }
        if c.is_empty() || c.len() != s.len() {
            return Err(SphericalHarmonicsErrors::MalformedTable);
        }
        for (n, (c_row, s_row)) in c.iter().zip(&s).enumerate() {
            if c_row.len() != n + 1 || s_row.len() != n + 1 {
                return Err(SphericalHarmonicsErrors::MalformedTable);
            }
        }
        let max_degree = c.len() - 1;
        Ok(Self {
            c,
            s,
            max_degree,
            reference_radius,
            mu,
        })
    }

    /// Builds a table from unnormalized coefficients, normalizing each entry.
    pub fn from_unnormalized(
        mut c: Vec<Vec<f64>>,
        mut s: Vec<Vec<f64>>,
        reference_radius: f64,
        mu: f64,
    ) -> Result<Self, SphericalHarmonicsErrors> {
        for (n, (c_row, s_row)) in c.iter_mut().zip(s.iter_mut()).enumerate() {
            for (m, (c_nm, s_nm)) in c_row.iter_mut().zip(s_row.iter_mut()).enumerate() {
                let norm = normalization_factor(n, m)?;
                *c_nm /= norm;
                *s_nm /= norm;
            }
        }
        Self::new(c, s, reference_radius, mu)
    }

    /// Zonal-only table from J_2, J_3, ... (J_n = -C_n0 unnormalized).
    pub fn from_zonal(
        j: &[f64],
        reference_radius: f64,
        mu: f64,
    ) -> Result<Self, SphericalHarmonicsErrors> {
        let max_degree = j.len() + 1;
        let mut c: Vec<Vec<f64>> = (0..=max_degree).map(|n| vec![0.0; n + 1]).collect();
        let s = c.clone();
        c[0][0] = 1.0;
        for (i, jn) in j.iter().enumerate() {
            let n = i + 2;
            c[n][0] = -jn / normalization_factor(n, 0)?;
        }
        Self::new(c, s, reference_radius, mu)
    }

    /// Reads normalized coefficients from CSV records `degree, order, C, S`.
    ///
    /// Records above `max_degree` are skipped, extra columns are ignored.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        max_degree: usize,
        reference_radius: f64,
        mu: f64,
    ) -> Result<Self, SphericalHarmonicsErrors> {
        let mut c: Vec<Vec<f64>> = (0..=max_degree).map(|n| vec![0.0; n + 1]).collect();
        let mut s = c.clone();

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (i, record) in csv_reader.records().enumerate() {
            let record = record?;
            let field = |k: usize| record.get(k).map(str::trim);
            let (Some(n), Some(m), Some(c_nm), Some(s_nm)) = (field(0), field(1), field(2), field(3))
            else {
                return Err(SphericalHarmonicsErrors::MalformedRecord(i));
            };
            let (Ok(n), Ok(m), Ok(c_nm), Ok(s_nm)) = (
                n.parse::<usize>(),
                m.parse::<usize>(),
                c_nm.parse::<f64>(),
                s_nm.parse::<f64>(),
            ) else {
                return Err(SphericalHarmonicsErrors::MalformedRecord(i));
            };
            if m > n {
                return Err(SphericalHarmonicsErrors::MalformedTable);
            }
            if n <= max_degree {
                c[n][m] = c_nm;
                s[n][m] = s_nm;
            }
        }
        Self::new(c, s, reference_radius, mu)
    }

    pub fn c(&self, n: usize, m: usize) -> f64 {
        self.c[n][m]
    }

    pub fn s(&self, n: usize, m: usize) -> f64 {
        self.s[n][m]
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    pub fn reference_radius(&self) -> f64 {
        self.reference_radius
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utilities::assert_equal;

    const RE: f64 = 6378137.0;
    const MU: f64 = 3.986004415e14;

    #[test]
    fn test_from_zonal() {
        let table = GravityCoefficients::from_zonal(&[1.0826e-3, -2.5e-6], RE, MU).unwrap();
        assert_eq!(table.max_degree(), 3);
        assert_equal(table.c(2, 0), -1.0826e-3 / 5.0_f64.sqrt());
        assert_equal(table.c(3, 0), 2.5e-6 / 7.0_f64.sqrt());
        assert_eq!(table.s(3, 0), 0.0);
    }

    #[test]
    fn test_from_unnormalized() {
        let c = vec![vec![1.0], vec![0.0, 0.0], vec![-1.0826e-3, 0.0, 1.5e-6]];
        let s = vec![vec![0.0], vec![0.0, 0.0], vec![0.0, 0.0, -0.9e-6]];
        let table = GravityCoefficients::from_unnormalized(c, s, RE, MU).unwrap();
        assert_equal(table.c(2, 0), -1.0826e-3 / 5.0_f64.sqrt());
        let n22 = (10.0_f64 / 24.0).sqrt();
        assert_equal(table.c(2, 2), 1.5e-6 / n22);
        assert_equal(table.s(2, 2), -0.9e-6 / n22);
    }

    #[test]
    fn test_from_csv() {
        let data = "0,0,1.0,0.0\n2,0,-4.84e-4,0.0\n2,1,-2.0e-10,1.4e-9\n2,2,2.4e-6,-1.4e-6\n3,0,9.5e-7,0.0\n";
        let table = GravityCoefficients::from_csv_reader(data.as_bytes(), 2, RE, MU).unwrap();
        assert_eq!(table.max_degree(), 2);
        assert_equal(table.c(2, 0), -4.84e-4);
        assert_equal(table.s(2, 1), 1.4e-9);
        assert_equal(table.s(2, 2), -1.4e-6);
    }

    #[test]
    fn test_from_csv_malformed() {
        let data = "2,0,abc,0.0\n";
        assert!(matches!(
            GravityCoefficients::from_csv_reader(data.as_bytes(), 2, RE, MU),
            Err(SphericalHarmonicsErrors::MalformedRecord(0))
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        let c = vec![vec![1.0]];
        let s = vec![vec![0.0]];
        assert!(GravityCoefficients::new(c.clone(), s.clone(), RE, -1.0).is_err());
        assert!(GravityCoefficients::new(c, s, 0.0, MU).is_err());
        assert!(GravityCoefficients::new(vec![vec![1.0], vec![0.0]], vec![vec![0.0], vec![0.0]], RE, MU).is_err());
    }
}
