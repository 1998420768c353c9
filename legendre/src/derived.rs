use crate::LegendreErrors;

/// Fully normalized derived Legendre functions Ā_nm(u) of the Pines formulation.
///
/// Ā_nm is a polynomial in u = z/r, so the recursion has no singularity at the
/// poles. The table is filled one degree beyond the requested degree because
/// the acceleration partials reference Ā_(n+1),(m+1).
#[derive(Debug, Clone)]
pub struct DerivedLegendre {
    pub a: Vec<Vec<f64>>,
    degree: usize,
    n1: Vec<Vec<f64>>,
    n2: Vec<Vec<f64>>,
    sub_diagonal: Vec<f64>,
}

fn k(m: usize) -> f64 {
    if m == 0 { 1.0 } else { 2.0 }
}

impl DerivedLegendre {
    pub fn new(degree: usize) -> Self {
        let size = degree + 2;
        let mut a = vec![vec![0.0; size]; size];
        let mut n1 = vec![vec![0.0; size]; size];
        let mut n2 = vec![vec![0.0; size]; size];
        let mut sub_diagonal = vec![0.0; size];

        // the diagonal does not depend on u
        a[0][0] = 1.0;
        for l in 1..size {
            let lf = l as f64;
            a[l][l] = ((2.0 * lf + 1.0) * k(l) / (2.0 * lf * k(l - 1))).sqrt() * a[l - 1][l - 1];
            sub_diagonal[l] = (2.0 * lf * k(l - 1) / k(l)).sqrt();
        }

        for l in 2..size {
            let lf = l as f64;
            for m in 0..=(l - 2) {
                let mf = m as f64;
                n1[l][m] = ((2.0 * lf + 1.0) * (2.0 * lf - 1.0) / ((lf - mf) * (lf + mf))).sqrt();
                n2[l][m] = ((lf + mf - 1.0) * (2.0 * lf + 1.0) * (lf - mf - 1.0)
                    / ((lf + mf) * (lf - mf) * (2.0 * lf - 3.0)))
                    .sqrt();
            }
        }

        Self {
            a,
            degree,
            n1,
            n2,
            sub_diagonal,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn calculate(&mut self, u: f64) -> Result<(), LegendreErrors> {
        if !(-1.0..=1.0).contains(&u) {
            return Err(LegendreErrors::ValueOutOfRange);
        }
        let size = self.degree + 2;
        let a = &mut self.a;
        for l in 1..size {
            a[l][l - 1] = self.sub_diagonal[l] * a[l][l] * u;
        }
        for m in 0..size {
            for l in (m + 2)..size {
                a[l][m] = u * self.n1[l][m] * a[l - 1][m] - self.n2[l][m] * a[l - 2][m];
            }
        }
        Ok(())
    }
}
