use std::ops::{AddAssign, Deref, DerefMut, MulAssign};

use super::Integrable;

/// A dynamic-sized vector type for use in ODE solvers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateVector(Vec<f64>);

impl StateVector {
    pub fn new(value: Vec<f64>) -> Self {
        Self(value)
    }

    pub fn zeros(n: usize) -> Self {
        Self(vec![0.0; n])
    }

    /// Resizes to `n` elements and sets every element to zero.
    pub fn reset(&mut self, n: usize) {
        self.0.clear();
        self.0.resize(n, 0.0);
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }

    /// Index of the first NaN or infinite element.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.0.iter().position(|x| !x.is_finite())
    }
}

impl AddAssign<&Self> for StateVector {
    /// Element-wise addition.
    ///
    /// # Panics
    ///
    /// Panics if the vectors have different lengths.
    fn add_assign(&mut self, rhs: &Self) {
        assert_eq!(
            self.0.len(),
            rhs.0.len(),
            "state vectors do not have same length"
        );
        self.0
            .iter_mut()
            .zip(rhs.0.iter())
            .for_each(|(a, b)| *a += b);
    }
}

impl MulAssign<f64> for StateVector {
    fn mul_assign(&mut self, rhs: f64) {
        self.0.iter_mut().for_each(|a| *a *= rhs);
    }
}

impl Deref for StateVector {
    type Target = Vec<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StateVector {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<f64>> for StateVector {
    fn from(value: Vec<f64>) -> Self {
        Self(value)
    }
}

impl Integrable for StateVector {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let mut a = StateVector::new(vec![1.0, 2.0, 3.0]);
        let b = StateVector::new(vec![0.5, 0.5, 0.5]);
        a += &b;
        a *= 2.0;
        assert_eq!(*a, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_non_finite() {
        let mut a = StateVector::zeros(4);
        assert!(a.is_finite());
        a[2] = f64::NAN;
        assert_eq!(a.first_non_finite(), Some(2));
        a.reset(3);
        assert_eq!(a.len(), 3);
        assert!(a.is_finite());
    }

    #[test]
    #[should_panic]
    fn test_length_mismatch() {
        let mut a = StateVector::zeros(2);
        a += &StateVector::zeros(3);
    }
}
