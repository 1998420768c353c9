use std::{
    fmt::Debug,
    ops::{AddAssign, MulAssign},
};

pub mod state_vector;

/// Trait representing an integrable state for use in ODE solvers.
///
/// The derivative of a state is a value of the same type.
pub trait Integrable: Clone + Default + Debug + MulAssign<f64> + for<'a> AddAssign<&'a Self> {}

impl Integrable for f64 {}
