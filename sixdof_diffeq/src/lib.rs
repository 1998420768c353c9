use std::fmt::Debug;

/// Submodules for core ODE system components.
pub mod result;
pub mod rk;
pub mod state;
pub mod tableau;

pub use result::MemoryResult;
pub use rk::RungeKutta;
pub use state::{Integrable, state_vector::StateVector};
pub use tableau::ButcherTableau;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverErrors<E: std::error::Error> {
    #[error("time step must be positive and finite, got {0}")]
    InvalidStep(f64),
    #[error("time span end {1} precedes start {0}")]
    InvalidTimeSpan(f64, f64),
    #[error("{0}")]
    Model(E),
}

/// Trait for defining a dynamical system model that can be numerically integrated.
///
/// Types implementing this trait must define how to compute the derivative (or RHS function)
/// of the ODE at a given time and state.
pub trait OdeModel: Debug {
    type State: Integrable;
    type Error;
    /// Compute the derivative at time `t` and state `state`, storing the result in `derivative`.
    fn f(
        &mut self,
        t: f64,
        state: &Self::State,
        derivative: &mut Self::State,
    ) -> Result<(), Self::Error>;
}

/// A single deterministic step `x(t) -> y = x(t + h)`.
///
/// Implementors may keep scratch buffers between calls but must not carry
/// any other state from one step to the next.
pub trait Integrator<Model: OdeModel>: Debug {
    fn step(
        &mut self,
        model: &mut Model,
        t: f64,
        x: &Model::State,
        h: f64,
        y: &mut Model::State,
    ) -> Result<(), Model::Error>;

    fn name(&self) -> &str;
}

/// Integrates `model` from `tspan.0` to `tspan.1` with fixed steps of `dt`.
/// The final step is shortened to land exactly on `tspan.1`.
pub fn solve_fixed<Model, I>(
    model: &mut Model,
    integrator: &mut I,
    x0: &Model::State,
    tspan: (f64, f64),
    dt: f64,
) -> Result<MemoryResult<Model::State>, SolverErrors<Model::Error>>
where
    Model: OdeModel,
    Model::Error: std::error::Error,
    I: Integrator<Model> + ?Sized,
{
    if !(dt > 0.0 && dt.is_finite()) {
        return Err(SolverErrors::InvalidStep(dt));
    }
    if tspan.1 < tspan.0 {
        return Err(SolverErrors::InvalidTimeSpan(tspan.0, tspan.1));
    }

    // tolerance keeps an exact multiple of dt from gaining a zero-length step
    let n = ((tspan.1 - tspan.0) / dt - 1e-9).ceil().max(0.0) as usize;
    let mut result = MemoryResult::new(n + 1);
    result.insert(tspan.0, x0);

    let mut x = x0.clone();
    let mut y = x0.clone();
    for i in 0..n {
        // t from the step count so round-off doesn't accumulate
        let t = tspan.0 + i as f64 * dt;
        let h = dt.min(tspan.1 - t);
        if h <= 0.0 {
            break;
        }
        integrator
            .step(model, t, &x, h, &mut y)
            .map_err(SolverErrors::Model)?;
        result.insert(t + h, &y);
        x.clone_from(&y);
    }
    Ok(result)
}
