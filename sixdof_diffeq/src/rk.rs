use std::array;

use crate::{Integrable, Integrator, OdeModel, tableau::ButcherTableau};

/// Explicit fixed-step Runge-Kutta stepper with preallocated stage buffers.
#[derive(Debug)]
pub struct RungeKutta<State: Integrable, const STAGES: usize> {
    tableau: ButcherTableau<STAGES>,
    name: &'static str,
    k: [State; STAGES],
    state: State,
    derivative: State,
}

impl<State: Integrable, const STAGES: usize> RungeKutta<State, STAGES> {
    pub fn new(tableau: ButcherTableau<STAGES>, name: &'static str) -> Self {
        Self {
            tableau,
            name,
            k: array::from_fn(|_| State::default()),
            state: State::default(),
            derivative: State::default(),
        }
    }

    // self.derivative = k[i] * scale, reusing the buffer's allocation
    fn scaled_stage(&mut self, i: usize, scale: f64) {
        self.derivative.clone_from(&self.k[i]);
        self.derivative *= scale;
    }
}

impl<State: Integrable> RungeKutta<State, 1> {
    pub fn euler() -> Self {
        Self::new(ButcherTableau::<1>::EULER, "euler")
    }
}

impl<State: Integrable> RungeKutta<State, 2> {
    pub fn rk2() -> Self {
        Self::new(ButcherTableau::<2>::RK2, "rk2")
    }
}

impl<State: Integrable> RungeKutta<State, 4> {
    pub fn rk4() -> Self {
        Self::new(ButcherTableau::<4>::RK4, "rk4")
    }
}

impl<State: Integrable> Default for RungeKutta<State, 4> {
    fn default() -> Self {
        Self::rk4()
    }
}

impl<Model, State, const STAGES: usize> Integrator<Model> for RungeKutta<State, STAGES>
where
    Model: OdeModel<State = State>,
    State: Integrable,
{
    fn step(
        &mut self,
        model: &mut Model,
        t: f64,
        x: &State,
        h: f64,
        y: &mut State,
    ) -> Result<(), Model::Error> {
        // k0
        model.f(t, x, &mut self.k[0])?;

        // k1 - ks
        for s in 1..STAGES {
            // intermediate point starts from x so no buffer is ever scaled by zero
            self.state.clone_from(x);
            for i in 0..s {
                let a = self.tableau.a[s][i];
                if a != 0.0 {
                    self.scaled_stage(i, a * h);
                    self.state += &self.derivative;
                }
            }
            model.f(t + self.tableau.c[s] * h, &self.state, &mut self.k[s])?;
        }

        y.clone_from(x);
        for s in 0..STAGES {
            let b = self.tableau.b[s];
            if b != 0.0 {
                self.scaled_stage(s, b * h);
                *y += &self.derivative;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.name
    }
}
