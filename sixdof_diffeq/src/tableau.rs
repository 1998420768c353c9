/// Explicit Runge-Kutta coefficients. `a` is strictly lower triangular.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButcherTableau<const STAGES: usize> {
    pub a: [[f64; STAGES]; STAGES],
    pub b: [f64; STAGES],
    pub c: [f64; STAGES],
}

impl ButcherTableau<1> {
    pub const EULER: Self = Self {
        a: [[0.]],
        b: [1.],
        c: [0.],
    };
}

impl ButcherTableau<2> {
    // Heun's method
    pub const RK2: Self = Self {
        a: [[0., 0.], [1., 0.]],
        b: [1. / 2., 1. / 2.],
        c: [0., 1.],
    };
}

impl ButcherTableau<4> {
    // usage is ButcherTableau::<4>::RK4
    pub const RK4: Self = Self {
        a: [
            [0., 0., 0., 0.],
            [1. / 2., 0., 0., 0.],
            [0., 1. / 2., 0., 0.],
            [0., 0., 1., 0.],
        ],
        b: [1. / 6., 1. / 3., 1. / 3., 1. / 6.],
        c: [0., 1.0 / 2.0, 1.0 / 2.0, 1.0],
    };
}
