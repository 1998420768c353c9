use log::{debug, warn};
use mass_properties::MassPart;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Coordinate, EffectorContext, EffectorModel, EffectorTelemetry, PartState,
};
use crate::state_map::{EffectorStates, EffectorStatesMut, StateKind};

#[derive(Debug, Error)]
pub enum FuelTankErrors {
    #[error("tank '{0}': initial mass must not be negative")]
    NegativeMass(String),
    #[error("tank '{0}': radius must be greater than 0")]
    NonPositiveRadius(String),
    #[error("tank '{0}': slosh mass fractions must be in [0, 1] and sum to at most 1")]
    InvalidMassFraction(String),
    #[error("tank '{0}': slosh direction must be nonzero")]
    ZeroSloshDirection(String),
    #[error("tank '{0}': slosh stiffness and damping must not be negative")]
    NegativeSpringDamper(String),
}

/// Inertia of the propellant that moves with the tank.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub enum TankModel {
    /// no inertia about its own center of mass
    Point,
    /// uniform sphere of fixed radius [m]
    ConstantVolume { radius: f64 },
    /// uniform sphere whose radius scales with the cube root of mass
    ConstantDensity { initial_radius: f64 },
}

impl TankModel {
    /// Scalar inertia and its rate for `mass` out of `initial_mass`, flowing at `mass_rate`.
    fn inertia(&self, mass: f64, initial_mass: f64, mass_rate: f64) -> (f64, f64) {
        match *self {
            Self::Point => (0.0, 0.0),
            Self::ConstantVolume { radius } => {
                let r2 = radius * radius;
                (0.4 * mass * r2, 0.4 * mass_rate * r2)
            }
            Self::ConstantDensity { initial_radius } => {
                if initial_mass <= 0.0 {
                    return (0.0, 0.0);
                }
                let radius = initial_radius * (mass.max(0.0) / initial_mass).cbrt();
                let r2 = radius * radius;
                // d/dt (⅖ m R²) with R ∝ m^⅓
                (0.4 * mass * r2, 2.0 / 3.0 * mass_rate * r2)
            }
        }
    }
}

/// Point mass on a spring along a fixed direction.
///
/// Stiffness and damping are given for the full tank and scale with the
/// remaining propellant, so the slosh frequency stays fixed as the tank drains.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SloshParticle {
    /// share of the current tank mass
    mass_fraction: f64,
    /// rest position relative to the tank location
    rest_position: Vector3<f64>,
    direction: Vector3<f64>,
    stiffness: f64,
    damping: f64,
    rho_0: f64,
    rho_dot_0: f64,
}

impl SloshParticle {
    pub fn new(
        mass_fraction: f64,
        rest_position: Vector3<f64>,
        direction: Vector3<f64>,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self {
            mass_fraction,
            rest_position,
            direction,
            stiffness,
            damping,
            rho_0: 0.0,
            rho_dot_0: 0.0,
        }
    }

    pub fn with_initial_displacement(mut self, rho: f64, rho_dot: f64) -> Self {
        self.rho_0 = rho;
        self.rho_dot_0 = rho_dot;
        self
    }
}

/// Propellant tank, optionally with slosh particles.
///
/// States are (ρ, ρ̇) per particle and the tank mass. Propellant draw is set
/// by the thrusters feeding from this tank at every evaluation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FuelTank {
    pub name: String,
    location: Vector3<f64>,
    initial_mass: f64,
    model: TankModel,
    slosh: Vec<SloshParticle>,
    #[serde(skip)]
    consumption: f64,
    #[serde(skip)]
    depleted: bool,
}

impl FuelTank {
    pub fn new(
        name: &str,
        location: Vector3<f64>,
        initial_mass: f64,
        model: TankModel,
    ) -> Result<Self, FuelTankErrors> {
        if !(initial_mass >= 0.0) {
            return Err(FuelTankErrors::NegativeMass(name.to_string()));
        }
        let radius = match model {
            TankModel::Point => 1.0,
            TankModel::ConstantVolume { radius } => radius,
            TankModel::ConstantDensity { initial_radius } => initial_radius,
        };
        if !(radius > 0.0) {
            return Err(FuelTankErrors::NonPositiveRadius(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            location,
            initial_mass,
            model,
            slosh: Vec::new(),
            consumption: 0.0,
            depleted: initial_mass == 0.0,
        })
    }

    pub fn with_slosh(mut self, particle: SloshParticle) -> Result<Self, FuelTankErrors> {
        let f = particle.mass_fraction;
        let total: f64 = self.slosh.iter().map(|p| p.mass_fraction).sum::<f64>() + f;
        if !(0.0..=1.0).contains(&f) || total > 1.0 {
            return Err(FuelTankErrors::InvalidMassFraction(self.name));
        }
        if particle.stiffness < 0.0 || particle.damping < 0.0 {
            return Err(FuelTankErrors::NegativeSpringDamper(self.name));
        }
        let norm = particle.direction.norm();
        if !(norm > f64::EPSILON) {
            return Err(FuelTankErrors::ZeroSloshDirection(self.name));
        }
        self.slosh.push(SloshParticle {
            direction: particle.direction / norm,
            ..particle
        });
        Ok(self)
    }

    pub fn is_depleted(&self) -> bool {
        self.depleted
    }

    /// Sets the draw of all feeding thrusters [kg/s], positive when consuming.
    pub(crate) fn set_consumption(&mut self, consumption: f64) {
        self.consumption = consumption;
    }

    pub fn mass(states: &EffectorStates<'_>) -> f64 {
        states
            .get(StateKind::TankMass)
            .first()
            .copied()
            .unwrap_or_default()
    }

    fn rigid_fraction(&self) -> f64 {
        1.0 - self.slosh.iter().map(|p| p.mass_fraction).sum::<f64>()
    }
}

impl EffectorModel for FuelTank {
    fn name(&self) -> &str {
        &self.name
    }

    fn state_blocks(&self) -> Vec<(StateKind, usize)> {
        vec![
            (StateKind::Slosh, 2 * self.slosh.len()),
            (StateKind::TankMass, 1),
        ]
    }

    fn to_body_frame(&mut self, structure_to_body: &Matrix3<f64>) {
        self.location = structure_to_body * self.location;
        for particle in &mut self.slosh {
            particle.rest_position = structure_to_body * particle.rest_position;
            particle.direction = (structure_to_body * particle.direction).normalize();
        }
    }

    fn initial_state(&self, states: &mut EffectorStatesMut<'_>) {
        let slosh = states.get_mut(StateKind::Slosh);
        for (x, particle) in slosh.chunks_exact_mut(2).zip(&self.slosh) {
            x[0] = particle.rho_0;
            x[1] = particle.rho_dot_0;
        }
        if let Some(mass) = states.get_mut(StateKind::TankMass).first_mut() {
            *mass = self.initial_mass;
        }
    }

    fn mass_parts(&self, states: &EffectorStates<'_>, parts: &mut Vec<PartState>) {
        let mass = Self::mass(states).max(0.0);
        let mass_rate = -self.consumption;

        let fraction = self.rigid_fraction();
        let (inertia, inertia_rate) =
            self.model
                .inertia(fraction * mass, fraction * self.initial_mass, fraction * mass_rate);
        let mut rigid = MassPart::rigid(
            fraction * mass,
            self.location,
            Matrix3::from_diagonal_element(inertia),
        );
        rigid.inertia_rate = Matrix3::from_diagonal_element(inertia_rate);
        rigid.mass_rate = fraction * mass_rate;
        rigid.is_propellant = true;
        parts.push(PartState::fixed(rigid));

        let scale = if self.initial_mass > 0.0 {
            mass / self.initial_mass
        } else {
            0.0
        };
        let index = states.offset(StateKind::Slosh).unwrap_or_default();
        let slosh = states.get(StateKind::Slosh);
        for (k, (x, particle)) in slosh.chunks_exact(2).zip(&self.slosh).enumerate() {
            let (rho, rho_dot) = (x[0], x[1]);
            let position = self.location + particle.rest_position + rho * particle.direction;
            let mut part = MassPart::point(particle.mass_fraction * mass, position);
            part.mass_rate = particle.mass_fraction * mass_rate;
            part.is_propellant = true;
            parts.push(PartState {
                part,
                velocity: rho_dot * particle.direction,
                angular_velocity: Vector3::zeros(),
                coordinate: Some(Coordinate {
                    kind: StateKind::Slosh,
                    index: index + 2 * k,
                    q: rho,
                    q_dot: rho_dot,
                    stiffness: scale * particle.stiffness,
                    damping: scale * particle.damping,
                    q_ref: 0.0,
                    q_dot_ref: 0.0,
                    linear: particle.direction,
                    angular: Vector3::zeros(),
                    bias: Vector3::zeros(),
                }),
            });
        }
    }

    fn write_derivatives(
        &self,
        _ctx: &EffectorContext,
        _states: &EffectorStates<'_>,
        derivatives: &mut EffectorStatesMut<'_>,
    ) {
        if let Some(dm) = derivatives.get_mut(StateKind::TankMass).first_mut() {
            *dm = -self.consumption;
        }
    }

    fn project_state(&self, states: &mut EffectorStatesMut<'_>) {
        if let Some(mass) = states.get_mut(StateKind::TankMass).first_mut() {
            if *mass < 0.0 {
                debug!("tank '{}' mass {} restored to 0", self.name, *mass);
                *mass = 0.0;
            }
        }
    }

    fn post_step(&mut self, states: &EffectorStates<'_>) {
        let empty = FuelTank::mass(states) <= 0.0;
        if empty && !self.depleted {
            warn!("tank '{}' depleted", self.name);
        }
        self.depleted = empty;
    }

    fn telemetry(&self, _ctx: &EffectorContext, states: &EffectorStates<'_>) -> EffectorTelemetry {
        EffectorTelemetry::FuelTank {
            mass: Self::mass(states),
            mass_rate: -self.consumption,
            depleted: self.depleted,
            slosh: states
                .get(StateKind::Slosh)
                .chunks_exact(2)
                .map(|x| x[0])
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::test_support::{context, pack};
    use approx::assert_abs_diff_eq;
    use mass_properties::CompositeMassProperties;

    fn tank() -> FuelTank {
        FuelTank::new(
            "tank",
            Vector3::new(0.0, 0.0, -0.5),
            40.0,
            TankModel::ConstantVolume { radius: 0.5 },
        )
        .unwrap()
    }

    #[test]
    fn test_validation() {
        assert!(FuelTank::new("t", Vector3::zeros(), -1.0, TankModel::Point).is_err());
        assert!(
            FuelTank::new("t", Vector3::zeros(), 1.0, TankModel::ConstantVolume { radius: 0.0 })
                .is_err()
        );
        let slosh = SloshParticle::new(0.6, Vector3::zeros(), Vector3::x(), 1.0, 0.1);
        let full = tank().with_slosh(slosh.clone()).unwrap();
        // fractions would sum past one
        assert!(full.with_slosh(slosh).is_err());
        let bad = SloshParticle::new(0.1, Vector3::zeros(), Vector3::zeros(), 1.0, 0.1);
        assert!(tank().with_slosh(bad).is_err());
    }

    #[test]
    fn test_inertia_models() {
        let (i, di) = TankModel::ConstantVolume { radius: 0.5 }.inertia(40.0, 40.0, -1.0);
        assert_abs_diff_eq!(i, 4.0, epsilon = 1e-14);
        assert_abs_diff_eq!(di, -0.1, epsilon = 1e-15);

        // an eighth of the mass halves the radius
        let model = TankModel::ConstantDensity { initial_radius: 0.5 };
        let (i, di) = model.inertia(5.0, 40.0, -1.0);
        assert_abs_diff_eq!(i, 0.4 * 5.0 * 0.0625, epsilon = 1e-14);
        assert_abs_diff_eq!(di, -2.0 / 3.0 * 0.0625, epsilon = 1e-15);

        // finite difference of the inertia against the reported rate
        let h = 1e-6;
        let (i0, di) = model.inertia(20.0, 40.0, -1.0);
        let (i1, _) = model.inertia(20.0 - h, 40.0, -1.0);
        assert_abs_diff_eq!((i1 - i0) / h, di, epsilon = 1e-6);

        assert_eq!(TankModel::Point.inertia(10.0, 10.0, -1.0), (0.0, 0.0));
    }

    #[test]
    fn test_mass_split_with_slosh() {
        let tank = tank()
            .with_slosh(
                SloshParticle::new(0.25, Vector3::new(0.1, 0.0, 0.0), Vector3::y(), 10.0, 1.0)
                    .with_initial_displacement(0.05, 0.0),
            )
            .unwrap();
        let (map, x) = pack(&tank);
        let states = EffectorStates::new(&x, &map, 0);
        let mut parts = Vec::new();
        tank.mass_parts(&states, &mut parts);

        assert_eq!(parts.len(), 2);
        assert_abs_diff_eq!(parts[0].part.mass, 30.0, epsilon = 1e-12);
        assert_abs_diff_eq!(parts[1].part.mass, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            parts[1].part.position,
            Vector3::new(0.1, 0.05, -0.5),
            epsilon = 1e-15
        );
        let q = parts[1].coordinate.unwrap();
        assert_eq!(q.index, 12);
        assert_eq!(q.stiffness, 10.0);
        assert_eq!(FuelTank::mass(&states), 40.0);

        let composite = CompositeMassProperties::from_parts(
            [&MassPart::rigid(100.0, Vector3::zeros(), Matrix3::identity())]
                .into_iter()
                .chain(parts.iter().map(|p| &p.part)),
        )
        .unwrap();
        assert_abs_diff_eq!(composite.mass, 140.0, epsilon = 1e-12);
        assert_abs_diff_eq!(composite.dry_mass, 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_slosh_spring_scales_with_mass() {
        let tank = tank()
            .with_slosh(SloshParticle::new(0.5, Vector3::zeros(), Vector3::x(), 8.0, 2.0))
            .unwrap();
        let (map, mut x) = pack(&tank);
        let mass_index = map.block(0, StateKind::TankMass).unwrap().range.start;
        x[mass_index] = 10.0;
        let mut parts = Vec::new();
        tank.mass_parts(&EffectorStates::new(&x, &map, 0), &mut parts);
        let q = parts[1].coordinate.unwrap();
        assert_abs_diff_eq!(parts[1].part.mass, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q.stiffness, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q.damping, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_consumption_and_depletion() {
        let mut tank = tank();
        tank.set_consumption(0.5);
        let (map, mut x) = pack(&tank);
        let ctx = context(Vector3::zeros());

        let mut dx = vec![0.0; map.dimension()];
        tank.write_derivatives(
            &ctx,
            &EffectorStates::new(&x, &map, 0),
            &mut EffectorStatesMut::new(&mut dx, &map, 0),
        );
        assert_eq!(dx[12], -0.5);

        x[12] = -1e-3;
        tank.project_state(&mut EffectorStatesMut::new(&mut x, &map, 0));
        assert_eq!(x[12], 0.0);
        // only an accepted step flips the flag
        assert!(!tank.is_depleted());
        tank.post_step(&EffectorStates::new(&x, &map, 0));
        assert!(tank.is_depleted());
    }
}
