use gravity::{GravityBody, third_body};
use mass_properties::{CompositeMassProperties, MassPart};
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use sixdof_diffeq::{OdeModel, StateVector};

use crate::{
    PropagatorConfig, SixDofErrors, coupled,
    effector::{
        Effector, EffectorContext, EffectorModel, ForceTorque, PartState, fuel_tank::FuelTank,
    },
    state_map::{ATTITUDE, EffectorStates, EffectorStatesMut, POSITION, RATE, StateMap, VELOCITY},
};

/// Quantities from one evaluation of the equations of motion.
#[derive(Clone, Copy, Debug)]
pub struct Evaluation {
    pub context: EffectorContext,
    /// total body frame force on the hub [N]
    pub force: Vector3<f64>,
    /// total torque about the composite center of mass [N-m]
    pub torque: Vector3<f64>,
    /// inertial gravitational acceleration [m/s^2]
    pub gravity: Vector3<f64>,
    pub omega_dot: Vector3<f64>,
    pub coordinate_power: f64,
}

impl Evaluation {
    /// Non-gravitational acceleration of the composite center of mass, body frame.
    pub fn nonconservative_acceleration(&self) -> Vector3<f64> {
        self.force / self.context.mass.mass
    }
}

/// Right-hand side of the composite vehicle state.
///
/// Owns the gravity bodies and effectors so that one evaluation is a pure
/// function of `(t, x)` and the latched commands.
#[derive(Debug)]
pub struct EquationsOfMotion {
    pub(crate) use_translation: bool,
    pub(crate) use_rotation: bool,
    pub(crate) use_gravity: bool,
    /// dry hub in body frame
    pub(crate) dry: MassPart,
    pub(crate) gravity_bodies: Vec<GravityBody>,
    pub(crate) central: Option<usize>,
    pub(crate) effectors: Vec<Effector>,
    pub(crate) map: StateMap,
    /// (thruster set, tank) effector indices
    feeds: Vec<(usize, usize)>,
    draws: Vec<f64>,
    parts: Vec<PartState>,
}

impl EquationsOfMotion {
    pub fn new(config: &PropagatorConfig) -> Self {
        Self {
            use_translation: config.use_translation,
            use_rotation: config.use_rotation,
            use_gravity: config.use_gravity,
            dry: MassPart::rigid(config.dry_mass, config.dry_center_of_mass, config.dry_inertia),
            gravity_bodies: Vec::new(),
            central: None,
            effectors: Vec::new(),
            map: StateMap::default(),
            feeds: Vec::new(),
            draws: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Moves the dry hub and every effector into the body frame.
    pub(crate) fn to_body_frame(&mut self, structure_to_body: &Matrix3<f64>) {
        let dry = &mut self.dry;
        dry.position = structure_to_body * dry.position;
        dry.inertia = structure_to_body * dry.inertia * structure_to_body.transpose();
        for effector in &mut self.effectors {
            effector.to_body_frame(structure_to_body);
        }
    }

    /// Resolves propellant feeds and lays out the packed state.
    pub(crate) fn bind(&mut self) -> Result<(), SixDofErrors> {
        self.feeds.clear();
        for (i, effector) in self.effectors.iter().enumerate() {
            let Effector::Thrusters(set) = effector else {
                continue;
            };
            let Some(tank) = set.tank() else {
                continue;
            };
            let j = self
                .effectors
                .iter()
                .position(|e| matches!(e, Effector::FuelTank(t) if t.name == tank))
                .ok_or_else(|| SixDofErrors::UnknownEffector(tank.to_string()))?;
            self.feeds.push((i, j));
        }

        let requests = self.effectors.iter().enumerate().flat_map(|(i, e)| {
            e.state_blocks()
                .into_iter()
                .map(move |(kind, width)| (i, kind, width))
        });
        self.map = StateMap::build(requests)?;
        for (i, effector) in self.effectors.iter().enumerate() {
            let expected: usize = effector.state_blocks().iter().map(|(_, w)| w).sum();
            let actual = self.map.effector_dimension(i);
            if expected != actual {
                return Err(SixDofErrors::EffectorDimensionMismatch {
                    name: effector.name().to_string(),
                    expected,
                    actual,
                });
            }
        }
        self.draws = vec![0.0; self.effectors.len()];
        Ok(())
    }

    /// Packs the hub state and every effector's initial substate.
    pub(crate) fn initial_state(&self, config: &PropagatorConfig) -> StateVector {
        let mut x = StateVector::zeros(self.map.dimension());
        x[POSITION].copy_from_slice(config.position.as_slice());
        x[VELOCITY].copy_from_slice(config.velocity.as_slice());
        x[ATTITUDE].copy_from_slice(config.attitude.0.as_slice());
        x[RATE].copy_from_slice(config.angular_rate.as_slice());
        for (i, effector) in self.effectors.iter().enumerate() {
            effector.initial_state(&mut EffectorStatesMut::new(&mut x, &self.map, i));
        }
        x
    }

    pub fn state_map(&self) -> &StateMap {
        &self.map
    }

    /// Mass parts from the most recent evaluation, hub first.
    pub fn parts(&self) -> &[PartState] {
        &self.parts
    }

    pub fn gravity_bodies(&self) -> &[GravityBody] {
        &self.gravity_bodies
    }

    pub fn effectors(&self) -> &[Effector] {
        &self.effectors
    }

    pub fn central_body(&self) -> Option<&GravityBody> {
        self.central.and_then(|c| self.gravity_bodies.get(c))
    }

    /// Sets thruster feed availability from tank masses and routes each
    /// set's draw to its tank.
    fn plumb(&mut self, t: f64, x: &[f64]) {
        self.draws.iter_mut().for_each(|d| *d = 0.0);
        for &(set, tank) in &self.feeds {
            let available = FuelTank::mass(&EffectorStates::new(x, &self.map, tank)) > 0.0;
            if let Some(Effector::Thrusters(thrusters)) = self.effectors.get_mut(set) {
                thrusters.set_feed_available(available);
                if let Some(draw) = self.draws.get_mut(tank) {
                    *draw += thrusters.total_mass_flow(t);
                }
            }
        }
        for (effector, draw) in self.effectors.iter_mut().zip(&self.draws) {
            if let Effector::FuelTank(tank) = effector {
                tank.set_consumption(*draw);
            }
        }
    }

    /// Gathers the mass parts at `x` and rolls them up.
    pub fn mass_properties(&mut self, t: f64, x: &[f64]) -> Result<CompositeMassProperties, SixDofErrors> {
        self.plumb(t, x);
        self.parts.clear();
        self.parts.push(PartState::fixed(self.dry));
        for (i, effector) in self.effectors.iter().enumerate() {
            effector.mass_parts(&EffectorStates::new(x, &self.map, i), &mut self.parts);
        }
        Ok(CompositeMassProperties::from_parts(
            self.parts.iter().map(|p| &p.part),
        )?)
    }

    pub fn mu_central(&self) -> f64 {
        self.central_body().map_or(0.0, |b| b.mu())
    }

    /// Central body field plus third-body perturbations at `r` relative to the central body.
    fn gravity(&mut self, t: f64, r: &Vector3<f64>) -> Result<Vector3<f64>, SixDofErrors> {
        if !self.use_gravity {
            return Ok(Vector3::zeros());
        }
        let c = self.central.ok_or(SixDofErrors::NoCentralBody)?;
        let central_position = self.gravity_bodies[c].position_at(t);
        let mut g = self.gravity_bodies[c].acceleration(r, t)?;
        for (i, body) in self.gravity_bodies.iter_mut().enumerate() {
            if i == c {
                continue;
            }
            let r_body = body.position_at(t) - central_position;
            g += third_body(body.mu(), &r_body, r) + body.nonspherical(&(r - r_body), t)?;
        }
        Ok(g)
    }

    /// Writes `dx` for state `x` at time `t`.
    pub fn evaluate(&mut self, t: f64, x: &[f64], dx: &mut [f64]) -> Result<Evaluation, SixDofErrors> {
        let n = self.map.dimension();
        if x.len() != n || dx.len() != n {
            return Err(SixDofErrors::EffectorDimensionMismatch {
                name: "state vector".into(),
                expected: n,
                actual: x.len().min(dx.len()),
            });
        }
        let r = Vector3::from_column_slice(&x[POSITION]);
        let v = Vector3::from_column_slice(&x[VELOCITY]);
        let sigma = Mrp(Vector3::from_column_slice(&x[ATTITUDE]));
        let omega = Vector3::from_column_slice(&x[RATE]);

        let mass = self.mass_properties(t, x)?;
        let context = EffectorContext {
            t,
            mass,
            sigma,
            omega,
            position: r,
            velocity: v,
            mu_central: if self.use_gravity { self.mu_central() } else { 0.0 },
        };

        let mut total = ForceTorque::default();
        for (i, effector) in self.effectors.iter().enumerate() {
            total += effector.force_torque(&context, &EffectorStates::new(x, &self.map, i));
        }
        let torque = total.torque - mass.center_of_mass.cross(&total.force);
        let gravity = self.gravity(t, &r)?;

        dx.fill(0.0);
        if self.use_translation {
            let acceleration = gravity + RotationMatrix::from(&sigma).rotate(&(total.force / mass.mass));
            dx[POSITION].copy_from_slice(v.as_slice());
            dx[VELOCITY].copy_from_slice(acceleration.as_slice());
        }

        let solution = coupled::solve(
            &self.parts,
            &mass,
            &omega,
            &torque,
            &total.force,
            !self.use_rotation,
        )?;
        if self.use_rotation {
            dx[ATTITUDE].copy_from_slice(sigma.derivative(&omega).as_slice());
            dx[RATE].copy_from_slice(solution.omega_dot.as_slice());
        }
        for q in self.parts.iter().filter_map(|p| p.coordinate) {
            dx[q.index] = q.q_dot;
        }
        for &(index, q_ddot) in &solution.accelerations {
            dx[index + 1] = q_ddot;
        }
        for (i, effector) in self.effectors.iter().enumerate() {
            effector.write_derivatives(
                &context,
                &EffectorStates::new(x, &self.map, i),
                &mut EffectorStatesMut::new(dx, &self.map, i),
            );
        }

        if let Some(index) = dx.iter().position(|v| !v.is_finite()) {
            return Err(SixDofErrors::NonFiniteDerivative { index });
        }
        Ok(Evaluation {
            context,
            force: total.force,
            torque,
            gravity,
            omega_dot: solution.omega_dot,
            coordinate_power: solution.coordinate_power,
        })
    }
}

impl OdeModel for EquationsOfMotion {
    type State = StateVector;
    type Error = SixDofErrors;

    fn f(&mut self, t: f64, x: &StateVector, dx: &mut StateVector) -> Result<(), SixDofErrors> {
        if dx.len() != x.len() {
            dx.reset(x.len());
        }
        self.evaluate(t, x, dx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::{
        EffectorCommand,
        fuel_tank::TankModel,
        hinged_body::HingedBody,
        reaction_wheel::{ReactionWheel, ReactionWheelSet},
        thruster::{Thruster, ThrusterSet},
    };
    use crate::state_map::HUB_DIMENSION;
    use approx::assert_abs_diff_eq;
    use gravity::point_mass;
    use mass_properties::Inertia;

    const MU: f64 = 3.986004415e14;

    fn config() -> PropagatorConfig {
        PropagatorConfig::default()
            .with_state(Vector3::new(7e6, 0.0, 0.0), Vector3::new(0.0, 7546.05, 0.0))
            .with_attitude(Mrp::new(0.1, 0.2, -0.1), Vector3::new(0.01, -0.02, 0.03))
    }

    fn eom(config: &PropagatorConfig) -> EquationsOfMotion {
        let mut eom = EquationsOfMotion::new(config);
        eom.gravity_bodies
            .push(GravityBody::new("earth", MU, 6378137.0).unwrap().with_central());
        eom.central = Some(0);
        eom.gravity_bodies[0].initialize().unwrap();
        eom
    }

    #[test]
    fn test_rigid_body_derivative() {
        let config = config();
        let mut eom = eom(&config);
        eom.bind().unwrap();
        let x = eom.initial_state(&config);
        let mut dx = StateVector::zeros(x.len());
        eom.f(0.0, &x, &mut dx).unwrap();

        assert_eq!(&dx[POSITION], config.velocity.as_slice());
        let g = point_mass(MU, &config.position);
        assert_abs_diff_eq!(Vector3::from_column_slice(&dx[VELOCITY]), g, epsilon = 1e-15);
        let sigma_dot = config.attitude.derivative(&config.angular_rate);
        assert_abs_diff_eq!(Vector3::from_column_slice(&dx[ATTITUDE]), sigma_dot, epsilon = 1e-15);
        // ω × Iω vanishes for a spherical inertia
        assert_abs_diff_eq!(Vector3::from_column_slice(&dx[RATE]), Vector3::zeros(), epsilon = 1e-15);
    }

    #[test]
    fn test_reduced_modes() {
        let config = config().with_translation(false).with_rotation(false).with_gravity(false);
        let mut eom = EquationsOfMotion::new(&config);
        eom.bind().unwrap();
        let x = eom.initial_state(&config);
        let mut dx = StateVector::zeros(x.len());
        eom.f(0.0, &x, &mut dx).unwrap();
        assert!(dx.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_missing_central_body() {
        let config = config();
        let mut eom = EquationsOfMotion::new(&config);
        eom.bind().unwrap();
        let x = eom.initial_state(&config);
        let mut dx = StateVector::zeros(x.len());
        assert!(matches!(
            eom.f(0.0, &x, &mut dx),
            Err(SixDofErrors::NoCentralBody)
        ));
    }

    #[test]
    fn test_thruster_feed_and_tank_draw() {
        let config = config().with_gravity(false);
        let mut eom = EquationsOfMotion::new(&config);
        let thruster =
            Thruster::new("main", Vector3::new(0.0, 0.0, -1.0), Vector3::z(), 10.0, 250.0).unwrap();
        let mut set = ThrusterSet::new("main").with_thruster(thruster).with_tank("tank");
        set.apply_command(0.0, &EffectorCommand::ThrusterOnTimes(vec![5.0]))
            .unwrap();
        eom.effectors.push(set.into());
        eom.effectors.push(
            FuelTank::new("tank", Vector3::zeros(), 20.0, TankModel::Point)
                .unwrap()
                .into(),
        );
        eom.bind().unwrap();
        let mut x = eom.initial_state(&config);
        assert_eq!(x[HUB_DIMENSION], 20.0);

        let mut dx = StateVector::zeros(x.len());
        let evaluation = eom.evaluate(1.0, &x, &mut dx).unwrap();
        assert_abs_diff_eq!(dx[HUB_DIMENSION], -10.0 / (250.0 * 9.80665), epsilon = 1e-15);
        assert_abs_diff_eq!(evaluation.force, Vector3::new(0.0, 0.0, 10.0), epsilon = 1e-15);
        assert_abs_diff_eq!(evaluation.context.mass.mass, 120.0, epsilon = 1e-12);

        // empty tank starves the set
        x[HUB_DIMENSION] = 0.0;
        let evaluation = eom.evaluate(1.0, &x, &mut dx).unwrap();
        assert_eq!(dx[HUB_DIMENSION], 0.0);
        assert_eq!(evaluation.force, Vector3::zeros());
    }

    #[test]
    fn test_unknown_feed_tank() {
        let config = config();
        let mut eom = EquationsOfMotion::new(&config);
        eom.effectors.push(ThrusterSet::new("rcs").with_tank("missing").into());
        assert!(matches!(eom.bind(), Err(SixDofErrors::UnknownEffector(_))));
    }

    #[test]
    fn test_wheel_and_panel_coupling() {
        let config = config().with_gravity(false).with_translation(false);
        let mut eom = EquationsOfMotion::new(&config);
        eom.effectors.push(
            ReactionWheelSet::new("rwa")
                .with_wheel(ReactionWheel::new("rw", Vector3::x(), 0.1).unwrap().with_speed(50.0))
                .into(),
        );
        eom.effectors.push(
            HingedBody::new("panel", 10.0, Inertia::diagonal(1.0, 2.0, 1.5).unwrap(), 1.0, 5.0, 0.5)
                .unwrap()
                .with_hinge(Vector3::new(0.5, 0.0, 0.0), Matrix3::identity())
                .unwrap()
                .with_initial_angle(0.1, 0.05)
                .into(),
        );
        eom.bind().unwrap();
        assert_eq!(eom.state_map().dimension(), HUB_DIMENSION + 4);
        let x = eom.initial_state(&config);
        let mut dx = StateVector::zeros(x.len());
        eom.f(0.0, &x, &mut dx).unwrap();

        // Θ̇ = Ω and θ̇ passes through
        assert_eq!(dx[HUB_DIMENSION], 50.0);
        assert_eq!(dx[HUB_DIMENSION + 2], 0.05);
        assert!(dx[HUB_DIMENSION + 3].is_finite());
        assert_eq!(eom.parts().len(), 2);
    }
}
