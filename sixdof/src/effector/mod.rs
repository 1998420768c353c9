use std::ops::AddAssign;

use ambassador::{Delegate, delegatable_trait};
use mass_properties::{CompositeMassProperties, MassPart};
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_map::{EffectorStates, EffectorStatesMut, StateKind};

pub mod body_effector;
pub mod fuel_tank;
pub mod hinged_body;
pub mod reaction_wheel;
pub mod thruster;

use body_effector::BodyEffector;
use fuel_tank::{FuelTank, FuelTankErrors};
use hinged_body::{HingedBody, HingedBodyErrors};
use reaction_wheel::{ReactionWheelErrors, ReactionWheelSet};
use thruster::{ThrusterErrors, ThrusterSet};

/// Standard gravity for specific impulse [m/s^2]
pub const G0: f64 = 9.80665;

#[derive(Debug, Error)]
pub enum EffectorErrors {
    #[error("{0}")]
    ReactionWheel(#[from] ReactionWheelErrors),
    #[error("{0}")]
    Thruster(#[from] ThrusterErrors),
    #[error("{0}")]
    HingedBody(#[from] HingedBodyErrors),
    #[error("{0}")]
    FuelTank(#[from] FuelTankErrors),
    #[error("effector '{name}' rejected command: {reason}")]
    InvalidCommand { name: String, reason: String },
}

/// Everything an effector may read about the vehicle during one evaluation.
#[derive(Clone, Copy, Debug)]
pub struct EffectorContext {
    pub t: f64,
    pub mass: CompositeMassProperties,
    pub sigma: Mrp,
    /// ω_BN, body components
    pub omega: Vector3<f64>,
    /// inertial position relative to the central body
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// μ of the central body, zero without gravity
    pub mu_central: f64,
}

/// Body frame force and torque about the structure origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceTorque {
    pub force: Vector3<f64>,
    pub torque: Vector3<f64>,
}

impl ForceTorque {
    /// Force applied at `point`, measured from the structure origin.
    pub fn at_point(force: Vector3<f64>, point: &Vector3<f64>) -> Self {
        Self {
            force,
            torque: point.cross(&force),
        }
    }
}

impl AddAssign for ForceTorque {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.torque += rhs.torque;
    }
}

/// A generalized coordinate q (hinge angle, slosh displacement) and the
/// partials of its owning part's motion with respect to q̇.
#[derive(Clone, Copy, Debug)]
pub struct Coordinate {
    pub kind: StateKind,
    /// index of q in the packed state, q̇ follows it
    pub index: usize,
    pub q: f64,
    pub q_dot: f64,
    pub stiffness: f64,
    pub damping: f64,
    pub q_ref: f64,
    pub q_dot_ref: f64,
    /// ∂r'/∂q̇ of the part center of mass
    pub linear: Vector3<f64>,
    /// ∂w/∂q̇ of the part angular velocity
    pub angular: Vector3<f64>,
    /// remainder of r'' at q̈ = 0
    pub bias: Vector3<f64>,
}

impl Coordinate {
    pub fn spring_energy(&self) -> f64 {
        0.5 * self.stiffness * (self.q - self.q_ref).powi(2)
    }

    /// -k(q - q_ref) - c(q̇ - q̇_ref)
    pub fn spring_damper(&self) -> f64 {
        -self.stiffness * (self.q - self.q_ref) - self.damping * (self.q_dot - self.q_dot_ref)
    }

    pub fn damping_power(&self) -> f64 {
        -self.damping * (self.q_dot - self.q_dot_ref) * self.q_dot
    }
}

/// A mass part together with its motion relative to the body frame.
#[derive(Clone, Copy, Debug)]
pub struct PartState {
    pub part: MassPart,
    /// velocity of the part center of mass relative to the body frame
    pub velocity: Vector3<f64>,
    /// angular velocity of the part relative to the body frame
    pub angular_velocity: Vector3<f64>,
    pub coordinate: Option<Coordinate>,
}

impl PartState {
    pub fn fixed(part: MassPart) -> Self {
        Self {
            part,
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            coordinate: None,
        }
    }
}

/// Commands from controllers, applied at the tick they arrive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EffectorCommand {
    /// motor torque per wheel [N-m]
    WheelTorques(Vec<f64>),
    /// on-time per thruster [s]
    ThrusterOnTimes(Vec<f64>),
    /// hinge reference angle and rate
    HingeReference { theta: f64, theta_dot: f64 },
}

/// Effector substate re-emitted for downstream consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EffectorTelemetry {
    ReactionWheels {
        angles: Vec<f64>,
        speeds: Vec<f64>,
        motor_torques: Vec<f64>,
    },
    Thrusters {
        firing: Vec<bool>,
        thrust: Vec<f64>,
        mass_flow: f64,
    },
    HingedBody {
        theta: f64,
        theta_dot: f64,
    },
    FuelTank {
        mass: f64,
        mass_rate: f64,
        depleted: bool,
        slosh: Vec<f64>,
    },
    Body {
        force: Vector3<f64>,
        torque: Vector3<f64>,
    },
}

impl EffectorTelemetry {
    pub fn headers(&self) -> Vec<String> {
        fn indexed(prefix: &str, n: usize) -> impl Iterator<Item = String> + '_ {
            (0..n).map(move |i| format!("{prefix}[{i}]"))
        }
        let mut headers = vec!["t".to_string()];
        match self {
            Self::ReactionWheels { speeds, .. } => {
                let n = speeds.len();
                headers.extend(indexed("angle", n));
                headers.extend(indexed("speed", n));
                headers.extend(indexed("motor_torque", n));
            }
            Self::Thrusters { firing, .. } => {
                let n = firing.len();
                headers.extend(indexed("firing", n));
                headers.extend(indexed("thrust", n));
                headers.push("mass_flow".to_string());
            }
            Self::HingedBody { .. } => headers.extend(["theta".to_string(), "theta_dot".to_string()]),
            Self::FuelTank { slosh, .. } => {
                headers.extend(["mass", "mass_rate", "depleted"].map(String::from));
                headers.extend(indexed("slosh", slosh.len()));
            }
            Self::Body { .. } => headers.extend(
                ["force[x]", "force[y]", "force[z]", "torque[x]", "torque[y]", "torque[z]"]
                    .map(String::from),
            ),
        }
        headers
    }

    pub fn record(&self, t: f64) -> Vec<String> {
        let mut record = vec![t.to_string()];
        match self {
            Self::ReactionWheels {
                angles,
                speeds,
                motor_torques,
            } => {
                record.extend(angles.iter().map(f64::to_string));
                record.extend(speeds.iter().map(f64::to_string));
                record.extend(motor_torques.iter().map(f64::to_string));
            }
            Self::Thrusters {
                firing,
                thrust,
                mass_flow,
            } => {
                record.extend(firing.iter().map(|f| (*f as u8).to_string()));
                record.extend(thrust.iter().map(f64::to_string));
                record.push(mass_flow.to_string());
            }
            Self::HingedBody { theta, theta_dot } => {
                record.extend([theta.to_string(), theta_dot.to_string()])
            }
            Self::FuelTank {
                mass,
                mass_rate,
                depleted,
                slosh,
            } => {
                record.extend([
                    mass.to_string(),
                    mass_rate.to_string(),
                    (*depleted as u8).to_string(),
                ]);
                record.extend(slosh.iter().map(f64::to_string));
            }
            Self::Body { force, torque } => {
                record.extend(force.iter().chain(torque.iter()).map(f64::to_string))
            }
        }
        record
    }
}

/// Capability contract shared by every effector kind.
///
/// All geometry is in body frame components once `to_body_frame` has run.
/// Torques are about the structure origin; the assembler moves them to the
/// composite center of mass.
#[delegatable_trait]
pub trait EffectorModel {
    fn name(&self) -> &str;

    /// Widths of the sub-blocks this effector owns in the packed state.
    fn state_blocks(&self) -> Vec<(StateKind, usize)> {
        Vec::new()
    }

    /// Rotates structure frame geometry into the body frame. Called once.
    fn to_body_frame(&mut self, structure_to_body: &Matrix3<f64>);

    fn initial_state(&self, _states: &mut EffectorStatesMut<'_>) {}

    /// Appends the mass parts this effector adds to the composite.
    fn mass_parts(&self, _states: &EffectorStates<'_>, _parts: &mut Vec<PartState>) {}

    fn force_torque(&self, _ctx: &EffectorContext, _states: &EffectorStates<'_>) -> ForceTorque {
        ForceTorque::default()
    }

    /// Derivatives of every owned state except generalized coordinates, which
    /// the assembler writes from the coupled solve.
    fn write_derivatives(
        &self,
        _ctx: &EffectorContext,
        _states: &EffectorStates<'_>,
        _derivatives: &mut EffectorStatesMut<'_>,
    ) {
    }

    /// Angular momentum stored in spinning rotors, body components.
    fn internal_momentum(&self, _states: &EffectorStates<'_>) -> Vector3<f64> {
        Vector3::zeros()
    }

    /// Kinetic energy stored in spinning rotors.
    fn internal_energy(&self, _states: &EffectorStates<'_>) -> f64 {
        0.0
    }

    /// Power delivered to rotors by their own motors and bearings.
    fn internal_power(&self, _ctx: &EffectorContext, _states: &EffectorStates<'_>) -> f64 {
        0.0
    }

    fn apply_command(&mut self, _t: f64, command: &EffectorCommand) -> Result<(), EffectorErrors> {
        Err(EffectorErrors::InvalidCommand {
            name: self.name().to_string(),
            reason: format!("{command:?} is not accepted by this effector"),
        })
    }

    /// Projects a candidate step state back onto the admissible set.
    fn project_state(&self, _states: &mut EffectorStatesMut<'_>) {}

    /// Runs once the step is accepted.
    fn post_step(&mut self, _states: &EffectorStates<'_>) {}

    fn telemetry(&self, ctx: &EffectorContext, states: &EffectorStates<'_>) -> EffectorTelemetry;
}

#[derive(Debug, Delegate, Serialize, Deserialize)]
#[delegate(EffectorModel)]
pub enum Effector {
    ReactionWheels(ReactionWheelSet),
    Thrusters(ThrusterSet),
    HingedBody(HingedBody),
    FuelTank(FuelTank),
    Body(BodyEffector),
}

impl From<ReactionWheelSet> for Effector {
    fn from(value: ReactionWheelSet) -> Self {
        Self::ReactionWheels(value)
    }
}

impl From<ThrusterSet> for Effector {
    fn from(value: ThrusterSet) -> Self {
        Self::Thrusters(value)
    }
}

impl From<HingedBody> for Effector {
    fn from(value: HingedBody) -> Self {
        Self::HingedBody(value)
    }
}

impl From<FuelTank> for Effector {
    fn from(value: FuelTank) -> Self {
        Self::FuelTank(value)
    }
}

impl From<BodyEffector> for Effector {
    fn from(value: BodyEffector) -> Self {
        Self::Body(value)
    }
}

/// Rotates a structure frame inertia into body components.
pub(crate) fn rotate_inertia(structure_to_body: &Matrix3<f64>, inertia: &Matrix3<f64>) -> Matrix3<f64> {
    structure_to_body * inertia * structure_to_body.transpose()
}
