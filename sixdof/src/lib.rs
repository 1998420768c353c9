//! Six degree of freedom spacecraft propagator.
//!
//! The propagator owns a composite vehicle (dry hub plus effectors), a list of
//! gravity bodies and an integrator. Each call to
//! [`SixDofPropagator::update_state`] advances the packed state by one tick,
//! shadows the attitude, and publishes vehicle state, mass properties,
//! diagnostics and effector telemetry.

pub mod config;
pub mod diagnostics;
pub mod effector;
pub mod eom;
pub mod messages;
pub mod propagator;
pub mod state_map;

mod coupled;

pub use config::PropagatorConfig;
pub use effector::{Effector, EffectorCommand, EffectorErrors, EffectorModel};
pub use eom::EquationsOfMotion;
pub use propagator::{PropagatorStatus, SixDofPropagator};
pub use state_map::{StateKind, StateMap};

use gravity::GravityErrors;
use mass_properties::MassPropertiesErrors;
use sixdof_result::ResultErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SixDofErrors {
    #[error("gravity is enabled but no gravity body is marked central")]
    NoCentralBody,
    #[error("more than one gravity body is marked central ('{0}' and '{1}')")]
    MultipleCentralBodies(String, String),
    #[error("gravity body '{0}' already exists")]
    DuplicateGravityBody(String),
    #[error("state slices overlap: [{0}, {1}) and [{2}, {3})")]
    OverlappingStateSlices(usize, usize, usize, usize),
    #[error("effector '{name}' expected {expected} states but was given {actual}")]
    EffectorDimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("initial attitude norm {0} is greater than 1")]
    InitialAttitudeOutOfRange(f64),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("propagator is already initialized")]
    AlreadyInitialized,
    #[error("propagator is not initialized")]
    NotInitialized,
    #[error("could not find effector '{0}'")]
    UnknownEffector(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("requested time {requested} ns is before the current time {current} ns")]
    NonMonotonicTime { current: u64, requested: u64 },
    #[error("derivative is not finite at state index {index}")]
    NonFiniteDerivative { index: usize },
    #[error("system mass matrix is singular")]
    SingularMassMatrix,
    #[error("propagator is in the failed state")]
    Failed,
    #[error("{0}")]
    Effector(#[from] EffectorErrors),
    #[error("{0}")]
    Gravity(#[from] GravityErrors),
    #[error("{0}")]
    MassProperties(#[from] MassPropertiesErrors),
    #[error("{0}")]
    Result(#[from] ResultErrors),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    RonDeserialize(#[from] ron::error::SpannedError),
    #[error("{0}")]
    RonSerialize(#[from] ron::Error),
}
