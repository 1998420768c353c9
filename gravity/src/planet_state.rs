use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Pose of one celestial body published once per tick by an ephemeris producer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlanetStateMessage {
    pub planet_name: String,
    /// inertial position [m]
    pub position: Vector3<f64>,
    /// inertial velocity [m/s]
    pub velocity: Vector3<f64>,
    pub j2000_to_pfix: Matrix3<f64>,
    pub j2000_to_pfix_dot: Matrix3<f64>,
    /// ephemeris time of the state [s]
    pub j2000_current: f64,
    /// false when the producer had no orientation data and sent the identity
    pub computed_attitude: bool,
    /// simulation time the state is valid for [ns]
    pub valid_sim_nanos: u64,
}

impl PlanetStateMessage {
    /// Inertially fixed body at `position` with identity orientation.
    pub fn fixed(planet_name: &str, position: Vector3<f64>) -> Self {
        Self {
            planet_name: planet_name.to_string(),
            position,
            velocity: Vector3::zeros(),
            j2000_to_pfix: Matrix3::identity(),
            j2000_to_pfix_dot: Matrix3::zeros(),
            j2000_current: 0.0,
            computed_attitude: false,
            valid_sim_nanos: 0,
        }
    }
}
