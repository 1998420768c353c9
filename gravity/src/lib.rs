use nalgebra::Vector3;
use spherical_harmonics::SphericalHarmonicsErrors;
use thiserror::Error;

pub mod body;
pub mod planet_state;

pub use body::GravityBody;
pub use planet_state::PlanetStateMessage;

#[derive(Debug, Error)]
pub enum GravityErrors {
    #[error("gravitational parameter for '{0}' must be greater than zero")]
    NonPositiveMu(String),
    #[error("equatorial radius for '{0}' must be greater than zero")]
    NonPositiveRadius(String),
    #[error("harmonics degree {requested} exceeds loaded degree {loaded} for '{name}'")]
    HarmonicsDegree {
        name: String,
        requested: usize,
        loaded: usize,
    },
    #[error("gravity is undefined at the center of '{0}'")]
    ZeroPosition(String),
    #[error("SphericalHarmonicsError: {0}")]
    SphericalHarmonics(#[from] SphericalHarmonicsErrors),
}

/// Point mass acceleration at `r` relative to a body with parameter `mu`.
pub fn point_mass(mu: f64, r: &Vector3<f64>) -> Vector3<f64> {
    let r_mag = r.norm();
    -mu * r / (r_mag * r_mag * r_mag)
}

/// Third body perturbation on a vehicle at `r_sc` from a body at `r_body`, both relative to
/// the central body. The second term is the acceleration of the central body itself.
pub fn third_body(mu: f64, r_body: &Vector3<f64>, r_sc: &Vector3<f64>) -> Vector3<f64> {
    let d = r_body - r_sc;
    let d_mag = d.norm();
    let r_body_mag = r_body.norm();
    mu * (d / (d_mag * d_mag * d_mag) - r_body / (r_body_mag * r_body_mag * r_body_mag))
}
