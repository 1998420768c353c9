//! Analytic planet ephemeris from classical heliocentric orbit elements.
//!
//! Publishes one [`PlanetStateMessage`] per planet per tick. Orientation is
//! modeled from pole right ascension and declination, sidereal time at epoch
//! and a constant spin rate; planets without complete orientation data are
//! published with an inertially fixed identity orientation.

use std::collections::VecDeque;
use std::f64::consts::FRAC_PI_2;

use gravity::PlanetStateMessage;
use log::{debug, info};
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::{EulerAngles, EulerSequence, RotationMatrix, tilde};
use serde::{Deserialize, Serialize};
use sixdof_result::{ResultErrors, ResultManager, SixDofResult};
use thiserror::Error;

mod elements;
pub use elements::ClassicalElements;

/// Heliocentric gravitational parameter [m^3/s^2]
pub const MU_SUN: f64 = 1.32712440018e20;

#[derive(Debug, Error)]
pub enum CelestialErrors {
    #[error("planet '{0}' already exists in the ephemeris")]
    DuplicatePlanet(String),
    #[error("eccentricity must be in [0, 1), got {0}")]
    InvalidEccentricity(f64),
    #[error("semi-major axis must be positive, got {0}")]
    InvalidSemiMajorAxis(f64),
    #[error("gravitational parameter must be positive, got {0}")]
    NonPositiveMu(f64),
    #[error("kepler's equation did not converge for mean anomaly {0}")]
    KeplerNotConverged(f64),
    #[error("output buffer count must be at least 1")]
    InvalidOutputBufferCount,
}

/// Pole and spin of a planet. Used only when every field is present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PlanetOrientation {
    /// right ascension of the north pole [rad]
    pub right_ascension: Option<f64>,
    /// declination of the north pole [rad]
    pub declination: Option<f64>,
    /// local sidereal time at epoch [rad]
    pub lst0: Option<f64>,
    /// spin rate about the pole [rad/s]
    pub rotation_rate: Option<f64>,
}

impl PlanetOrientation {
    pub fn new(right_ascension: f64, declination: f64, lst0: f64, rotation_rate: f64) -> Self {
        Self {
            right_ascension: Some(right_ascension),
            declination: Some(declination),
            lst0: Some(lst0),
            rotation_rate: Some(rotation_rate),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.right_ascension.is_some()
            && self.declination.is_some()
            && self.lst0.is_some()
            && self.rotation_rate.is_some()
    }

    /// J2000 to planet-fixed DCM and its rate, `dt` seconds after epoch.
    pub fn dcm(&self, dt: f64) -> Option<(Matrix3<f64>, Matrix3<f64>)> {
        let (Some(ra), Some(dec), Some(lst0), Some(rate)) = (
            self.right_ascension,
            self.declination,
            self.lst0,
            self.rotation_rate,
        ) else {
            return None;
        };
        let angles = EulerAngles::new(
            ra + FRAC_PI_2,
            FRAC_PI_2 - dec,
            lst0 + rate * dt,
            EulerSequence::ZXZ,
        );
        let dcm = RotationMatrix::from(&angles).value();
        let dcm_dot = -tilde(&Vector3::new(0.0, 0.0, rate)) * dcm;
        Some((dcm, dcm_dot))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Planet {
    pub name: String,
    pub elements: ClassicalElements,
    pub orientation: PlanetOrientation,
    #[serde(skip)]
    result_id: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlanetEphemeris {
    /// sim time at which the elements are given [s]
    pub epoch: f64,
    pub mu_sun: f64,
    pub output_buffer_count: usize,
    planets: Vec<Planet>,
    #[serde(skip)]
    outputs: Vec<VecDeque<PlanetStateMessage>>,
}

impl Default for PlanetEphemeris {
    fn default() -> Self {
        Self {
            epoch: 0.0,
            mu_sun: MU_SUN,
            output_buffer_count: 2,
            planets: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

impl PlanetEphemeris {
    pub fn new(epoch: f64) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }

    pub fn with_mu(mut self, mu: f64) -> Result<Self, CelestialErrors> {
        if !(mu > 0.0) {
            return Err(CelestialErrors::NonPositiveMu(mu));
        }
        self.mu_sun = mu;
        Ok(self)
    }

    pub fn with_planet(
        mut self,
        name: &str,
        elements: ClassicalElements,
        orientation: PlanetOrientation,
    ) -> Result<Self, CelestialErrors> {
        if self.planets.iter().any(|p| p.name == name) {
            return Err(CelestialErrors::DuplicatePlanet(name.to_string()));
        }
        self.planets.push(Planet {
            name: name.to_string(),
            elements,
            orientation,
            result_id: None,
        });
        Ok(self)
    }

    pub fn planets(&self) -> &[Planet] {
        &self.planets
    }

    /// Validates the set up and clears the output buffers.
    pub fn reset(&mut self) -> Result<(), CelestialErrors> {
        if self.output_buffer_count == 0 {
            return Err(CelestialErrors::InvalidOutputBufferCount);
        }
        for planet in &self.planets {
            planet.elements.validate()?;
            if !planet.orientation.is_complete() {
                debug!(
                    "planet '{}' has incomplete orientation data, publishing a fixed identity orientation",
                    planet.name
                );
            }
        }
        self.outputs = vec![VecDeque::with_capacity(self.output_buffer_count); self.planets.len()];
        info!("planet ephemeris reset with {} planets", self.planets.len());
        Ok(())
    }

    /// Propagates every planet to `current_sim_nanos` and publishes its state.
    pub fn update_state(
        &mut self,
        current_sim_nanos: u64,
    ) -> Result<Vec<PlanetStateMessage>, CelestialErrors> {
        if self.outputs.len() != self.planets.len() {
            self.reset()?;
        }
        let t = current_sim_nanos as f64 * 1e-9;
        let dt = t - self.epoch;

        let mut messages = Vec::with_capacity(self.planets.len());
        for (planet, buffer) in self.planets.iter().zip(self.outputs.iter_mut()) {
            let (position, velocity) = planet.elements.to_state(self.mu_sun, dt)?;
            let (j2000_to_pfix, j2000_to_pfix_dot, computed_attitude) =
                match planet.orientation.dcm(dt) {
                    Some((dcm, dcm_dot)) => (dcm, dcm_dot, true),
                    None => (Matrix3::identity(), Matrix3::zeros(), false),
                };
            let message = PlanetStateMessage {
                planet_name: planet.name.clone(),
                position,
                velocity,
                j2000_to_pfix,
                j2000_to_pfix_dot,
                j2000_current: t,
                computed_attitude,
                valid_sim_nanos: current_sim_nanos,
            };
            if buffer.len() == self.output_buffer_count {
                buffer.pop_front();
            }
            buffer.push_back(message.clone());
            messages.push(message);
        }
        Ok(messages)
    }

    /// Most recent message published for `name`.
    pub fn latest(&self, name: &str) -> Option<&PlanetStateMessage> {
        let index = self.planets.iter().position(|p| p.name == name)?;
        self.outputs.get(index)?.back()
    }
}

impl SixDofResult for PlanetEphemeris {
    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), ResultErrors> {
        let folder = results.result_path.join("celestial");
        let headers = [
            "t",
            "position[x]",
            "position[y]",
            "position[z]",
            "velocity[x]",
            "velocity[y]",
            "velocity[z]",
        ];
        for planet in &mut self.planets {
            planet.result_id = Some(results.new_writer(&planet.name, &folder, &headers)?);
        }
        Ok(())
    }

    fn write_result(&self, t: f64, results: &mut ResultManager) -> Result<(), ResultErrors> {
        for (planet, buffer) in self.planets.iter().zip(self.outputs.iter()) {
            if let (Some(id), Some(message)) = (planet.result_id, buffer.back()) {
                results.write_record(
                    id,
                    &[
                        t.to_string(),
                        message.position[0].to_string(),
                        message.position[1].to_string(),
                        message.position[2].to_string(),
                        message.velocity[0].to_string(),
                        message.velocity[1].to_string(),
                        message.velocity[2].to_string(),
                    ],
                )?;
            }
        }
        Ok(())
    }
}
