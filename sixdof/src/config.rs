use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use ron::ser::{PrettyConfig, to_string_pretty};
use rotations::prelude::*;
use serde::{Deserialize, Serialize};

use crate::SixDofErrors;

/// Run switches, initial state and dry vehicle properties.
///
/// Missing fields take their defaults when loaded from RON, so a file only
/// needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagatorConfig {
    pub use_translation: bool,
    pub use_rotation: bool,
    pub use_gravity: bool,
    pub output_buffer_count: usize,
    /// composite center of mass relative to the central body, inertial [m]
    pub position: Vector3<f64>,
    /// inertial [m/s]
    pub velocity: Vector3<f64>,
    /// σ_BN
    pub attitude: Mrp,
    /// ω_BN in body components [rad/s]
    pub angular_rate: Vector3<f64>,
    /// [kg]
    pub dry_mass: f64,
    /// structure frame [m]
    pub dry_center_of_mass: Vector3<f64>,
    /// about the dry center of mass, structure frame [kg-m^2]
    pub dry_inertia: Matrix3<f64>,
    /// T_str2bdy
    pub structure_to_body: Matrix3<f64>,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            use_translation: true,
            use_rotation: true,
            use_gravity: true,
            output_buffer_count: 2,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            attitude: Mrp::default(),
            angular_rate: Vector3::zeros(),
            dry_mass: 100.0,
            dry_center_of_mass: Vector3::zeros(),
            dry_inertia: Matrix3::from_diagonal_element(100.0),
            structure_to_body: Matrix3::identity(),
        }
    }
}

impl PropagatorConfig {
    pub fn with_state(
        mut self,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    ) -> Self {
        self.position = position;
        self.velocity = velocity;
        self
    }

    pub fn with_attitude(mut self, attitude: Mrp, angular_rate: Vector3<f64>) -> Self {
        self.attitude = attitude;
        self.angular_rate = angular_rate;
        self
    }

    pub fn with_dry_properties(
        mut self,
        mass: f64,
        center_of_mass: Vector3<f64>,
        inertia: Matrix3<f64>,
    ) -> Self {
        self.dry_mass = mass;
        self.dry_center_of_mass = center_of_mass;
        self.dry_inertia = inertia;
        self
    }

    pub fn with_gravity(mut self, use_gravity: bool) -> Self {
        self.use_gravity = use_gravity;
        self
    }

    pub fn with_translation(mut self, use_translation: bool) -> Self {
        self.use_translation = use_translation;
        self
    }

    pub fn with_rotation(mut self, use_rotation: bool) -> Self {
        self.use_rotation = use_rotation;
        self
    }

    pub fn validate(&self) -> Result<(), SixDofErrors> {
        if self.output_buffer_count == 0 {
            return Err(SixDofErrors::InvalidConfiguration(
                "output_buffer_count must be at least 1".into(),
            ));
        }
        if !(self.dry_mass > 0.0) {
            return Err(SixDofErrors::InvalidConfiguration(format!(
                "dry mass must be positive, got {}",
                self.dry_mass
            )));
        }
        let inertia = &self.dry_inertia;
        if (inertia - inertia.transpose()).norm() > 1e-12 * inertia.norm() {
            return Err(SixDofErrors::InvalidConfiguration(
                "dry inertia is not symmetric".into(),
            ));
        }
        if !mass_properties::is_positive_definite(inertia) {
            return Err(SixDofErrors::InvalidConfiguration(
                "dry inertia is not positive definite".into(),
            ));
        }
        RotationMatrix::new(self.structure_to_body).map_err(|e| {
            SixDofErrors::InvalidConfiguration(format!("structure_to_body: {e}"))
        })?;
        let finite = self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.attitude.0.iter().all(|v| v.is_finite())
            && self.angular_rate.iter().all(|v| v.is_finite());
        if !finite {
            return Err(SixDofErrors::InvalidConfiguration(
                "initial state is not finite".into(),
            ));
        }
        let norm = self.attitude.0.norm();
        if norm > 1.0 {
            return Err(SixDofErrors::InitialAttitudeOutOfRange(norm));
        }
        Ok(())
    }

    pub fn to_ron_string(&self) -> Result<String, SixDofErrors> {
        Ok(to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn from_ron_str(s: &str) -> Result<Self, SixDofErrors> {
        Ok(ron::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, SixDofErrors> {
        let s = fs::read_to_string(path)?;
        Self::from_ron_str(&s)
    }

    pub fn save(&self, path: &Path) -> Result<(), SixDofErrors> {
        fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PropagatorConfig::default();
        assert!(config.use_translation && config.use_rotation && config.use_gravity);
        assert_eq!(config.output_buffer_count, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ron_round_trip() {
        let config = PropagatorConfig::default()
            .with_state(Vector3::new(7e6, 0.0, 0.0), Vector3::new(0.0, 7546.05, 0.0))
            .with_attitude(Mrp::new(0.1, -0.2, 0.3), Vector3::new(0.01, 0.0, 0.0))
            .with_translation(false);
        let s = config.to_ron_string().unwrap();
        let back = PropagatorConfig::from_ron_str(&s).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = PropagatorConfig::from_ron_str("(use_gravity: false, dry_mass: 12.5)").unwrap();
        assert!(!config.use_gravity);
        assert!(config.use_rotation);
        assert_eq!(config.dry_mass, 12.5);
        assert_eq!(config.output_buffer_count, 2);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("sixdof_config_{}.ron", std::process::id()));
        let config = PropagatorConfig::default().with_gravity(false);
        config.save(&path).unwrap();
        let back = PropagatorConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = PropagatorConfig::default();
        config.output_buffer_count = 0;
        assert!(matches!(
            config.validate(),
            Err(SixDofErrors::InvalidConfiguration(_))
        ));

        let config = PropagatorConfig::default().with_attitude(Mrp::new(1.0, 0.5, 0.0), Vector3::zeros());
        assert!(matches!(
            config.validate(),
            Err(SixDofErrors::InitialAttitudeOutOfRange(_))
        ));

        let config = PropagatorConfig::default().with_dry_properties(
            10.0,
            Vector3::zeros(),
            Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)),
        );
        assert!(config.validate().is_err());

        // lower triangle alone is positive definite
        let config = PropagatorConfig::default().with_dry_properties(
            10.0,
            Vector3::zeros(),
            Matrix3::new(2.0, 0.5, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0),
        );
        assert!(mass_properties::is_positive_definite(&config.dry_inertia));
        assert!(matches!(
            config.validate(),
            Err(SixDofErrors::InvalidConfiguration(msg)) if msg.contains("symmetric")
        ));

        let mut config = PropagatorConfig::default();
        config.structure_to_body = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        assert!(config.validate().is_err());
    }
}
