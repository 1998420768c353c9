use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod composite;
pub use composite::{CompositeMassProperties, MassPart, parallel_axis};

#[derive(Debug, Error)]
pub enum MassPropertiesErrors {
    #[error("Ixx cant be less than or equal to  zero")]
    IxxLessThanOrEqualToZero,
    #[error("Iyy cant be less than or equal to zero")]
    IyyLessThanOrEqualToZero,
    #[error("Izz cant be less than or equal to zero")]
    IzzLessThanOrEqualToZero,
    #[error("inertia tensor is not positive definite")]
    NotPositiveDefinite,
    #[error("mass cannot be less than or equal to zero")]
    MassLessThanOrEqualToZero,
    #[error("mass cannot be negative")]
    NegativeMass,
}

/// Symmetric inertia tensor about a body's center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inertia {
    pub ixx: f64,
    pub iyy: f64,
    pub izz: f64,
    pub ixy: f64,
    pub ixz: f64,
    pub iyz: f64,
}

impl Inertia {
    pub fn new(
        ixx: f64,
        iyy: f64,
        izz: f64,
        ixy: f64,
        ixz: f64,
        iyz: f64,
    ) -> Result<Self, MassPropertiesErrors> {
        if ixx <= f64::EPSILON {
            return Err(MassPropertiesErrors::IxxLessThanOrEqualToZero);
        }
        if iyy <= f64::EPSILON {
            return Err(MassPropertiesErrors::IyyLessThanOrEqualToZero);
        }
        if izz <= f64::EPSILON {
            return Err(MassPropertiesErrors::IzzLessThanOrEqualToZero);
        }
        let inertia = Self {
            ixx,
            iyy,
            izz,
            ixy,
            ixz,
            iyz,
        };
        if !is_positive_definite(&inertia.matrix()) {
            return Err(MassPropertiesErrors::NotPositiveDefinite);
        }
        Ok(inertia)
    }

    pub fn diagonal(ixx: f64, iyy: f64, izz: f64) -> Result<Self, MassPropertiesErrors> {
        Self::new(ixx, iyy, izz, 0.0, 0.0, 0.0)
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.ixx, self.ixy, self.ixz, self.ixy, self.iyy, self.iyz, self.ixz, self.iyz,
            self.izz,
        )
    }
}

impl TryFrom<Matrix3<f64>> for Inertia {
    type Error = MassPropertiesErrors;

    /// Uses the upper triangle; the lower triangle is assumed symmetric.
    fn try_from(m: Matrix3<f64>) -> Result<Inertia, MassPropertiesErrors> {
        Inertia::new(
            m[(0, 0)],
            m[(1, 1)],
            m[(2, 2)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 2)],
        )
    }
}

pub fn is_positive_definite(m: &Matrix3<f64>) -> bool {
    m.iter().all(|x| x.is_finite()) && m.cholesky().is_some()
}

/// Represents the mass properties of a rigid object
/// Mass, Center of Mass, Inertia about the Center of Mass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub center_of_mass: Vector3<f64>,
    pub inertia: Inertia,
}

impl MassProperties {
    pub fn new(
        mass: f64,
        center_of_mass: Vector3<f64>,
        inertia: Inertia,
    ) -> Result<Self, MassPropertiesErrors> {
        if mass <= f64::EPSILON {
            return Err(MassPropertiesErrors::MassLessThanOrEqualToZero);
        }
        Ok(MassProperties {
            mass,
            center_of_mass,
            inertia,
        })
    }

    /// The same properties expressed in a frame reached through `dcm` (`v' = dcm * v`).
    pub fn transformed(&self, dcm: &Matrix3<f64>) -> Result<Self, MassPropertiesErrors> {
        let inertia = dcm * self.inertia.matrix() * dcm.transpose();
        Ok(Self {
            mass: self.mass,
            center_of_mass: dcm * self.center_of_mass,
            inertia: Inertia::try_from(inertia)?,
        })
    }
}
