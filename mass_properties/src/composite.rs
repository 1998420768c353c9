use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{MassPropertiesErrors, is_positive_definite};

/// Inertia of a point mass `mass` at `offset` about the origin of `offset`.
pub fn parallel_axis(mass: f64, offset: &Vector3<f64>) -> Matrix3<f64> {
    mass * (offset.norm_squared() * Matrix3::identity() - offset * offset.transpose())
}

/// One contributor to the composite vehicle, in body frame components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassPart {
    pub mass: f64,
    /// part center of mass relative to the structure origin [m]
    pub position: Vector3<f64>,
    /// inertia about the part's own center of mass [kg-m^2]
    pub inertia: Matrix3<f64>,
    /// rate of change of `inertia` due to mass change [kg-m^2/s]
    pub inertia_rate: Matrix3<f64>,
    pub mass_rate: f64,
    pub is_propellant: bool,
}

impl MassPart {
    pub fn rigid(mass: f64, position: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            position,
            inertia,
            inertia_rate: Matrix3::zeros(),
            mass_rate: 0.0,
            is_propellant: false,
        }
    }

    pub fn point(mass: f64, position: Vector3<f64>) -> Self {
        Self::rigid(mass, position, Matrix3::zeros())
    }
}

/// Mass, center of mass and inertia of the whole vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeMassProperties {
    pub mass: f64,
    pub dry_mass: f64,
    pub mass_rate: f64,
    /// relative to the structure origin, body frame [m]
    pub center_of_mass: Vector3<f64>,
    /// about the composite center of mass, body frame [kg-m^2]
    pub inertia: Matrix3<f64>,
    pub inertia_rate: Matrix3<f64>,
}

impl CompositeMassProperties {
    /// Rolls parts up with the parallel axis theorem.
    ///
    /// The mass-change part of İ shifts no inertia through the moving center of
    /// mass, since Σ m_i (r_i - c) = 0.
    pub fn from_parts<'a, I>(parts: I) -> Result<Self, MassPropertiesErrors>
    where
        I: IntoIterator<Item = &'a MassPart>,
        I::IntoIter: Clone,
    {
        let parts = parts.into_iter();
        let mut mass = 0.0;
        let mut dry_mass = 0.0;
        let mut mass_rate = 0.0;
        let mut first_moment = Vector3::zeros();
        for part in parts.clone() {
            if part.mass < 0.0 {
                return Err(MassPropertiesErrors::NegativeMass);
            }
            mass += part.mass;
            mass_rate += part.mass_rate;
            if !part.is_propellant {
                dry_mass += part.mass;
            }
            first_moment += part.mass * part.position;
        }
        if mass <= f64::EPSILON {
            return Err(MassPropertiesErrors::MassLessThanOrEqualToZero);
        }
        let center_of_mass = first_moment / mass;

        let mut inertia = Matrix3::zeros();
        let mut inertia_rate = Matrix3::zeros();
        for part in parts {
            let s = part.position - center_of_mass;
            inertia += part.inertia + parallel_axis(part.mass, &s);
            inertia_rate += part.inertia_rate + parallel_axis(part.mass_rate, &s);
        }
        // remove round-off asymmetry
        let inertia = 0.5 * (inertia + inertia.transpose());
        if !is_positive_definite(&inertia) {
            return Err(MassPropertiesErrors::NotPositiveDefinite);
        }

        Ok(Self {
            mass,
            dry_mass,
            mass_rate,
            center_of_mass,
            inertia,
            inertia_rate,
        })
    }

    pub fn inertia_inverse(&self) -> Result<Matrix3<f64>, MassPropertiesErrors> {
        self.inertia
            .try_inverse()
            .ok_or(MassPropertiesErrors::NotPositiveDefinite)
    }
}
