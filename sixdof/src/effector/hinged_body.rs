use mass_properties::{Inertia, MassPart};
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Coordinate, EffectorCommand, EffectorContext, EffectorErrors, EffectorModel,
    EffectorTelemetry, PartState, rotate_inertia,
};
use crate::state_map::{EffectorStates, EffectorStatesMut, StateKind};

#[derive(Debug, Error)]
pub enum HingedBodyErrors {
    #[error("hinged body '{0}': mass must be greater than 0")]
    NonPositiveMass(String),
    #[error("hinged body '{0}': stiffness and damping must not be negative")]
    NegativeSpringDamper(String),
    #[error("hinged body '{0}': hinge frame is not a rotation: {1}")]
    HingeFrame(String, RotationMatrixErrors),
}

/// Single-hinge rigid panel.
///
/// The hinge frame H has ĥ2 along the hinge axis. The panel frame S starts
/// aligned with H and turns about ĥ2 by θ; the panel center of mass sits at
/// `-d ŝ1` from the hinge point.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HingedBody {
    pub name: String,
    mass: f64,
    /// about the panel center of mass, panel frame [kg-m^2]
    inertia: Matrix3<f64>,
    /// hinge point to panel center of mass [m]
    d: f64,
    /// hinge point from the structure origin
    hinge_point: Vector3<f64>,
    /// rows are ĥ1, ĥ2, ĥ3 in structure (later body) components
    hinge_frame: Matrix3<f64>,
    stiffness: f64,
    damping: f64,
    theta_0: f64,
    theta_dot_0: f64,
    #[serde(skip)]
    theta_ref: f64,
    #[serde(skip)]
    theta_dot_ref: f64,
}

impl HingedBody {
    pub fn new(
        name: &str,
        mass: f64,
        inertia: Inertia,
        d: f64,
        stiffness: f64,
        damping: f64,
    ) -> Result<Self, HingedBodyErrors> {
        if !(mass > 0.0) {
            return Err(HingedBodyErrors::NonPositiveMass(name.to_string()));
        }
        if stiffness < 0.0 || damping < 0.0 {
            return Err(HingedBodyErrors::NegativeSpringDamper(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            mass,
            inertia: inertia.matrix(),
            d,
            hinge_point: Vector3::zeros(),
            hinge_frame: Matrix3::identity(),
            stiffness,
            damping,
            theta_0: 0.0,
            theta_dot_0: 0.0,
            theta_ref: 0.0,
            theta_dot_ref: 0.0,
        })
    }

    pub fn with_hinge(
        mut self,
        hinge_point: Vector3<f64>,
        hinge_frame: Matrix3<f64>,
    ) -> Result<Self, HingedBodyErrors> {
        let frame = RotationMatrix::new(hinge_frame)
            .map_err(|e| HingedBodyErrors::HingeFrame(self.name.clone(), e))?;
        self.hinge_point = hinge_point;
        self.hinge_frame = frame.value();
        Ok(self)
    }

    pub fn with_initial_angle(mut self, theta: f64, theta_dot: f64) -> Self {
        self.theta_0 = theta;
        self.theta_dot_0 = theta_dot;
        self
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Panel axes ŝ1, ŝ2, ŝ3 in body components at hinge angle `theta`.
    fn panel_axes(&self, theta: f64) -> [Vector3<f64>; 3] {
        let h1: Vector3<f64> = self.hinge_frame.row(0).transpose();
        let h2: Vector3<f64> = self.hinge_frame.row(1).transpose();
        let h3: Vector3<f64> = self.hinge_frame.row(2).transpose();
        let (sin, cos) = theta.sin_cos();
        [cos * h1 - sin * h3, h2, sin * h1 + cos * h3]
    }

    fn hinge_states(&self, states: &EffectorStates<'_>) -> (f64, f64) {
        let x = states.get(StateKind::Hinge);
        (
            x.first().copied().unwrap_or_default(),
            x.get(1).copied().unwrap_or_default(),
        )
    }
}

impl EffectorModel for HingedBody {
    fn name(&self) -> &str {
        &self.name
    }

    fn state_blocks(&self) -> Vec<(StateKind, usize)> {
        vec![(StateKind::Hinge, 2)]
    }

    fn to_body_frame(&mut self, structure_to_body: &Matrix3<f64>) {
        self.hinge_point = structure_to_body * self.hinge_point;
        self.hinge_frame *= structure_to_body.transpose();
    }

    fn initial_state(&self, states: &mut EffectorStatesMut<'_>) {
        let x = states.get_mut(StateKind::Hinge);
        if let [theta, theta_dot] = x {
            *theta = self.theta_0;
            *theta_dot = self.theta_dot_0;
        }
    }

    fn mass_parts(&self, states: &EffectorStates<'_>, parts: &mut Vec<PartState>) {
        let (theta, theta_dot) = self.hinge_states(states);
        let [s1, s2, s3] = self.panel_axes(theta);
        let body_from_panel = Matrix3::from_columns(&[s1, s2, s3]);
        let inertia = rotate_inertia(&body_from_panel, &self.inertia);
        let position = self.hinge_point - self.d * s1;

        let linear = self.d * s3;
        let coordinate = Coordinate {
            kind: StateKind::Hinge,
            index: states.offset(StateKind::Hinge).unwrap_or_default(),
            q: theta,
            q_dot: theta_dot,
            stiffness: self.stiffness,
            damping: self.damping,
            q_ref: self.theta_ref,
            q_dot_ref: self.theta_dot_ref,
            linear,
            angular: s2,
            bias: self.d * theta_dot * theta_dot * s1,
        };
        parts.push(PartState {
            part: MassPart::rigid(self.mass, position, inertia),
            velocity: theta_dot * linear,
            angular_velocity: theta_dot * s2,
            coordinate: Some(coordinate),
        });
    }

    fn apply_command(&mut self, _t: f64, command: &EffectorCommand) -> Result<(), EffectorErrors> {
        match command {
            EffectorCommand::HingeReference { theta, theta_dot }
                if theta.is_finite() && theta_dot.is_finite() =>
            {
                self.theta_ref = *theta;
                self.theta_dot_ref = *theta_dot;
                Ok(())
            }
            _ => Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: format!("{command:?} is not a finite hinge reference"),
            }),
        }
    }

    fn telemetry(&self, _ctx: &EffectorContext, states: &EffectorStates<'_>) -> EffectorTelemetry {
        let (theta, theta_dot) = self.hinge_states(states);
        EffectorTelemetry::HingedBody { theta, theta_dot }
    }
}
