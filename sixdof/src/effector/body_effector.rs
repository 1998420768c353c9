use std::fmt::Debug;

use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use serde::{Deserialize, Serialize};

use super::{EffectorContext, EffectorModel, EffectorTelemetry, ForceTorque};
use crate::state_map::EffectorStates;

/// One-way coupled force source supplied from outside the propagator
/// (drag, solar pressure, disturbance torques).
#[typetag::serde]
pub trait BodyForceModel: Debug + Send + Sync {
    /// Body frame force on the hub and torque about the composite center of mass.
    fn force_torque(&self, ctx: &EffectorContext) -> (Vector3<f64>, Vector3<f64>);
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConstantForceTorque {
    pub force: Vector3<f64>,
    pub torque: Vector3<f64>,
}

#[typetag::serde]
impl BodyForceModel for ConstantForceTorque {
    fn force_torque(&self, _ctx: &EffectorContext) -> (Vector3<f64>, Vector3<f64>) {
        (self.force, self.torque)
    }
}

/// 3μ/r³ r̂ × I r̂ about the composite center of mass.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GravityGradientTorque;

#[typetag::serde]
impl BodyForceModel for GravityGradientTorque {
    fn force_torque(&self, ctx: &EffectorContext) -> (Vector3<f64>, Vector3<f64>) {
        let r = ctx.position.norm();
        if ctx.mu_central <= 0.0 || r <= f64::EPSILON {
            return (Vector3::zeros(), Vector3::zeros());
        }
        let r_hat = RotationMatrix::from(&ctx.sigma).transform(&(ctx.position / r));
        let torque = 3.0 * ctx.mu_central / r.powi(3) * r_hat.cross(&(ctx.mass.inertia * r_hat));
        (Vector3::zeros(), torque)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BodyEffector {
    pub name: String,
    model: Box<dyn BodyForceModel>,
}

impl BodyEffector {
    pub fn new(name: &str, model: impl BodyForceModel + 'static) -> Self {
        Self {
            name: name.to_string(),
            model: Box::new(model),
        }
    }

    pub fn model(&self) -> &dyn BodyForceModel {
        self.model.as_ref()
    }
}

impl EffectorModel for BodyEffector {
    fn name(&self) -> &str {
        &self.name
    }

    // already body frame
    fn to_body_frame(&mut self, _structure_to_body: &Matrix3<f64>) {}

    fn force_torque(&self, ctx: &EffectorContext, _states: &EffectorStates<'_>) -> ForceTorque {
        let (force, torque) = self.model.force_torque(ctx);
        // about the structure origin
        ForceTorque {
            force,
            torque: torque + ctx.mass.center_of_mass.cross(&force),
        }
    }

    fn telemetry(&self, ctx: &EffectorContext, _states: &EffectorStates<'_>) -> EffectorTelemetry {
        let (force, torque) = self.model.force_torque(ctx);
        EffectorTelemetry::Body { force, torque }
    }
}
