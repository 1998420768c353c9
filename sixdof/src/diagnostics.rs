//! Energy and momentum bookkeeping published after every tick.
//!
//! Rotational quantities are about the composite center of mass and include
//! internal motion (hinges, slosh, rotors) so that they are conserved for a
//! free vehicle. Translational kinetic energy of the center of mass belongs to
//! the orbital terms.

use nalgebra::Vector3;
use rotations::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    EffectorModel, EquationsOfMotion,
    eom::Evaluation,
    state_map::{EffectorStates, POSITION, VELOCITY},
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsMessage {
    /// ½ m vᵀv - m μ/‖r‖ [J]
    pub orbital_energy: f64,
    /// m r × v, inertial [kg-m^2/s]
    pub orbital_angular_momentum: Vector3<f64>,
    pub orbital_angular_momentum_norm: f64,
    /// about the composite center of mass [J]
    pub rotational_energy: f64,
    /// about the composite center of mass, inertial [kg-m^2/s]
    pub rotational_angular_momentum: Vector3<f64>,
    pub rotational_angular_momentum_norm: f64,
    /// power delivered to the rotational energy by applied torques, generalized
    /// forces, dampers and rotor motors [W]
    pub rotational_power: f64,
    /// backward difference of `rotational_energy`, zero on the first message [W]
    pub rotational_energy_rate: f64,
    pub sim_nanos: u64,
}

impl DiagnosticsMessage {
    /// Diagnostics at state `x`. `evaluation` must come from the most recent
    /// evaluation of `eom` at `x`.
    pub(crate) fn new(
        eom: &EquationsOfMotion,
        x: &[f64],
        evaluation: &Evaluation,
        sim_nanos: u64,
        previous: Option<&DiagnosticsMessage>,
    ) -> Self {
        let ctx = &evaluation.context;
        let m = ctx.mass.mass;
        let r = Vector3::from_column_slice(&x[POSITION]);
        let v = Vector3::from_column_slice(&x[VELOCITY]);
        let orbital_energy = if r.norm() > 0.0 {
            0.5 * m * v.norm_squared() - m * ctx.mu_central / r.norm()
        } else {
            0.5 * m * v.norm_squared()
        };
        let orbital_angular_momentum = m * r.cross(&v);

        let (mut rotational_energy, mut h_body) = rotational_energy_momentum(eom, &ctx.omega);
        let mut rotational_power = ctx.omega.dot(&evaluation.torque) + evaluation.coordinate_power;
        for (i, effector) in eom.effectors.iter().enumerate() {
            let states = EffectorStates::new(x, &eom.map, i);
            rotational_energy += effector.internal_energy(&states);
            h_body += effector.internal_momentum(&states);
            rotational_power += effector.internal_power(ctx, &states);
        }
        let rotational_angular_momentum = RotationMatrix::from(&ctx.sigma).rotate(&h_body);

        let rotational_energy_rate = match previous {
            Some(p) if sim_nanos > p.sim_nanos => {
                (rotational_energy - p.rotational_energy) / ((sim_nanos - p.sim_nanos) as f64 * 1e-9)
            }
            _ => 0.0,
        };

        Self {
            orbital_energy,
            orbital_angular_momentum,
            orbital_angular_momentum_norm: orbital_angular_momentum.norm(),
            rotational_energy,
            rotational_angular_momentum,
            rotational_angular_momentum_norm: rotational_angular_momentum.norm(),
            rotational_power,
            rotational_energy_rate,
            sim_nanos,
        }
    }

    pub fn headers() -> [&'static str; 11] {
        [
            "t",
            "orbital_energy",
            "orbital_angular_momentum[x]",
            "orbital_angular_momentum[y]",
            "orbital_angular_momentum[z]",
            "rotational_energy",
            "rotational_angular_momentum[x]",
            "rotational_angular_momentum[y]",
            "rotational_angular_momentum[z]",
            "rotational_power",
            "rotational_energy_rate",
        ]
    }

    pub fn record(&self, t: f64) -> Vec<String> {
        let mut record = vec![t.to_string(), self.orbital_energy.to_string()];
        record.extend(self.orbital_angular_momentum.iter().map(f64::to_string));
        record.push(self.rotational_energy.to_string());
        record.extend(self.rotational_angular_momentum.iter().map(f64::to_string));
        record.push(self.rotational_power.to_string());
        record.push(self.rotational_energy_rate.to_string());
        record
    }
}

/// Kinetic plus spring energy and angular momentum (body components) of the
/// mass parts about the composite center of mass.
fn rotational_energy_momentum(eom: &EquationsOfMotion, omega: &Vector3<f64>) -> (f64, Vector3<f64>) {
    let parts = eom.parts();
    let m: f64 = parts.iter().map(|p| p.part.mass).sum();
    if m <= 0.0 {
        return (0.0, Vector3::zeros());
    }
    let c = parts.iter().map(|p| p.part.mass * p.part.position).sum::<Vector3<f64>>() / m;
    let c_dot = parts.iter().map(|p| p.part.mass * p.velocity).sum::<Vector3<f64>>() / m;

    let mut energy = 0.0;
    let mut momentum = Vector3::zeros();
    for p in parts {
        let s = p.part.position - c;
        let velocity = omega.cross(&s) + p.velocity - c_dot;
        let rate = omega + p.angular_velocity;
        let spin = p.part.inertia * rate;
        energy += 0.5 * p.part.mass * velocity.norm_squared() + 0.5 * rate.dot(&spin);
        momentum += p.part.mass * s.cross(&velocity) + spin;
        if let Some(q) = &p.coordinate {
            energy += q.spring_energy();
        }
    }
    (energy, momentum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropagatorConfig;
    use crate::effector::reaction_wheel::{ReactionWheel, ReactionWheelSet};
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix3;
    use sixdof_diffeq::StateVector;

    #[test]
    fn test_rigid_rotational_terms() {
        let inertia = Matrix3::from_diagonal(&Vector3::new(100.0, 100.0, 200.0));
        let omega = Vector3::new(1.0, 0.0, 0.1);
        let config = PropagatorConfig::default()
            .with_gravity(false)
            .with_dry_properties(50.0, Vector3::new(0.1, 0.0, 0.0), inertia)
            .with_attitude(Mrp::new(0.0, 0.0, 0.0), omega)
            .with_state(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 1.0, 0.0));
        let mut eom = EquationsOfMotion::new(&config);
        eom.bind().unwrap();
        let x = eom.initial_state(&config);
        let mut dx = StateVector::zeros(x.len());
        let evaluation = eom.evaluate(0.0, &x, &mut dx).unwrap();
        let message = DiagnosticsMessage::new(&eom, &x, &evaluation, 0, None);

        assert_abs_diff_eq!(message.rotational_energy, 0.5 * omega.dot(&(inertia * omega)), epsilon = 1e-12);
        assert_abs_diff_eq!(message.rotational_angular_momentum, inertia * omega, epsilon = 1e-12);
        assert_eq!(message.rotational_power, 0.0);
        assert_eq!(message.rotational_energy_rate, 0.0);
        // no gravity leaves only kinetic orbital energy
        assert_abs_diff_eq!(message.orbital_energy, 25.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            message.orbital_angular_momentum,
            50.0 * Vector3::new(-3.0, 0.0, 1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_wheel_momentum_included() {
        let config = PropagatorConfig::default().with_gravity(false);
        let mut eom = EquationsOfMotion::new(&config);
        eom.effectors.push(
            ReactionWheelSet::new("rwa")
                .with_wheel(ReactionWheel::new("rw", Vector3::z(), 0.2).unwrap().with_speed(10.0))
                .into(),
        );
        eom.bind().unwrap();
        let x = eom.initial_state(&config);
        let mut dx = StateVector::zeros(x.len());
        let evaluation = eom.evaluate(0.0, &x, &mut dx).unwrap();
        let first = DiagnosticsMessage::new(&eom, &x, &evaluation, 0, None);
        assert_abs_diff_eq!(first.rotational_energy, 0.5 * 0.2 * 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(first.rotational_angular_momentum, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);

        let second = DiagnosticsMessage::new(&eom, &x, &evaluation, 1_000_000_000, Some(&first));
        assert_eq!(second.rotational_energy_rate, 0.0);
        assert_eq!(second.record(1.0).len(), DiagnosticsMessage::headers().len());
    }
}
