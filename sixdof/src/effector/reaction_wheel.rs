use log::warn;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    EffectorCommand, EffectorContext, EffectorErrors, EffectorModel, EffectorTelemetry,
    ForceTorque,
};
use crate::state_map::{EffectorStates, EffectorStatesMut, StateKind};

#[derive(Debug, Error)]
pub enum ReactionWheelErrors {
    #[error("wheel '{0}': spin axis inertia must be greater than 0")]
    SmallInertia(String),
    #[error("wheel '{0}': spin axis must be nonzero")]
    ZeroSpinAxis(String),
    #[error("wheel '{0}': max torque must be greater than 0")]
    NegativeMaxTorque(String),
    #[error("wheel '{0}': coulomb friction should be greater than 0")]
    NegativeCoulomb(String),
    #[error("wheel '{0}': viscous friction should be greater than 0")]
    NegativeViscous(String),
    #[error("wheel '{0}': imbalance should be greater than 0")]
    NegativeImbalance(String),
}

/// Bearing friction acting on the rotor speed relative to the body.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct ReactionWheelFriction {
    pub coulomb: f64,
    pub viscous: f64,
}

impl ReactionWheelFriction {
    pub fn calculate_dynamic_friction(&self, velocity: f64) -> f64 {
        let coulomb = if velocity == 0.0 {
            0.0
        } else {
            -velocity.signum() * self.coulomb
        };
        coulomb - self.viscous * velocity
    }
}

/// Rotor mass imbalance.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ReactionWheelJitter {
    /// U_s [kg-m]
    pub static_imbalance: f64,
    /// U_d [kg-m^2]
    pub dynamic_imbalance: f64,
    /// rotor phase relative to the body at t = 0 [rad]
    pub initial_phase: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReactionWheel {
    pub name: String,
    spin_axis: Vector3<f64>,
    location: Vector3<f64>,
    /// J_s [kg-m^2]
    inertia: f64,
    /// inertial spin rate about the spin axis [rad/s]
    initial_speed: f64,
    initial_angle: f64,
    torque_max: Option<f64>,
    friction: ReactionWheelFriction,
    jitter: Option<ReactionWheelJitter>,
    #[serde(skip)]
    command: f64,
}

impl ReactionWheel {
    pub fn new(
        name: &str,
        spin_axis: Vector3<f64>,
        inertia: f64,
    ) -> Result<Self, ReactionWheelErrors> {
        if !(inertia > f64::EPSILON) {
            return Err(ReactionWheelErrors::SmallInertia(name.to_string()));
        }
        let norm = spin_axis.norm();
        if !(norm > f64::EPSILON) {
            return Err(ReactionWheelErrors::ZeroSpinAxis(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            spin_axis: spin_axis / norm,
            location: Vector3::zeros(),
            inertia,
            initial_speed: 0.0,
            initial_angle: 0.0,
            torque_max: None,
            friction: ReactionWheelFriction::default(),
            jitter: None,
            command: 0.0,
        })
    }

    pub fn with_location(mut self, location: Vector3<f64>) -> Self {
        self.location = location;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.initial_speed = speed;
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.initial_angle = angle;
        self
    }

    pub fn with_torque_max(mut self, torque_max: f64) -> Result<Self, ReactionWheelErrors> {
        if !(torque_max > 0.0) {
            return Err(ReactionWheelErrors::NegativeMaxTorque(self.name));
        }
        self.torque_max = Some(torque_max);
        Ok(self)
    }

    pub fn with_coulomb(mut self, coulomb: f64) -> Result<Self, ReactionWheelErrors> {
        if coulomb < 0.0 {
            return Err(ReactionWheelErrors::NegativeCoulomb(self.name));
        }
        self.friction.coulomb = coulomb;
        Ok(self)
    }

    pub fn with_viscous(mut self, viscous: f64) -> Result<Self, ReactionWheelErrors> {
        if viscous < 0.0 {
            return Err(ReactionWheelErrors::NegativeViscous(self.name));
        }
        self.friction.viscous = viscous;
        Ok(self)
    }

    pub fn with_jitter(
        mut self,
        static_imbalance: f64,
        dynamic_imbalance: f64,
    ) -> Result<Self, ReactionWheelErrors> {
        if static_imbalance < 0.0 || dynamic_imbalance < 0.0 {
            return Err(ReactionWheelErrors::NegativeImbalance(self.name));
        }
        self.jitter = Some(ReactionWheelJitter {
            static_imbalance,
            dynamic_imbalance,
            initial_phase: 0.0,
        });
        Ok(self)
    }

    pub fn spin_axis(&self) -> &Vector3<f64> {
        &self.spin_axis
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter.is_some()
    }

    /// Commanded motor torque after saturation.
    pub fn motor_torque(&self) -> f64 {
        match self.torque_max {
            Some(max) => self.command.clamp(-max, max),
            None => self.command,
        }
    }

    /// Motor plus bearing torque on the rotor at inertial speed `speed`.
    fn net_torque(&self, speed: f64, omega: &Vector3<f64>) -> f64 {
        let relative = speed - self.spin_axis.dot(omega);
        self.motor_torque() + self.friction.calculate_dynamic_friction(relative)
    }

    /// Unit vector along the imbalance at rotor phase `phase`.
    fn imbalance_direction(&self, phase: f64) -> Vector3<f64> {
        let s = &self.spin_axis;
        let least = s.iamin();
        let g1 = s.cross(&Vector3::ith(least, 1.0)).normalize();
        let g2 = s.cross(&g1);
        let (sin, cos) = phase.sin_cos();
        cos * g1 + sin * g2
    }
}

/// Wheels sharing one command channel.
///
/// States are (Θ, Ω) per wheel, then one rotor phase per jittered wheel.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReactionWheelSet {
    pub name: String,
    wheels: Vec<ReactionWheel>,
}

impl ReactionWheelSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wheels: Vec::new(),
        }
    }

    pub fn with_wheel(mut self, wheel: ReactionWheel) -> Self {
        self.wheels.push(wheel);
        self
    }

    pub fn wheels(&self) -> &[ReactionWheel] {
        &self.wheels
    }

    fn jittered(&self) -> impl Iterator<Item = (&ReactionWheel, &ReactionWheelJitter)> {
        self.wheels
            .iter()
            .filter_map(|w| w.jitter.as_ref().map(|j| (w, j)))
    }
}

impl EffectorModel for ReactionWheelSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn state_blocks(&self) -> Vec<(StateKind, usize)> {
        vec![
            (StateKind::WheelSpin, 2 * self.wheels.len()),
            (StateKind::WheelJitter, self.jittered().count()),
        ]
    }

    fn to_body_frame(&mut self, structure_to_body: &Matrix3<f64>) {
        for wheel in &mut self.wheels {
            wheel.spin_axis = (structure_to_body * wheel.spin_axis).normalize();
            wheel.location = structure_to_body * wheel.location;
        }
    }

    fn initial_state(&self, states: &mut EffectorStatesMut<'_>) {
        let spin = states.get_mut(StateKind::WheelSpin);
        for (x, wheel) in spin.chunks_exact_mut(2).zip(&self.wheels) {
            x[0] = wheel.initial_angle;
            x[1] = wheel.initial_speed;
        }
        let phases = states.get_mut(StateKind::WheelJitter);
        for (x, (_, jitter)) in phases.iter_mut().zip(self.jittered()) {
            *x = jitter.initial_phase;
        }
    }

    fn force_torque(&self, ctx: &EffectorContext, states: &EffectorStates<'_>) -> ForceTorque {
        let spin = states.get(StateKind::WheelSpin);
        let mut ft = ForceTorque::default();
        for (x, wheel) in spin.chunks_exact(2).zip(&self.wheels) {
            let speed = x[1];
            let h = wheel.inertia * speed * wheel.spin_axis;
            ft.torque -= wheel.net_torque(speed, &ctx.omega) * wheel.spin_axis + ctx.omega.cross(&h);
        }

        let phases = states.get(StateKind::WheelJitter);
        let jittered = spin
            .chunks_exact(2)
            .zip(&self.wheels)
            .filter_map(|(x, w)| w.jitter.as_ref().map(|j| (x[1], w, j)));
        for (phase, (speed, wheel, jitter)) in phases.iter().zip(jittered) {
            let u = wheel.imbalance_direction(*phase);
            let force = jitter.static_imbalance * speed * speed * u;
            ft += ForceTorque::at_point(force, &wheel.location);
            ft.torque += jitter.dynamic_imbalance * speed * speed * u;
        }
        ft
    }

    fn write_derivatives(
        &self,
        ctx: &EffectorContext,
        states: &EffectorStates<'_>,
        derivatives: &mut EffectorStatesMut<'_>,
    ) {
        let spin = states.get(StateKind::WheelSpin);
        let d_spin = derivatives.get_mut(StateKind::WheelSpin);
        for ((x, dx), wheel) in spin.chunks_exact(2).zip(d_spin.chunks_exact_mut(2)).zip(&self.wheels) {
            dx[0] = x[1];
            dx[1] = wheel.net_torque(x[1], &ctx.omega) / wheel.inertia;
        }

        let d_phase = derivatives.get_mut(StateKind::WheelJitter);
        let speeds = spin.chunks_exact(2).zip(&self.wheels);
        let jittered_speeds = speeds.filter(|(_, w)| w.has_jitter());
        for (dx, (x, wheel)) in d_phase.iter_mut().zip(jittered_speeds) {
            *dx = x[1] - wheel.spin_axis.dot(&ctx.omega);
        }
    }

    fn internal_momentum(&self, states: &EffectorStates<'_>) -> Vector3<f64> {
        states
            .get(StateKind::WheelSpin)
            .chunks_exact(2)
            .zip(&self.wheels)
            .map(|(x, wheel)| wheel.inertia * x[1] * wheel.spin_axis)
            .sum()
    }

    fn internal_energy(&self, states: &EffectorStates<'_>) -> f64 {
        states
            .get(StateKind::WheelSpin)
            .chunks_exact(2)
            .zip(&self.wheels)
            .map(|(x, wheel)| 0.5 * wheel.inertia * x[1] * x[1])
            .sum()
    }

    fn internal_power(&self, ctx: &EffectorContext, states: &EffectorStates<'_>) -> f64 {
        states
            .get(StateKind::WheelSpin)
            .chunks_exact(2)
            .zip(&self.wheels)
            .map(|(x, wheel)| wheel.net_torque(x[1], &ctx.omega) * x[1])
            .sum()
    }

    fn apply_command(&mut self, _t: f64, command: &EffectorCommand) -> Result<(), EffectorErrors> {
        let EffectorCommand::WheelTorques(torques) = command else {
            return Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: "reaction wheels only accept wheel torques".into(),
            });
        };
        if torques.len() != self.wheels.len() {
            return Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: format!(
                    "expected {} wheel torques, got {}",
                    self.wheels.len(),
                    torques.len()
                ),
            });
        }
        if let Some(bad) = torques.iter().find(|t| !t.is_finite()) {
            return Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: format!("wheel torque {bad} is not finite"),
            });
        }
        for (wheel, torque) in self.wheels.iter_mut().zip(torques) {
            wheel.command = *torque;
            if let Some(max) = wheel.torque_max {
                if torque.abs() > max {
                    warn!(
                        "wheel '{}' torque command {} saturated at {}",
                        wheel.name, torque, max
                    );
                }
            }
        }
        Ok(())
    }

    fn telemetry(&self, _ctx: &EffectorContext, states: &EffectorStates<'_>) -> EffectorTelemetry {
        let spin = states.get(StateKind::WheelSpin);
        EffectorTelemetry::ReactionWheels {
            angles: spin.chunks_exact(2).map(|x| x[0]).collect(),
            speeds: spin.chunks_exact(2).map(|x| x[1]).collect(),
            motor_torques: self.wheels.iter().map(|w| w.motor_torque()).collect(),
        }
    }
}
