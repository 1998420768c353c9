use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    EffectorCommand, EffectorContext, EffectorErrors, EffectorModel, EffectorTelemetry,
    ForceTorque, G0,
};
use crate::state_map::EffectorStates;

#[derive(Debug, Error)]
pub enum ThrusterErrors {
    #[error("thruster '{0}': max thrust must be greater than 0")]
    NonPositiveThrust(String),
    #[error("thruster '{0}': specific impulse must be greater than 0")]
    NonPositiveIsp(String),
    #[error("thruster '{0}': direction must be nonzero")]
    ZeroDirection(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Thruster {
    pub name: String,
    location: Vector3<f64>,
    /// unit thrust direction
    direction: Vector3<f64>,
    /// [N]
    max_thrust: f64,
    /// [s]
    isp: f64,
    #[serde(skip)]
    on_time: f64,
    #[serde(skip)]
    latch_time: f64,
}

impl Thruster {
    pub fn new(
        name: &str,
        location: Vector3<f64>,
        direction: Vector3<f64>,
        max_thrust: f64,
        isp: f64,
    ) -> Result<Self, ThrusterErrors> {
        if !(max_thrust > 0.0) {
            return Err(ThrusterErrors::NonPositiveThrust(name.to_string()));
        }
        if !(isp > 0.0) {
            return Err(ThrusterErrors::NonPositiveIsp(name.to_string()));
        }
        let norm = direction.norm();
        if !(norm > f64::EPSILON) {
            return Err(ThrusterErrors::ZeroDirection(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            location,
            direction: direction / norm,
            max_thrust,
            isp,
            on_time: 0.0,
            latch_time: 0.0,
        })
    }

    /// Firing while less than the latched on-time has elapsed.
    pub fn is_firing(&self, t: f64) -> bool {
        let elapsed = t - self.latch_time;
        elapsed >= 0.0 && elapsed < self.on_time
    }

    pub fn mass_flow(&self) -> f64 {
        self.max_thrust / (self.isp * G0)
    }
}

/// Thrusters sharing a command channel and, optionally, a fuel tank.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ThrusterSet {
    pub name: String,
    thrusters: Vec<Thruster>,
    tank: Option<String>,
    #[serde(skip, default = "feed_default")]
    feed_available: bool,
}

fn feed_default() -> bool {
    true
}

impl ThrusterSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            thrusters: Vec::new(),
            tank: None,
            feed_available: true,
        }
    }

    pub fn with_thruster(mut self, thruster: Thruster) -> Self {
        self.thrusters.push(thruster);
        self
    }

    /// Draws propellant from the tank effector called `tank`.
    pub fn with_tank(mut self, tank: &str) -> Self {
        self.tank = Some(tank.to_string());
        self
    }

    pub fn thrusters(&self) -> &[Thruster] {
        &self.thrusters
    }

    pub fn tank(&self) -> Option<&str> {
        self.tank.as_deref()
    }

    pub(crate) fn set_feed_available(&mut self, available: bool) {
        self.feed_available = available;
    }

    fn firing(&self, t: f64) -> impl Iterator<Item = &Thruster> {
        self.thrusters
            .iter()
            .filter(move |thruster| self.feed_available && thruster.is_firing(t))
    }

    /// Propellant consumed at time `t` [kg/s].
    pub fn total_mass_flow(&self, t: f64) -> f64 {
        self.firing(t).map(Thruster::mass_flow).sum()
    }
}

impl EffectorModel for ThrusterSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_body_frame(&mut self, structure_to_body: &Matrix3<f64>) {
        for thruster in &mut self.thrusters {
            thruster.location = structure_to_body * thruster.location;
            thruster.direction = (structure_to_body * thruster.direction).normalize();
        }
    }

    fn force_torque(&self, ctx: &EffectorContext, _states: &EffectorStates<'_>) -> ForceTorque {
        let mut ft = ForceTorque::default();
        for thruster in self.firing(ctx.t) {
            ft += ForceTorque::at_point(thruster.max_thrust * thruster.direction, &thruster.location);
        }
        ft
    }

    fn apply_command(&mut self, t: f64, command: &EffectorCommand) -> Result<(), EffectorErrors> {
        let EffectorCommand::ThrusterOnTimes(on_times) = command else {
            return Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: "thrusters only accept on-times".into(),
            });
        };
        if on_times.len() != self.thrusters.len() {
            return Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: format!(
                    "expected {} on-times, got {}",
                    self.thrusters.len(),
                    on_times.len()
                ),
            });
        }
        if let Some(bad) = on_times.iter().find(|t| !(**t >= 0.0) || !t.is_finite()) {
            return Err(EffectorErrors::InvalidCommand {
                name: self.name.clone(),
                reason: format!("on-time {bad} must be finite and not negative"),
            });
        }
        for (thruster, on_time) in self.thrusters.iter_mut().zip(on_times) {
            thruster.on_time = *on_time;
            thruster.latch_time = t;
        }
        Ok(())
    }

    fn telemetry(&self, ctx: &EffectorContext, _states: &EffectorStates<'_>) -> EffectorTelemetry {
        let firing: Vec<bool> = self
            .thrusters
            .iter()
            .map(|thruster| self.feed_available && thruster.is_firing(ctx.t))
            .collect();
        let thrust = self
            .thrusters
            .iter()
            .zip(&firing)
            .map(|(thruster, on)| if *on { thruster.max_thrust } else { 0.0 })
            .collect();
        EffectorTelemetry::Thrusters {
            firing,
            thrust,
            mass_flow: self.total_mass_flow(ctx.t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::test_support::{context, pack};
    use approx::assert_abs_diff_eq;

    fn set() -> ThrusterSet {
        ThrusterSet::new("rcs")
            .with_thruster(
                Thruster::new("t1", Vector3::new(0.0, 1.0, 0.0), Vector3::x(), 2.0, 200.0).unwrap(),
            )
            .with_thruster(
                Thruster::new("t2", Vector3::new(0.0, -1.0, 0.0), Vector3::x(), 2.0, 200.0).unwrap(),
            )
    }

    #[test]
    fn test_validation() {
        assert!(Thruster::new("t", Vector3::zeros(), Vector3::x(), 0.0, 200.0).is_err());
        assert!(Thruster::new("t", Vector3::zeros(), Vector3::x(), 1.0, 0.0).is_err());
        assert!(Thruster::new("t", Vector3::zeros(), Vector3::zeros(), 1.0, 200.0).is_err());
    }

    #[test]
    fn test_on_time_latch() {
        let mut set = set();
        set.apply_command(10.0, &EffectorCommand::ThrusterOnTimes(vec![0.5, 0.0]))
            .unwrap();
        let (map, x) = pack(&set);
        let states = EffectorStates::new(&x, &map, 0);
        let mut ctx = context(Vector3::zeros());

        ctx.t = 10.25;
        let ft = set.force_torque(&ctx, &states);
        assert_eq!(ft.force, Vector3::new(2.0, 0.0, 0.0));
        // force along x at +y gives torque about -z
        assert_eq!(ft.torque, Vector3::new(0.0, 0.0, -2.0));
        assert_abs_diff_eq!(set.total_mass_flow(ctx.t), 2.0 / (200.0 * G0), epsilon = 1e-15);

        ctx.t = 10.5;
        assert_eq!(set.force_torque(&ctx, &states), ForceTorque::default());
        ctx.t = 9.9;
        assert_eq!(set.force_torque(&ctx, &states), ForceTorque::default());
    }

    #[test]
    fn test_empty_feed() {
        let mut set = set();
        set.apply_command(0.0, &EffectorCommand::ThrusterOnTimes(vec![1.0, 1.0]))
            .unwrap();
        set.set_feed_available(false);
        let (map, x) = pack(&set);
        let states = EffectorStates::new(&x, &map, 0);
        let ctx = context(Vector3::zeros());
        assert_eq!(set.force_torque(&ctx, &states), ForceTorque::default());
        assert_eq!(set.total_mass_flow(0.0), 0.0);
    }

    #[test]
    fn test_bad_commands() {
        let mut set = set();
        assert!(
            set.apply_command(0.0, &EffectorCommand::ThrusterOnTimes(vec![1.0]))
                .is_err()
        );
        assert!(
            set.apply_command(0.0, &EffectorCommand::ThrusterOnTimes(vec![1.0, -1.0]))
                .is_err()
        );
        assert!(
            set.apply_command(0.0, &EffectorCommand::WheelTorques(vec![1.0, 1.0]))
                .is_err()
        );
    }
}
