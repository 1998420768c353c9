use std::collections::VecDeque;

use mass_properties::CompositeMassProperties;
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use serde::{Deserialize, Serialize};

use crate::effector::EffectorTelemetry;

/// Translational and rotational state of the vehicle at the end of a tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStateMessage {
    /// composite center of mass relative to the central body, inertial [m]
    pub r_bn_n: Vector3<f64>,
    /// [m/s]
    pub v_bn_n: Vector3<f64>,
    pub sigma_bn: Mrp,
    /// body rate, body frame [rad/s]
    pub omega_bn_b: Vector3<f64>,
    /// accumulated non-gravitational ΔV, body frame [m/s]
    pub total_accum_dv_bdy: Vector3<f64>,
    /// non-gravitational acceleration at the end of the tick, body frame [m/s^2]
    pub nonconservative_accel_bdy: Vector3<f64>,
    pub sim_nanos: u64,
    pub shadow_count: u64,
    /// at least one gravity body is running on an old pose
    pub stale: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MassPropertiesMessage {
    /// [kg]
    pub mass: f64,
    pub dry_mass: f64,
    /// relative to the structure origin, body frame [m]
    pub center_of_mass: Vector3<f64>,
    /// about the center of mass, body frame [kg-m^2]
    pub inertia: Matrix3<f64>,
    pub inertia_inverse: Matrix3<f64>,
    pub sim_nanos: u64,
}

impl MassPropertiesMessage {
    pub fn new(props: &CompositeMassProperties, inertia_inverse: Matrix3<f64>, sim_nanos: u64) -> Self {
        Self {
            mass: props.mass,
            dry_mass: props.dry_mass,
            center_of_mass: props.center_of_mass,
            inertia: props.inertia,
            inertia_inverse,
            sim_nanos,
        }
    }
}

/// Name of the body the translational state is measured from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CentralBodyMessage {
    pub name: String,
    pub sim_nanos: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectorTelemetryMessage {
    pub name: String,
    pub telemetry: EffectorTelemetry,
    pub sim_nanos: u64,
}

/// Keeps the last `capacity` published messages, oldest first.
#[derive(Clone, Debug)]
pub struct OutputBuffer<T> {
    capacity: usize,
    messages: VecDeque<T>,
}

impl<T> OutputBuffer<T> {
    /// A zero capacity is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, message: T) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn latest(&self) -> Option<&T> {
        self.messages.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl<T> Default for OutputBuffer<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let mut buffer = OutputBuffer::new(2);
        assert!(buffer.is_empty());
        for i in 0..5 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest(), Some(&4));
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        buffer.clear();
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = OutputBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.latest(), Some(&"b"));
    }
}
