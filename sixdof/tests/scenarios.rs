use std::f64::consts::{FRAC_PI_4, PI};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use celestial::{ClassicalElements, PlanetEphemeris, PlanetOrientation};
use gravity::{GravityBody, PlanetStateMessage, point_mass, third_body};
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use sixdof::{
    EffectorCommand, PropagatorConfig, SixDofPropagator,
    effector::reaction_wheel::{ReactionWheel, ReactionWheelSet},
    state_map::VELOCITY,
};
use spherical_harmonics::GravityCoefficients;
use utilities::assert_equal_reltol;

const MU_EARTH: f64 = 3.986e14;
const R_EARTH: f64 = 6378137.0;
const SECOND: u64 = 1_000_000_000;

fn earth() -> GravityBody {
    GravityBody::new("earth", MU_EARTH, R_EARTH).unwrap().with_central()
}

/// Two-body position after `dt` for a start at an apsis (r0 · v0 = 0).
fn kepler_apsis(r0: &Vector3<f64>, v0: &Vector3<f64>, dt: f64) -> Vector3<f64> {
    let r0_mag = r0.norm();
    let a = 1.0 / (2.0 / r0_mag - v0.norm_squared() / MU_EARTH);
    let n = (MU_EARTH / a.powi(3)).sqrt();
    let k = 1.0 - r0_mag / a;
    // n dt = ΔE - (1 - r0/a) sin ΔE
    let mut de = n * dt;
    for _ in 0..50 {
        let step = (de - k * de.sin() - n * dt) / (1.0 - k * de.cos());
        de -= step;
        if step.abs() < 1e-15 {
            break;
        }
    }
    let f = 1.0 - a / r0_mag * (1.0 - de.cos());
    let g = dt + (de.sin() - de) / n;
    f * r0 + g * v0
}

#[test]
fn kepler_orbit_matches_two_body_solution() {
    let r0 = Vector3::new(7e6, 0.0, 0.0);
    let v0 = Vector3::new(0.0, 7546.05, 0.0);
    let mut propagator = SixDofPropagator::new(PropagatorConfig::default().with_state(r0, v0))
        .with_gravity_body(earth())
        .unwrap();
    propagator.initialize().unwrap();
    let e0 = propagator.latest_diagnostics().unwrap().orbital_energy;

    for _ in 0..5560 {
        propagator.step(SECOND).unwrap();
    }

    let expected = kepler_apsis(&r0, &v0, 5560.0);
    assert!(
        (propagator.position() - expected).norm() < 10.0,
        "position error {} m",
        (propagator.position() - expected).norm()
    );
    let e1 = propagator.latest_diagnostics().unwrap().orbital_energy;
    assert!(((e1 - e0) / e0).abs() < 1e-10);
}

#[test]
fn j2_nodal_regression_matches_secular_rate() {
    let j2 = 1.0826e-3;
    let a = 7e6;
    let inclination = FRAC_PI_4;
    let speed = 7546.05;
    let r0 = Vector3::new(a, 0.0, 0.0);
    let v0 = speed * Vector3::new(0.0, inclination.cos(), inclination.sin());
    let body = GravityBody::new("earth", MU_EARTH, R_EARTH)
        .unwrap()
        .with_central()
        .with_j_params(vec![j2]);
    let mut propagator = SixDofPropagator::new(
        PropagatorConfig::default()
            .with_state(r0, v0)
            .with_rotation(false),
    )
    .with_gravity_body(body)
    .unwrap();
    propagator.initialize().unwrap();

    let raan = |r: Vector3<f64>, v: Vector3<f64>| {
        let h = r.cross(&v);
        h[0].atan2(-h[1])
    };
    // node crossings (t, Ω), starting at the ascending node
    let mut nodes = vec![(0.0, raan(r0, v0))];
    let dt = 10;
    let mut z_prev = 0.0;
    for k in 1..=8640 {
        propagator.step(dt * SECOND).unwrap();
        let r = propagator.position();
        if z_prev < 0.0 && r[2] >= 0.0 {
            nodes.push(((k * dt) as f64, raan(r, propagator.velocity())));
        }
        z_prev = r[2];
    }
    assert!(nodes.len() > 10);

    // least squares slope of Ω(t), unwrapped across ±π
    let mut unwrapped = Vec::with_capacity(nodes.len());
    let mut offset = 0.0;
    for (i, (t, omega)) in nodes.iter().enumerate() {
        if i > 0 {
            let previous = nodes[i - 1].1;
            if omega - previous > PI {
                offset -= 2.0 * PI;
            } else if omega - previous < -PI {
                offset += 2.0 * PI;
            }
        }
        unwrapped.push((*t, omega + offset));
    }
    let count = unwrapped.len() as f64;
    let t_mean = unwrapped.iter().map(|(t, _)| t).sum::<f64>() / count;
    let w_mean = unwrapped.iter().map(|(_, w)| w).sum::<f64>() / count;
    let numerator: f64 = unwrapped.iter().map(|(t, w)| (t - t_mean) * (w - w_mean)).sum();
    let denominator: f64 = unwrapped.iter().map(|(t, _)| (t - t_mean).powi(2)).sum();
    let rate = numerator / denominator;

    let n = (MU_EARTH / a.powi(3)).sqrt();
    let e = {
        // eccentricity of the initial osculating orbit
        let sma = 1.0 / (2.0 / a - speed * speed / MU_EARTH);
        (1.0 - a / sma).abs()
    };
    let p = a * (1.0 + e);
    let expected = -1.5 * n * j2 * (R_EARTH / p).powi(2) * inclination.cos();
    assert_equal_reltol(rate, expected, 0.01);
}

#[test]
fn torque_free_symmetric_top_precesses() {
    let inertia = Matrix3::from_diagonal(&Vector3::new(100.0, 100.0, 200.0));
    let omega0 = Vector3::new(1.0, 0.0, 0.1);
    let config = PropagatorConfig::default()
        .with_gravity(false)
        .with_translation(false)
        .with_dry_properties(100.0, Vector3::zeros(), inertia)
        .with_attitude(Mrp::default(), omega0);
    let mut propagator = SixDofPropagator::new(config);
    propagator.initialize().unwrap();
    let h0 = propagator.latest_diagnostics().unwrap().rotational_angular_momentum_norm;

    for _ in 0..10000 {
        propagator.step(SECOND / 10).unwrap();
        let omega = propagator.angular_rate();
        assert_equal_reltol(omega.norm(), omega0.norm(), 1e-9);
        assert_abs_diff_eq!(omega[2], 0.1, epsilon = 1e-12);
        let h = propagator.latest_diagnostics().unwrap().rotational_angular_momentum_norm;
        assert_equal_reltol(h, h0, 1e-9);
    }

    // body rate precesses at (I3 - I1)/I1 ω3 = 0.1 rad/s
    let t: f64 = 1000.0;
    let omega = propagator.angular_rate();
    assert_abs_diff_eq!(omega[0], (0.1 * t).cos(), epsilon = 1e-6);
    assert_abs_diff_eq!(omega[1], (0.1 * t).sin(), epsilon = 1e-6);
}

#[test]
fn mrp_shadow_keeps_attitude_continuous() {
    let config = PropagatorConfig::default()
        .with_gravity(false)
        .with_translation(false)
        .with_attitude(Mrp::new(0.9, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
    let mut propagator = SixDofPropagator::new(config);
    propagator.initialize().unwrap();

    let mut dcm = propagator.dcm();
    for _ in 0..400 {
        propagator.step(SECOND / 100).unwrap();
        let next = propagator.dcm();
        // one 0.01 s step at 1 rad/s moves the dcm by about 0.01
        assert!((next - dcm).norm() < 0.02);
        assert!(propagator.attitude().norm_squared() <= 1.0);
        dcm = next;
    }
    assert!(propagator.shadow_count() >= 1);
    assert_eq!(
        propagator.latest_vehicle_state().unwrap().shadow_count,
        propagator.shadow_count()
    );

    // spin about body z: [BN](t) = M3(t) [BN](0)
    let initial = RotationMatrix::from(&Mrp::new(0.9, 0.0, 0.0)).value();
    let expected = RotationMatrix::m3(4.0).value() * initial;
    assert_abs_diff_eq!(dcm, expected, epsilon = 1e-8);
}

#[test]
fn reaction_wheel_spin_up_conserves_momentum() {
    let j_s = 0.05;
    let config = PropagatorConfig::default()
        .with_gravity(false)
        .with_translation(false);
    let wheel = ReactionWheel::new("rw1", Vector3::x(), j_s).unwrap();
    let mut propagator = SixDofPropagator::new(config)
        .with_effector(ReactionWheelSet::new("rwa").with_wheel(wheel))
        .unwrap();
    propagator.initialize().unwrap();
    propagator
        .command("rwa", EffectorCommand::WheelTorques(vec![0.1]))
        .unwrap();

    for _ in 0..100 {
        propagator.step(SECOND / 10).unwrap();
        let h = propagator.latest_diagnostics().unwrap().rotational_angular_momentum_norm;
        assert!(h < 1e-12, "|H| = {h}");
    }

    let speed = propagator.effector_states("rwa").unwrap().get(sixdof::StateKind::WheelSpin)[1];
    assert_equal_reltol(speed, 0.1 * 10.0 / j_s, 1e-12);
    // the hub turns the other way
    assert_abs_diff_eq!(propagator.angular_rate()[0], -0.1 * 10.0 / 100.0, epsilon = 1e-12);
}

#[test]
fn third_body_acceleration_matches_difference_form() {
    let mu_moon = 4.9e12;
    let r_moon = Vector3::new(384400e3, 0.0, 0.0);
    let moon = GravityBody::new("moon", mu_moon, 1737400.0)
        .unwrap()
        .with_pose(r_moon, Vector3::zeros());
    let r = Vector3::new(7e6, 1e6, -5e5);
    let mut propagator = SixDofPropagator::new(
        PropagatorConfig::default().with_state(r, Vector3::new(0.0, 7500.0, 0.0)),
    )
    .with_gravity_body(earth())
    .unwrap()
    .with_gravity_body(moon)
    .unwrap();
    propagator.initialize().unwrap();

    let dx = propagator.state_derivative().unwrap();
    let acceleration = Vector3::from_column_slice(&dx[VELOCITY]);
    let perturbation = acceleration - point_mass(MU_EARTH, &r);
    let expected = third_body(mu_moon, &r_moon, &r);
    assert_abs_diff_eq!(perturbation, expected, epsilon = 1e-13);
    assert_equal_reltol(perturbation.norm(), expected.norm(), 1e-6);
}

#[test]
fn harmonics_table_matches_zonal_terms() {
    let j2 = 1.0826e-3;
    let r = Vector3::new(5e6, -3e6, 4e6);
    let v = Vector3::new(1000.0, 6000.0, 3000.0);
    let derivative = |body: GravityBody| {
        let mut propagator = SixDofPropagator::new(PropagatorConfig::default().with_state(r, v))
            .with_gravity_body(body)
            .unwrap();
        propagator.initialize().unwrap();
        let dx = propagator.state_derivative().unwrap();
        Vector3::from_column_slice(&dx[VELOCITY])
    };
    let zonal = derivative(earth().with_j_params(vec![j2]));
    let table = Arc::new(GravityCoefficients::from_zonal(&[j2], R_EARTH, MU_EARTH).unwrap());
    let harmonics = derivative(earth().with_harmonics(table, 2).unwrap());

    assert_abs_diff_eq!(zonal, harmonics, epsilon = 1e-12);
    assert!((zonal - point_mass(MU_EARTH, &r)).norm() > 1e-3);
}

#[test]
fn ephemeris_messages_drive_the_third_body() {
    let mu_moon = 4.9e12;
    let elements = ClassicalElements::new(384400e3, 0.05, 0.1, 0.3, 0.2, 0.0).unwrap();
    let mut ephemeris = PlanetEphemeris::new(0.0)
        .with_mu(MU_EARTH + mu_moon)
        .unwrap()
        .with_planet("moon", elements, PlanetOrientation::default())
        .unwrap();
    let moon = GravityBody::new("luna", mu_moon, 1737400.0)
        .unwrap()
        .with_ephemeris("moon");
    let mut propagator = SixDofPropagator::new(
        PropagatorConfig::default()
            .with_state(Vector3::new(7e6, 0.0, 0.0), Vector3::new(0.0, 7546.05, 0.0)),
    )
    .with_gravity_body(earth())
    .unwrap()
    .with_gravity_body(moon)
    .unwrap();

    for message in ephemeris.update_state(0).unwrap() {
        propagator.write_planet_message(message).unwrap();
    }
    propagator.initialize().unwrap();
    assert!(!propagator.is_stale());

    for k in 1..=60 {
        let nanos = k * SECOND;
        for message in ephemeris.update_state(nanos).unwrap() {
            propagator.write_planet_message(message).unwrap();
        }
        propagator.update_state(nanos).unwrap();
        assert!(!propagator.is_stale());
        let published = ephemeris.latest("moon").unwrap();
        let body = propagator.gravity_body("luna").unwrap();
        assert_eq!(body.position, published.position);
        assert_abs_diff_eq!(body.eph_int_time, k as f64, epsilon = 1e-12);
    }

    // a tick without a new message keeps the old pose and flags it
    propagator.step(SECOND).unwrap();
    assert!(propagator.is_stale());
    assert!(propagator.latest_vehicle_state().unwrap().stale);
    assert!(propagator.write_planet_message(PlanetStateMessage::fixed("mars", Vector3::zeros())).is_err());
}
