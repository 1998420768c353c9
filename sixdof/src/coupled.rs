//! Coupled hub and internal coordinate accelerations.
//!
//! Every mass part is measured from the instantaneous composite center of
//! mass C. With generalized speeds (ω, q̇) the system mass matrix is
//!
//! ```text
//! M_ωω = I_C
//! M_ωj = Σ_i m_i s_i × e_ij + I_j a_j
//! M_jk = Σ_i m_i e_ij · e_ik + a_jᵀ I_j a_k   (same owner only)
//! ```
//!
//! where s_i = r_i - c, e_ij = t_j δ(owner) - m_j t_j / m and a_j is the
//! angular partial of the owning part.

use mass_properties::CompositeMassProperties;
use nalgebra::{DMatrix, DVector, Vector3};

use crate::{SixDofErrors, effector::PartState};

/// Parts lighter than this freeze their coordinate.
const FROZEN_MASS: f64 = 1e-9;

#[derive(Clone, Debug, Default)]
pub(crate) struct CoupledSolution {
    pub omega_dot: Vector3<f64>,
    /// (packed index of q, q̈)
    pub accelerations: Vec<(usize, f64)>,
    /// Σ Q_j q̇_j plus damping power over active coordinates
    pub coordinate_power: f64,
}

/// Solves for ω̇ and q̈ given the torque about C and the total hub force.
/// With `lock_rotation` the hub rate is held and only q̈ is solved.
pub(crate) fn solve(
    parts: &[PartState],
    composite: &CompositeMassProperties,
    omega: &Vector3<f64>,
    torque: &Vector3<f64>,
    force: &Vector3<f64>,
    lock_rotation: bool,
) -> Result<CoupledSolution, SixDofErrors> {
    let mut solution = CoupledSolution::default();
    let mut active = Vec::new();
    for (i, p) in parts.iter().enumerate() {
        if let Some(q) = p.coordinate {
            if p.part.mass > FROZEN_MASS {
                active.push((i, q));
            } else {
                solution.accelerations.push((q.index, 0.0));
            }
        }
    }

    if active.is_empty() {
        if !lock_rotation {
            let rhs = torque
                - omega.cross(&(composite.inertia * omega))
                - composite.inertia_rate * omega;
            solution.omega_dot = composite
                .inertia
                .cholesky()
                .ok_or(SixDofErrors::SingularMassMatrix)?
                .solve(&rhs);
        }
        return Ok(solution);
    }

    let m = composite.mass;
    let c = composite.center_of_mass;
    let c_dot = parts
        .iter()
        .map(|p| p.part.mass * p.velocity)
        .sum::<Vector3<f64>>()
        / m;
    let kappa_c = parts
        .iter()
        .filter_map(|p| p.coordinate.map(|q| p.part.mass * q.bias))
        .sum::<Vector3<f64>>()
        / m;
    let d: Vec<Vector3<f64>> = active
        .iter()
        .map(|(i, q)| parts[*i].part.mass * q.linear / m)
        .collect();

    let n = active.len();
    let mut mass_matrix = DMatrix::<f64>::zeros(3 + n, 3 + n);
    let mut rhs = DVector::<f64>::zeros(3 + n);
    mass_matrix
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&composite.inertia);
    let mut rhs_omega = torque - composite.inertia_rate * omega;

    for (i, p) in parts.iter().enumerate() {
        let mass = p.part.mass;
        let inertia = &p.part.inertia;
        let s = p.part.position - c;
        let s_dot = p.velocity - c_dot;
        let rate = omega + p.angular_velocity;
        let own_bias = p.coordinate.map_or_else(Vector3::zeros, |q| q.bias);
        let accel = omega.cross(&omega.cross(&s)) + 2.0 * omega.cross(&s_dot) + own_bias - kappa_c;
        let angular_bias = inertia * omega.cross(&p.angular_velocity) + rate.cross(&(inertia * rate));
        rhs_omega -= mass * s.cross(&accel) + angular_bias;

        for (j, (owner_j, qj)) in active.iter().enumerate() {
            let own_j = *owner_j == i;
            let e_j = if own_j { qj.linear - d[j] } else { -d[j] };
            let mut m_wj = mass * s.cross(&e_j);
            if own_j {
                m_wj += inertia * qj.angular;
                rhs[3 + j] -= qj.angular.dot(&angular_bias);
            }
            for r in 0..3 {
                mass_matrix[(r, 3 + j)] += m_wj[r];
            }
            rhs[3 + j] -= mass * e_j.dot(&accel);

            for (k, (owner_k, qk)) in active.iter().enumerate().skip(j) {
                let own_k = *owner_k == i;
                let e_k = if own_k { qk.linear - d[k] } else { -d[k] };
                let mut m_jk = mass * e_j.dot(&e_k);
                if own_j && own_k {
                    m_jk += qj.angular.dot(&(inertia * qk.angular));
                }
                mass_matrix[(3 + j, 3 + k)] += m_jk;
            }
        }
    }

    for r in 0..3 {
        rhs[r] = rhs_omega[r];
    }
    for (j, (_, q)) in active.iter().enumerate() {
        let generalized_force = -force.dot(&d[j]);
        rhs[3 + j] += generalized_force + q.spring_damper();
        solution.coordinate_power += generalized_force * q.q_dot + q.damping_power();
    }
    mass_matrix.fill_lower_triangle_with_upper_triangle();

    let accelerations = if lock_rotation {
        let block = mass_matrix.view((3, 3), (n, n)).clone_owned();
        let rhs_q = rhs.rows(3, n).clone_owned();
        block
            .cholesky()
            .ok_or(SixDofErrors::SingularMassMatrix)?
            .solve(&rhs_q)
    } else {
        let x = mass_matrix
            .cholesky()
            .ok_or(SixDofErrors::SingularMassMatrix)?
            .solve(&rhs);
        solution.omega_dot = Vector3::new(x[0], x[1], x[2]);
        x.rows(3, n).clone_owned()
    };
    solution.accelerations.extend(
        active
            .iter()
            .zip(accelerations.iter())
            .map(|((_, q), q_ddot)| (q.index, *q_ddot)),
    );
    Ok(solution)
}
