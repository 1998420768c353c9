use std::sync::Arc;

use log::debug;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use spherical_harmonics::{GravityCoefficients, SphericalHarmonics};

use crate::{GravityErrors, PlanetStateMessage, point_mass};

/// Gravitational parameters and current pose of one celestial body.
///
/// Parameters are fixed once built. Only the pose fields change, once per tick,
/// from the body's planet state message.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GravityBody {
    pub name: String,
    mu: f64,
    radius_equator: f64,
    j_params: Vec<f64>,
    use_j_params: bool,
    harmonics: Option<Arc<GravityCoefficients>>,
    harmonics_degree: usize,
    use_harmonics: bool,
    is_central: bool,
    is_display: bool,
    planet_ephem_name: Option<String>,
    /// inertial position [m]
    pub position: Vector3<f64>,
    /// inertial velocity [m/s]
    pub velocity: Vector3<f64>,
    pub j2000_to_pfix: Matrix3<f64>,
    pub j2000_to_pfix_dot: Matrix3<f64>,
    /// ephemeris time of the current pose [s]
    pub ephem_time: f64,
    /// simulation time of the current pose [s]
    pub eph_int_time: f64,
    pub pos_rel_display: Vector3<f64>,
    pub vel_rel_display: Vector3<f64>,
    #[serde(skip)]
    zonal: Option<GravityCoefficients>,
    #[serde(skip)]
    evaluator: Option<SphericalHarmonics>,
    #[serde(skip)]
    pending: Option<PlanetStateMessage>,
    #[serde(skip)]
    stale: bool,
}

impl GravityBody {
    pub fn new(name: &str, mu: f64, radius_equator: f64) -> Result<Self, GravityErrors> {
        if !(mu > 0.0) {
            return Err(GravityErrors::NonPositiveMu(name.to_string()));
        }
        if !(radius_equator > 0.0) {
            return Err(GravityErrors::NonPositiveRadius(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            mu,
            radius_equator,
            j_params: Vec::new(),
            use_j_params: false,
            harmonics: None,
            harmonics_degree: 0,
            use_harmonics: false,
            is_central: false,
            is_display: false,
            planet_ephem_name: None,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            j2000_to_pfix: Matrix3::identity(),
            j2000_to_pfix_dot: Matrix3::zeros(),
            ephem_time: 0.0,
            eph_int_time: 0.0,
            pos_rel_display: Vector3::zeros(),
            vel_rel_display: Vector3::zeros(),
            zonal: None,
            evaluator: None,
            pending: None,
            stale: false,
        })
    }

    /// Zonal coefficients starting at J2.
    pub fn with_j_params(mut self, j_params: Vec<f64>) -> Self {
        self.use_j_params = !j_params.is_empty();
        self.j_params = j_params;
        self
    }

    /// Shares a coefficient table and truncates evaluation at `degree`.
    pub fn with_harmonics(
        mut self,
        coefficients: Arc<GravityCoefficients>,
        degree: usize,
    ) -> Result<Self, GravityErrors> {
        if degree > coefficients.max_degree() {
            return Err(GravityErrors::HarmonicsDegree {
                name: self.name.clone(),
                requested: degree,
                loaded: coefficients.max_degree(),
            });
        }
        self.harmonics = Some(coefficients);
        self.harmonics_degree = degree;
        self.use_harmonics = true;
        Ok(self)
    }

    pub fn with_central(mut self) -> Self {
        self.set_central();
        self
    }

    pub fn with_display(mut self) -> Self {
        self.is_display = true;
        self
    }

    /// Marks the body as driven by the planet state message called `name`.
    pub fn with_ephemeris(mut self, name: &str) -> Self {
        self.planet_ephem_name = Some(name.to_string());
        self
    }

    /// Static inertial pose used until (or instead of) planet state messages.
    pub fn with_pose(mut self, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        self.position = position;
        self.velocity = velocity;
        self
    }

    pub fn set_central(&mut self) {
        self.is_central = true;
    }

    pub fn is_central(&self) -> bool {
        self.is_central
    }

    pub fn is_display(&self) -> bool {
        self.is_display
    }

    pub fn uses_harmonics(&self) -> bool {
        self.use_harmonics && self.harmonics.is_some()
    }

    pub fn uses_j_params(&self) -> bool {
        self.use_j_params
    }

    pub fn harmonics_model(&self) -> Option<&Arc<GravityCoefficients>> {
        self.harmonics.as_ref()
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn radius_equator(&self) -> f64 {
        self.radius_equator
    }

    pub fn j_params(&self) -> &[f64] {
        &self.j_params
    }

    pub fn planet_ephem_name(&self) -> Option<&str> {
        self.planet_ephem_name.as_deref()
    }

    /// Builds the zonal table and evaluator scratch. Required before evaluating gravity.
    pub fn initialize(&mut self) -> Result<(), GravityErrors> {
        let mut degree = 0;
        if let Some(harmonics) = &self.harmonics {
            if self.harmonics_degree > harmonics.max_degree() {
                return Err(GravityErrors::HarmonicsDegree {
                    name: self.name.clone(),
                    requested: self.harmonics_degree,
                    loaded: harmonics.max_degree(),
                });
            }
            degree = self.harmonics_degree;
        }
        self.zonal = if self.j_params.is_empty() {
            None
        } else {
            let zonal = GravityCoefficients::from_zonal(&self.j_params, self.radius_equator, self.mu)?;
            degree = degree.max(zonal.max_degree());
            Some(zonal)
        };
        self.evaluator = Some(SphericalHarmonics::new(degree));
        self.stale = self.planet_ephem_name.is_some();
        debug!("gravity body '{}' initialized with evaluator degree {}", self.name, degree);
        Ok(())
    }

    /// Queues a planet state message, applied at the next `read_messages`.
    pub fn write_message(&mut self, message: PlanetStateMessage) {
        self.pending = Some(message);
    }

    /// Applies the queued message, if any. A body that follows an ephemeris and got no
    /// new message keeps its last pose and is flagged stale.
    pub fn read_messages(&mut self) -> bool {
        match self.pending.take() {
            Some(message) => {
                self.position = message.position;
                self.velocity = message.velocity;
                self.j2000_to_pfix = message.j2000_to_pfix;
                self.j2000_to_pfix_dot = message.j2000_to_pfix_dot;
                self.ephem_time = message.j2000_current;
                self.eph_int_time = message.valid_sim_nanos as f64 * 1e-9;
                self.stale = false;
            }
            None => self.stale = self.planet_ephem_name.is_some(),
        }
        self.stale
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Inertial position extrapolated from the current pose to sim time `t`.
    pub fn position_at(&self, t: f64) -> Vector3<f64> {
        self.position + self.velocity * (t - self.eph_int_time)
    }

    /// J2000 to planet-fixed DCM extrapolated to sim time `t`.
    pub fn dcm_at(&self, t: f64) -> Matrix3<f64> {
        self.j2000_to_pfix + self.j2000_to_pfix_dot * (t - self.eph_int_time)
    }

    /// Non-spherical part of the field at inertial `r` (relative to the body) in inertial axes.
    pub fn nonspherical(&mut self, r: &Vector3<f64>, t: f64) -> Result<Vector3<f64>, GravityErrors> {
        let dcm = self.dcm_at(t);
        let r_pfix = dcm * r;
        let Some(evaluator) = self.evaluator.as_mut() else {
            return Ok(Vector3::zeros());
        };
        let a_pfix = if let (true, Some(harmonics)) = (self.use_harmonics, &self.harmonics) {
            evaluator.calculate(&r_pfix, harmonics, self.harmonics_degree)?
        } else if let (true, Some(zonal)) = (self.use_j_params, &self.zonal) {
            evaluator.calculate(&r_pfix, zonal, zonal.max_degree())?
        } else {
            return Ok(Vector3::zeros());
        };
        Ok(dcm.transpose() * a_pfix)
    }

    /// Full field of the body (point mass plus harmonics or zonal terms) at inertial `r`
    /// relative to the body, in inertial axes.
    pub fn acceleration(&mut self, r: &Vector3<f64>, t: f64) -> Result<Vector3<f64>, GravityErrors> {
        let r_mag = r.norm();
        if r_mag < f64::EPSILON || !r_mag.is_finite() {
            return Err(GravityErrors::ZeroPosition(self.name.clone()));
        }
        Ok(point_mass(self.mu, r) + self.nonspherical(r, t)?)
    }
}
