use gravity::{GravityBody, PlanetStateMessage};
use log::{debug, error, info, warn};
use nalgebra::{Matrix3, Vector3};
use rotations::prelude::*;
use serde::{Deserialize, Serialize};
use sixdof_diffeq::{Integrator, RungeKutta, StateVector};
use sixdof_result::{ResultErrors, ResultManager, SixDofResult};

use crate::{
    Effector, EffectorCommand, EffectorModel, EquationsOfMotion, PropagatorConfig, SixDofErrors,
    StateMap,
    diagnostics::DiagnosticsMessage,
    eom::Evaluation,
    messages::{
        CentralBodyMessage, EffectorTelemetryMessage, MassPropertiesMessage, OutputBuffer,
        VehicleStateMessage,
    },
    state_map::{ATTITUDE, EffectorStates, EffectorStatesMut, POSITION, RATE, VELOCITY},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagatorStatus {
    #[default]
    Unconfigured,
    Initialized,
    Stepping,
    Finalized,
    /// terminal, every further step returns `SixDofErrors::Failed`
    Failed,
}

#[derive(Debug, Default)]
struct ResultIds {
    vehicle: Option<u32>,
    mass: Option<u32>,
    diagnostics: Option<u32>,
    effectors: Vec<Option<u32>>,
}

/// Owns one vehicle and advances it one simulator tick at a time.
#[derive(Debug)]
pub struct SixDofPropagator {
    config: PropagatorConfig,
    status: PropagatorStatus,
    eom: EquationsOfMotion,
    integrator: Box<dyn Integrator<EquationsOfMotion> + Send>,
    state: StateVector,
    next: StateVector,
    derivative: StateVector,
    sim_nanos: u64,
    shadow_count: u64,
    accumulated_dv: Vector3<f64>,
    nonconservative_accel: Vector3<f64>,
    stale: bool,
    vehicle_out: OutputBuffer<VehicleStateMessage>,
    mass_out: OutputBuffer<MassPropertiesMessage>,
    central_out: OutputBuffer<CentralBodyMessage>,
    diagnostics_out: OutputBuffer<DiagnosticsMessage>,
    telemetry_out: Vec<OutputBuffer<EffectorTelemetryMessage>>,
    results: ResultIds,
}

impl SixDofPropagator {
    pub fn new(config: PropagatorConfig) -> Self {
        Self {
            eom: EquationsOfMotion::new(&config),
            config,
            status: PropagatorStatus::Unconfigured,
            integrator: Box::new(RungeKutta::<StateVector, 4>::rk4()),
            state: StateVector::default(),
            next: StateVector::default(),
            derivative: StateVector::default(),
            sim_nanos: 0,
            shadow_count: 0,
            accumulated_dv: Vector3::zeros(),
            nonconservative_accel: Vector3::zeros(),
            stale: false,
            vehicle_out: OutputBuffer::default(),
            mass_out: OutputBuffer::default(),
            central_out: OutputBuffer::default(),
            diagnostics_out: OutputBuffer::default(),
            telemetry_out: Vec::new(),
            results: ResultIds::default(),
        }
    }

    fn ensure_unconfigured(&self) -> Result<(), SixDofErrors> {
        match self.status {
            PropagatorStatus::Unconfigured => Ok(()),
            _ => Err(SixDofErrors::AlreadyInitialized),
        }
    }

    pub fn add_gravity_body(&mut self, body: GravityBody) -> Result<(), SixDofErrors> {
        self.ensure_unconfigured()?;
        let bodies = &self.eom.gravity_bodies;
        if bodies.iter().any(|b| b.name == body.name) {
            return Err(SixDofErrors::DuplicateGravityBody(body.name));
        }
        if body.is_central() {
            if let Some(c) = self.eom.central.and_then(|c| bodies.get(c)) {
                return Err(SixDofErrors::MultipleCentralBodies(c.name.clone(), body.name));
            }
            self.eom.central = Some(bodies.len());
        }
        self.eom.gravity_bodies.push(body);
        Ok(())
    }

    pub fn with_gravity_body(mut self, body: GravityBody) -> Result<Self, SixDofErrors> {
        self.add_gravity_body(body)?;
        Ok(self)
    }

    pub fn add_effector(&mut self, effector: impl Into<Effector>) -> Result<(), SixDofErrors> {
        self.ensure_unconfigured()?;
        let effector = effector.into();
        if self.eom.effectors.iter().any(|e| e.name() == effector.name()) {
            return Err(SixDofErrors::InvalidConfiguration(format!(
                "effector '{}' already exists",
                effector.name()
            )));
        }
        self.eom.effectors.push(effector);
        Ok(())
    }

    pub fn with_effector(mut self, effector: impl Into<Effector>) -> Result<Self, SixDofErrors> {
        self.add_effector(effector)?;
        Ok(self)
    }

    /// Replaces the default RK4 stepper.
    pub fn set_integrator(
        &mut self,
        integrator: impl Integrator<EquationsOfMotion> + Send + 'static,
    ) -> Result<(), SixDofErrors> {
        self.ensure_unconfigured()?;
        self.integrator = Box::new(integrator);
        Ok(())
    }

    /// Freezes the vehicle: rotates geometry into the body frame, binds state
    /// slices, packs the initial state and publishes the first outputs.
    pub fn initialize(&mut self) -> Result<(), SixDofErrors> {
        self.ensure_unconfigured()?;
        self.config.validate()?;
        if self.config.use_gravity && self.eom.central.is_none() {
            return Err(SixDofErrors::NoCentralBody);
        }
        if let Err(e) = self.bind() {
            error!("propagator initialization failed: {e}");
            self.status = PropagatorStatus::Failed;
            return Err(e);
        }
        self.status = PropagatorStatus::Initialized;
        info!(
            "propagator initialized: {} states, central body {}, {} effectors, {} integrator",
            self.state.len(),
            self.eom.central_body().map_or("none", |b| b.name.as_str()),
            self.eom.effectors.len(),
            self.integrator.name()
        );
        Ok(())
    }

    fn bind(&mut self) -> Result<(), SixDofErrors> {
        for body in &mut self.eom.gravity_bodies {
            body.initialize()?;
        }
        self.eom.to_body_frame(&self.config.structure_to_body);
        self.eom.bind()?;
        self.state = self.eom.initial_state(&self.config);
        self.next = self.state.clone();
        self.derivative = StateVector::zeros(self.state.len());

        let n = self.config.output_buffer_count;
        self.vehicle_out = OutputBuffer::new(n);
        self.mass_out = OutputBuffer::new(n);
        self.central_out = OutputBuffer::new(n);
        self.diagnostics_out = OutputBuffer::new(n);
        self.telemetry_out = (0..self.eom.effectors.len()).map(|_| OutputBuffer::new(n)).collect();

        self.read_messages();
        let t = self.time();
        let evaluation = self.eom.evaluate(t, &self.state, &mut self.derivative)?;
        self.nonconservative_accel = evaluation.nonconservative_acceleration();
        self.publish(&evaluation)
    }

    fn time(&self) -> f64 {
        self.sim_nanos as f64 * 1e-9
    }

    /// Applies queued planet messages and refreshes display offsets.
    fn read_messages(&mut self) {
        self.stale = false;
        for body in &mut self.eom.gravity_bodies {
            if body.read_messages() {
                warn!("gravity body '{}' has no new planet state, reusing the last pose", body.name);
                self.stale = true;
            }
        }
        let bodies = &mut self.eom.gravity_bodies;
        let display = bodies
            .iter()
            .find(|b| b.is_display())
            .map(|b| (b.position, b.velocity));
        if let Some((position, velocity)) = display {
            for body in bodies.iter_mut() {
                body.pos_rel_display = body.position - position;
                body.vel_rel_display = body.velocity - velocity;
            }
        }
    }

    /// Advances the vehicle to `current_sim_nanos` in one integrator step.
    pub fn update_state(&mut self, current_sim_nanos: u64) -> Result<(), SixDofErrors> {
        match self.status {
            PropagatorStatus::Initialized | PropagatorStatus::Stepping => {}
            PropagatorStatus::Failed => return Err(SixDofErrors::Failed),
            PropagatorStatus::Unconfigured | PropagatorStatus::Finalized => {
                return Err(SixDofErrors::NotInitialized);
            }
        }
        if current_sim_nanos < self.sim_nanos {
            return Err(SixDofErrors::NonMonotonicTime {
                current: self.sim_nanos,
                requested: current_sim_nanos,
            });
        }
        self.status = PropagatorStatus::Stepping;
        self.read_messages();
        if current_sim_nanos == self.sim_nanos {
            return Ok(());
        }

        match self.advance(current_sim_nanos) {
            Ok(evaluation) => self.publish(&evaluation),
            Err(e) => {
                error!("step to {current_sim_nanos} ns failed, keeping the last good state: {e}");
                self.status = PropagatorStatus::Failed;
                Err(e)
            }
        }
    }

    /// Steps from the current time by `dt_nanos`.
    pub fn step(&mut self, dt_nanos: u64) -> Result<(), SixDofErrors> {
        self.update_state(self.sim_nanos + dt_nanos)
    }

    fn advance(&mut self, current_sim_nanos: u64) -> Result<Evaluation, SixDofErrors> {
        let t0 = self.time();
        let h = (current_sim_nanos - self.sim_nanos) as f64 * 1e-9;
        let start = self.eom.evaluate(t0, &self.state, &mut self.derivative)?;

        self.integrator
            .step(&mut self.eom, t0, &self.state, h, &mut self.next)?;
        if let Some(index) = self.next.first_non_finite() {
            return Err(SixDofErrors::NonFiniteDerivative { index });
        }
        if !self.config.use_translation {
            self.next[POSITION].copy_from_slice(&self.state[POSITION]);
            self.next[VELOCITY].copy_from_slice(&self.state[VELOCITY]);
        }
        if !self.config.use_rotation {
            self.next[ATTITUDE].copy_from_slice(&self.state[ATTITUDE]);
            self.next[RATE].copy_from_slice(&self.state[RATE]);
        }

        for (i, effector) in self.eom.effectors.iter().enumerate() {
            effector.project_state(&mut EffectorStatesMut::new(&mut self.next, &self.eom.map, i));
        }
        let sigma = Mrp(Vector3::from_column_slice(&self.next[ATTITUDE]));
        let shadowed = sigma.needs_shadow();
        if shadowed {
            self.next[ATTITUDE].copy_from_slice(sigma.shadow().0.as_slice());
        }

        let t1 = current_sim_nanos as f64 * 1e-9;
        let end = self.eom.evaluate(t1, &self.next, &mut self.derivative)?;

        // accepted from here on
        std::mem::swap(&mut self.state, &mut self.next);
        self.sim_nanos = current_sim_nanos;
        for (i, effector) in self.eom.effectors.iter_mut().enumerate() {
            effector.post_step(&EffectorStates::new(&self.state, &self.eom.map, i));
        }
        if shadowed {
            self.shadow_count += 1;
            debug!(
                "mrp shadow at {current_sim_nanos} ns: |σ|² = {:.6}, count {}",
                sigma.norm_squared(),
                self.shadow_count
            );
        }

        let a0 = start.nonconservative_acceleration();
        let a1 = end.nonconservative_acceleration();
        self.accumulated_dv += 0.5 * (a0 + a1) * h;
        self.nonconservative_accel = a1;
        Ok(end)
    }

    fn publish(&mut self, evaluation: &Evaluation) -> Result<(), SixDofErrors> {
        let sim_nanos = self.sim_nanos;
        let x = &self.state;
        self.vehicle_out.push(VehicleStateMessage {
            r_bn_n: Vector3::from_column_slice(&x[POSITION]),
            v_bn_n: Vector3::from_column_slice(&x[VELOCITY]),
            sigma_bn: Mrp(Vector3::from_column_slice(&x[ATTITUDE])),
            omega_bn_b: Vector3::from_column_slice(&x[RATE]),
            total_accum_dv_bdy: self.accumulated_dv,
            nonconservative_accel_bdy: self.nonconservative_accel,
            sim_nanos,
            shadow_count: self.shadow_count,
            stale: self.stale,
        });

        let mass = &evaluation.context.mass;
        self.mass_out.push(MassPropertiesMessage::new(
            mass,
            mass.inertia_inverse()?,
            sim_nanos,
        ));

        if let Some(central) = self.eom.central_body() {
            self.central_out.push(CentralBodyMessage {
                name: central.name.clone(),
                sim_nanos,
            });
        }

        let diagnostics =
            DiagnosticsMessage::new(&self.eom, x, evaluation, sim_nanos, self.diagnostics_out.latest());
        self.diagnostics_out.push(diagnostics);

        for (i, (effector, buffer)) in self
            .eom
            .effectors
            .iter()
            .zip(self.telemetry_out.iter_mut())
            .enumerate()
        {
            let states = EffectorStates::new(x, &self.eom.map, i);
            buffer.push(EffectorTelemetryMessage {
                name: effector.name().to_string(),
                telemetry: effector.telemetry(&evaluation.context, &states),
                sim_nanos,
            });
        }
        Ok(())
    }

    /// Latches a controller command on the named effector.
    pub fn command(&mut self, name: &str, command: EffectorCommand) -> Result<(), SixDofErrors> {
        if self.status == PropagatorStatus::Failed {
            return Err(SixDofErrors::Failed);
        }
        let t = self.time();
        let Some(effector) = self.eom.effectors.iter_mut().find(|e| e.name() == name) else {
            warn!("command for unknown effector '{name}' ignored");
            return Err(SixDofErrors::UnknownEffector(name.to_string()));
        };
        effector.apply_command(t, &command).map_err(|e| {
            warn!("{e}");
            SixDofErrors::InvalidCommand(e.to_string())
        })
    }

    /// Queues a planet state for every gravity body following that planet.
    pub fn write_planet_message(&mut self, message: PlanetStateMessage) -> Result<(), SixDofErrors> {
        let mut found = false;
        for body in &mut self.eom.gravity_bodies {
            let follows = body.planet_ephem_name().unwrap_or(body.name.as_str()) == message.planet_name;
            if follows {
                body.write_message(message.clone());
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(SixDofErrors::InvalidCommand(format!(
                "no gravity body follows planet '{}'",
                message.planet_name
            )))
        }
    }

    pub fn finalize(&mut self) {
        if self.status != PropagatorStatus::Failed {
            self.status = PropagatorStatus::Finalized;
        }
        self.next = StateVector::default();
        self.derivative = StateVector::default();
        info!(
            "propagator finalized at {} ns after {} mrp shadow events",
            self.sim_nanos, self.shadow_count
        );
    }

    /// dX at the current state, without advancing.
    pub fn state_derivative(&mut self) -> Result<StateVector, SixDofErrors> {
        if matches!(self.status, PropagatorStatus::Unconfigured | PropagatorStatus::Finalized) {
            return Err(SixDofErrors::NotInitialized);
        }
        let mut dx = StateVector::zeros(self.state.len());
        self.eom.evaluate(self.time(), &self.state, &mut dx)?;
        Ok(dx)
    }

    pub fn status(&self) -> PropagatorStatus {
        self.status
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    pub fn sim_nanos(&self) -> u64 {
        self.sim_nanos
    }

    pub fn state(&self) -> &StateVector {
        &self.state
    }

    pub fn state_map(&self) -> &StateMap {
        self.eom.state_map()
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state[POSITION])
    }

    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state[VELOCITY])
    }

    pub fn attitude(&self) -> Mrp {
        Mrp(Vector3::from_column_slice(&self.state[ATTITUDE]))
    }

    pub fn angular_rate(&self) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state[RATE])
    }

    /// [BN] of the current attitude.
    pub fn dcm(&self) -> Matrix3<f64> {
        RotationMatrix::from(&self.attitude()).value()
    }

    pub fn shadow_count(&self) -> u64 {
        self.shadow_count
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn integrator_name(&self) -> &str {
        self.integrator.name()
    }

    pub fn effector(&self, name: &str) -> Option<&Effector> {
        self.eom.effectors.iter().find(|e| e.name() == name)
    }

    pub fn gravity_body(&self, name: &str) -> Option<&GravityBody> {
        self.eom.gravity_bodies.iter().find(|b| b.name == name)
    }

    /// The packed substate owned by `name`, in state map order.
    pub fn effector_states(&self, name: &str) -> Option<EffectorStates<'_>> {
        let i = self.eom.effectors.iter().position(|e| e.name() == name)?;
        Some(EffectorStates::new(&self.state, self.eom.state_map(), i))
    }

    pub fn latest_vehicle_state(&self) -> Option<&VehicleStateMessage> {
        self.vehicle_out.latest()
    }

    pub fn latest_mass_properties(&self) -> Option<&MassPropertiesMessage> {
        self.mass_out.latest()
    }

    pub fn latest_central_body(&self) -> Option<&CentralBodyMessage> {
        self.central_out.latest()
    }

    pub fn latest_diagnostics(&self) -> Option<&DiagnosticsMessage> {
        self.diagnostics_out.latest()
    }

    pub fn latest_telemetry(&self, name: &str) -> Option<&EffectorTelemetryMessage> {
        let i = self.eom.effectors.iter().position(|e| e.name() == name)?;
        self.telemetry_out.get(i)?.latest()
    }

    pub fn vehicle_states(&self) -> &OutputBuffer<VehicleStateMessage> {
        &self.vehicle_out
    }

    pub fn diagnostics(&self) -> &OutputBuffer<DiagnosticsMessage> {
        &self.diagnostics_out
    }
}

impl SixDofResult for SixDofPropagator {
    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), ResultErrors> {
        let folder = results.result_path.join("sixdof");
        let vehicle_headers = [
            "t",
            "position[x]",
            "position[y]",
            "position[z]",
            "velocity[x]",
            "velocity[y]",
            "velocity[z]",
            "sigma[0]",
            "sigma[1]",
            "sigma[2]",
            "omega[x]",
            "omega[y]",
            "omega[z]",
            "dv[x]",
            "dv[y]",
            "dv[z]",
        ];
        self.results.vehicle = Some(results.new_writer("vehicle", &folder, &vehicle_headers)?);
        let mass_headers = ["t", "mass", "com[x]", "com[y]", "com[z]", "ixx", "iyy", "izz", "ixy", "ixz", "iyz"];
        self.results.mass = Some(results.new_writer("mass_properties", &folder, &mass_headers)?);
        self.results.diagnostics =
            Some(results.new_writer("diagnostics", &folder, &DiagnosticsMessage::headers())?);

        let effector_folder = folder.join("effectors");
        self.results.effectors.clear();
        for buffer in &self.telemetry_out {
            let id = match buffer.latest() {
                Some(message) => {
                    let headers = message.telemetry.headers();
                    let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
                    Some(results.new_writer(&message.name, &effector_folder, &headers)?)
                }
                None => None,
            };
            self.results.effectors.push(id);
        }
        Ok(())
    }

    fn write_result(&self, t: f64, results: &mut ResultManager) -> Result<(), ResultErrors> {
        if let (Some(id), Some(message)) = (self.results.vehicle, self.vehicle_out.latest()) {
            let mut record = vec![t.to_string()];
            record.extend(
                message
                    .r_bn_n
                    .iter()
                    .chain(message.v_bn_n.iter())
                    .chain(message.sigma_bn.0.iter())
                    .chain(message.omega_bn_b.iter())
                    .chain(message.total_accum_dv_bdy.iter())
                    .map(f64::to_string),
            );
            results.write_record(id, &record)?;
        }
        if let (Some(id), Some(message)) = (self.results.mass, self.mass_out.latest()) {
            let i = &message.inertia;
            let mut record = vec![t.to_string(), message.mass.to_string()];
            record.extend(message.center_of_mass.iter().map(f64::to_string));
            record.extend(
                [i[(0, 0)], i[(1, 1)], i[(2, 2)], i[(0, 1)], i[(0, 2)], i[(1, 2)]].map(|v| v.to_string()),
            );
            results.write_record(id, &record)?;
        }
        if let (Some(id), Some(message)) = (self.results.diagnostics, self.diagnostics_out.latest()) {
            results.write_record(id, &message.record(t))?;
        }
        for (id, buffer) in self.results.effectors.iter().zip(&self.telemetry_out) {
            if let (Some(id), Some(message)) = (id, buffer.latest()) {
                results.write_record(*id, &message.telemetry.record(t))?;
            }
        }
        Ok(())
    }
}
