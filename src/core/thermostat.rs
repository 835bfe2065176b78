use crate::core::particle::DIM;
use crate::core::scheduler::{CollisionScheduler, EventOutcome};
use crate::error::{Error, Result};
use log::debug;
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Whether the driver is running dynamics or a stochastic cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatState {
    Integrating,
    Thermostatting,
}

/// Cadence on which thermostat cycles fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Every `n` resolved events.
    Events(u64),
    /// Every `dt` simulation time units (checked at step boundaries).
    Time(f64),
}

/// A stochastic move applied during a thermostat cycle.
///
/// Actions run strictly in registration order, to completion, while the
/// scheduler is paused; they may mutate velocities, positions, or the box
/// through the scheduler's mutable accessors. The horizon rebuild afterwards
/// is the driver's responsibility, not the action's: a `reset` issued from
/// inside an action is deferred to the end of the cycle. Actions must be
/// `Send` so driver replicas can run on independent threads.
pub trait ThermostatAction: Send {
    /// Short name used in logs.
    fn label(&self) -> &str;

    fn apply(&mut self, scheduler: &mut CollisionScheduler, rng: &mut StdRng) -> Result<()>;
}

/// Hybrid-step driver: deterministic event dynamics interleaved with
/// stochastic resampling cycles.
///
/// Layered over the scheduler as an explicit state machine: normally
/// `Integrating`; when the cadence is due, transitions to `Thermostatting`,
/// runs every registered action in order, then performs exactly one full
/// scheduler resync and returns to `Integrating`. No collision event is ever
/// resolved while a cycle is in progress.
pub struct HybridStepDriver {
    scheduler: CollisionScheduler,
    state: ThermostatState,
    cadence: Option<Cadence>,
    actions: Vec<Box<dyn ThermostatAction>>,
    rng: StdRng,
    events_since_cycle: u64,
    last_cycle_time: f64,
    cycles_run: u64,
}

impl HybridStepDriver {
    /// Wrap a scheduler. The seed feeds every stochastic action.
    pub fn new(scheduler: CollisionScheduler, seed: Option<u64>) -> Self {
        let rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        let last_cycle_time = scheduler.current_time();
        Self {
            scheduler,
            state: ThermostatState::Integrating,
            cadence: None,
            actions: Vec::new(),
            rng,
            events_since_cycle: 0,
            last_cycle_time,
            cycles_run: 0,
        }
    }

    /// Configure (or disable, with `None`) the cycle cadence.
    pub fn set_cadence(&mut self, cadence: Option<Cadence>) -> Result<()> {
        match cadence {
            Some(Cadence::Events(0)) => {
                return Err(Error::InvalidParam("event cadence must be > 0".into()))
            }
            Some(Cadence::Time(dt)) if !dt.is_finite() || dt <= 0.0 => {
                return Err(Error::InvalidParam(
                    "time cadence must be finite and > 0".into(),
                ))
            }
            _ => {}
        }
        self.cadence = cadence;
        Ok(())
    }

    /// Register an action; actions run in registration order each cycle.
    pub fn add_action(&mut self, action: Box<dyn ThermostatAction>) {
        self.actions.push(action);
    }

    pub fn state(&self) -> ThermostatState {
        self.state
    }

    /// Number of completed thermostat cycles.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    pub fn scheduler(&self) -> &CollisionScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut CollisionScheduler {
        &mut self.scheduler
    }

    pub fn current_time(&self) -> f64 {
        self.scheduler.current_time()
    }

    /// Resynchronize the underlying scheduler.
    pub fn reset(&mut self) -> Result<()> {
        self.scheduler.reset()
    }

    /// Run a thermostat cycle if one is due, then resolve the next event.
    pub fn step(&mut self) -> Result<EventOutcome> {
        if self.cycle_due() {
            self.run_cycle()?;
        }
        let outcome = self.scheduler.step()?;
        if outcome != EventOutcome::NonePending {
            self.events_since_cycle += 1;
        }
        Ok(outcome)
    }

    /// Resolve up to `n` events; stops early when nothing is pending.
    /// Returns the number of events actually resolved.
    pub fn run_events(&mut self, n: u64) -> Result<u64> {
        let mut resolved = 0;
        for _ in 0..n {
            match self.step()? {
                EventOutcome::NonePending => break,
                _ => resolved += 1,
            }
        }
        Ok(resolved)
    }

    /// Advance to `target`, running due cycles between events and drifting
    /// the remainder once no event is left before the target.
    pub fn advance_to(&mut self, target: f64) -> Result<()> {
        if !target.is_finite() {
            return Err(Error::InvalidParam("target time must be finite".into()));
        }
        loop {
            if self.cycle_due() {
                self.run_cycle()?;
            }
            match self.scheduler.step_up_to(target)? {
                Some(_) => self.events_since_cycle += 1,
                None => return Ok(()),
            }
        }
    }

    fn cycle_due(&self) -> bool {
        if self.actions.is_empty() {
            return false;
        }
        match self.cadence {
            Some(Cadence::Events(n)) => self.events_since_cycle >= n,
            Some(Cadence::Time(dt)) => self.scheduler.current_time() - self.last_cycle_time >= dt,
            None => false,
        }
    }

    /// One full thermostat cycle: pause the scheduler, run every action in
    /// order, then the single authoritative resync.
    fn run_cycle(&mut self) -> Result<()> {
        self.state = ThermostatState::Thermostatting;
        self.scheduler.begin_resample_cycle();
        let mut applied = Ok(());
        for action in &mut self.actions {
            debug!(
                "thermostat action '{}' at t = {}",
                action.label(),
                self.scheduler.current_time()
            );
            applied = action.apply(&mut self.scheduler, &mut self.rng);
            if applied.is_err() {
                break;
            }
        }
        let deferred = self.scheduler.end_resample_cycle();
        self.state = ThermostatState::Integrating;
        applied?;

        if deferred {
            debug!("action-requested resync folded into the cycle resync");
        }
        self.scheduler.reset()?;
        self.events_since_cycle = 0;
        self.last_cycle_time = self.scheduler.current_time();
        self.cycles_run += 1;
        Ok(())
    }
}

/// Andersen-style full momentum resampling: every velocity component is
/// redrawn as `sqrt(kT/m) * N(0,1)`.
#[derive(Debug, Clone, Copy)]
pub struct MomentumResample {
    temperature: f64,
}

impl MomentumResample {
    pub fn new(temperature: f64) -> Result<Self> {
        validate_temperature(temperature)?;
        Ok(Self { temperature })
    }
}

impl ThermostatAction for MomentumResample {
    fn label(&self) -> &str {
        "momentum-resample"
    }

    fn apply(&mut self, scheduler: &mut CollisionScheduler, rng: &mut StdRng) -> Result<()> {
        let t = self.temperature;
        for p in scheduler.particles_mut() {
            let scale = (t / p.mass).sqrt();
            for k in 0..DIM {
                p.v[k] = scale * rng.sample::<f64, _>(StandardNormal);
            }
        }
        Ok(())
    }
}

/// Hybrid Monte Carlo momentum move: propose a full Gaussian redraw and
/// accept with `min(1, exp(-ΔE / kT))` over the total (potential + kinetic)
/// energy, restoring the previous velocities on rejection.
#[derive(Debug, Clone, Copy)]
pub struct MetropolisMomentumResample {
    temperature: f64,
}

impl MetropolisMomentumResample {
    pub fn new(temperature: f64) -> Result<Self> {
        validate_temperature(temperature)?;
        Ok(Self { temperature })
    }
}

impl ThermostatAction for MetropolisMomentumResample {
    fn label(&self) -> &str {
        "metropolis-momentum-resample"
    }

    fn apply(&mut self, scheduler: &mut CollisionScheduler, rng: &mut StdRng) -> Result<()> {
        let old_v: Vec<[f64; DIM]> = scheduler.particles().iter().map(|p| p.v).collect();
        let e_old = scheduler.current_potential_energy() + scheduler.current_kinetic_energy();

        let t = self.temperature;
        for p in scheduler.particles_mut() {
            let scale = (t / p.mass).sqrt();
            for k in 0..DIM {
                p.v[k] = scale * rng.sample::<f64, _>(StandardNormal);
            }
        }

        let e_new = scheduler.current_potential_energy() + scheduler.current_kinetic_energy();
        let de = e_new - e_old;
        let accept = de <= 0.0 || rng.random::<f64>() < (-de / t).exp();
        if !accept {
            for (p, v) in scheduler.particles_mut().iter_mut().zip(old_v) {
                p.v = v;
            }
        }
        Ok(())
    }
}

/// Monte Carlo volume move (constant-pressure sampling): propose a random
/// `ln V` perturbation, scale box and positions isotropically, and accept
/// with `min(1, exp(-(p ΔV)/kT + N Δln V))`. Any resulting hard-core
/// overlap rejects the move outright; box and positions are restored
/// exactly on rejection.
#[derive(Debug, Clone, Copy)]
pub struct VolumeMove {
    pressure: f64,
    temperature: f64,
    max_ln_scale: f64,
}

impl VolumeMove {
    pub fn new(pressure: f64, temperature: f64, max_ln_scale: f64) -> Result<Self> {
        validate_temperature(temperature)?;
        if !pressure.is_finite() || pressure <= 0.0 {
            return Err(Error::InvalidParam(
                "pressure must be finite and > 0".into(),
            ));
        }
        if !max_ln_scale.is_finite() || max_ln_scale <= 0.0 {
            return Err(Error::InvalidParam(
                "max log-volume step must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            pressure,
            temperature,
            max_ln_scale,
        })
    }
}

impl ThermostatAction for VolumeMove {
    fn label(&self) -> &str {
        "volume-move"
    }

    fn apply(&mut self, scheduler: &mut CollisionScheduler, rng: &mut StdRng) -> Result<()> {
        let n = scheduler.num_particles() as f64;
        let v_old = scheduler.boundary().volume();
        let old_lengths = scheduler.boundary().lengths();
        let old_positions: Vec<[f64; DIM]> = scheduler.particles().iter().map(|p| p.r).collect();

        let dln = rng.random_range(-self.max_ln_scale..=self.max_ln_scale);
        let factor = (dln / DIM as f64).exp();
        scheduler.boundary_mut().scale(factor)?;
        for p in scheduler.particles_mut() {
            for k in 0..DIM {
                p.r[k] *= factor;
            }
        }

        let v_new = v_old * dln.exp();
        let potential = scheduler.current_potential_energy();
        let ln_acc = -(self.pressure * (v_new - v_old)) / self.temperature + n * dln;
        let accept = potential.is_finite() && (ln_acc >= 0.0 || rng.random::<f64>() < ln_acc.exp());
        if !accept {
            scheduler.boundary_mut().set_lengths(old_lengths)?;
            for (p, r) in scheduler.particles_mut().iter_mut().zip(old_positions) {
                p.r = r;
            }
        }
        Ok(())
    }
}

fn validate_temperature(temperature: f64) -> Result<()> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(Error::InvalidParam(
            "temperature must be finite and > 0".into(),
        ));
    }
    Ok(())
}
