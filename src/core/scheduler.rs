use crate::core::boundary::{Boundary, WallRule};
use crate::core::collide::{self, EPS_TIME};
use crate::core::event::{Event, EventKind};
use crate::core::particle::{Particle, DIM};
use crate::core::probe::{EnergyProbe, HardCoreProbe};
use crate::core::queue::EventQueue;
use crate::error::{Error, Result};
use log::{trace, warn};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};

/// Observable phase of the scheduler state machine.
///
/// `Advancing` and `Resolving` are only visible mid-`step` (e.g. from a
/// probe callback); between steps the scheduler is `Idle` unless it has
/// entered the fault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Advancing,
    Resolving,
    OverlapFault,
}

/// What one `step` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventOutcome {
    /// A pair collision was resolved at `time`.
    PairCollision { i: u32, j: u32, time: f64 },
    /// A wall reflection or periodic crossing was resolved at `time`.
    BoundaryCrossing { i: u32, wall: u32, time: f64 },
    /// The schedule holds no further events; nothing was advanced.
    NonePending,
}

/// Event-driven collision scheduler.
///
/// Owns the particle set, boundary, event schedule, and clock exclusively;
/// one instance is strictly sequential. Every `step` resolves exactly one
/// event and propagates its consequences into the schedule before the next
/// event can be popped.
pub struct CollisionScheduler {
    particles: Vec<Particle>,
    boundary: Boundary,
    queue: EventQueue,
    time_now: f64,
    phase: SchedulerPhase,
    probe: Box<dyn EnergyProbe>,
    /// Set by the thermostat driver around its action sequence; while set,
    /// `reset` defers to the driver's single end-of-cycle resync.
    resampling: bool,
    resync_pending: bool,
    energies_at_resync: (f64, f64),
}

impl CollisionScheduler {
    /// Create a scheduler over an explicit particle set.
    ///
    /// Particle ids must equal their indices. The event horizon starts
    /// empty; call [`reset`](Self::reset) to probe the configuration and
    /// seed it.
    pub fn new(particles: Vec<Particle>, boundary: Boundary) -> Result<Self> {
        if particles.is_empty() {
            return Err(Error::InvalidParam("particle set must be non-empty".into()));
        }
        for (idx, p) in particles.iter().enumerate() {
            if p.id as usize != idx {
                return Err(Error::InvalidParam(format!(
                    "particle id {} does not match its index {}",
                    p.id, idx
                )));
            }
            if !boundary.admits_radius(p.radius) {
                return Err(Error::InvalidParam(
                    "box must be at least one diameter wide on every reflecting axis".into(),
                ));
            }
        }
        Ok(Self {
            particles,
            boundary,
            queue: EventQueue::new(),
            time_now: 0.0,
            phase: SchedulerPhase::Idle,
            probe: Box::new(HardCoreProbe),
            resampling: false,
            resync_pending: false,
            energies_at_resync: (0.0, 0.0),
        })
    }

    /// Replace the energy probe (builder style).
    pub fn with_probe(mut self, probe: Box<dyn EnergyProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Build a dilute gas of `n` identical spheres by rejection sampling
    /// non-overlapping positions, with velocity components uniform in
    /// [-1, 1], then reset to seed the event horizon.
    pub fn random_gas(
        n: usize,
        boundary: Boundary,
        radius: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidParam("particle count must be > 0".into()));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidParam("radius must be finite and > 0".into()));
        }
        if !boundary.admits_radius(radius) {
            return Err(Error::InvalidParam(
                "box must be at least one diameter wide on every reflecting axis".into(),
            ));
        }

        let mut rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };

        let mut particles: Vec<Particle> = Vec::with_capacity(n);
        let max_attempts = 1_000_000usize;
        for id in 0..(n as u32) {
            let mut attempts = 0usize;
            let r = loop {
                if attempts >= max_attempts {
                    return Err(Error::InvalidParam(format!(
                        "failed to place particle {id} without overlap; \
                         try fewer particles or a smaller radius"
                    )));
                }
                attempts += 1;
                let mut r = [0.0_f64; DIM];
                for (k, r_k) in r.iter_mut().enumerate() {
                    let l = boundary.length(k);
                    *r_k = match boundary.rule(k) {
                        WallRule::Reflecting => rng.random_range(radius..=(l - radius)),
                        WallRule::Periodic => rng.random_range(0.0..l),
                    };
                }
                if !overlaps_existing(&particles, &r, radius, &boundary) {
                    break r;
                }
            };

            let mut v = [0.0_f64; DIM];
            v.iter_mut().for_each(|x| *x = rng.random_range(-1.0..=1.0));
            particles.push(Particle::new(id, r, v, radius, mass)?);
        }

        let mut scheduler = Self::new(particles, boundary)?;
        scheduler.reset()?;
        Ok(scheduler)
    }

    /// Current simulation time.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.time_now
    }

    /// Current phase of the state machine.
    #[inline]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Number of live scheduled events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Read-only particle view.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable particle view for out-of-band mutation (thermostat actions,
    /// configuration setters). Any caller that touches positions or
    /// velocities through this must call [`reset`](Self::reset) before the
    /// next step.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Mutable boundary access (volume-changing moves). Same resync
    /// obligation as [`particles_mut`](Self::particles_mut).
    pub fn boundary_mut(&mut self) -> &mut Boundary {
        &mut self.boundary
    }

    /// Potential energy of the live configuration, via the probe.
    pub fn current_potential_energy(&self) -> f64 {
        self.probe.potential_energy(&self.particles, &self.boundary)
    }

    /// Kinetic energy of the live configuration, via the probe.
    pub fn current_kinetic_energy(&self) -> f64 {
        self.probe.kinetic_energy(&self.particles)
    }

    /// Instantaneous kinetic temperature, 2K / (3N), in reduced units.
    pub fn kinetic_temperature(&self) -> f64 {
        2.0 * self.current_kinetic_energy() / (3.0 * self.particles.len() as f64)
    }

    /// Energies recorded by the most recent successful resync:
    /// `(potential, kinetic)`.
    pub fn energies_at_resync(&self) -> (f64, f64) {
        self.energies_at_resync
    }

    /// Resolve the next scheduled event, if any.
    ///
    /// Pops the earliest valid event, drifts every particle by free flight
    /// to its time, applies the resolution, and re-predicts for the touched
    /// particles. Stale entries encountered along the way are discarded
    /// silently. In the fault state this returns the overlap error.
    pub fn step(&mut self) -> Result<EventOutcome> {
        Ok(self
            .step_up_to(f64::INFINITY)?
            .unwrap_or(EventOutcome::NonePending))
    }

    /// Like [`step`](Self::step), but never resolves an event beyond
    /// `limit`; when the next event lies past the limit (or none is left),
    /// all particles drift to `limit` instead and `None` is returned.
    pub fn step_up_to(&mut self, limit: f64) -> Result<Option<EventOutcome>> {
        match self.pop_valid_up_to(limit)? {
            Some(event) => Ok(Some(self.resolve_event(event)?)),
            None => {
                if limit.is_finite() && limit > self.time_now {
                    self.phase = SchedulerPhase::Advancing;
                    self.drift_all(limit);
                    self.time_now = limit;
                    self.phase = SchedulerPhase::Idle;
                }
                Ok(None)
            }
        }
    }

    /// Advance to `target`, resolving every event up to it, then drift the
    /// remainder. Events past `target` stay scheduled untouched.
    pub fn advance_to(&mut self, target: f64) -> Result<()> {
        if !target.is_finite() {
            return Err(Error::InvalidParam("target time must be finite".into()));
        }
        if target < self.time_now - EPS_TIME {
            return Err(Error::InvalidParam(
                "target time cannot be earlier than the current time".into(),
            ));
        }
        while self.step_up_to(target)?.is_some() {}
        Ok(())
    }

    /// Resynchronize with the live configuration: recompute potential and
    /// kinetic energy through the probe and rebuild the event horizon from
    /// scratch. Required after any out-of-band position/velocity/boundary
    /// mutation.
    ///
    /// An infinite potential energy is a hard-core overlap: the scheduler
    /// enters the fault state, clears the schedule, and returns
    /// `Error::Overlap`. No events remain scheduled in that case; the
    /// caller must correct the configuration and reset again.
    ///
    /// While a thermostat cycle is active the resync is only recorded as
    /// pending; the driver performs the single authoritative resync at the
    /// end of the cycle.
    pub fn reset(&mut self) -> Result<()> {
        if self.resampling {
            self.resync_pending = true;
            return Ok(());
        }
        self.resync()
    }

    pub(crate) fn begin_resample_cycle(&mut self) {
        self.resampling = true;
    }

    /// Clear the cycle flag; returns whether an action requested a resync
    /// mid-cycle (which the driver folds into its single end-of-cycle one).
    pub(crate) fn end_resample_cycle(&mut self) -> bool {
        self.resampling = false;
        std::mem::take(&mut self.resync_pending)
    }

    // ============ Internal helpers ============

    fn resync(&mut self) -> Result<()> {
        let potential = self.current_potential_energy();
        if potential.is_infinite() {
            self.phase = SchedulerPhase::OverlapFault;
            self.queue.clear();
            warn!(
                "hard-core overlap in box '{}' at t = {}; schedule cleared",
                self.boundary.label(),
                self.time_now
            );
            return Err(self.overlap_error());
        }
        self.energies_at_resync = (potential, self.current_kinetic_energy());
        self.queue.clear();
        self.seed_horizon()?;
        self.phase = SchedulerPhase::Idle;
        Ok(())
    }

    fn overlap_error(&self) -> Error {
        Error::Overlap {
            label: self.boundary.label().to_string(),
        }
    }

    /// Pop the earliest event that is still valid and not beyond `limit`.
    /// A valid event past the limit goes back into the schedule.
    fn pop_valid_up_to(&mut self, limit: f64) -> Result<Option<Event>> {
        if self.phase == SchedulerPhase::OverlapFault {
            return Err(self.overlap_error());
        }
        while let Some(event) = self.queue.pop_min() {
            let (i, j) = event.participants();
            let now_i = self.particles[i as usize].collision_count;
            let now_j = j.map(|j| self.particles[j as usize].collision_count);
            if !event.is_valid(now_i, now_j) {
                trace!("discarding stale event at t = {}", event.time_f64());
                continue;
            }
            let t = event.time_f64();
            if t < self.time_now - EPS_TIME {
                trace!("discarding event predicted before the current time");
                continue;
            }
            if t > limit {
                self.queue.schedule(event);
                return Ok(None);
            }
            return Ok(Some(event));
        }
        Ok(None)
    }

    fn resolve_event(&mut self, event: Event) -> Result<EventOutcome> {
        let t = event.time_f64();

        self.phase = SchedulerPhase::Advancing;
        self.drift_all(t);
        self.time_now = self.time_now.max(t);

        self.phase = SchedulerPhase::Resolving;
        let outcome = match event.kind {
            EventKind::PairCollision { i, j } => {
                let (a, b) = (i as usize, j as usize);
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                let (left, right) = self.particles.split_at_mut(hi);
                collide::resolve_pair(&mut left[lo], &mut right[0], &self.boundary)?;

                for id in [i, j] {
                    self.particles[id as usize].bump_collision_count();
                    self.queue.invalidate_all(id);
                }
                self.reschedule(a)?;
                self.reschedule(b)?;
                EventOutcome::PairCollision { i, j, time: t }
            }
            EventKind::BoundaryCrossing { i, wall } => {
                let a = i as usize;
                collide::resolve_wall(&mut self.particles[a], wall, &self.boundary)?;
                self.particles[a].bump_collision_count();
                self.queue.invalidate_all(i);
                self.reschedule(a)?;
                EventOutcome::BoundaryCrossing { i, wall, time: t }
            }
        };
        self.phase = SchedulerPhase::Idle;
        Ok(outcome)
    }

    /// Free-flight drift of every particle to the absolute time `to`.
    fn drift_all(&mut self, to: f64) {
        let dt = to - self.time_now;
        if dt <= EPS_TIME {
            return;
        }
        for p in &mut self.particles {
            p.drift(dt);
            // Clamp reflecting axes against numerical drift; the wall events
            // themselves handle the physics.
            for k in 0..DIM {
                if self.boundary.rule(k) == WallRule::Reflecting {
                    let (lo, hi) = (p.radius, self.boundary.length(k) - p.radius);
                    p.r[k] = p.r[k].clamp(lo, hi);
                }
            }
        }
    }

    /// Predict and schedule all events for every particle: pair events over
    /// all pairs, plus the earliest wall event per particle.
    fn seed_horizon(&mut self) -> Result<()> {
        let n = self.particles.len();
        for i in 0..n {
            for j in (i + 1)..n {
                self.schedule_pair(i, j)?;
            }
            self.schedule_wall(i)?;
        }
        Ok(())
    }

    /// Re-predict events for one particle against the walls and all others.
    fn reschedule(&mut self, i: usize) -> Result<()> {
        self.schedule_wall(i)?;
        for j in 0..self.particles.len() {
            if j != i {
                let (a, b) = if i < j { (i, j) } else { (j, i) };
                self.schedule_pair(a, b)?;
            }
        }
        Ok(())
    }

    fn schedule_pair(&mut self, a: usize, b: usize) -> Result<()> {
        if let Some(dt) =
            collide::pair_collision_time(&self.particles[a], &self.particles[b], &self.boundary)
        {
            let t = self.time_now + dt;
            if t.is_finite() {
                let event = Event::new(
                    t,
                    EventKind::PairCollision {
                        i: self.particles[a].id,
                        j: self.particles[b].id,
                    },
                    self.particles[a].collision_count,
                    Some(self.particles[b].collision_count),
                )?;
                self.queue.schedule(event);
            }
        }
        Ok(())
    }

    fn schedule_wall(&mut self, i: usize) -> Result<()> {
        if let Some((dt, wall)) = collide::wall_crossing_time(&self.particles[i], &self.boundary) {
            let t = self.time_now + dt;
            if t.is_finite() {
                let event = Event::new(
                    t,
                    EventKind::BoundaryCrossing {
                        i: self.particles[i].id,
                        wall,
                    },
                    self.particles[i].collision_count,
                    None,
                )?;
                self.queue.schedule(event);
            }
        }
        Ok(())
    }
}

fn overlaps_existing(
    existing: &[Particle],
    r: &[f64; DIM],
    radius: f64,
    boundary: &Boundary,
) -> bool {
    let min_sq = (2.0 * radius) * (2.0 * radius);
    for p in existing {
        let mut d = [0.0_f64; DIM];
        for k in 0..DIM {
            d[k] = r[k] - p.r[k];
        }
        let d = boundary.min_image(d);
        let dist_sq: f64 = d.iter().map(|&x| x * x).sum();
        if dist_sq < min_sq {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_on_a_line() -> Result<CollisionScheduler> {
        let boundary = Boundary::reflecting([10.0, 10.0, 10.0])?;
        let particles = vec![
            Particle::new(0, [4.0, 5.0, 5.0], [1.0, 0.0, 0.0], 0.5, 1.0)?,
            Particle::new(1, [6.0, 5.0, 5.0], [-1.0, 0.0, 0.0], 0.5, 1.0)?,
        ];
        CollisionScheduler::new(particles, boundary)
    }

    #[test]
    fn horizon_is_empty_until_reset() -> Result<()> {
        let mut sim = two_on_a_line()?;
        assert_eq!(sim.pending_events(), 0);
        assert_eq!(sim.step()?, EventOutcome::NonePending);
        sim.reset()?;
        assert!(sim.pending_events() > 0);
        Ok(())
    }

    #[test]
    fn random_gas_is_seeded_and_overlap_free() -> Result<()> {
        let boundary = Boundary::reflecting([12.0, 12.0, 12.0])?;
        let sim = CollisionScheduler::random_gas(24, boundary, 0.3, 1.0, Some(1234))?;
        assert_eq!(sim.num_particles(), 24);
        assert_eq!(sim.current_potential_energy(), 0.0);
        assert!(sim.pending_events() > 0);
        Ok(())
    }

    #[test]
    fn mismatched_ids_rejected() -> Result<()> {
        let boundary = Boundary::reflecting([10.0, 10.0, 10.0])?;
        let particles = vec![Particle::new(3, [5.0, 5.0, 5.0], [0.0; DIM], 0.5, 1.0)?];
        assert!(CollisionScheduler::new(particles, boundary).is_err());
        Ok(())
    }

    #[test]
    fn too_narrow_box_rejected() -> Result<()> {
        let boundary = Boundary::reflecting([0.8, 10.0, 10.0])?;
        let particles = vec![Particle::new(0, [0.4, 5.0, 5.0], [0.0; DIM], 0.5, 1.0)?];
        assert!(CollisionScheduler::new(particles, boundary).is_err());
        Ok(())
    }

    #[test]
    fn advance_to_drifts_past_the_last_event() -> Result<()> {
        let boundary = Boundary::new(
            [10.0, 10.0, 10.0],
            [WallRule::Periodic, WallRule::Periodic, WallRule::Periodic],
        )?;
        let particles = vec![Particle::new(0, [5.0, 5.0, 5.0], [0.0; DIM], 0.5, 1.0)?];
        let mut sim = CollisionScheduler::new(particles, boundary)?;
        sim.reset()?;
        // A resting particle schedules nothing; advance_to just drifts time.
        sim.advance_to(3.5)?;
        assert!((sim.current_time() - 3.5).abs() < 1e-12);
        assert!(sim.advance_to(1.0).is_err());
        Ok(())
    }

    #[test]
    fn resync_records_energies() -> Result<()> {
        let mut sim = two_on_a_line()?;
        sim.reset()?;
        let (pe, ke) = sim.energies_at_resync();
        assert_eq!(pe, 0.0);
        assert!((ke - 1.0).abs() < 1e-12); // two unit masses at speed 1
        Ok(())
    }
}
