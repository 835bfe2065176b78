use hardsim::core::{
    Boundary, Cadence, CollisionScheduler, EnergyProbe, EventOutcome, HybridStepDriver,
    MetropolisMomentumResample, MomentumResample, Particle, SchedulerPhase, ThermostatAction,
    ThermostatState, VolumeMove,
};
use hardsim::error::Result;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn colliding_pair() -> Result<CollisionScheduler> {
    let boundary = Boundary::reflecting([10.0, 10.0, 10.0])?;
    let particles = vec![
        Particle::new(0, [4.0, 5.0, 5.0], [1.0, 0.0, 0.0], 0.5, 1.0)?,
        Particle::new(1, [6.0, 5.0, 5.0], [-1.0, 0.0, 0.0], 0.5, 1.0)?,
    ];
    CollisionScheduler::new(particles, boundary)
}

/// An interpenetrating configuration must fault at reset, leave nothing
/// scheduled, and refuse to step until corrected.
#[test]
fn overlap_faults_reset_and_blocks_stepping() -> Result<()> {
    let boundary = Boundary::reflecting([10.0, 10.0, 10.0])?.with_label("overlap-box");
    let particles = vec![
        Particle::new(0, [5.0, 5.0, 5.0], [0.0; 3], 0.5, 1.0)?,
        Particle::new(1, [5.6, 5.0, 5.0], [0.0; 3], 0.5, 1.0)?,
    ];
    let mut sim = CollisionScheduler::new(particles, boundary)?;

    let err = sim.reset().unwrap_err();
    assert!(err.is_overlap());
    assert!(err.to_string().contains("overlap-box"));
    assert_eq!(sim.pending_events(), 0);
    assert_eq!(sim.phase(), SchedulerPhase::OverlapFault);
    assert!(sim.step().unwrap_err().is_overlap());

    // Correct the configuration; the fault clears on the next reset.
    sim.particles_mut()[1].set_position([7.0, 5.0, 5.0])?;
    sim.reset()?;
    assert_eq!(sim.phase(), SchedulerPhase::Idle);
    Ok(())
}

struct Recorder {
    tag: &'static str,
    record: Arc<Mutex<Vec<&'static str>>>,
}

impl ThermostatAction for Recorder {
    fn label(&self) -> &str {
        self.tag
    }

    fn apply(&mut self, _scheduler: &mut CollisionScheduler, _rng: &mut StdRng) -> Result<()> {
        self.record.lock().unwrap().push(self.tag);
        Ok(())
    }
}

/// Actions run in registration order, once per cycle.
#[test]
fn actions_run_in_registration_order() -> Result<()> {
    let mut sim = colliding_pair()?;
    sim.reset()?;
    let mut driver = HybridStepDriver::new(sim, Some(11));
    driver.set_cadence(Some(Cadence::Events(1)))?;

    let record = Arc::new(Mutex::new(Vec::new()));
    driver.add_action(Box::new(Recorder {
        tag: "first",
        record: Arc::clone(&record),
    }));
    driver.add_action(Box::new(Recorder {
        tag: "second",
        record: Arc::clone(&record),
    }));

    driver.run_events(3)?;
    assert!(driver.cycles_run() >= 1);
    let record = record.lock().unwrap();
    assert!(record.len() >= 2);
    assert_eq!(&record[..2], &["first", "second"]);
    assert_eq!(driver.state(), ThermostatState::Integrating);
    Ok(())
}

#[derive(Debug)]
struct CountingProbe {
    calls: Arc<AtomicUsize>,
}

impl EnergyProbe for CountingProbe {
    fn potential_energy(&self, _particles: &[Particle], _boundary: &Boundary) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        0.0
    }
}

struct ResetInsideAction;

impl ThermostatAction for ResetInsideAction {
    fn label(&self) -> &str {
        "reset-inside"
    }

    fn apply(&mut self, scheduler: &mut CollisionScheduler, _rng: &mut StdRng) -> Result<()> {
        // A reset issued mid-cycle must defer to the driver's single
        // end-of-cycle resync.
        scheduler.reset()
    }
}

/// The overlap/energy resync runs exactly once per thermostat cycle, even
/// when an action itself calls reset.
#[test]
fn exactly_one_resync_per_cycle() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let sim = colliding_pair()?.with_probe(Box::new(CountingProbe {
        calls: Arc::clone(&calls),
    }));
    let mut driver = HybridStepDriver::new(sim, Some(3));
    driver.reset()?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    driver.set_cadence(Some(Cadence::Events(1)))?;
    driver.add_action(Box::new(ResetInsideAction));

    // First step resolves the pair collision (no cycle yet); the second
    // runs exactly one cycle before its event.
    driver.step()?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    driver.step()?;
    assert_eq!(driver.cycles_run(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

/// A resampling cycle rebuilds the horizon; the run stays causal and
/// healthy afterwards, with the gas pulled toward the bath temperature.
#[test]
fn momentum_resample_cycles_keep_the_run_healthy() -> Result<()> {
    let boundary = Boundary::reflecting([14.0, 14.0, 14.0])?;
    let sim = CollisionScheduler::random_gas(32, boundary, 0.25, 1.0, Some(2024))?;
    let mut driver = HybridStepDriver::new(sim, Some(2024));
    driver.set_cadence(Some(Cadence::Events(10)))?;
    driver.add_action(Box::new(MomentumResample::new(1.5)?));

    let mut last_time = 0.0;
    for _ in 0..120 {
        let time = match driver.step()? {
            EventOutcome::PairCollision { time, .. } => time,
            EventOutcome::BoundaryCrossing { time, .. } => time,
            EventOutcome::NonePending => break,
        };
        assert!(time >= last_time - 1e-12, "clock went backwards");
        last_time = time;
    }
    assert!(driver.cycles_run() >= 5);
    assert_eq!(driver.state(), ThermostatState::Integrating);
    assert_eq!(driver.scheduler().phase(), SchedulerPhase::Idle);
    assert!(driver.scheduler().pending_events() > 0);

    let temp = driver.scheduler().kinetic_temperature();
    assert!(temp > 0.5 && temp < 4.5, "temperature {temp} out of range");
    Ok(())
}

/// Time-based cadence fires between events during a timed advance.
#[test]
fn time_cadence_fires_during_advance() -> Result<()> {
    let boundary = Boundary::reflecting([10.0, 10.0, 10.0])?;
    let sim = CollisionScheduler::random_gas(24, boundary, 0.3, 1.0, Some(77))?;
    let mut driver = HybridStepDriver::new(sim, Some(77));
    driver.set_cadence(Some(Cadence::Time(0.5)))?;
    driver.add_action(Box::new(MomentumResample::new(1.0)?));

    driver.advance_to(5.0)?;
    assert!((driver.current_time() - 5.0).abs() < 1e-9);
    assert!(driver.cycles_run() >= 2);
    Ok(())
}

/// The Metropolis momentum move is deterministic under a fixed seed and
/// always leaves a finite, resettable configuration.
#[test]
fn metropolis_resample_is_seed_deterministic() -> Result<()> {
    let run = || -> Result<Vec<[f64; 3]>> {
        let mut sim = colliding_pair()?;
        sim.reset()?;
        let mut action = MetropolisMomentumResample::new(1.0)?;
        let mut rng: StdRng = SeedableRng::seed_from_u64(9);
        action.apply(&mut sim, &mut rng)?;
        sim.reset()?;
        assert_eq!(sim.phase(), SchedulerPhase::Idle);
        Ok(sim.particles().iter().map(|p| p.v).collect())
    };

    let first = run()?;
    let second = run()?;
    assert_eq!(first, second);
    assert!(first.iter().flatten().all(|v| v.is_finite()));
    Ok(())
}

/// Volume moves never leave the configuration overlapped: either the scaled
/// box is accepted or box and positions are restored exactly.
#[test]
fn volume_move_preserves_validity() -> Result<()> {
    let boundary = Boundary::periodic([10.0, 10.0, 10.0])?;
    let mut sim = CollisionScheduler::random_gas(20, boundary, 0.4, 1.0, Some(5))?;

    let mut action = VolumeMove::new(1.0, 1.0, 0.05)?;
    let mut rng: StdRng = SeedableRng::seed_from_u64(5);
    for _ in 0..10 {
        action.apply(&mut sim, &mut rng)?;
        assert_eq!(sim.current_potential_energy(), 0.0);
    }
    sim.reset()?;
    assert_eq!(sim.phase(), SchedulerPhase::Idle);
    assert!(sim.boundary().volume() > 0.0);
    Ok(())
}
