//! Event-driven hard-body dynamics core.
//!
//! Leaves first: [`boundary`] supplies the geometry, [`collide`] the
//! pair/wall interaction model, [`queue`] the time-ordered schedule with
//! lazy invalidation, [`probe`] the energy oracle. [`scheduler`] drives the
//! system from collision to collision, and [`thermostat`] layers the hybrid
//! Monte Carlo resampling state machine on top.

pub mod boundary;
pub mod collide;
pub mod event;
pub mod particle;
pub mod probe;
pub mod queue;
pub mod scheduler;
pub mod thermostat;

pub use boundary::{Boundary, WallRule};
pub use event::{Event, EventKind};
pub use particle::Particle;
pub use probe::{EnergyProbe, HardCoreProbe};
pub use queue::EventQueue;
pub use scheduler::{CollisionScheduler, EventOutcome, SchedulerPhase};
pub use thermostat::{
    Cadence, HybridStepDriver, MetropolisMomentumResample, MomentumResample, ThermostatAction,
    ThermostatState, VolumeMove,
};
