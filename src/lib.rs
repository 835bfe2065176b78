//! hardsim: event-driven hard-sphere molecular dynamics.
//!
//! The engine advances a particle system exactly from collision to
//! collision. Contact times are predicted analytically, kept in a
//! time-ordered schedule with lazy invalidation, and resolved as elastic
//! impulses; a hybrid Monte Carlo thermostat driver can interleave
//! stochastic resampling cycles with the deterministic dynamics.
//!
//! The Rust API lives in [`core`]; with the `python` feature enabled the
//! crate also builds as a Python extension module exposing the same engine.

pub mod core;
pub mod error;

#[cfg(feature = "python")]
mod python;
