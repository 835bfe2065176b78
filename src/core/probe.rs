use crate::core::boundary::{Boundary, WallRule};
use crate::core::particle::{Particle, DIM};

/// Relative slack under which two cores are considered interpenetrating.
/// Pairs sitting exactly at contact (post-resolution snap) must not read as
/// overlapped.
const OVERLAP_SLACK: f64 = 1e-9;

/// Energy oracle the scheduler consults at resynchronization points.
///
/// `potential_energy` may return `+inf` to signal a hard-core overlap, the
/// one configuration fault the engine treats as fatal. Probes must be
/// `Send` so scheduler replicas can run on independent threads.
pub trait EnergyProbe: Send {
    /// Potential energy of the configuration; `+inf` flags overlap.
    fn potential_energy(&self, particles: &[Particle], boundary: &Boundary) -> f64;

    /// Total kinetic energy.
    fn kinetic_energy(&self, particles: &[Particle]) -> f64 {
        particles.iter().map(Particle::kinetic_energy).sum()
    }
}

/// Pure hard-core probe: zero everywhere except interpenetration, which is
/// infinite. Checks pair separations (minimum image) and, on reflecting
/// axes, wall interpenetration.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardCoreProbe;

impl EnergyProbe for HardCoreProbe {
    fn potential_energy(&self, particles: &[Particle], boundary: &Boundary) -> f64 {
        let n = particles.len();
        for i in 0..n {
            let pi = &particles[i];
            for k in 0..DIM {
                if boundary.rule(k) == WallRule::Reflecting {
                    let (lo, hi) = (pi.radius, boundary.length(k) - pi.radius);
                    let slack = pi.radius * OVERLAP_SLACK;
                    if pi.r[k] < lo - slack || pi.r[k] > hi + slack {
                        return f64::INFINITY;
                    }
                }
            }
            for pj in &particles[i + 1..] {
                let mut d = [0.0_f64; DIM];
                for k in 0..DIM {
                    d[k] = pj.r[k] - pi.r[k];
                }
                let d = boundary.min_image(d);
                let dist_sq: f64 = d.iter().map(|&x| x * x).sum();
                let sigma = pi.radius + pj.radius;
                if dist_sq < sigma * sigma * (1.0 - OVERLAP_SLACK) {
                    return f64::INFINITY;
                }
            }
        }
        0.0
    }
}
