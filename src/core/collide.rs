use crate::core::boundary::{wall_axis_side, Boundary, WallRule};
use crate::core::particle::{Particle, DIM};
use crate::error::{Error, Result};

/// Small numeric tolerance for time and geometric checks.
pub(crate) const EPS_TIME: f64 = 1e-12;

/// Time until hard-core contact of a pair, relative to now, under free
/// flight. Uses the smaller positive root of `|d + u t| = r_a + r_b` over
/// the minimum-image displacement. Returns `None` when the pair is
/// separating, not moving relative to each other, or the discriminant is
/// non-positive (grazing contact counts as no collision).
pub fn pair_collision_time(a: &Particle, b: &Particle, boundary: &Boundary) -> Option<f64> {
    let mut d = [0.0_f64; DIM];
    let mut u = [0.0_f64; DIM];
    for k in 0..DIM {
        d[k] = b.r[k] - a.r[k];
        u[k] = b.v[k] - a.v[k];
    }
    let d = boundary.min_image(d);

    let qa = dot(&u, &u);
    if qa <= EPS_TIME {
        return None; // no relative motion
    }
    let qb = 2.0 * dot(&d, &u);
    let sigma = a.radius + b.radius;
    let qc = dot(&d, &d) - sigma * sigma;

    let disc = qb * qb - 4.0 * qa * qc;
    if disc <= 0.0 {
        return None;
    }

    // Smaller root; require an approaching pair and a strictly positive time.
    let t = (-qb - disc.sqrt()) / (2.0 * qa);
    if qb >= 0.0 || t <= EPS_TIME || !t.is_finite() {
        return None;
    }
    Some(t)
}

/// Resolve an elastic hard-sphere collision for a pair at contact.
///
/// The impulse acts along the line of centers and conserves both momentum
/// and kinetic energy for equal or unequal masses. Velocities are mutated in
/// place; bumping the update tokens is the scheduler's job.
pub fn resolve_pair(a: &mut Particle, b: &mut Particle, boundary: &Boundary) -> Result<()> {
    let mut n = [0.0_f64; DIM];
    for k in 0..DIM {
        n[k] = b.r[k] - a.r[k];
    }
    let n = boundary.min_image(n);
    let dist = dot(&n, &n).sqrt();
    if dist <= EPS_TIME {
        return Err(Error::MathError(
            "degenerate contact normal in pair collision".into(),
        ));
    }
    let mut n = n;
    for nk in &mut n {
        *nk /= dist;
    }

    let (ma, mb) = (a.mass, b.mass);
    let mut u = [0.0_f64; DIM];
    for k in 0..DIM {
        u[k] = b.v[k] - a.v[k];
    }
    let u_n = dot(&u, &n);

    // Only the normal component changes.
    let fa = (2.0 * mb / (ma + mb)) * u_n;
    let fb = (2.0 * ma / (ma + mb)) * u_n;
    for (k, &nk) in n.iter().enumerate() {
        a.v[k] += fa * nk;
        b.v[k] -= fb * nk;
    }
    Ok(())
}

/// Earliest wall event for a particle, relative to now: `(dt, wall_id)`.
///
/// Reflecting axes collide at the contact planes `radius` / `L - radius`;
/// periodic axes cross when the center reaches `0` / `L`.
pub fn wall_crossing_time(p: &Particle, boundary: &Boundary) -> Option<(f64, u32)> {
    let mut best_t = f64::INFINITY;
    let mut best_wall: Option<u32> = None;

    for k in 0..DIM {
        let (x, v, l) = (p.r[k], p.v[k], boundary.length(k));
        let (lo, hi) = match boundary.rule(k) {
            WallRule::Reflecting => (p.radius, l - p.radius),
            WallRule::Periodic => (0.0, l),
        };
        if v < -EPS_TIME {
            let t = (lo - x) / v; // v is negative
            if t > EPS_TIME && t < best_t {
                best_t = t;
                best_wall = Some((2 * k) as u32);
            }
        }
        if v > EPS_TIME {
            let t = (hi - x) / v;
            if t > EPS_TIME && t < best_t {
                best_t = t;
                best_wall = Some((2 * k + 1) as u32);
            }
        }
    }

    best_wall.map(|w| (best_t, w))
}

/// Resolve a wall event at the moment of crossing.
///
/// Reflecting: specular flip of the normal velocity component, position
/// snapped to the contact plane. Periodic: the coordinate wraps to the
/// opposite face; the velocity is untouched.
pub fn resolve_wall(p: &mut Particle, wall: u32, boundary: &Boundary) -> Result<()> {
    let (axis, is_max) = wall_axis_side(wall);
    if axis >= DIM {
        return Err(Error::InvalidParam(format!("wall id {wall} out of range")));
    }
    let l = boundary.length(axis);
    match boundary.rule(axis) {
        WallRule::Reflecting => {
            p.v[axis] = -p.v[axis];
            p.r[axis] = if is_max { l - p.radius } else { p.radius };
        }
        WallRule::Periodic => {
            p.r[axis] = if is_max { 0.0 } else { l };
        }
    }
    Ok(())
}

#[inline]
fn dot(a: &[f64; DIM], b: &[f64; DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
