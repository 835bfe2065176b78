use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// Kinds of events the engine schedules.
///
/// Tie-breaking for deterministic ordering prefers pair collisions over
/// boundary crossings when times are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Hard-core contact between particles `i` and `j`.
    PairCollision { i: u32, j: u32 },
    /// Particle `i` reaching wall `wall` (reflecting contact or periodic
    /// image crossing).
    BoundaryCrossing { i: u32, wall: u32 },
}

impl EventKind {
    #[inline]
    fn order_key(&self) -> (u8, u32, u32) {
        match *self {
            EventKind::PairCollision { i, j } => (0, i, j),
            EventKind::BoundaryCrossing { i, wall } => (1, i, wall),
        }
    }
}

/// A scheduled prediction.
///
/// `token_i` / `token_j` are the collision-count snapshots of the referenced
/// particles at prediction time. The event is valid only while every
/// referenced particle's live count still equals its snapshot; otherwise it
/// is stale and must be discarded, never acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: NotNan<f64>,
    pub kind: EventKind,
    pub token_i: u64,
    pub token_j: Option<u64>,
}

impl Event {
    /// Create a new event, validating that the time is finite and non-NaN.
    pub fn new(time: f64, kind: EventKind, token_i: u64, token_j: Option<u64>) -> Result<Self> {
        if !time.is_finite() {
            return Err(Error::InvalidParam(
                "event time must be finite and non-NaN".into(),
            ));
        }
        let time = NotNan::new(time)
            .map_err(|_| Error::InvalidParam("event time cannot be NaN".into()))?;
        Ok(Self {
            time,
            kind,
            token_i,
            token_j,
        })
    }

    /// Raw f64 event time.
    #[inline]
    pub fn time_f64(&self) -> f64 {
        self.time.into_inner()
    }

    /// Referenced particle ids: the primary participant and, for pair
    /// collisions, the partner.
    #[inline]
    pub fn participants(&self) -> (u32, Option<u32>) {
        match self.kind {
            EventKind::PairCollision { i, j } => (i, Some(j)),
            EventKind::BoundaryCrossing { i, .. } => (i, None),
        }
    }

    /// Validate against live collision counts. Pass `None` for `now_j` when
    /// the event has no second participant.
    #[inline]
    pub fn is_valid(&self, now_i: u64, now_j: Option<u64>) -> bool {
        if self.token_i != now_i {
            return false;
        }
        match (self.token_j, now_j) {
            (Some(a), Some(b)) => a == b,
            (None, _) => true,
            // A snapshot of a second participant with no live count to
            // compare against cannot be trusted.
            (Some(_), None) => false,
        }
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {
                let a = self.kind.order_key();
                let b = other.kind.order_key();
                match a.cmp(&b) {
                    Ordering::Equal => {
                        // Final tie-breaker on token snapshots for a total order.
                        (self.token_i, self.token_j.unwrap_or(0))
                            .cmp(&(other.token_i, other.token_j.unwrap_or(0)))
                    }
                    o => o,
                }
            }
            o => o,
        }
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EventKind::{BoundaryCrossing, PairCollision};

    #[test]
    fn new_event_rejects_nan_and_inf_time() {
        assert!(Event::new(f64::NAN, PairCollision { i: 1, j: 2 }, 0, Some(0)).is_err());
        assert!(Event::new(f64::INFINITY, BoundaryCrossing { i: 0, wall: 1 }, 0, None).is_err());
    }

    #[test]
    fn ordering_by_time_then_kind() -> Result<()> {
        let e1 = Event::new(1.0, PairCollision { i: 0, j: 1 }, 0, Some(0))?;
        let e2 = Event::new(2.0, BoundaryCrossing { i: 0, wall: 0 }, 0, None)?;
        assert!(e1 < e2);

        let t = 5.0;
        let a = Event::new(t, PairCollision { i: 0, j: 1 }, 3, Some(4))?;
        let b = Event::new(t, BoundaryCrossing { i: 0, wall: 1 }, 3, None)?;
        assert!(a < b); // pair collision wins the tie
        Ok(())
    }

    #[test]
    fn is_valid_checks_tokens() -> Result<()> {
        let e_pair = Event::new(1.0, PairCollision { i: 1, j: 2 }, 10, Some(20))?;
        assert!(e_pair.is_valid(10, Some(20)));
        assert!(!e_pair.is_valid(11, Some(20)));
        assert!(!e_pair.is_valid(10, Some(21)));
        assert!(!e_pair.is_valid(10, None));

        let e_wall = Event::new(1.0, BoundaryCrossing { i: 3, wall: 0 }, 7, None)?;
        assert!(e_wall.is_valid(7, None));
        assert!(e_wall.is_valid(7, Some(999))); // unrelated second count ignored
        assert!(!e_wall.is_valid(8, None));
        Ok(())
    }

    #[test]
    fn participants_reported() -> Result<()> {
        let e = Event::new(1.0, PairCollision { i: 4, j: 9 }, 0, Some(0))?;
        assert_eq!(e.participants(), (4, Some(9)));
        let e = Event::new(1.0, BoundaryCrossing { i: 4, wall: 2 }, 0, None)?;
        assert_eq!(e.participants(), (4, None));
        Ok(())
    }
}
