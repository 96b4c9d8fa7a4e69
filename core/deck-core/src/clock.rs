//! Time source abstraction.
//!
//! Every deadline in the deck is computed from a [`Clock`] so the whole
//! cooperative loop is deterministic under test: tests hold a [`ManualClock`]
//! clone and advance it between ticks instead of sleeping.

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A hand-advanced clock. Clones share the same instant, so the owner of one
/// clone can move time forward for a component holding another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.advance(Duration::milliseconds(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn manual_clock_clones_share_the_same_instant() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let held = clock.clone();
        clock.advance_ms(2500);
        assert_eq!(held.now(), at("2026-03-01T12:00:02.500Z"));
    }
}
