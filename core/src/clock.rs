//! Game clock: time scaling between real time and game hours, plus the
//! injectable clock the engine consults for "now".
//!
//! RULE: Core functions never read the wall clock. They take `now`
//! as an argument; only the engine asks a `Clock`.
//!
//! One real hour is one game week (168 game hours).

use crate::types::{GameHours, Instant};
use chrono::{Duration, Utc};
use std::sync::Mutex;

/// Game hours that elapse per real hour.
pub const TIME_ACCELERATION: f64 = 168.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Convert a real duration in milliseconds to game hours.
pub fn real_ms_to_game_hours(real_ms: i64) -> GameHours {
    real_ms as f64 / MS_PER_HOUR * TIME_ACCELERATION
}

/// Convert game hours to a real duration in milliseconds (rounded).
pub fn game_hours_to_real_ms(hours: GameHours) -> i64 {
    (hours / TIME_ACCELERATION * MS_PER_HOUR).round() as i64
}

/// Signed game hours elapsed from `from` to `to`.
pub fn game_hours_between(from: Instant, to: Instant) -> GameHours {
    real_ms_to_game_hours((to - from).num_milliseconds())
}

/// Game hours left until `deadline`, never negative.
pub fn game_hours_remaining(now: Instant, deadline: Instant) -> GameHours {
    game_hours_between(now, deadline).max(0.0)
}

/// The real instant at which `hours` game hours will have passed after `now`.
pub fn real_time_after_game_hours(now: Instant, hours: GameHours) -> Instant {
    now + Duration::milliseconds(game_hours_to_real_ms(hours))
}

/// Real hours between two instants, never negative. Offline-gap
/// calculations are expressed in real hours.
pub fn real_hours_between(from: Instant, to: Instant) -> f64 {
    ((to - from).num_milliseconds() as f64 / MS_PER_HOUR).max(0.0)
}

// ── Clock sources ────────────────────────────────────────────────────────────

/// Source of "current real time".
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Utc::now()
    }
}

/// A manually advanced clock for tests and headless runs.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Instant>,
}

impl FixedClock {
    pub fn new(start: Instant) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, instant: Instant) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = instant;
    }

    /// Move the clock forward by a real duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }

    /// Move the clock forward by `hours` of game time.
    pub fn advance_game_hours(&self, hours: GameHours) {
        self.advance(Duration::milliseconds(game_hours_to_real_ms(hours)));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> Instant {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn one_real_hour_is_one_game_week() {
        assert_eq!(real_ms_to_game_hours(3_600_000), 168.0);
        assert_eq!(game_hours_to_real_ms(168.0), 3_600_000);
    }

    #[test]
    fn remaining_time_clamps_to_zero() {
        let now = t0();
        let past = now - Duration::minutes(5);
        assert_eq!(game_hours_remaining(now, past), 0.0);
        assert!(game_hours_remaining(past, now) > 0.0);
    }

    #[test]
    fn future_date_round_trips_through_game_hours() {
        let now = t0();
        let later = real_time_after_game_hours(now, 26.0);
        let hours = game_hours_between(now, later);
        assert!((hours - 26.0).abs() < 1e-3, "got {hours}");
    }

    #[test]
    fn fixed_clock_advances_in_game_hours() {
        let clock = FixedClock::new(t0());
        clock.advance_game_hours(168.0);
        assert_eq!(clock.now(), t0() + Duration::hours(1));
    }
}
