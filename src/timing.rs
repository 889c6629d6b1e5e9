//! Phase math for the emulated vsync grid

use crate::clock::{Nsecs, NSEC_PER_SEC};

/// Default vsync period (60Hz)
pub const DEFAULT_PERIOD_NS: Nsecs = 16_666_666;

/// Pick the instant the loop should wake for the next tick.
///
/// If the scheduled tick is still ahead (or exactly now) it is used as is.
/// Otherwise one or more ticks were missed and the wake moves to the first
/// grid point strictly after `now`, where the grid is anchored on the
/// originally scheduled tick rather than on `now`. Missed ticks are never
/// replayed.
pub fn next_wake(next_tick: Nsecs, now: Nsecs, period: Nsecs) -> Nsecs {
    debug_assert!(period > 0);
    let sleep = next_tick - now;
    if sleep >= 0 {
        return next_tick;
    }
    now + (period - (now - next_tick) % period)
}

/// Convert a refresh rate into a vsync period, truncating to whole nanoseconds.
pub fn period_from_refresh_hz(hz: f64) -> Option<Nsecs> {
    if !hz.is_finite() || hz <= 0.0 {
        return None;
    }
    let period = (NSEC_PER_SEC as f64 / hz) as Nsecs;
    (period > 0).then_some(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Nsecs = DEFAULT_PERIOD_NS;

    #[test]
    fn test_on_schedule_keeps_tick() {
        assert_eq!(next_wake(1_000, 500, P), 1_000);
        assert_eq!(next_wake(1_000, 1_000, P), 1_000);
    }

    #[test]
    fn test_missed_tick_keeps_phase() {
        // Scheduled at 100ms, we woke up 40ms late: next grid point is 100 + 3P
        let next_tick = 100_000_000;
        let now = next_tick + 40_000_000;
        let wake = next_wake(next_tick, now, P);
        assert_eq!(wake, next_tick + 3 * P);
        assert!(wake > now);
        assert_eq!((wake - next_tick) % P, 0);
    }

    #[test]
    fn test_missed_by_whole_periods_moves_past_now() {
        let next_tick = 0;
        let now = 2 * P;
        assert_eq!(next_wake(next_tick, now, P), 3 * P);
    }

    #[test]
    fn test_uninitialized_schedule_aligns_to_grid() {
        let now = 123_456_789_012;
        let wake = next_wake(0, now, P);
        assert!(wake > now && wake - now <= P);
        assert_eq!(wake % P, 0);
    }

    #[test]
    fn test_period_from_refresh_hz() {
        assert_eq!(period_from_refresh_hz(60.0), Some(16_666_666));
        assert_eq!(period_from_refresh_hz(50.0), Some(20_000_000));
        assert_eq!(period_from_refresh_hz(0.0), None);
        assert_eq!(period_from_refresh_hz(-60.0), None);
        assert_eq!(period_from_refresh_hz(f64::NAN), None);
        assert_eq!(period_from_refresh_hz(f64::INFINITY), None);
    }
}
