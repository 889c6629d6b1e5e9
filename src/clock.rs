//! Monotonic time source for the vsync emulator
//!
//! Timestamps are signed nanoseconds on `CLOCK_MONOTONIC`, the same unit the
//! hwcomposer HAL uses for `nsecs_t`. Sleeping is always expressed as an
//! absolute deadline so the loop cannot accumulate drift between computing a
//! wake instant and actually going to sleep.

use thiserror::Error;

/// Nanoseconds on the monotonic clock
pub type Nsecs = i64;

pub const NSEC_PER_SEC: Nsecs = 1_000_000_000;

/// Failure of an absolute-deadline sleep
#[derive(Error, Debug)]
pub enum SleepError {
    /// A signal arrived before the deadline; the same deadline should be retried
    #[error("sleep interrupted")]
    Interrupted,

    #[error("clock_nanosleep failed: {0}")]
    Os(#[source] std::io::Error),
}

/// Clock used by the vsync loop
///
/// Implementations must be monotonic and immune to wall-clock adjustments.
pub trait Clock: Send + Sync + 'static {
    /// Current time
    fn now(&self) -> Nsecs;

    /// Block until `deadline`. Returns immediately if it already passed.
    fn sleep_until(&self, deadline: Nsecs) -> Result<(), SleepError>;
}

/// `CLOCK_MONOTONIC` backed clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

fn to_timespec(t: Nsecs) -> libc::timespec {
    let t = t.max(0);
    libc::timespec {
        tv_sec: (t / NSEC_PER_SEC) as libc::time_t,
        tv_nsec: (t % NSEC_PER_SEC) as libc::c_long,
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Nsecs {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // CLOCK_MONOTONIC cannot fail with a valid timespec pointer
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        ts.tv_sec as Nsecs * NSEC_PER_SEC + ts.tv_nsec as Nsecs
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn sleep_until(&self, deadline: Nsecs) -> Result<(), SleepError> {
        let spec = to_timespec(deadline);
        // clock_nanosleep returns the error number instead of setting errno
        let err = unsafe {
            libc::clock_nanosleep(
                libc::CLOCK_MONOTONIC,
                libc::TIMER_ABSTIME,
                &spec,
                std::ptr::null_mut(),
            )
        };
        match err {
            0 => Ok(()),
            libc::EINTR => Err(SleepError::Interrupted),
            code => Err(SleepError::Os(std::io::Error::from_raw_os_error(code))),
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn sleep_until(&self, deadline: Nsecs) -> Result<(), SleepError> {
        // No TIMER_ABSTIME here; recompute the remaining time on every call so
        // a retried sleep still targets the same instant.
        let remaining = deadline - self.now();
        if remaining > 0 {
            std::thread::sleep(std::time::Duration::from_nanos(remaining as u64));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn test_sleep_until_reaches_deadline() {
        let clock = MonotonicClock::new();
        let deadline = clock.now() + 5_000_000;
        clock.sleep_until(deadline).unwrap();
        assert!(clock.now() >= deadline);
    }

    #[test]
    fn test_sleep_until_past_deadline_returns() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        clock.sleep_until(start - NSEC_PER_SEC).unwrap();
        clock.sleep_until(-1).unwrap();
        assert!(clock.now() - start < NSEC_PER_SEC);
    }

    #[test]
    fn test_to_timespec_splits_seconds() {
        let ts = to_timespec(3 * NSEC_PER_SEC + 250);
        assert_eq!(ts.tv_sec, 3);
        assert_eq!(ts.tv_nsec, 250);
        let ts = to_timespec(-5);
        assert_eq!(ts.tv_sec, 0);
        assert_eq!(ts.tv_nsec, 0);
    }
}
