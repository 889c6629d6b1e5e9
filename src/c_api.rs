//! C API for hosts that drive the vsync emulator over FFI
//!
//! ```c
//! struct hwc_vsync *v = hwc_vsync_create(0, 0);
//! hwc_vsync_set_callback(v, on_vsync, user_data);
//! hwc_vsync_set_enabled(v, true);
//! ...
//! hwc_vsync_destroy(v);
//! ```

use crate::config::VsyncConfig;
use crate::vsync::VsyncEmulator;
use std::ffi::{c_int, c_void};
use std::ptr;
use tracing::{error, warn};

/// Tick callback: `user_data` as passed at registration, timestamp in ns
pub type HwcVsyncCallback = Option<unsafe extern "C" fn(user_data: *mut c_void, timestamp_ns: i64)>;

/// Opaque emulator handle
pub struct HwcVsync {
    inner: VsyncEmulator,
}

/// Opaque user pointer handed back to C on the vsync thread
struct UserData(*mut c_void);

// The host guarantees user_data stays valid and thread-safe for the emulator's lifetime
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

/// Create and start an emulator.
///
/// `period_ns <= 0` selects the default 60Hz period. Returns null on failure.
#[no_mangle]
pub extern "C" fn hwc_vsync_create(period_ns: i64, startup_delay_ms: u32) -> *mut HwcVsync {
    let mut config = VsyncConfig::default();
    if let Err(e) = config.apply_env() {
        warn!("ignoring vsync environment overrides: {}", e);
        config = VsyncConfig::default();
    }
    if period_ns > 0 {
        config.period_ns = period_ns;
    }
    config.startup_delay_ms = u64::from(startup_delay_ms);

    let mut inner = match VsyncEmulator::new(config) {
        Ok(inner) => inner,
        Err(e) => {
            error!("hwc_vsync_create: {}", e);
            return ptr::null_mut();
        }
    };
    if let Err(e) = inner.start() {
        error!("failed to start vsync thread: {}", e);
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(HwcVsync { inner }))
}

/// Install the tick callback. Returns 0, -EINVAL or -EBUSY if one is already set.
///
/// # Safety
/// `ctx` must come from [`hwc_vsync_create`] and not be destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn hwc_vsync_set_callback(
    ctx: *mut HwcVsync,
    callback: HwcVsyncCallback,
    user_data: *mut c_void,
) -> c_int {
    let (Some(ctx), Some(callback)) = (ctx.as_ref(), callback) else {
        return -libc::EINVAL;
    };
    let user_data = UserData(user_data);
    let result = ctx.inner.register_callback(move |ts| {
        let user_data = &user_data;
        unsafe { callback(user_data.0, ts) }
    });
    match result {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

/// Enable or disable tick delivery. Returns 0 or -EINVAL.
///
/// # Safety
/// `ctx` must come from [`hwc_vsync_create`] and not be destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn hwc_vsync_set_enabled(ctx: *mut HwcVsync, enabled: bool) -> c_int {
    let Some(ctx) = ctx.as_ref() else {
        return -libc::EINVAL;
    };
    ctx.inner.set_enabled(enabled);
    0
}

/// Stop the vsync thread and free the handle. Null is ignored.
///
/// # Safety
/// `ctx` must come from [`hwc_vsync_create`]; it is invalid afterwards.
/// Must not be called from inside the vsync callback.
#[no_mangle]
pub unsafe extern "C" fn hwc_vsync_destroy(ctx: *mut HwcVsync) {
    if ctx.is_null() {
        return;
    }
    let mut ctx = Box::from_raw(ctx);
    if let Err(e) = ctx.inner.shutdown() {
        warn!("vsync shutdown: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct Counter {
        calls: AtomicUsize,
        last: AtomicI64,
    }

    unsafe extern "C" fn on_vsync(user_data: *mut c_void, timestamp_ns: i64) {
        let counter = &*(user_data as *const Counter);
        counter.last.store(timestamp_ns, Ordering::SeqCst);
        counter.calls.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_null_handles_are_rejected() {
        unsafe {
            assert_eq!(hwc_vsync_set_enabled(ptr::null_mut(), true), -libc::EINVAL);
            assert_eq!(
                hwc_vsync_set_callback(ptr::null_mut(), Some(on_vsync), ptr::null_mut()),
                -libc::EINVAL
            );
            hwc_vsync_destroy(ptr::null_mut());
        }
    }

    #[test]
    fn test_callback_receives_ticks() {
        let counter = Box::new(Counter {
            calls: AtomicUsize::new(0),
            last: AtomicI64::new(0),
        });
        let user_data = &*counter as *const Counter as *mut c_void;

        unsafe {
            let ctx = hwc_vsync_create(5_000_000, 0);
            assert!(!ctx.is_null());
            assert_eq!(hwc_vsync_set_callback(ctx, None, user_data), -libc::EINVAL);
            assert_eq!(hwc_vsync_set_callback(ctx, Some(on_vsync), user_data), 0);
            assert_eq!(
                hwc_vsync_set_callback(ctx, Some(on_vsync), user_data),
                -libc::EBUSY
            );
            assert_eq!(hwc_vsync_set_enabled(ctx, true), 0);

            let deadline = Instant::now() + Duration::from_secs(2);
            while counter.calls.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            hwc_vsync_destroy(ctx);
        }

        assert!(counter.calls.load(Ordering::SeqCst) >= 3);
        assert!(counter.last.load(Ordering::SeqCst) > 0);
    }
}
