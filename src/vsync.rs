//! Emulated hardware vsync
//!
//! A single worker thread produces vsync ticks on a fixed grid of the
//! monotonic clock:
//!
//! ```text
//!            set_enabled(true)          set_enabled(false)
//!   Idle  ─────────────────────▶ Running ─────────────────▶ Idle
//!  (condvar wait)          (compute ▸ sleep ▸ tick)
//! ```
//!
//! Each iteration picks an absolute wake instant, advances the schedule by
//! one period *before* sleeping, sleeps until that instant (retrying the same
//! deadline on `EINTR`) and then hands the wake instant to the registered
//! callback. If the loop falls behind it skips ahead to the next grid point
//! instead of replaying missed ticks. A disabled → enabled transition
//! restarts the grid at the moment the loop observes it.

use crate::clock::{Clock, MonotonicClock, Nsecs, SleepError};
use crate::config::VsyncConfig;
use crate::timing::next_wake;
use crate::{Error, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Tick handler, called on the vsync thread with the tick timestamp
pub type VsyncCallback = Arc<dyn Fn(Nsecs) + Send + Sync>;

struct State {
    enabled: bool,
    /// Set on a disabled -> enabled transition, consumed by the loop
    rearm: bool,
    shutdown: bool,
    callback: Option<VsyncCallback>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

/// Handle used by the display host to drive the emulator
///
/// Cheap to clone; every clone controls the same worker.
#[derive(Clone)]
pub struct VsyncControl {
    shared: Arc<Shared>,
}

impl VsyncControl {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    enabled: false,
                    rearm: false,
                    shutdown: false,
                    callback: None,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    // The lock never guards user code, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start or stop tick delivery
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        if enabled && !state.enabled {
            state.rearm = true;
        }
        if enabled != state.enabled {
            debug!("vsync {}", if enabled { "enabled" } else { "disabled" });
        }
        state.enabled = enabled;
        self.shared.cond.notify_all();
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Install the tick handler.
    ///
    /// The slot is write-once: a second registration is rejected and the
    /// first handler stays in place.
    pub fn register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Nsecs) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        if state.callback.is_some() {
            warn!("vsync callback already registered, ignoring new one");
            return Err(Error::CallbackAlreadyRegistered);
        }
        state.callback = Some(Arc::new(callback));
        Ok(())
    }

    pub fn has_callback(&self) -> bool {
        self.lock().callback.is_some()
    }

    /// Ask the worker to exit at its next wait boundary
    pub fn request_shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        self.shared.cond.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Callback invoked with this timestamp
    Ticked(Nsecs),
    /// Woke on time but nobody is listening yet
    NoCallback(Nsecs),
    /// Vsync got disabled while sleeping; tick discarded
    Dropped(Nsecs),
    /// The sleep failed with something other than EINTR
    SleepFailed,
    Shutdown,
}

/// The vsync loop body, owned by the worker thread
pub(crate) struct TickLoop<C: Clock> {
    control: VsyncControl,
    clock: Arc<C>,
    period: Nsecs,
    next_tick: Nsecs,
}

impl<C: Clock> TickLoop<C> {
    pub(crate) fn new(control: VsyncControl, clock: Arc<C>, period: Nsecs) -> Self {
        Self {
            control,
            clock,
            period,
            next_tick: 0,
        }
    }

    /// Run one iteration: wait for enable, sleep to the next grid point, tick.
    pub(crate) fn step(&mut self) -> Step {
        let rearm = {
            let state = self.control.lock();
            let mut state = self
                .control
                .shared
                .cond
                .wait_while(state, |s| !s.enabled && !s.shutdown)
                .unwrap_or_else(PoisonError::into_inner);
            if state.shutdown {
                return Step::Shutdown;
            }
            std::mem::take(&mut state.rearm)
        };

        let now = self.clock.now();
        if rearm && self.next_tick < now {
            debug!("vsync re-armed at {}", now);
            self.next_tick = now;
        }

        let wake = next_wake(self.next_tick, now, self.period);
        if wake != self.next_tick {
            trace!(
                "vsync missed {} tick(s), resuming at {}",
                (wake - self.next_tick) / self.period,
                wake
            );
        }
        self.next_tick = wake + self.period;

        if let Err(e) = self.sleep_until(wake) {
            warn!("vsync sleep until {} failed: {}", wake, e);
            return Step::SleepFailed;
        }

        let callback = {
            let state = self.control.lock();
            if state.shutdown {
                return Step::Shutdown;
            }
            if !state.enabled {
                trace!("vsync disabled during sleep, dropping tick {}", wake);
                // Never emitted, so a later re-arm may anchor at or after it
                self.next_tick = wake;
                return Step::Dropped(wake);
            }
            match &state.callback {
                Some(cb) => Arc::clone(cb),
                None => return Step::NoCallback(wake),
            }
        };

        trace!("vsync tick {}", wake);
        if catch_unwind(AssertUnwindSafe(|| callback(wake))).is_err() {
            error!("vsync callback panicked at tick {}", wake);
        }
        Step::Ticked(wake)
    }

    fn sleep_until(&self, deadline: Nsecs) -> std::result::Result<(), SleepError> {
        loop {
            match self.clock.sleep_until(deadline) {
                Err(SleepError::Interrupted) => continue,
                other => return other,
            }
        }
    }

    /// Worker thread body. Returns only after shutdown is requested.
    pub(crate) fn run(mut self, startup_delay: Duration, priority: Option<i32>) {
        if let Some(priority) = priority {
            apply_priority(priority);
        }

        if !startup_delay.is_zero() {
            let state = self.control.lock();
            let (state, _) = self
                .control
                .shared
                .cond
                .wait_timeout_while(state, startup_delay, |s| !s.shutdown)
                .unwrap_or_else(PoisonError::into_inner);
            if state.shutdown {
                info!("vsync thread stopped during startup delay");
                return;
            }
        }

        info!("vsync thread running, period {}ns", self.period);
        while self.step() != Step::Shutdown {}
        info!("vsync thread stopped");
    }
}

fn apply_priority(priority: i32) {
    // With who == 0 Linux applies the nice value to the calling thread only
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, priority) };
    if ret != 0 {
        warn!(
            "Failed to set vsync thread priority {}: {}",
            priority,
            std::io::Error::last_os_error()
        );
    }
}

/// Software vsync source
///
/// Created idle. [`start`](Self::start) spawns the worker, which then lives
/// for the rest of the process unless [`shutdown`](Self::shutdown) is called.
pub struct VsyncEmulator<C: Clock = MonotonicClock> {
    control: VsyncControl,
    clock: Arc<C>,
    config: VsyncConfig,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl VsyncEmulator<MonotonicClock> {
    pub fn new(config: VsyncConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }
}

impl<C: Clock> VsyncEmulator<C> {
    pub fn with_clock(config: VsyncConfig, clock: Arc<C>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            control: VsyncControl::new(),
            clock,
            config,
            worker: None,
            started: false,
        })
    }

    pub fn control(&self) -> VsyncControl {
        self.control.clone()
    }

    pub fn config(&self) -> &VsyncConfig {
        &self.config
    }

    pub fn period(&self) -> Nsecs {
        self.config.period_ns
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.control.set_enabled(enabled)
    }

    pub fn register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Nsecs) + Send + Sync + 'static,
    {
        self.control.register_callback(callback)
    }

    pub(crate) fn tick_loop(&self) -> TickLoop<C> {
        TickLoop::new(
            self.control.clone(),
            Arc::clone(&self.clock),
            self.config.period_ns,
        )
    }

    /// Spawn the vsync thread. Only one worker is ever started.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }

        let tick_loop = self.tick_loop();
        let delay = self.config.startup_delay();
        let priority = self.config.priority;
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || tick_loop.run(delay, priority))
            .map_err(Error::ThreadSpawn)?;

        info!(
            "Started vsync emulation at {:.2}Hz",
            self.config.refresh_rate()
        );
        self.worker = Some(handle);
        self.started = true;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Safe to call from inside the vsync callback; the worker is then only
    /// signalled, not joined.
    pub fn shutdown(&mut self) -> Result<()> {
        self.control.request_shutdown();
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        if handle.thread().id() == thread::current().id() {
            return Ok(());
        }
        handle.join().map_err(|_| Error::WorkerPanicked)
    }
}
