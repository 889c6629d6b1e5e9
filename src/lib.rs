//! Android hwcomposer shim with emulated vsync
//!
//! Boards without a usable hardware vsync interrupt still need SurfaceFlinger
//! to receive a steady vsync signal. This crate provides the composer device
//! for such boards: layer composition is handed to the GPU (video overlay
//! buffers are only tagged for the overlay path), and vsync is produced by a
//! background thread that ticks on a fixed grid of the monotonic clock.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Display host (SurfaceFlinger)         │
//! └──────────────────────────────────────────────┘
//!      │ prepare/set        │ event_control   ▲ vsync(ts)
//!      ▼                    ▼                 │
//! ┌──────────────┐   ┌────────────────────────────────┐
//! │  HwcDevice   │──▶│  VsyncEmulator (worker thread) │
//! │  (composer)  │   │  condvar gate ▸ abs. sleep     │
//! └──────────────┘   └────────────────────────────────┘
//!      │ eglSwapBuffers             │ clock_nanosleep
//!      ▼                            ▼
//!    libEGL                  CLOCK_MONOTONIC
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use hwc_vsync::{VsyncConfig, VsyncEmulator};
//!
//! let mut vsync = VsyncEmulator::new(VsyncConfig::from_env()?)?;
//! vsync.register_callback(|ts| println!("vsync at {ts}"))?;
//! vsync.start()?;
//! vsync.set_enabled(true);
//! # Ok::<(), hwc_vsync::Error>(())
//! ```

pub mod c_api;
pub mod clock;
pub mod composer;
pub mod config;
pub mod egl;
pub mod error;
pub mod timing;
pub mod vsync;

pub use clock::{Clock, MonotonicClock, Nsecs};
pub use composer::HwcDevice;
pub use config::VsyncConfig;
pub use error::Error;
pub use vsync::{VsyncCallback, VsyncControl, VsyncEmulator};

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;
