//! Vsync emulator configuration
//!
//! Values come from built-in defaults, optionally overridden by a TOML file
//! and then by environment variables:
//! - `HWC_VSYNC_REFRESH_HZ`: refresh rate, converted to a period
//! - `HWC_VSYNC_PERIOD_NS`: period in nanoseconds (wins over the refresh rate)
//! - `HWC_VSYNC_STARTUP_DELAY_MS`: warm-up delay before the first tick

use crate::clock::Nsecs;
use crate::timing::{period_from_refresh_hz, DEFAULT_PERIOD_NS};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// `HAL_PRIORITY_URGENT_DISPLAY - 1`
pub const DEFAULT_PRIORITY: i32 = -9;

pub const DEFAULT_STARTUP_DELAY_MS: u64 = 2000;

const ENV_PERIOD_NS: &str = "HWC_VSYNC_PERIOD_NS";
const ENV_REFRESH_HZ: &str = "HWC_VSYNC_REFRESH_HZ";
const ENV_STARTUP_DELAY_MS: &str = "HWC_VSYNC_STARTUP_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VsyncConfig {
    /// Interval between ticks
    pub period_ns: Nsecs,
    /// Delay before the worker starts ticking, modelling display warm-up
    pub startup_delay_ms: u64,
    /// Name given to the worker thread
    pub thread_name: String,
    /// Nice value applied to the worker thread, `None` leaves it unchanged
    pub priority: Option<i32>,
}

impl Default for VsyncConfig {
    fn default() -> Self {
        Self {
            period_ns: DEFAULT_PERIOD_NS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            thread_name: "hwc-vsync".to_string(),
            priority: Some(DEFAULT_PRIORITY),
        }
    }
}

impl VsyncConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading vsync config from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hz) = lookup(ENV_REFRESH_HZ) {
            let parsed: f64 = hz.trim().parse().map_err(|_| {
                Error::Config(format!("{}={:?} is not a number", ENV_REFRESH_HZ, hz))
            })?;
            self.period_ns = period_from_refresh_hz(parsed).ok_or_else(|| {
                Error::Config(format!("{}={} is out of range", ENV_REFRESH_HZ, parsed))
            })?;
        }

        if let Some(ns) = lookup(ENV_PERIOD_NS) {
            self.period_ns = ns.trim().parse().map_err(|_| {
                Error::Config(format!("{}={:?} is not an integer", ENV_PERIOD_NS, ns))
            })?;
        }

        if let Some(ms) = lookup(ENV_STARTUP_DELAY_MS) {
            self.startup_delay_ms = ms.trim().parse().map_err(|_| {
                Error::Config(format!("{}={:?} is not an integer", ENV_STARTUP_DELAY_MS, ms))
            })?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_ns <= 0 {
            return Err(Error::Config(format!(
                "period_ns must be positive, got {}",
                self.period_ns
            )));
        }
        if self.thread_name.contains('\0') {
            return Err(Error::Config("thread_name contains a NUL byte".to_string()));
        }
        Ok(())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Nominal refresh rate in Hz
    pub fn refresh_rate(&self) -> f64 {
        1e9 / self.period_ns as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = VsyncConfig::default();
        assert_eq!(config.period_ns, 16_666_666);
        assert_eq!(config.startup_delay(), Duration::from_secs(2));
        assert_eq!(config.priority, Some(-9));
        assert!((config.refresh_rate() - 60.0).abs() < 0.001);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_partial_override() {
        let config = VsyncConfig::from_toml_str(
            r#"
            period_ns = 20000000
            thread_name = "vsync-50hz"
            "#,
        )
        .unwrap();
        assert_eq!(config.period_ns, 20_000_000);
        assert_eq!(config.thread_name, "vsync-50hz");
        assert_eq!(config.startup_delay_ms, DEFAULT_STARTUP_DELAY_MS);
    }

    #[test]
    fn test_toml_rejects_bad_values() {
        assert!(matches!(
            VsyncConfig::from_toml_str("period_ns = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            VsyncConfig::from_toml_str("refresh = 60"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = VsyncConfig::default();
        config
            .apply_vars(lookup(&[
                (ENV_REFRESH_HZ, "50"),
                (ENV_STARTUP_DELAY_MS, "0"),
            ]))
            .unwrap();
        assert_eq!(config.period_ns, 20_000_000);
        assert_eq!(config.startup_delay_ms, 0);

        // An explicit period wins over the refresh rate
        config
            .apply_vars(lookup(&[(ENV_REFRESH_HZ, "60"), (ENV_PERIOD_NS, "8333333")]))
            .unwrap();
        assert_eq!(config.period_ns, 8_333_333);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = VsyncConfig::default();
        assert!(config.apply_vars(lookup(&[(ENV_PERIOD_NS, "fast")])).is_err());
        assert!(config.apply_vars(lookup(&[(ENV_PERIOD_NS, "-5")])).is_err());
        assert!(config.apply_vars(lookup(&[(ENV_REFRESH_HZ, "0")])).is_err());
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("hwc-vsync-{}.toml", std::process::id()));
        std::fs::write(&path, "startup_delay_ms = 250\npriority = -4\n").unwrap();
        let config = VsyncConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.startup_delay_ms, 250);
        assert_eq!(config.priority, Some(-4));

        assert!(matches!(
            VsyncConfig::load("/nonexistent/hwc-vsync.toml"),
            Err(Error::Io(_))
        ));
    }
}
