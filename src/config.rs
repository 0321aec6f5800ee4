//! Wheel configuration.
//!
//! Configuration only affects the ambient surface of the wheel: how
//! durations convert to ticks and how the wheel labels its trace output.
//! The wheel geometry itself (4 levels × 256 buckets) is fixed.

use std::time::Duration;

/// Default tick rate: 100 ticks per second.
pub const DEFAULT_HZ: u32 = 100;

/// Error returned when a configuration fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The tick rate was zero.
    #[error("hz must be nonzero")]
    ZeroHz,
    /// The wheel name was empty.
    #[error("name must not be empty")]
    EmptyName,
}

/// Configuration for a [`Callwheel`](crate::Callwheel).
#[derive(Debug, Clone)]
pub struct WheelConfig {
    /// Ticks per second, used by the duration-conversion wrappers.
    pub hz: u32,
    /// Label attached to trace events from this wheel.
    pub name: String,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            hz: DEFAULT_HZ,
            name: "callwheel".to_string(),
        }
    }
}

impl WheelConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick rate.
    #[must_use]
    pub fn hz(mut self, hz: u32) -> Self {
        self.hz = hz;
        self
    }

    /// Sets the wheel name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Checks the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hz == 0 {
            return Err(ConfigError::ZeroHz);
        }
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }

    /// Normalizes invalid values to safe defaults.
    pub fn normalize(&mut self) {
        if self.hz == 0 {
            self.hz = DEFAULT_HZ;
        }
        if self.name.is_empty() {
            self.name = "callwheel".to_string();
        }
    }

    /// Length of one tick at this configuration's rate.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.hz.max(1)))
    }
}
