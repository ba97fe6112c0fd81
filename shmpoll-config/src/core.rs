//! Core multiplexing parameters.
//!
//! Manages the properties that shape the registry and the wait engine:
//! - Instance table sizing
//! - Polling cadence for shared-memory descriptors

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Instance table configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TableConfig {
    /// Number of addressable instance handles. Handles at or above this value
    /// are rejected as exhausted.
    #[serde(default = "default_capacity")]
    #[validate(range(min = 16, max = 65536))]
    pub capacity: usize,

    /// Capacity reserved for overflow entries when an instance outgrows its inline slot.
    #[serde(default = "default_overflow_capacity")]
    #[validate(range(min = 1, max = 4096))]
    pub initial_overflow_capacity: usize,
}

fn default_capacity() -> usize {
    1024
}

fn default_overflow_capacity() -> usize {
    8
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            initial_overflow_capacity: default_overflow_capacity(),
        }
    }
}

/// Wait engine configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct WaitConfig {
    /// Sleep between shared-memory passes once spin backoff is exhausted (microseconds).
    #[serde(default = "default_poll_interval")]
    #[validate(range(min = 1, max = 100_000))]
    pub poll_interval_us: u64,

    /// Longest single kernel wait issued by the background side of a mixed wait (milliseconds).
    #[serde(default = "default_kernel_slice")]
    #[validate(range(min = 1, max = 1000))]
    pub kernel_slice_ms: u32,
}

fn default_poll_interval() -> u64 {
    50
}

fn default_kernel_slice() -> u32 {
    5
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: default_poll_interval(),
            kernel_slice_ms: default_kernel_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TableConfig::default().validate().unwrap();
        WaitConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_slice_is_rejected() {
        let config = WaitConfig {
            kernel_slice_ms: 0,
            ..WaitConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
