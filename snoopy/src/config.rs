//! Validated runtime settings.
//!
//! [`SnoopyConfig`] is built once from the command line and checked before
//! the probe is loaded, so a bad value never reaches the kernel side.

use std::time::Duration;

use snoopy_common::CONFIG_LIMIT;

use crate::error::ConfigError;
use crate::format::OutputFormat;

pub const DEFAULT_MAX_ARGS: i64 = 16;
pub const DEFAULT_MAX_ENVS: i64 = 16;
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// What the consumer does with events still queued when shutdown is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Return immediately, queued events are dropped.
    #[default]
    Drop,
    /// Keep writing already-queued events until the queue is empty or the
    /// timeout elapses.
    Flush { timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoopyConfig {
    pub max_args: u32,
    pub max_envs: u32,
    pub queue_capacity: usize,
    pub shutdown: ShutdownPolicy,
    pub format: OutputFormat,
}

impl SnoopyConfig {
    /// Validate the producer bounds. Both must be within `0..=128`.
    pub fn new(max_args: i64, max_envs: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            max_args: bound("max-args", max_args)?,
            max_envs: bound("max-envs", max_envs)?,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown: ShutdownPolicy::default(),
            format: OutputFormat::default(),
        })
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        self.queue_capacity = capacity;
        Ok(self)
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownPolicy) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Environment blocks are only rendered when the producer captures them.
    pub fn print_env(&self) -> bool {
        self.max_envs > 0
    }
}

impl Default for SnoopyConfig {
    fn default() -> Self {
        Self {
            max_args: DEFAULT_MAX_ARGS as u32,
            max_envs: DEFAULT_MAX_ENVS as u32,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown: ShutdownPolicy::default(),
            format: OutputFormat::default(),
        }
    }
}

fn bound(name: &'static str, value: i64) -> Result<u32, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Negative { name, value });
    }
    if value > CONFIG_LIMIT as i64 {
        return Err(ConfigError::TooLarge { name, value });
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_print_env() {
        let config = SnoopyConfig::default();
        assert_eq!((config.max_args, config.max_envs), (16, 16));
        assert_eq!(config.queue_capacity, 128);
        assert_eq!(config.shutdown, ShutdownPolicy::Drop);
        assert!(config.print_env());
    }

    #[test]
    fn accepts_bounds_inclusive() {
        let config = SnoopyConfig::new(0, 128).unwrap();
        assert_eq!((config.max_args, config.max_envs), (0, 128));
    }

    #[test]
    fn zero_envs_disables_print_env() {
        assert!(!SnoopyConfig::new(16, 0).unwrap().print_env());
    }

    #[test]
    fn rejects_negative() {
        assert_eq!(
            SnoopyConfig::new(-1, 16).unwrap_err(),
            ConfigError::Negative {
                name: "max-args",
                value: -1
            }
        );
    }

    #[test]
    fn rejects_above_limit() {
        let err = SnoopyConfig::new(16, 129).unwrap_err();
        assert_eq!(
            err,
            ConfigError::TooLarge {
                name: "max-envs",
                value: 129
            }
        );
        assert!(err.to_string().contains("at most 128"));
    }

    #[test]
    fn rejects_zero_queue() {
        let err = SnoopyConfig::default().with_queue_capacity(0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroQueue);
    }
}
