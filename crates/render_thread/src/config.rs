use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderThreadConfig {
    /// Command slots in the ring. A full ring blocks the producer.
    pub command_capacity: usize,
    /// Upper bound on one idle wait before housekeeping runs again.
    pub idle_wait_millis: u64,
    pub max_idle_tick_hz: f64,
    pub suspend_poll_micros: u64,
    pub thread_name: String,
}

impl Default for RenderThreadConfig {
    fn default() -> Self {
        Self {
            command_capacity: 4096,
            idle_wait_millis: 16,
            max_idle_tick_hz: 40.0,
            suspend_poll_micros: 1000,
            thread_name: "render_thread".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderThreadConfigError {
    #[error("command capacity must be greater than zero")]
    CommandCapacityZero,
    #[error("idle wait must be greater than zero")]
    IdleWaitZero,
    #[error("idle tick rate must be finite and positive")]
    IdleTickRateInvalid,
    #[error("suspend poll interval must be greater than zero")]
    SuspendPollZero,
    #[error("thread name must not be empty")]
    ThreadNameEmpty,
}

impl RenderThreadConfig {
    pub fn validate(&self) -> Result<(), RenderThreadConfigError> {
        if self.command_capacity == 0 {
            return Err(RenderThreadConfigError::CommandCapacityZero);
        }
        if self.idle_wait_millis == 0 {
            return Err(RenderThreadConfigError::IdleWaitZero);
        }
        if !self.max_idle_tick_hz.is_finite() || self.max_idle_tick_hz <= 0.0 {
            return Err(RenderThreadConfigError::IdleTickRateInvalid);
        }
        if self.suspend_poll_micros == 0 {
            return Err(RenderThreadConfigError::SuspendPollZero);
        }
        if self.thread_name.is_empty() {
            return Err(RenderThreadConfigError::ThreadNameEmpty);
        }
        Ok(())
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_millis)
    }

    pub fn suspend_poll(&self) -> Duration {
        Duration::from_micros(self.suspend_poll_micros)
    }

    pub fn min_idle_tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_idle_tick_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RenderThreadConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.idle_wait(), Duration::from_millis(16));
        assert_eq!(config.min_idle_tick_interval(), Duration::from_millis(25));
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let zero_capacity = RenderThreadConfig {
            command_capacity: 0,
            ..RenderThreadConfig::default()
        };
        assert_eq!(
            zero_capacity.validate(),
            Err(RenderThreadConfigError::CommandCapacityZero)
        );

        let bad_rate = RenderThreadConfig {
            max_idle_tick_hz: f64::NAN,
            ..RenderThreadConfig::default()
        };
        assert_eq!(
            bad_rate.validate(),
            Err(RenderThreadConfigError::IdleTickRateInvalid)
        );

        let no_name = RenderThreadConfig {
            thread_name: String::new(),
            ..RenderThreadConfig::default()
        };
        assert_eq!(no_name.validate(), Err(RenderThreadConfigError::ThreadNameEmpty));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RenderThreadConfig =
            serde_json::from_str(r#"{ "command_capacity": 64, "thread_name": "gpu" }"#)
                .expect("parse config");
        assert_eq!(config.command_capacity, 64);
        assert_eq!(config.thread_name, "gpu");
        assert_eq!(config.idle_wait_millis, 16);
        assert_eq!(config.max_idle_tick_hz, 40.0);
    }
}
