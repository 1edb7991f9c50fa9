//! Core configuration.

use std::time::Duration;

use adsp_errors::{AdspError, Result};
use adsp_pipeline::PipelineConfig;
use adsp_recovery::RecoveryConfig;
use serde::{Deserialize, Serialize};

/// Timeouts, quanta and capacity for one [`AudioCore`](crate::AudioCore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Bound for every lifecycle and control wait.
    pub op_timeout: Duration,
    /// Bound for next-track waiting on the drained block.
    pub drain_timeout: Duration,
    /// Bound for repair confirmation. Expiry is fatal.
    pub repair_timeout: Duration,
    /// Power the DSP off when the last vote is released.
    pub auto_power_off: bool,
    /// Minimum poll quantum for pipeline workers.
    pub pipeline_poll_interval: Duration,
    /// Capture back-off after an overrun.
    pub overrun_backoff: Duration,
    /// Registry capacity.
    pub max_sessions: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(1500),
            drain_timeout: Duration::from_secs(5),
            repair_timeout: Duration::from_secs(10),
            auto_power_off: true,
            pipeline_poll_interval: Duration::from_millis(1),
            overrun_backoff: Duration::from_millis(2),
            max_sessions: 64,
        }
    }
}

impl CoreConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a timeout, quantum or the capacity
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("op_timeout", self.op_timeout),
            ("drain_timeout", self.drain_timeout),
            ("repair_timeout", self.repair_timeout),
            ("pipeline_poll_interval", self.pipeline_poll_interval),
            ("overrun_backoff", self.overrun_backoff),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(AdspError::config(format!("{name} must be greater than 0")));
            }
        }
        if self.max_sessions == 0 {
            return Err(AdspError::config("max_sessions must be greater than 0"));
        }
        Ok(())
    }

    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            repair_timeout: self.repair_timeout,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: self.pipeline_poll_interval,
            overrun_backoff: self.overrun_backoff,
        }
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    #[must_use]
    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.config.op_timeout = timeout;
        self
    }

    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn repair_timeout(mut self, timeout: Duration) -> Self {
        self.config.repair_timeout = timeout;
        self
    }

    #[must_use]
    pub fn auto_power_off(mut self, enabled: bool) -> Self {
        self.config.auto_power_off = enabled;
        self
    }

    #[must_use]
    pub fn pipeline_poll_interval(mut self, interval: Duration) -> Self {
        self.config.pipeline_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn overrun_backoff(mut self, backoff: Duration) -> Self {
        self.config.overrun_backoff = backoff;
        self
    }

    #[must_use]
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Build and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<CoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let result = CoreConfig::builder().op_timeout(Duration::ZERO).build();
        match result {
            Err(AdspError::Config(msg)) => assert!(msg.contains("op_timeout")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_capacity_rejected() {
        let result = CoreConfig::builder().max_sessions(0).build();
        assert!(matches!(result, Err(AdspError::Config(_))));
    }

    #[test]
    fn derived_configs_follow_core_values() {
        let config = CoreConfig::builder()
            .repair_timeout(Duration::from_secs(3))
            .pipeline_poll_interval(Duration::from_micros(500))
            .build();
        let Ok(config) = config else {
            panic!("valid builder rejected");
        };
        assert_eq!(config.recovery_config().repair_timeout, Duration::from_secs(3));
        assert_eq!(
            config.pipeline_config().poll_interval,
            Duration::from_micros(500)
        );
    }

    #[test]
    fn partial_json_fills_defaults() -> std::result::Result<(), serde_json::Error> {
        let config: CoreConfig = serde_json::from_str(r#"{"max_sessions": 8, "auto_power_off": false}"#)?;
        assert_eq!(config.max_sessions, 8);
        assert!(!config.auto_power_off);
        assert_eq!(config.op_timeout, Duration::from_millis(1500));
        Ok(())
    }
}
