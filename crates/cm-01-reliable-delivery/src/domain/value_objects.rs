//! Engine configuration.

use crate::domain::errors::DeliveryError;
use std::time::Duration;

/// Default interval between resends of an unacknowledged event.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(30);

/// Default age after which an unacknowledged event is declared lost.
pub const DEFAULT_MAX_EVENT_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing parameters of the reliable delivery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Minimum time between two sends of the same event.
    /// The background cycle runs every half of this interval.
    pub retransmit_interval: Duration,
    /// Age (since first hand-over) at which an event is given up on.
    pub max_age: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            max_age: DEFAULT_MAX_EVENT_AGE,
        }
    }
}

impl DeliveryConfig {
    /// Config with short timings for tests.
    pub fn for_testing() -> Self {
        Self {
            retransmit_interval: Duration::from_millis(100),
            max_age: Duration::from_secs(5),
        }
    }

    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.retransmit_interval < Duration::from_millis(2) {
            return Err(DeliveryError::InvalidConfig(
                "retransmit_interval must be at least 2ms".into(),
            ));
        }
        if self.max_age <= self.retransmit_interval {
            return Err(DeliveryError::InvalidConfig(format!(
                "max_age ({:?}) must exceed retransmit_interval ({:?})",
                self.max_age, self.retransmit_interval
            )));
        }
        Ok(())
    }

    /// Period of the background retransmit cycle.
    pub fn tick_period(&self) -> Duration {
        self.retransmit_interval / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DeliveryConfig::default().validate().is_ok());
        assert!(DeliveryConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_timings() {
        let config = DeliveryConfig {
            retransmit_interval: Duration::from_secs(10),
            max_age: Duration::from_secs(10),
        };
        assert!(config.validate().is_err());

        let config = DeliveryConfig {
            retransmit_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_is_half_interval() {
        let config = DeliveryConfig::for_testing();
        assert_eq!(config.tick_period(), Duration::from_millis(50));
    }
}
