//! Connection configuration

use core::time::Duration;

use crate::errors::{Result, TransportError};
use crate::protocol::MAX_PAYLOAD_SIZE;

/// Tunables for a single peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// How often a heartbeat frame is sent
    pub heartbeat_interval: Duration,
    /// Silence after which the peer is considered dead; must exceed the interval
    pub heartbeat_timeout: Duration,
    /// Capacity of the drop-oldest video frame queue
    pub video_queue_capacity: usize,
    /// Largest payload accepted or sent
    pub max_payload_size: usize,
    /// Size of each socket read
    pub read_buffer_size: usize,
    /// Upper bound on a dial attempt
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(15),
            video_queue_capacity: 5,
            max_payload_size: MAX_PAYLOAD_SIZE,
            read_buffer_size: 4096,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Short timers for loopback tests
    pub fn testing() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_video_queue_capacity(mut self, capacity: usize) -> Self {
        self.video_queue_capacity = capacity;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reject settings the connection cannot honor
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(TransportError::InvalidConfiguration {
                reason: reason.to_string(),
            })
        };

        if self.heartbeat_interval.is_zero() {
            return invalid("heartbeat_interval must be non-zero");
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return invalid("heartbeat_timeout must be greater than heartbeat_interval");
        }
        if self.video_queue_capacity == 0 {
            return invalid("video_queue_capacity must be at least 1");
        }
        if self.max_payload_size == 0 || self.max_payload_size > u32::MAX as usize {
            return invalid("max_payload_size must be between 1 and u32::MAX");
        }
        if self.read_buffer_size == 0 {
            return invalid("read_buffer_size must be non-zero");
        }
        if self.connect_timeout.is_zero() {
            return invalid("connect_timeout must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConnectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.video_queue_capacity, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(15));
        assert!(ConnectionConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_timeout_must_exceed_interval() {
        let config = ConnectionConfig::default()
            .with_heartbeat(Duration::from_secs(5), Duration::from_secs(5));
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ConnectionConfig::default().with_video_queue_capacity(0);
        assert!(config.validate().is_err());
    }
}
