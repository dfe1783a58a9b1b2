//! Transport configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the broadcast transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How often each subscription drains newly received envelopes
    /// Default: 1 second
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Envelope time-to-live (seconds)
    /// Default: 60
    pub ttl_secs: u32,

    /// Proof-of-work target requested for outbound envelopes
    /// Default: 2.0
    pub pow_target: f64,

    /// Time budget for computing proof of work (seconds)
    /// Default: 5
    pub pow_time_secs: u32,

    /// Capacity of the inbound packet channel feeding the sync engine
    /// Default: 256
    pub inbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            ttl_secs: 60,
            pow_target: 2.0,
            pow_time_secs: 5,
            inbound_capacity: 256,
        }
    }
}

impl TransportConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the envelope time-to-live
    pub fn with_ttl(mut self, secs: u32) -> Self {
        self.ttl_secs = secs;
        self
    }

    /// Set the proof-of-work parameters
    pub fn with_pow(mut self, target: f64, time_secs: u32) -> Self {
        self.pow_target = target;
        self.pow_time_secs = time_secs;
        self
    }

    /// Set the inbound packet channel capacity
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Configuration for testing (fast polling, no proof of work)
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            ttl_secs: 60,
            pow_target: 0.0,
            pow_time_secs: 0,
            inbound_capacity: 64,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.ttl_secs, 60);
        assert_eq!(config.pow_target, 2.0);
        assert_eq!(config.pow_time_secs, 5);
    }

    #[test]
    fn test_builder() {
        let config = TransportConfig::new()
            .with_poll_interval(Duration::from_millis(250))
            .with_ttl(10)
            .with_pow(1.0, 2)
            .with_inbound_capacity(8);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.ttl_secs, 10);
        assert_eq!(config.pow_target, 1.0);
        assert_eq!(config.inbound_capacity, 8);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"poll_interval": 500, "ttl_secs": 30}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.ttl_secs, 30);
        assert_eq!(config.inbound_capacity, 256);
    }
}
