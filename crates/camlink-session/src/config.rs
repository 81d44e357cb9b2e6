use std::path::Path;
use std::time::Duration;

use camlink_frame::DEFAULT_MAX_PAYLOAD;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::kind::ChannelKind;

/// Service name a host advertises for the mirroring channel.
pub const DEFAULT_MIRRORING_SERVICE: &str = "camlink-mirror";
/// Service name a host advertises for the remote channel.
pub const DEFAULT_REMOTE_SERVICE: &str = "camlink-remote";

/// Session tuning.
///
/// Durations are (de)serialized as integer milliseconds:
///
/// ```json
/// { "heartbeat_interval_ms": 1000, "heartbeat_timeout_ms": 5000 }
/// ```
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// How often each channel sends a heartbeat.
    #[serde(rename = "heartbeat_interval_ms", with = "millis")]
    pub heartbeat_interval: Duration,
    /// Silence after which a channel is declared lost. Must exceed the interval.
    #[serde(rename = "heartbeat_timeout_ms", with = "millis")]
    pub heartbeat_timeout: Duration,
    /// Upper bound on a single connect attempt, including a host waiting for
    /// its peer to attach again.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    /// Largest payload accepted or sent on a channel.
    pub max_payload_size: usize,
    /// Queue depth of each per-kind subscription.
    pub handler_buffer: usize,
    /// Service name selecting the mirroring channel.
    pub mirroring_service: String,
    /// Service name selecting the remote channel.
    pub remote_service: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            handler_buffer: 64,
            mirroring_service: DEFAULT_MIRRORING_SERVICE.to_string(),
            remote_service: DEFAULT_REMOTE_SERVICE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Check that the values can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval must be non-zero"));
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(invalid(format!(
                "heartbeat_timeout ({:?}) must exceed heartbeat_interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout must be non-zero"));
        }
        if self.max_payload_size == 0 {
            return Err(invalid("max_payload_size must be non-zero"));
        }
        if self.handler_buffer == 0 {
            return Err(invalid("handler_buffer must be non-zero"));
        }
        if self.mirroring_service.is_empty() || self.remote_service.is_empty() {
            return Err(invalid("service names must be non-empty"));
        }
        if self.mirroring_service == self.remote_service {
            return Err(invalid(format!(
                "mirroring and remote services must differ (both '{}')",
                self.mirroring_service
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Service name used to open or advertise `channel`.
    pub fn service_for(&self, channel: ChannelKind) -> &str {
        match channel {
            ChannelKind::Mirroring => &self.mirroring_service,
            ChannelKind::Remote => &self.remote_service,
        }
    }

    /// Channel selected by an inbound link's service name.
    pub fn channel_for_service(&self, service: &str) -> Option<ChannelKind> {
        ChannelKind::ALL
            .into_iter()
            .find(|channel| self.service_for(*channel) == service)
    }
}

fn invalid(message: impl Into<String>) -> SessionError {
    SessionError::InvalidConfig(message.into())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn timeout_must_exceed_interval() {
        let config = SessionConfig {
            heartbeat_interval: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn services_must_differ() {
        let config = SessionConfig {
            remote_service: DEFAULT_MIRRORING_SERVICE.to_string(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_uses_milliseconds_and_defaults() {
        let config =
            SessionConfig::from_json(r#"{"heartbeat_interval_ms": 250, "heartbeat_timeout_ms": 900}"#)
                .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.heartbeat_timeout, Duration::from_millis(900));
        assert_eq!(config.handler_buffer, 64);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["connect_timeout_ms"], 10_000);
    }

    #[test]
    fn json_rejects_invalid_values_and_unknown_fields() {
        assert!(matches!(
            SessionConfig::from_json(r#"{"heartbeat_timeout_ms": 10}"#),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"heartbeat": 1}"#),
            Err(SessionError::Json(_))
        ));
    }

    #[test]
    fn service_lookup_round_trips() {
        let config = SessionConfig::default();
        for channel in ChannelKind::ALL {
            let service = config.service_for(channel).to_string();
            assert_eq!(config.channel_for_service(&service), Some(channel));
        }
        assert_eq!(config.channel_for_service("camlink-other"), None);
    }
}
