use crate::error::{PianobarError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default port of the pianobar WebSocket bridge
pub const DEFAULT_PORT: u16 = 8080;

/// Coordinator configuration
///
/// Durations are expressed in (fractional) seconds when deserialised, so a
/// host application can feed this straight from its own config entry:
///
/// ```
/// use pianobar_remote::CoordinatorConfig;
///
/// let config: CoordinatorConfig =
///     serde_json::from_str(r#"{"host": "10.0.0.5", "port": 3000, "reconnectMaxDelay": 60}"#)
///         .unwrap();
/// assert_eq!(config.port, 3000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,

    /// Maximum time for the WebSocket handshake
    #[serde(with = "secs")]
    pub connect_timeout: Duration,

    /// Maximum time a command may wait for room in the outbound queue
    #[serde(with = "secs")]
    pub send_timeout: Duration,

    /// Maximum time to wait for the reply to a query command
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    #[serde(with = "secs")]
    pub reconnect_base_delay: Duration,

    #[serde(with = "secs")]
    pub reconnect_max_delay: Duration,

    /// Random spread applied to each reconnect delay, as a fraction of it
    pub reconnect_jitter: f64,

    /// Calibration constant K of the perceptual volume curve
    pub volume_calibration: f64,

    pub volume_min_db: f64,

    /// Upper gain bound until the server reports its own `maxGain`
    pub volume_max_db: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(300),
            reconnect_jitter: 0.1,
            volume_calibration: 20.0,
            volume_min_db: -40.0,
            volume_max_db: 10.0,
        }
    }
}

impl CoordinatorConfig {
    /// Configuration for a bridge at `host:port` with default timings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the reconnect backoff window
    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    /// Set the reconnect jitter fraction (0 disables jitter)
    pub fn with_reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    pub fn with_volume_calibration(mut self, k: f64) -> Self {
        self.volume_calibration = k;
        self
    }

    /// WebSocket URL of the bridge
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}/socket.io", self.host, self.port)
    }

    /// Check the configuration for values the coordinator cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PianobarError::InvalidConfig(msg.to_string()));

        if self.host.trim().is_empty() {
            return invalid("host must not be empty");
        }
        if self.port == 0 {
            return invalid("port must not be 0");
        }
        if self.connect_timeout.is_zero()
            || self.send_timeout.is_zero()
            || self.request_timeout.is_zero()
        {
            return invalid("timeouts must be greater than zero");
        }
        if self.reconnect_base_delay > self.reconnect_max_delay {
            return invalid("reconnect base delay exceeds max delay");
        }
        if !(0.0..=1.0).contains(&self.reconnect_jitter) {
            return invalid("reconnect jitter must be within [0, 1]");
        }
        if !(self.volume_calibration.is_finite() && self.volume_calibration > 0.0) {
            return invalid("volume calibration must be a positive number");
        }
        if !(self.volume_min_db.is_finite()
            && self.volume_max_db.is_finite()
            && self.volume_min_db < self.volume_max_db)
        {
            return invalid("volume dB range is empty");
        }
        Ok(())
    }
}

/// Duration as fractional seconds
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
