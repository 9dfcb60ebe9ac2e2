use crate::backoff::ReconnectConfig;
use crate::transport::TransportMode;
use serde::Deserialize;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub live: LiveSettings,
}

/// Where the Scribe device lives.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// Base URL of the device web interface.
    #[serde(default = "default_device_url")]
    pub url: String,

    /// Timeout for plain (non-streaming) requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Route of the device's event stream.
    #[serde(default = "default_events_path")]
    pub events_path: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            url: default_device_url(),
            request_timeout_ms: default_request_timeout(),
            events_path: default_events_path(),
        }
    }
}

/// Live update transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveSettings {
    #[serde(default)]
    pub transport: TransportMode,

    /// First reconnect delay after the stream drops.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Reconnect delay cap.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Overrides the interval advertised by the device.
    #[serde(default)]
    pub polling_interval_ms: Option<u64>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            polling_interval_ms: None,
        }
    }
}

impl AppConfig {
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(self.live.initial_backoff_ms),
            max_delay: Duration::from_millis(self.live.max_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.device.request_timeout_ms)
    }
}

// --- Defaults ---

fn default_device_url() -> String {
    "http://scribe.local".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_events_path() -> String {
    crate::device::DEFAULT_EVENTS_PATH.to_string()
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30000
}
