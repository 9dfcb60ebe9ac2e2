use crate::backoff::ReconnectConfig;
use crate::device::DeviceClient;
use crate::error::Result;
use crate::poll::PollingFallbackClient;
use crate::sink::UpdateSink;
use crate::state::ConnectionState;
use crate::stream::{HttpSseConnector, StreamClient};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Which transport to use for live updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Stream when the device serves one, poll otherwise.
    #[default]
    Auto,
    Stream,
    Polling,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "stream" | "sse" => Ok(Self::Stream),
            "polling" | "poll" => Ok(Self::Polling),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Stream => f.write_str("stream"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Settings needed to build either transport.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub mode: TransportMode,
    pub reconnect: ReconnectConfig,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
}

/// Exactly one live transport. The two are never run side by side.
pub enum LiveTransport {
    Stream(StreamClient<HttpSseConnector>),
    Polling {
        client: PollingFallbackClient,
        interval: Duration,
    },
}

impl LiveTransport {
    /// Pick a transport for `device` according to `settings.mode`.
    ///
    /// # Errors
    /// Returns `LiveError` if the events URL or an HTTP client cannot be built.
    pub async fn select(
        device: &DeviceClient,
        sink: UpdateSink,
        settings: &TransportSettings,
    ) -> Result<Self> {
        let streaming = match settings.mode {
            TransportMode::Stream => true,
            TransportMode::Polling => false,
            TransportMode::Auto => device.supports_streaming().await,
        };

        if streaming {
            let connector = HttpSseConnector::new(device.events_url()?, settings.connect_timeout)?;
            info!(url = %connector.url(), "using event stream transport");
            Ok(Self::Stream(StreamClient::new(
                Arc::new(connector),
                sink,
                settings.reconnect.clone(),
            )))
        } else {
            info!("using polling fallback transport");
            Ok(Self::Polling {
                client: PollingFallbackClient::new(device.clone(), sink),
                interval: settings.poll_interval,
            })
        }
    }

    pub fn start(&self) {
        match self {
            Self::Stream(client) => client.start(),
            Self::Polling { client, interval } => client.start(*interval),
        }
    }

    pub fn stop(&self) {
        match self {
            Self::Stream(client) => client.stop(),
            Self::Polling { client, .. } => client.stop(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Stream(client) => client.state(),
            Self::Polling { client, .. } => client.state(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}
