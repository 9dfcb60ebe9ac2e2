use crate::error::{LiveError, Result};
use crate::model::DeviceConfig;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Event stream route used unless the config names another.
pub const DEFAULT_EVENTS_PATH: &str = "/events";
const DISCOVERY_PATH: &str = "/api/printer-discovery";
const CONFIG_PATH: &str = "/api/config";
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Result of a conditional discovery request.
#[derive(Debug)]
pub enum DiscoveryResponse {
    /// The device answered 304; the current list is still valid.
    NotModified,
    /// A fresh body plus the validator to present next time.
    Updated {
        etag: Option<String>,
        body: Vec<u8>,
    },
}

/// HTTP access to a Scribe device.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base: Url,
    events_path: String,
}

impl DeviceClient {
    /// # Errors
    /// Returns `LiveError::Http` if the HTTP client cannot be built.
    pub fn new(base: Url, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(http, base))
    }

    pub fn with_client(http: reqwest::Client, base: Url) -> Self {
        Self {
            http,
            base,
            events_path: DEFAULT_EVENTS_PATH.to_string(),
        }
    }

    /// Use `path` for the event stream. Older firmware serves it at
    /// `/mqtt-printers`.
    #[must_use]
    pub fn with_events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = path.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn events_url(&self) -> Result<Url> {
        self.join(&self.events_path)
    }

    pub fn discovery_url(&self) -> Result<Url> {
        self.join(DISCOVERY_PATH)
    }

    pub fn config_url(&self) -> Result<Url> {
        self.join(CONFIG_PATH)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| LiveError::InvalidUrl(format!("{}{path}: {e}", self.base)))
    }

    /// Load the device configuration used to seed the local printer.
    ///
    /// # Errors
    /// Returns `LiveError::Http` on network failure, `LiveError::UnexpectedStatus`
    /// on a non-2xx answer, or `LiveError::Json` on a malformed body.
    pub async fn fetch_config(&self) -> Result<DeviceConfig> {
        let url = self.config_url()?;
        let resp = self.http.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LiveError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }
        let body = resp.bytes().await?;
        let config = serde_json::from_slice(&body)?;
        debug!("loaded device config from {url}");
        Ok(config)
    }

    /// Conditional GET of the discovered printer list.
    ///
    /// # Errors
    /// Returns `LiveError::Http` on network failure or
    /// `LiveError::UnexpectedStatus` for anything but 200/304.
    pub async fn fetch_discovery(&self, validator: Option<&str>) -> Result<DiscoveryResponse> {
        let url = self.discovery_url()?;
        let mut req = self.http.get(url.clone());
        if let Some(tag) = validator {
            req = req.header(IF_NONE_MATCH, tag);
        }

        let resp = req.send().await?;
        match resp.status() {
            StatusCode::NOT_MODIFIED => Ok(DiscoveryResponse::NotModified),
            status if status.is_success() => {
                let etag = resp
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = resp.bytes().await?.to_vec();
                Ok(DiscoveryResponse::Updated { etag, body })
            }
            status => Err(LiveError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }),
        }
    }

    /// Whether the device serves an event stream.
    ///
    /// A definitive answer without `text/event-stream` (a device in setup
    /// mode has no `/events` route) means no. A network error means yes:
    /// the stream client retries an unreachable device on its own.
    pub async fn supports_streaming(&self) -> bool {
        let url = match self.events_url() {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self.http.get(url).header(ACCEPT, EVENT_STREAM_MIME).send().await {
            Ok(resp) => {
                let is_stream = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ct| ct.starts_with(EVENT_STREAM_MIME));
                let supported = resp.status().is_success() && is_stream;
                if !supported {
                    info!(
                        status = %resp.status(),
                        "device has no event stream, using polling fallback"
                    );
                }
                supported
            }
            Err(e) => {
                debug!("event stream probe failed, assuming streaming: {e}");
                true
            }
        }
    }
}
