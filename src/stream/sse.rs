use crate::error::{LiveError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Url;
use reqwest_eventsource::{retry, Event, EventSource};
use std::time::Duration;

/// One frame from a streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// The connection is established.
    Open,
    /// A named event with its raw data.
    Message { event: String, data: String },
}

/// Opens streaming connections. Each call is a fresh connection; dropping
/// the returned stream closes it.
///
/// The stream ending, or yielding `Err`, means the connection is gone.
pub trait SseConnector: Send + Sync + 'static {
    fn connect(&self) -> BoxStream<'static, Result<SseFrame>>;
}

/// Connects to the device's `/events` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSseConnector {
    http: reqwest::Client,
    url: Url,
}

impl HttpSseConnector {
    /// # Errors
    /// Returns `LiveError::Http` if the HTTP client cannot be built.
    pub fn new(url: Url, connect_timeout: Duration) -> Result<Self> {
        // No overall timeout: the body never completes on a healthy stream.
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl SseConnector for HttpSseConnector {
    fn connect(&self) -> BoxStream<'static, Result<SseFrame>> {
        let mut source = match EventSource::new(self.http.get(self.url.clone())) {
            Ok(source) => source,
            Err(e) => {
                let err = LiveError::Stream(format!("cannot open event source: {e:?}"));
                return stream::once(async move { Err(err) }).boxed();
            }
        };
        // Reconnects are owned by StreamClient.
        source.set_retry_policy(Box::new(retry::Never));

        source
            .map(|item| match item {
                Ok(Event::Open) => Ok(SseFrame::Open),
                Ok(Event::Message(msg)) => Ok(SseFrame::Message {
                    event: msg.event,
                    data: msg.data,
                }),
                Err(reqwest_eventsource::Error::StreamEnded) => Err(LiveError::StreamEnded),
                Err(e) => Err(LiveError::Stream(e.to_string())),
            })
            .boxed()
    }
}
