//! Secondary transport: conditional polling of the discovery endpoint.

use crate::device::{DeviceClient, DiscoveryResponse};
use crate::error::Result;
use crate::model::parse_printer_update;
use crate::sink::UpdateSink;
use crate::state::{ConnectionState, Lifecycle};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval used when neither the local config nor the device sets one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// What a single poll produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 304: the list is unchanged.
    NotModified,
    /// A fresh list with this many printers was published.
    Updated(usize),
    /// The response was malformed and dropped.
    Discarded,
    /// The client was stopped or restarted while the request was in flight.
    Superseded,
}

/// Polls `/api/printer-discovery` on an interval using an entity tag.
pub struct PollingFallbackClient {
    inner: Arc<Poller>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

struct Poller {
    device: DeviceClient,
    sink: UpdateSink,
    lifecycle: Lifecycle,
    validator: Mutex<Option<String>>,
}

impl PollingFallbackClient {
    pub fn new(device: DeviceClient, sink: UpdateSink) -> Self {
        Self {
            inner: Arc::new(Poller {
                device,
                sink,
                lifecycle: Lifecycle::new(),
                validator: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Poll now, then every `interval`. A running loop is replaced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) {
        let generation = self.inner.lifecycle.begin(ConnectionState::Open);

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.lifecycle.current() != generation {
            debug!("start superseded before polling was spawned");
            return;
        }
        if let Some((cancel, handle)) = task.take() {
            cancel.cancel();
            handle.abort();
        }

        let cancel = CancellationToken::new();
        let poller = Arc::clone(&self.inner);
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            poller.run(generation, interval, loop_cancel).await;
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            "polling printer discovery"
        );
        *task = Some((cancel, handle));
    }

    /// Stop polling. A request already in flight is discarded.
    pub fn stop(&self) {
        self.inner.lifecycle.end();
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            handle.abort();
            info!("printer discovery polling stopped");
        }
    }

    /// Run a single poll outside the interval loop.
    ///
    /// # Errors
    /// Returns `LiveError` on network failure or an unexpected HTTP status.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let generation = self.inner.lifecycle.current();
        self.inner.poll(generation).await
    }

    /// The entity tag presented on the next request.
    pub fn validator(&self) -> Option<String> {
        self.inner
            .validator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.lifecycle.watch()
    }
}

impl Drop for PollingFallbackClient {
    fn drop(&mut self) {
        let running = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            handle.abort();
            self.inner.lifecycle.end();
        }
    }
}

impl Poller {
    async fn run(&self, generation: u64, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                outcome = self.poll(generation) => outcome,
            };

            match outcome {
                Ok(PollOutcome::Superseded) => return,
                Ok(_) => {}
                Err(e) => warn!("printer discovery poll failed: {e}"),
            }
        }
    }

    async fn poll(&self, generation: u64) -> Result<PollOutcome> {
        let validator = self
            .validator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let (etag, body) = match self.device.fetch_discovery(validator.as_deref()).await? {
            DiscoveryResponse::NotModified => {
                debug!("printer list not modified");
                return Ok(PollOutcome::NotModified);
            }
            DiscoveryResponse::Updated { etag, body } => (etag, body),
        };

        let printers = match parse_printer_update(&body) {
            Ok(printers) => printers,
            Err(e) => {
                warn!("malformed discovery response dropped: {e}");
                return Ok(PollOutcome::Discarded);
            }
        };

        let count = printers.len();
        let current = self.lifecycle.if_current(generation, || {
            *self.validator.lock().unwrap_or_else(PoisonError::into_inner) = etag;
            self.sink.replace_printers(printers);
        });

        if current {
            debug!(count, "printer list replaced from poll");
            Ok(PollOutcome::Updated(count))
        } else {
            debug!("discarding poll response from stopped client");
            Ok(PollOutcome::Superseded)
        }
    }
}
