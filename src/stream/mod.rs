//! Primary transport: a persistent event stream with automatic reconnect.
//!
//! ```text
//! Idle -> Connecting -> Open -> (Retrying -> Connecting)* -> Closed
//! ```

pub mod sse;

pub use sse::{HttpSseConnector, SseConnector, SseFrame};

use crate::backoff::{Backoff, ReconnectConfig};
use crate::error::LiveError;
use crate::model::{parse_stream_message, Inbound};
use crate::sink::UpdateSink;
use crate::state::{ConnectionState, Lifecycle};
use futures::StreamExt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keeps one live event stream open and feeds it into an [`UpdateSink`].
pub struct StreamClient<C: SseConnector> {
    connector: Arc<C>,
    sink: UpdateSink,
    reconnect: ReconnectConfig,
    lifecycle: Arc<Lifecycle>,
    task: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn shutdown(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

impl<C: SseConnector> StreamClient<C> {
    pub fn new(connector: Arc<C>, sink: UpdateSink, reconnect: ReconnectConfig) -> Self {
        Self {
            connector,
            sink,
            reconnect,
            lifecycle: Arc::new(Lifecycle::new()),
            task: Mutex::new(None),
        }
    }

    /// Open the stream. Any connection already running is closed first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        // The generation gate is always taken before the task slot, never
        // inside it, so handlers may call back into the client.
        let generation = self.lifecycle.begin(ConnectionState::Connecting);

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if self.lifecycle.current() != generation {
            debug!("start superseded before the connection was spawned");
            return;
        }
        if let Some(stale) = task.take() {
            debug!("closing stale event stream before restart");
            stale.shutdown();
        }

        let cancel = CancellationToken::new();
        let connection = Connection {
            connector: Arc::clone(&self.connector),
            sink: self.sink.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            generation,
            backoff: Backoff::new(self.reconnect.clone()),
        };
        let handle = tokio::spawn(connection.run(cancel.clone()));
        *task = Some(Running { cancel, handle });
    }

    /// Close the stream and cancel any pending reconnect.
    pub fn stop(&self) {
        self.lifecycle.end();
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.shutdown();
            info!("event stream closed");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.lifecycle.watch()
    }
}

impl<C: SseConnector> Drop for StreamClient<C> {
    fn drop(&mut self) {
        let running = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.shutdown();
            self.lifecycle.end();
        }
    }
}

enum Outcome {
    Dropped(LiveError),
    Superseded,
}

/// State owned by one connection task.
struct Connection<C> {
    connector: Arc<C>,
    sink: UpdateSink,
    lifecycle: Arc<Lifecycle>,
    generation: u64,
    backoff: Backoff,
}

impl<C: SseConnector> Connection<C> {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            if !self.lifecycle.set_state(self.generation, ConnectionState::Connecting) {
                return;
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                outcome = self.read() => outcome,
            };

            match outcome {
                Outcome::Superseded => return,
                Outcome::Dropped(e) => warn!("event stream dropped: {e}"),
            }

            if !self.lifecycle.set_state(self.generation, ConnectionState::Retrying) {
                return;
            }

            let delay = self.backoff.next_delay();
            info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.backoff.attempt(),
                "reconnecting to event stream"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Read one connection until it fails.
    async fn read(&mut self) -> Outcome {
        let mut frames = self.connector.connect();

        while let Some(frame) = frames.next().await {
            let current = match frame {
                Ok(SseFrame::Open) => {
                    self.backoff.reset();
                    let open = self.lifecycle.set_state(self.generation, ConnectionState::Open);
                    if open {
                        info!("event stream open");
                    }
                    open
                }
                Ok(SseFrame::Message { event, data }) => self.handle_message(&event, &data),
                Err(e) => return Outcome::Dropped(e),
            };
            if !current {
                return Outcome::Superseded;
            }
        }

        Outcome::Dropped(LiveError::StreamEnded)
    }

    /// Returns `false` once this connection has been superseded.
    fn handle_message(&self, event: &str, data: &str) -> bool {
        match parse_stream_message(event, data) {
            Ok(Some(Inbound::Printers(printers))) => {
                let count = printers.len();
                let current = self
                    .lifecycle
                    .if_current(self.generation, || self.sink.replace_printers(printers));
                if current {
                    debug!(count, "printer list replaced from stream");
                }
                current
            }
            Ok(Some(Inbound::Status { status, message })) => self
                .lifecycle
                .if_current(self.generation, || self.sink.system_status(status, message)),
            Ok(None) => {
                debug!(event, "ignoring unknown stream event");
                true
            }
            Err(e) => {
                warn!(event, "malformed stream payload dropped: {e}");
                true
            }
        }
    }
}
