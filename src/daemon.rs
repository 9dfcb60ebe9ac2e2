use crate::config::schema::AppConfig;
use crate::config::watcher;
use crate::device::DeviceClient;
use crate::dispatch::{Dispatcher, Subscription};
use crate::error::Result;
use crate::event::{ControlEvent, DeviceEvent, EventTag, SystemStatus};
use crate::model::PrinterRecord;
use crate::poll::DEFAULT_POLL_INTERVAL;
use crate::sink::{PrinterRegistry, UpdateSink};
use crate::transport::{LiveTransport, TransportSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 16;

/// Run the live sync daemon until Ctrl-C.
///
/// # Errors
/// Returns `LiveError` if the initial session cannot be set up.
pub async fn run(config: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    let cancel = CancellationToken::new();
    let (tx, _) = broadcast::channel::<ControlEvent>(CHANNEL_CAPACITY);

    let dispatcher = Dispatcher::new();
    let _renderers = attach_renderers(&dispatcher);
    let printers = Arc::new(PrinterRegistry::default());
    let sink = UpdateSink::new(dispatcher, printers);

    let mut session = Session::bootstrap(&config, sink.clone()).await?;

    let watcher_handle = config_path.map(|path| spawn_config_watcher(&tx, &cancel, path));
    let mut rx = tx.subscribe();

    info!("scribe-live running against {}", session.device.base_url());

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            () = async { tokio::signal::ctrl_c().await.ok(); } => {
                info!("received SIGINT, shutting down");
                break;
            }
            event = rx.recv() => {
                match event {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("control loop lagged, missed {n} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        match event {
            ControlEvent::ConfigReloaded(new_config) => {
                session = reload(session, &new_config, &sink).await;
            }
        }
    }

    info!("scribe-live shutting down...");
    session.stop();
    cancel.cancel();

    if let Some(handle) = watcher_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("scribe-live stopped");
    Ok(())
}

/// Replace `session` with one built from `config`.
///
/// The old transport is stopped first so two never overlap. If the new
/// session cannot be built, the old transport is restarted and kept.
async fn reload(session: Session, config: &AppConfig, sink: &UpdateSink) -> Session {
    session.stop();
    match Session::bootstrap(config, sink.clone()).await {
        Ok(next) => next,
        Err(e) => {
            error!("failed to apply reloaded config, restarting previous session: {e}");
            session.transport.start();
            session
        }
    }
}

/// One device connection: the device client plus its running transport.
pub struct Session {
    pub device: DeviceClient,
    pub transport: LiveTransport,
}

impl Session {
    /// Load device config, seed the local printer, pick and start a transport.
    ///
    /// # Errors
    /// Returns `LiveError` if the device URL or HTTP clients cannot be built.
    pub async fn bootstrap(config: &AppConfig, sink: UpdateSink) -> Result<Self> {
        let device = DeviceClient::new(crate::config::device_url(config)?, config.request_timeout())?
            .with_events_path(&config.device.events_path);

        let device_config = match device.fetch_config().await {
            Ok(device_config) => Some(device_config),
            Err(e) => {
                warn!("could not load device config, starting with an empty printer list: {e}");
                None
            }
        };

        match device_config.as_ref() {
            Some(device_config) => sink.seed_local(PrinterRecord::local(device_config)),
            None => sink.replace_printers(Vec::new()),
        }

        let poll_interval = config
            .live
            .polling_interval_ms
            .map(Duration::from_millis)
            .or_else(|| device_config.as_ref().and_then(|c| c.polling_interval()))
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let settings = TransportSettings {
            mode: config.live.transport,
            reconnect: config.reconnect(),
            poll_interval,
            connect_timeout: config.request_timeout(),
        };

        let transport = LiveTransport::select(&device, sink, &settings).await?;
        transport.start();

        Ok(Self { device, transport })
    }

    pub fn stop(&self) {
        self.transport.stop();
    }
}

/// Built-in renderers: log printer lists and surfaced status banners.
pub fn attach_renderers(dispatcher: &Dispatcher) -> Vec<Subscription> {
    let printers = dispatcher.subscribe(EventTag::PrintersUpdated, |event| {
        if let DeviceEvent::PrinterListChanged { printers } = event {
            let names: Vec<&str> = printers.iter().map(|p| p.name.as_str()).collect();
            info!(count = printers.len(), "printers: {}", names.join(", "));
        }
    });

    let status = dispatcher.subscribe(EventTag::SystemStatus, |event| {
        if let DeviceEvent::SystemStatusChanged { status, message } = event {
            if !status.is_notifiable() {
                debug!("device status '{status}' not surfaced");
            } else if *status == SystemStatus::Connected {
                info!("device status: connected {message}");
            } else {
                warn!("device status: {status} {message}");
            }
        }
    });

    vec![printers, status]
}

fn spawn_config_watcher(
    tx: &broadcast::Sender<ControlEvent>,
    cancel: &CancellationToken,
    config_path: PathBuf,
) -> tokio::task::JoinHandle<()> {
    let watcher_tx = tx.clone();
    let watcher_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = watcher::watch_config(config_path, watcher_tx, watcher_cancel).await {
            error!("config watcher error: {e}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionState;
    use crate::transport::TransportMode;
    use reqwest::Url;
    use wiremock::MockServer;

    fn polling_config(server: &MockServer) -> AppConfig {
        let mut config = AppConfig::default();
        config.device.url = server.uri();
        config.live.transport = TransportMode::Polling;
        config.live.polling_interval_ms = Some(100);
        config
    }

    fn sink() -> UpdateSink {
        UpdateSink::new(Dispatcher::new(), Arc::default())
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |r| r.len())
    }

    #[tokio::test]
    async fn reload_stops_old_transport_before_switching() {
        let old = MockServer::start().await;
        let new = MockServer::start().await;
        let sink = sink();

        let session = Session::bootstrap(&polling_config(&old), sink.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let session = reload(session, &polling_config(&new), &sink).await;
        assert_eq!(session.device.base_url(), &Url::parse(&new.uri()).unwrap());

        let before = request_count(&old).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(request_count(&old).await, before);
        assert!(request_count(&new).await >= 2);

        session.stop();
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_session() {
        let old = MockServer::start().await;
        let sink = sink();

        let session = Session::bootstrap(&polling_config(&old), sink.clone())
            .await
            .unwrap();

        let mut broken = polling_config(&old);
        broken.device.url = "ftp://scribe.local".to_string();
        let session = reload(session, &broken, &sink).await;

        assert_eq!(session.device.base_url(), &Url::parse(&old.uri()).unwrap());
        assert_eq!(session.transport.state(), ConnectionState::Open);

        let before = request_count(&old).await;
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(request_count(&old).await > before);

        session.stop();
    }

    #[test]
    fn renderers_cover_both_tags() {
        let dispatcher = Dispatcher::new();
        let _subscriptions = attach_renderers(&dispatcher);
        assert_eq!(dispatcher.subscriber_count(EventTag::PrintersUpdated), 1);
        assert_eq!(dispatcher.subscriber_count(EventTag::SystemStatus), 1);

        dispatcher.publish(DeviceEvent::SystemStatusChanged {
            status: SystemStatus::Other("booting".into()),
            message: String::new(),
        });
    }
}
