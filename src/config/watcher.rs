use crate::error::LiveError;
use crate::event::ControlEvent;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Watch a config file for changes and emit `ConfigReloaded` events.
///
/// # Errors
/// Returns `LiveError::Watcher` if the file watcher cannot be initialized.
pub async fn watch_config(
    config_path: PathBuf,
    tx: broadcast::Sender<ControlEvent>,
    cancel: CancellationToken,
) -> crate::error::Result<()> {
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel(16);

    let mut debouncer = new_debouncer(
        Duration::from_millis(500),
        move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
            match events {
                Ok(evts) => {
                    if evts.iter().any(|e| e.kind == DebouncedEventKind::Any) {
                        let _ = notify_tx.blocking_send(());
                    }
                }
                Err(e) => warn!("file watcher error: {e}"),
            }
        },
    )
    .map_err(|e| LiveError::Watcher(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&config_path, notify::RecursiveMode::NonRecursive)
        .map_err(|e| LiveError::Watcher(e.to_string()))?;
    info!("watching config file: {}", config_path.display());

    // The debouncer lives as long as this loop.
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("config watcher shutting down");
                return Ok(());
            }
            Some(()) = notify_rx.recv() => {
                info!("config file changed, reloading...");
                match crate::config::load(&config_path) {
                    Ok(new_config) => {
                        let _ = tx.send(ControlEvent::ConfigReloaded(Arc::new(new_config)));
                        info!("config reloaded successfully");
                    }
                    Err(e) => {
                        warn!("config reload failed, keeping old config: {e}");
                    }
                }
            }
        }
    }
}
