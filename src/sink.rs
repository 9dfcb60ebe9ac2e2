use crate::dispatch::Dispatcher;
use crate::event::{DeviceEvent, SystemStatus};
use crate::model::PrinterRecord;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// Single-owner cell holding the current printer list.
///
/// Readers get immutable snapshots; only [`UpdateSink`] writes.
#[derive(Default)]
pub struct PrinterRegistry {
    current: ArcSwap<Vec<PrinterRecord>>,
}

impl PrinterRegistry {
    pub fn snapshot(&self) -> Arc<Vec<PrinterRecord>> {
        self.current.load_full()
    }

    fn replace(&self, printers: Vec<PrinterRecord>) -> Arc<Vec<PrinterRecord>> {
        let snapshot = Arc::new(printers);
        self.current.store(Arc::clone(&snapshot));
        snapshot
    }
}

/// Where transports deliver normalized updates.
#[derive(Clone)]
pub struct UpdateSink {
    dispatcher: Dispatcher,
    printers: Arc<PrinterRegistry>,
}

impl UpdateSink {
    pub fn new(dispatcher: Dispatcher, printers: Arc<PrinterRegistry>) -> Self {
        Self {
            dispatcher,
            printers,
        }
    }

    pub fn printers(&self) -> &Arc<PrinterRegistry> {
        &self.printers
    }

    /// Install the synthesized local printer as the whole list.
    pub fn seed_local(&self, local: PrinterRecord) {
        debug!(name = %local.name, "seeding local printer");
        self.replace_printers(vec![local]);
    }

    /// Replace the printer set and publish the new snapshot.
    pub fn replace_printers(&self, printers: Vec<PrinterRecord>) {
        let snapshot = self.printers.replace(printers);
        self.dispatcher
            .publish(DeviceEvent::PrinterListChanged { printers: snapshot });
    }

    pub fn system_status(&self, status: SystemStatus, message: String) {
        self.dispatcher
            .publish(DeviceEvent::SystemStatusChanged { status, message });
    }
}
