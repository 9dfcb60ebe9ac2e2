//! Printer records and the JSON payloads the device sends.
//!
//! The device firmware emits camelCase field names; snake_case aliases are
//! accepted as well since simulators and older builds use them.

use crate::error::Result;
use crate::event::SystemStatus;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Reserved id of the device's own printer.
pub const LOCAL_PRINTER_ID: &str = "local";

/// SSE event name carrying the discovered printer list.
pub const PRINTER_UPDATE_EVENT: &str = "printer-update";

/// SSE event name carrying a system status banner.
pub const SYSTEM_STATUS_EVENT: &str = "system-status";

/// Reachability of a printer as reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterStatus {
    Online,
    Offline,
    Unknown,
}

impl PrinterStatus {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("online") => Self::Online,
            Some(s) if s.eq_ignore_ascii_case("offline") => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

/// A printer known to the UI, local or discovered over MQTT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterRecord {
    /// Uniqueness key. `"local"` is reserved for the device itself.
    pub printer_id: String,
    pub name: String,
    pub printer_type: String,
    /// MQTT topic used to print to this printer.
    pub topic: String,
    pub status: PrinterStatus,
    pub ip_address: Option<String>,
    pub firmware_version: Option<String>,
    pub mdns: Option<String>,
    pub last_power_on: Option<String>,
    pub timezone: Option<String>,
    /// Seconds.
    pub last_seen: Option<u64>,
}

impl PrinterRecord {
    /// Synthesize the local printer from the device configuration.
    pub fn local(config: &DeviceConfig) -> Self {
        let printer = config.printer.as_ref();
        let device = &config.device;

        let name = printer
            .and_then(|p| non_empty(p.name.as_deref()))
            .or_else(|| non_empty(device.printer_name.as_deref()))
            .or_else(|| non_empty(device.owner.as_deref()))
            .unwrap_or("Scribe")
            .to_string();

        let printer_type = printer
            .and_then(|p| non_empty(p.printer_type.as_deref()))
            .or_else(|| non_empty(device.device_type.as_deref()))
            .unwrap_or(LOCAL_PRINTER_ID)
            .to_string();

        let topic = printer
            .and_then(|p| non_empty(p.topic.as_deref()))
            .or_else(|| non_empty(device.mqtt_topic.as_deref()))
            .map_or_else(|| default_topic(&name), str::to_string);

        Self {
            printer_id: LOCAL_PRINTER_ID.to_string(),
            name,
            printer_type,
            topic,
            status: PrinterStatus::Online,
            ip_address: owned(device.ip_address.as_deref()),
            firmware_version: owned(device.firmware_version.as_deref()),
            mdns: owned(device.mdns.as_deref()),
            last_power_on: None,
            timezone: owned(device.timezone.as_deref()),
            last_seen: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.printer_id == LOCAL_PRINTER_ID
    }

    fn from_wire(wire: WirePrinter) -> Option<Self> {
        let printer_id = owned(wire.printer_id.as_deref())?;
        let name = owned(wire.name.as_deref()).unwrap_or_else(|| "Unknown".to_string());
        let printer_type = owned(wire.printer_type.as_deref()).unwrap_or_else(|| {
            if printer_id == LOCAL_PRINTER_ID {
                LOCAL_PRINTER_ID.to_string()
            } else {
                "mqtt".to_string()
            }
        });
        let topic = owned(wire.topic.as_deref()).unwrap_or_else(|| default_topic(&name));

        Some(Self {
            status: PrinterStatus::parse(wire.status.as_deref()),
            ip_address: owned(wire.ip_address.as_deref()),
            firmware_version: owned(wire.firmware_version.as_deref()),
            mdns: owned(wire.mdns.as_deref()),
            last_power_on: owned(wire.last_power_on.as_deref()),
            timezone: owned(wire.timezone.as_deref()),
            last_seen: wire.last_seen,
            printer_id,
            name,
            printer_type,
            topic,
        })
    }
}

/// Print topic for a printer that does not advertise one.
pub fn default_topic(name: &str) -> String {
    format!("scribe/{name}/print")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn owned(value: Option<&str>) -> Option<String> {
    non_empty(value).map(str::to_string)
}

// --- Device configuration (GET /api/config) ---

/// The subset of `/api/config` the live client needs. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(default)]
    pub printer: Option<LocalPrinterConfig>,

    #[serde(default)]
    pub device: DeviceSection,

    #[serde(default)]
    pub web_interface: WebInterfaceSection,
}

impl DeviceConfig {
    /// Polling interval advertised by the device, if any.
    pub fn polling_interval(&self) -> Option<Duration> {
        self.web_interface
            .printer_discovery_polling_interval
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Explicit local printer identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalPrinterConfig {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub printer_type: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSection {
    pub owner: Option<String>,
    pub printer_name: Option<String>,
    pub mqtt_topic: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub firmware_version: Option<String>,
    pub mdns: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebInterfaceSection {
    /// Milliseconds.
    pub printer_discovery_polling_interval: Option<u64>,
}

// --- Wire payloads ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePrinter {
    #[serde(alias = "printer_id")]
    printer_id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type", alias = "printer_type")]
    printer_type: Option<String>,
    topic: Option<String>,
    status: Option<String>,
    #[serde(alias = "ip_address")]
    ip_address: Option<String>,
    #[serde(alias = "firmware_version")]
    firmware_version: Option<String>,
    mdns: Option<String>,
    #[serde(alias = "last_power_on")]
    last_power_on: Option<String>,
    timezone: Option<String>,
    #[serde(alias = "last_seen")]
    last_seen: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrinterUpdatePayload {
    discovered_printers: Vec<WirePrinter>,
    count: Option<usize>,
    #[serde(alias = "our_printer_id")]
    our_printer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SystemStatusPayload {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// A parsed message from the device, before it is published.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Printers(Vec<PrinterRecord>),
    Status {
        status: SystemStatus,
        message: String,
    },
}

/// Parse a discovery payload (`{ "discovered_printers": [...] }`).
///
/// Records without an id are dropped; for duplicate ids the first wins.
///
/// # Errors
/// Returns `LiveError::Json` if the payload is not valid JSON of that shape.
pub fn parse_printer_update(data: &[u8]) -> Result<Vec<PrinterRecord>> {
    let payload: PrinterUpdatePayload = serde_json::from_slice(data)?;

    if let Some(count) = payload.count {
        if count != payload.discovered_printers.len() {
            debug!(
                count,
                listed = payload.discovered_printers.len(),
                "printer count disagrees with list"
            );
        }
    }
    if let Some(ref ours) = payload.our_printer_id {
        debug!(printer_id = %ours, "device reports its own printer id");
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(payload.discovered_printers.len());
    for wire in payload.discovered_printers {
        match PrinterRecord::from_wire(wire) {
            Some(record) if seen.insert(record.printer_id.clone()) => records.push(record),
            Some(record) => warn!(printer_id = %record.printer_id, "duplicate printer id, dropped"),
            None => warn!("printer record without id, dropped"),
        }
    }
    Ok(records)
}

/// Parse a named SSE message. Unknown event names yield `Ok(None)`.
///
/// # Errors
/// Returns `LiveError::Json` if a known event carries a malformed payload.
pub fn parse_stream_message(event: &str, data: &str) -> Result<Option<Inbound>> {
    match event {
        PRINTER_UPDATE_EVENT => parse_printer_update(data.as_bytes()).map(|p| Some(Inbound::Printers(p))),
        SYSTEM_STATUS_EVENT => {
            let payload: SystemStatusPayload = serde_json::from_str(data)?;
            Ok(Some(Inbound::Status {
                status: SystemStatus::parse(&payload.status),
                message: payload.message.unwrap_or_default(),
            }))
        }
        _ => Ok(None),
    }
}
