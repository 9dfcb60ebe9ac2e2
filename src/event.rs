use crate::config::schema::AppConfig;
use crate::model::PrinterRecord;
use std::fmt;
use std::sync::Arc;

/// Normalized device events published through the [`Dispatcher`](crate::dispatch::Dispatcher).
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The full, current printer list. Replaces whatever was seen before.
    PrinterListChanged { printers: Arc<Vec<PrinterRecord>> },

    /// A status banner pushed by the device.
    SystemStatusChanged {
        status: SystemStatus,
        message: String,
    },
}

impl DeviceEvent {
    pub fn tag(&self) -> EventTag {
        match self {
            Self::PrinterListChanged { .. } => EventTag::PrintersUpdated,
            Self::SystemStatusChanged { .. } => EventTag::SystemStatus,
        }
    }
}

/// Notification names renderers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    PrintersUpdated,
    SystemStatus,
}

impl EventTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrintersUpdated => "printersUpdated",
            Self::SystemStatus => "systemStatus",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device-reported system status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemStatus {
    Connected,
    Error,
    Reconnecting,
    /// Accepted and published, but never surfaced to the user.
    Other(String),
}

impl SystemStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "connected" => Self::Connected,
            "error" => Self::Error,
            "reconnecting" => Self::Reconnecting,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Whether renderers should show this status as a banner.
    pub fn is_notifiable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Error => f.write_str("error"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Events flowing through the daemon's control channel.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Configuration was reloaded from disk.
    ConfigReloaded(Arc<AppConfig>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(SystemStatus::parse("connected"), SystemStatus::Connected);
        assert_eq!(SystemStatus::parse("ERROR"), SystemStatus::Error);
        assert_eq!(
            SystemStatus::parse(" reconnecting "),
            SystemStatus::Reconnecting
        );
        assert_eq!(
            SystemStatus::parse("printing"),
            SystemStatus::Other("printing".into())
        );
    }

    #[test]
    fn only_known_statuses_are_notifiable() {
        assert!(SystemStatus::Connected.is_notifiable());
        assert!(SystemStatus::Error.is_notifiable());
        assert!(SystemStatus::Reconnecting.is_notifiable());
        assert!(!SystemStatus::Other("idle".into()).is_notifiable());
    }

    #[test]
    fn event_tags() {
        let printers = DeviceEvent::PrinterListChanged {
            printers: Arc::new(Vec::new()),
        };
        assert_eq!(printers.tag(), EventTag::PrintersUpdated);
        assert_eq!(printers.tag().as_str(), "printersUpdated");

        let status = DeviceEvent::SystemStatusChanged {
            status: SystemStatus::Connected,
            message: String::new(),
        };
        assert_eq!(status.tag().to_string(), "systemStatus");
    }
}
