//! Event definitions flowing between the transport, the session and the host

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{ConnectionStatus, ControllerList};

/// Global connection ID counter
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport connection attempt.
///
/// Every event a transport emits carries the ID it was opened with, so the
/// session can drop late events from a connection it already retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh, never reused ID
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────
// Transport Events
// ─────────────────────────────────────────────────────────

/// Events from a hub transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket is open; fired at most once per connection
    Connected,

    /// Connect or I/O failure (including the hub closing the socket)
    Error(String),

    /// Bytes received from the hub, unframed
    Data(Vec<u8>),
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "Connected",
            TransportEvent::Error(_) => "Error",
            TransportEvent::Data(_) => "Data",
        }
    }
}

/// A transport event tagged with the connection that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

impl TransportMessage {
    pub fn new(connection: ConnectionId, event: TransportEvent) -> Self {
        Self { connection, event }
    }
}

// ─────────────────────────────────────────────────────────
// Lifecycle Events
// ─────────────────────────────────────────────────────────

/// Foreground/background signal from the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Active,
    Inactive,
}

// ─────────────────────────────────────────────────────────
// Session Events (for the host UI)
// ─────────────────────────────────────────────────────────

/// Notifications the session emits for the UI to redraw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(ConnectionStatus),

    /// The address shown in the address field changed
    AddressChanged(String),

    /// New controller list, or `None` when it was cleared back to the placeholder
    ControllersChanged(Option<ControllerList>),

    /// Index of the controller page being shown
    SelectionChanged(usize),

    /// Something the user has to be told about
    Alert { title: String, message: String },
}

impl SessionEvent {
    pub fn alert(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Alert {
            title: title.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_uniqueness() {
        let id1 = ConnectionId::next();
        let id2 = ConnectionId::next();
        let id3 = ConnectionId::next();

        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert!(id3.as_u64() > id2.as_u64());
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::next();
        assert_eq!(id.to_string(), format!("#{}", id.as_u64()));
    }

    #[test]
    fn test_transport_event_kind() {
        assert_eq!(TransportEvent::Connected.kind(), "Connected");
        assert_eq!(TransportEvent::Error("x".into()).kind(), "Error");
        assert_eq!(TransportEvent::Data(vec![]).kind(), "Data");
    }

    #[test]
    fn test_alert_constructor() {
        let event = SessionEvent::alert("Connection failed", "refused");
        assert_eq!(
            event,
            SessionEvent::Alert {
                title: "Connection failed".to_string(),
                message: "refused".to_string(),
            }
        );
    }
}
