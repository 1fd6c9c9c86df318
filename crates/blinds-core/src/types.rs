//! Core domain types: connection status, controllers, persisted intent

use std::fmt;

use serde::{Deserialize, Serialize};

/// TCP port the controller hub listens on
pub const HUB_PORT: u16 = 1234;

/// Hub address used when nothing has been persisted yet
pub const DEFAULT_ADDRESS: &str = "10.0.2.2";

// ─────────────────────────────────────────────────────────
// Connection Status
// ─────────────────────────────────────────────────────────

/// Externally observable state of the hub connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// Transport opened, waiting for the connected event
    Connecting,
    Connected,
    /// Last attempt failed; left only by an explicit reconnect
    Error,
}

impl ConnectionStatus {
    /// True while a transport exists (`Connecting` or `Connected`)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────────────────
// Controllers
// ─────────────────────────────────────────────────────────

/// An operation a blind controller understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Up,
    Down,
    /// Stop, or move to the stored "my" position
    My,
    /// Enter programming mode
    Program,
}

impl Operation {
    /// All operations, in the order the controls are laid out
    pub const ALL: [Operation; 4] = [
        Operation::Up,
        Operation::My,
        Operation::Down,
        Operation::Program,
    ];

    /// The word used on the wire
    pub fn wire_word(&self) -> &'static str {
        match self {
            Operation::Up => "up",
            Operation::Down => "down",
            Operation::My => "my",
            Operation::Program => "prog",
        }
    }

    /// Button caption
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Up => "Up",
            Operation::Down => "Down",
            Operation::My => "My",
            Operation::Program => "Prog",
        }
    }

    /// Parse a wire word back into an operation
    pub fn from_wire_word(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.wire_word() == word)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_word())
    }
}

/// Check that a controller name can be embedded in a command line.
///
/// Commands are space-separated and `;`-terminated with no escaping, so a
/// usable name is non-empty and free of whitespace, `;`, and control
/// characters.
pub fn is_addressable_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == ';' || c.is_control())
}

/// A single blind controller reported by the hub
///
/// Only `name` is read from the hub's list response; any other fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ControllerDescriptor {
    pub name: String,
}

impl ControllerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Operations available on every controller
    pub fn operations(&self) -> &'static [Operation] {
        &Operation::ALL
    }

    /// Whether commands can be built for this controller
    pub fn is_addressable(&self) -> bool {
        is_addressable_name(&self.name)
    }
}

/// Controllers in the order the hub reported them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerList {
    controllers: Vec<ControllerDescriptor>,
}

impl ControllerList {
    pub fn new(controllers: Vec<ControllerDescriptor>) -> Self {
        Self { controllers }
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ControllerDescriptor> {
        self.controllers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ControllerDescriptor> {
        self.controllers.iter()
    }

    /// Find a controller by exact name
    pub fn find(&self, name: &str) -> Option<&ControllerDescriptor> {
        self.controllers.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.controllers.iter().map(|c| c.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a ControllerList {
    type Item = &'a ControllerDescriptor;
    type IntoIter = std::slice::Iter<'a, ControllerDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.controllers.iter()
    }
}

impl FromIterator<ControllerDescriptor> for ControllerList {
    fn from_iter<I: IntoIterator<Item = ControllerDescriptor>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ─────────────────────────────────────────────────────────
// Connection Intent
// ─────────────────────────────────────────────────────────

/// What the user wants, independent of the current connection status.
///
/// Persisted across restarts as a single JSON record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIntent {
    pub desired_address: String,
    pub should_stay_connected: bool,
    #[serde(default)]
    pub selected_controller_index: usize,
}

impl ConnectionIntent {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            desired_address: address.into(),
            should_stay_connected: false,
            selected_controller_index: 0,
        }
    }
}

impl Default for ConnectionIntent {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}
