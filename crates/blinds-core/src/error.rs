//! Application error types with rich context

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Connection error: {message}")]
    Transport { message: String },

    #[error("Not connected to the controller hub")]
    NotConnected,

    // ─────────────────────────────────────────────────────────────
    // Hub Protocol Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Hub protocol error: {message}")]
    Protocol { message: String },

    #[error("Command '{pending}' is still waiting for a response")]
    CommandPending { pending: String },

    #[error("Controller name {name:?} cannot be used in a command")]
    InvalidControllerName { name: String },

    // ─────────────────────────────────────────────────────────────
    // Persistence/Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn command_pending(pending: impl Into<String>) -> Self {
        Self::CommandPending {
            pending: pending.into(),
        }
    }

    pub fn invalid_controller_name(name: impl Into<String>) -> Self {
        Self::InvalidControllerName { name: name.into() }
    }

    /// Whether this error breaks trust in the hub stream.
    ///
    /// The wire protocol has no resynchronization, so the only recovery is
    /// tearing the connection down and reconnecting.
    pub fn forces_disconnect(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Transport { .. } | Error::Protocol { .. }
        )
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave the connection untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::CommandPending { .. }
                | Error::InvalidControllerName { .. }
                | Error::Persistence { .. }
                | Error::Config { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
