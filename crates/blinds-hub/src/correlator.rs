//! Response correlation for the hub's one-command-at-a-time protocol
//!
//! The wire carries no request IDs. The hub answers commands in order, and
//! only one command is ever in flight, so the first data after a command is
//! taken to be its response. This module provides:
//! - Tracking of the single outstanding command
//! - Classification of incoming data (list reply vs. acknowledgment)
//! - Buffering of list replies split across reads
//! - Detection of commands that never got an answer

use std::time::{Duration, Instant};

use blinds_core::prelude::*;
use blinds_core::ControllerList;

use super::commands::expects_list_response;
use super::protocol::{scan_controller_list, DecodeError, DecodeOutcome};

/// Default time to wait for a reply before giving up on the connection
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest list reply accepted before the hub is treated as misbehaving
pub const MAX_LIST_RESPONSE_BYTES: usize = 64 * 1024;

/// The one command sent but not yet matched to a response
#[derive(Debug, Clone)]
pub struct OutstandingCommand {
    text: String,
    expects_list: bool,
    sent_at: Instant,
    /// Partial list reply collected so far
    buffer: Vec<u8>,
}

impl OutstandingCommand {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            expects_list: expects_list_response(text),
            sent_at: Instant::now(),
            buffer: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expects_list_response(&self) -> bool {
        self.expects_list
    }

    pub fn sent_at(&self) -> Instant {
        self.sent_at
    }

    /// Bytes of a split list reply received so far
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// What a data event turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Reply to `list;`, decoded (or failed to decode)
    ControllerList(std::result::Result<ControllerList, DecodeError>),

    /// Reply to any other command
    Acknowledged { command: String, payload: String },

    /// Part of a list reply; the command stays outstanding
    Partial { buffered: usize },

    /// Data with no command outstanding; discarded
    Unsolicited { payload: String },
}

/// Tracks the outstanding command and matches data against it
#[derive(Debug, Default)]
pub struct CommandCorrelator {
    outstanding: Option<OutstandingCommand>,
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command that is about to be written.
    ///
    /// Fails with [`Error::CommandPending`] if another command has not been
    /// answered yet; the existing correlation is left untouched.
    pub fn begin(&mut self, command_text: &str) -> Result<()> {
        if let Some(pending) = &self.outstanding {
            warn!(
                "Rejecting '{}': '{}' is still outstanding",
                command_text, pending.text
            );
            return Err(Error::command_pending(pending.text.clone()));
        }

        debug!("Outstanding command: '{}'", command_text);
        self.outstanding = Some(OutstandingCommand::new(command_text));
        Ok(())
    }

    /// Drop the outstanding command (write failed or transport torn down)
    pub fn clear(&mut self) -> Option<OutstandingCommand> {
        self.outstanding.take()
    }

    pub fn outstanding(&self) -> Option<&OutstandingCommand> {
        self.outstanding.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_none()
    }

    /// Classify one data event from the transport
    pub fn handle_data(&mut self, data: &[u8]) -> Correlation {
        let Some(mut command) = self.outstanding.take() else {
            let payload = String::from_utf8_lossy(data).into_owned();
            warn!("Discarding data with no outstanding command: {:?}", payload);
            return Correlation::Unsolicited { payload };
        };

        debug!("Got response for command '{}'", command.text);

        if !command.expects_list {
            let payload = String::from_utf8_lossy(data).into_owned();
            info!("Hub acknowledged '{}': {}", command.text, payload.trim_end());
            return Correlation::Acknowledged {
                command: command.text,
                payload,
            };
        }

        command.buffer.extend_from_slice(data);
        if command.buffer.len() > MAX_LIST_RESPONSE_BYTES {
            warn!(
                "Controller list reply reached {} bytes, giving up",
                command.buffer.len()
            );
            return Correlation::ControllerList(Err(DecodeError::Malformed(format!(
                "controller list exceeds {} bytes",
                MAX_LIST_RESPONSE_BYTES
            ))));
        }

        match scan_controller_list(&command.buffer) {
            DecodeOutcome::Complete(result) => Correlation::ControllerList(result),
            DecodeOutcome::Incomplete => {
                let buffered = command.buffer.len();
                trace!("Buffered {} bytes of controller list", buffered);
                self.outstanding = Some(command);
                Correlation::Partial { buffered }
            }
        }
    }

    /// Remove the outstanding command if it has waited longer than `timeout`.
    ///
    /// Returns the text of the expired command.
    pub fn take_stale(&mut self, timeout: Duration) -> Option<String> {
        let expired = self
            .outstanding
            .as_ref()
            .is_some_and(|c| c.sent_at.elapsed() > timeout);

        if expired {
            self.outstanding.take().map(|c| c.text)
        } else {
            None
        }
    }
}
