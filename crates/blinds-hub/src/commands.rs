//! Command building for the controller hub's line protocol
//!
//! The hub understands exactly two request shapes:
//! - `list;` - reply is a JSON array describing the controllers
//! - `broadcast <name> <op>;` - reply is an opaque acknowledgment
//!
//! There is no escaping on the wire, so names are validated before a
//! `broadcast` line is built.

use blinds_core::prelude::*;
use blinds_core::{is_addressable_name, ControllerDescriptor, Operation};

/// Literal list-fetch command
pub const LIST_COMMAND: &str = "list;";

/// Commands understood by the controller hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand {
    /// Ask for the controller list
    List,
    /// Send an operation to one controller
    Broadcast {
        controller: String,
        operation: Operation,
    },
}

impl HubCommand {
    /// Build a `broadcast` command, rejecting names that would corrupt the line
    pub fn broadcast(controller: impl Into<String>, operation: Operation) -> Result<Self> {
        let controller = controller.into();
        if !is_addressable_name(&controller) {
            return Err(Error::invalid_controller_name(controller));
        }
        Ok(Self::Broadcast {
            controller,
            operation,
        })
    }

    /// Build a `broadcast` command for a descriptor from the controller list
    pub fn for_controller(controller: &ControllerDescriptor, operation: Operation) -> Result<Self> {
        Self::broadcast(controller.name.clone(), operation)
    }

    /// Encode as the exact text written to the hub
    pub fn build(&self) -> String {
        match self {
            HubCommand::List => LIST_COMMAND.to_string(),
            HubCommand::Broadcast {
                controller,
                operation,
            } => format!("broadcast {} {};", controller, operation.wire_word()),
        }
    }

    /// Whether the reply is a controller list (as opposed to an acknowledgment)
    pub fn expects_list_response(&self) -> bool {
        matches!(self, HubCommand::List)
    }

    /// Get a human-readable description
    pub fn description(&self) -> String {
        match self {
            HubCommand::List => "list controllers".to_string(),
            HubCommand::Broadcast {
                controller,
                operation,
            } => format!("{} {}", operation.label().to_lowercase(), controller),
        }
    }
}

/// Decide from raw command text whether the hub will answer with a list.
///
/// Raw text is what the generic send path carries, so this mirrors the
/// hub's own dispatch on the leading verb.
pub fn expects_list_response(command_text: &str) -> bool {
    command_text.trim_start().starts_with("list")
}
