//! # blinds-hub - Controller Hub Protocol and Transport
//!
//! Speaks the hub's text protocol over TCP: builds commands, tracks the one
//! outstanding command, and decodes the controller list reply.
//!
//! Depends on [`blinds_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Commands
//! - [`HubCommand`] - `list;` and `broadcast <name> <op>;`
//! - [`CommandCorrelator`] - Match hub replies to the command that caused them
//!
//! ### Protocol Parsing
//! - [`decode_controller_list()`] - Decode a complete `list;` reply
//! - [`scan_controller_list()`] - Decode a reply that may still be arriving
//!
//! ### Transport
//! - [`Transport`], [`TransportHandle`] - Connection abstraction
//! - [`TcpTransport`] - tokio TCP implementation

pub mod commands;
pub mod correlator;
pub mod protocol;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod transport;

pub use commands::{expects_list_response, HubCommand, LIST_COMMAND};
pub use correlator::{
    CommandCorrelator, Correlation, OutstandingCommand, DEFAULT_COMMAND_TIMEOUT,
    MAX_LIST_RESPONSE_BYTES,
};
pub use protocol::{decode_controller_list, scan_controller_list, DecodeError, DecodeOutcome};
pub use transport::{
    TcpHandle, TcpTransport, Transport, TransportHandle, DEFAULT_CONNECT_TIMEOUT,
};
