//! # blinds-core - Core Domain Types
//!
//! Foundation crate for Blinds Control. Provides domain types, error handling,
//! event definitions, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`ConnectionStatus`] - State of the hub connection
//! - [`ControllerDescriptor`], [`ControllerList`] - Controllers reported by the hub
//! - [`Operation`] - Up / Down / My / Prog
//! - [`ConnectionIntent`] - Persisted user intent (address, auto-connect, selection)
//!
//! ### Events (`events`)
//! - [`TransportEvent`], [`TransportMessage`] - Events from a hub connection
//! - [`LifecycleEvent`] - Foreground/background signal
//! - [`SessionEvent`] - Notifications for the host UI
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with transport/protocol/persistence classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use blinds_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use events::{ConnectionId, LifecycleEvent, SessionEvent, TransportEvent, TransportMessage};
pub use types::{
    is_addressable_name, ConnectionIntent, ConnectionStatus, ControllerDescriptor, ControllerList,
    Operation, DEFAULT_ADDRESS, HUB_PORT,
};
