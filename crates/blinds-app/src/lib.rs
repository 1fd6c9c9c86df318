//! # blinds-app - Connection Session Manager
//!
//! Owns the lifetime of the hub connection for a Blinds Control front-end:
//! restores and persists what the user wants, follows the host between
//! foreground and background, and turns hub replies into [`SessionEvent`]s.
//!
//! ## Public API
//!
//! ### Engine
//! - [`Engine`] - Event loop over lifecycle, requests, transport events and timeouts
//! - [`SessionRequest`] - User requests accepted by the engine
//! - [`LifecycleSignal`] - Foreground/background notifier injected by the host
//!
//! ### Session
//! - [`Session`] - Connection state machine
//! - [`SessionOptions`] - Port, default address and command timeout
//!
//! ### Persistence
//! - [`KeyValueStore`] - Async get/set contract
//! - [`MemoryStore`], [`FileStore`] - Bundled adapters
//! - [`load_intent()`], [`save_intent()`] - The persisted connection intent
//!
//! ### Configuration
//! - [`Settings`] - `config.toml` contents
//! - [`load_user_settings()`], [`save_settings()`]
//!
//! [`SessionEvent`]: blinds_core::SessionEvent

pub mod config;
pub mod engine;
pub mod intent;
pub mod lifecycle;
pub mod session;
pub mod store;

pub use config::{load_settings, load_user_settings, save_settings, Settings};
pub use engine::{Engine, SessionRequest};
pub use intent::{load_intent, save_intent};
pub use lifecycle::LifecycleSignal;
pub use session::{Session, SessionOptions};
pub use store::{FileStore, KeyValueStore, MemoryStore};
