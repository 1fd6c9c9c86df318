//! Connection session state machine
//!
//! A [`Session`] owns the single hub connection, the in-memory
//! [`ConnectionIntent`], and the controller list fetched from the hub. It is
//! driven by one task (see [`crate::engine::Engine`]) and reports every
//! observable change as a [`SessionEvent`].
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──Connected──▶ Connected
//!      ▲                        │                        │
//!      │                      Error                  Error / disconnect
//!      └──────disconnect───── Error ◀──────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use blinds_core::prelude::*;
use blinds_core::{
    ConnectionId, ConnectionIntent, ConnectionStatus, ControllerDescriptor, ControllerList,
    Operation, SessionEvent, TransportEvent, TransportMessage, DEFAULT_ADDRESS, HUB_PORT,
};
use blinds_hub::{
    CommandCorrelator, Correlation, HubCommand, Transport, TransportHandle,
    DEFAULT_COMMAND_TIMEOUT,
};

use crate::config::Settings;
use crate::intent::{load_intent, save_intent};
use crate::store::KeyValueStore;

/// Capacity of the session event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for a [`Session`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Hub port. Always [`HUB_PORT`] outside of tests.
    pub port: u16,

    /// Address used when no intent has been stored
    pub default_address: String,

    /// How long a command may wait for its reply before the connection is dropped
    pub command_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: HUB_PORT,
            default_address: DEFAULT_ADDRESS.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            port: HUB_PORT,
            default_address: settings.connection.default_address.clone(),
            command_timeout: settings.connection.command_timeout(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// The connection session manager
pub struct Session<T: Transport, S: KeyValueStore> {
    transport: T,
    store: S,
    options: SessionOptions,

    status: ConnectionStatus,
    intent: ConnectionIntent,

    /// `None` until a list has been decoded on the current connection
    controllers: Option<ControllerList>,

    /// Handle of the current connection; events from any other are ignored
    connection: Option<T::Handle>,

    correlator: CommandCorrelator,

    /// Handed to every connection the transport opens
    transport_tx: mpsc::Sender<TransportMessage>,

    event_tx: broadcast::Sender<SessionEvent>,
}

impl<T: Transport, S: KeyValueStore> Session<T, S> {
    /// Create a disconnected session.
    ///
    /// Transport events for this session arrive on the receiver paired with
    /// `transport_tx` and must be fed back through [`Session::handle_transport`].
    pub fn new(
        transport: T,
        store: S,
        options: SessionOptions,
        transport_tx: mpsc::Sender<TransportMessage>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let intent = ConnectionIntent::new(options.default_address.clone());

        Self {
            transport,
            store,
            options,
            status: ConnectionStatus::Disconnected,
            intent,
            controllers: None,
            connection: None,
            correlator: CommandCorrelator::new(),
            transport_tx,
            event_tx,
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    // ─────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn intent(&self) -> &ConnectionIntent {
        &self.intent
    }

    pub fn address(&self) -> &str {
        &self.intent.desired_address
    }

    pub fn controllers(&self) -> Option<&ControllerList> {
        self.controllers.as_ref()
    }

    /// Controller on the page the user is looking at
    pub fn selected_controller(&self) -> Option<&ControllerDescriptor> {
        self.controllers
            .as_ref()
            .and_then(|list| list.get(self.intent.selected_controller_index))
    }

    /// ID of the live connection, if any
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|h| h.connection())
    }

    /// Text of the command still waiting for a reply
    pub fn outstanding_command(&self) -> Option<&str> {
        self.correlator.outstanding().map(|c| c.text())
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────

    /// App came to the foreground: restore intent and reconnect if wanted
    pub async fn activate(&mut self) {
        self.intent = load_intent(&self.store, &self.options.default_address).await;
        info!(
            "Activated with address {} (stay connected: {})",
            self.intent.desired_address, self.intent.should_stay_connected
        );

        self.emit(SessionEvent::AddressChanged(
            self.intent.desired_address.clone(),
        ));
        self.emit(SessionEvent::SelectionChanged(
            self.intent.selected_controller_index,
        ));

        if self.intent.should_stay_connected {
            self.connect(false);
        }
    }

    /// App went to the background: drop the connection, keep the intent
    pub async fn deactivate(&mut self) {
        if self.status.is_active() {
            self.disconnect(false);
        }
        self.persist_intent().await;
    }

    // ─────────────────────────────────────────────────────────
    // Connection control
    // ─────────────────────────────────────────────────────────

    /// Open a connection to the desired address.
    ///
    /// No-op while connecting or connected.
    pub fn connect(&mut self, user_initiated: bool) {
        if self.status.is_active() {
            debug!("connect ignored: already {}", self.status);
            return;
        }

        if user_initiated {
            self.intent.should_stay_connected = true;
        }

        // Nothing from an earlier attempt may outlive it
        self.retire_connection();

        let connection = ConnectionId::next();
        let handle = self.transport.open(
            &self.intent.desired_address,
            self.options.port,
            connection,
            self.transport_tx.clone(),
        );
        self.connection = Some(handle);
        self.set_status(ConnectionStatus::Connecting);
    }

    /// Close the connection.
    ///
    /// No-op while disconnected. From `Error`, only a user disconnect has an
    /// effect: it clears the stay-connected flag and resets the status.
    pub fn disconnect(&mut self, user_initiated: bool) {
        match self.status {
            ConnectionStatus::Disconnected => {
                debug!("disconnect ignored: already disconnected");
                return;
            }
            ConnectionStatus::Error if !user_initiated => {
                debug!("disconnect ignored: connection already failed");
                return;
            }
            _ => {}
        }

        if user_initiated {
            self.intent.should_stay_connected = false;
        }

        self.retire_connection();
        self.set_status(ConnectionStatus::Disconnected);
        self.clear_controllers();
    }

    /// The Connect/Disconnect button
    pub fn toggle_connection(&mut self) {
        if self.status == ConnectionStatus::Connected {
            self.disconnect(true);
        } else {
            self.connect(true);
        }
    }

    /// Update the address and save the intent right away
    pub async fn set_address(&mut self, address: impl Into<String>) {
        let address = address.into();
        if address == self.intent.desired_address {
            return;
        }

        debug!("Address set to {:?}", address);
        self.intent.desired_address = address;
        self.emit(SessionEvent::AddressChanged(
            self.intent.desired_address.clone(),
        ));
        self.persist_intent().await;
    }

    /// Record which controller page the user is viewing.
    ///
    /// Clamped to the fetched list, if there is one.
    pub fn select_controller(&mut self, index: usize) {
        let index = match &self.controllers {
            Some(list) => index.min(list.len().saturating_sub(1)),
            None => index,
        };

        if index != self.intent.selected_controller_index {
            self.intent.selected_controller_index = index;
            self.emit(SessionEvent::SelectionChanged(index));
        }
    }

    // ─────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────

    /// Ask the hub for its controllers
    pub fn list_controllers(&mut self) -> Result<()> {
        self.send_command(&HubCommand::List.build())
    }

    /// Send one operation to a named controller
    pub fn operate(&mut self, controller: &str, operation: Operation) -> Result<()> {
        let command = match HubCommand::broadcast(controller, operation) {
            Ok(command) => command,
            Err(e) => {
                self.surface(&e);
                return Err(e);
            }
        };

        info!("{}", command.description());
        self.send_command(&command.build())
    }

    /// Write a raw command line to the hub.
    ///
    /// Fails (and alerts) when not connected or when a command is already
    /// outstanding. A failed write is a transport error and drops the
    /// connection.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        let result = self.try_send(command);
        if let Err(e) = &result {
            self.surface(e);
        }
        result
    }

    fn try_send(&mut self, command: &str) -> Result<()> {
        if self.status != ConnectionStatus::Connected {
            return Err(Error::NotConnected);
        }
        let Some(handle) = self.connection.as_mut() else {
            return Err(Error::NotConnected);
        };

        self.correlator.begin(command)?;

        if let Err(e) = handle.write(command.as_bytes()) {
            self.correlator.clear();
            return Err(e);
        }

        debug!("Sent '{}' on {}", command, handle.connection());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Transport events
    // ─────────────────────────────────────────────────────────

    /// Single dispatcher for everything the transport reports
    pub fn handle_transport(&mut self, message: TransportMessage) {
        if self.connection_id() != Some(message.connection) {
            debug!(
                "Ignoring {} from retired connection {}",
                message.event.kind(),
                message.connection
            );
            return;
        }

        match message.event {
            TransportEvent::Connected => self.handle_connected(),
            TransportEvent::Error(reason) => self.handle_transport_error(reason),
            TransportEvent::Data(bytes) => self.handle_data(&bytes),
        }
    }

    fn handle_connected(&mut self) {
        if self.status != ConnectionStatus::Connecting {
            warn!("Unexpected connected event while {}", self.status);
            return;
        }

        self.set_status(ConnectionStatus::Connected);
        // Failures are already surfaced
        let _ = self.list_controllers();
    }

    fn handle_transport_error(&mut self, reason: String) {
        warn!("Transport error: {}", reason);

        self.retire_connection();
        self.set_status(ConnectionStatus::Error);
        self.clear_controllers();

        let err = Error::transport(reason);
        self.emit(SessionEvent::alert(alert_title(&err), err.to_string()));
    }

    fn handle_data(&mut self, bytes: &[u8]) {
        match self.correlator.handle_data(bytes) {
            Correlation::ControllerList(Ok(list)) => self.store_controllers(list),
            Correlation::ControllerList(Err(e)) => self.surface(&e.into()),
            Correlation::Acknowledged { .. }
            | Correlation::Partial { .. }
            | Correlation::Unsolicited { .. } => {}
        }
    }

    fn store_controllers(&mut self, list: ControllerList) {
        info!("Received {} controllers", list.len());

        let max_index = list.len().saturating_sub(1);
        self.controllers = Some(list.clone());
        self.emit(SessionEvent::ControllersChanged(Some(list)));

        if self.intent.selected_controller_index > max_index {
            self.intent.selected_controller_index = max_index;
            self.emit(SessionEvent::SelectionChanged(max_index));
        }
    }

    /// Drop the connection if the outstanding command has waited too long
    pub fn check_timeouts(&mut self) {
        let timeout = self.options.command_timeout;
        if let Some(command) = self.correlator.take_stale(timeout) {
            let err = Error::transport(format!(
                "no response to '{}' within {:?}",
                command, timeout
            ));
            self.surface(&err);
        }
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    /// Alert the user; errors that break the stream also disconnect
    fn surface(&mut self, err: &Error) {
        if err.is_recoverable() {
            warn!("{}", err);
        } else {
            error!("{}", err);
        }

        self.emit(SessionEvent::alert(alert_title(err), err.to_string()));

        if err.forces_disconnect() {
            self.disconnect(false);
        }
    }

    /// Close the current handle and forget anything in flight on it
    fn retire_connection(&mut self) {
        if let Some(mut handle) = self.connection.take() {
            handle.close();
        }
        if let Some(command) = self.correlator.clear() {
            debug!("Dropped outstanding command '{}'", command.text());
        }
    }

    fn clear_controllers(&mut self) {
        if self.controllers.take().is_some() {
            self.emit(SessionEvent::ControllersChanged(None));
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!("Status: {} -> {}", self.status, status);
            self.status = status;
            self.emit(SessionEvent::StatusChanged(status));
        }
    }

    async fn persist_intent(&self) {
        if let Err(e) = save_intent(&self.store, &self.intent).await {
            warn!("Failed to save connection intent: {}", e);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

fn alert_title(err: &Error) -> &'static str {
    match err {
        Error::Transport { .. } | Error::Io(_) => "Connection error",
        Error::Protocol { .. } | Error::Json(_) => "Hub error",
        Error::NotConnected => "Not connected",
        Error::CommandPending { .. } => "Command pending",
        Error::InvalidControllerName { .. } => "Invalid controller",
        _ => "Error",
    }
}
