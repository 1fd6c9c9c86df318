//! Event loop driving a [`Session`]
//!
//! The engine is the only place the session is touched. It `select!`s over:
//! - lifecycle transitions from the host
//! - [`SessionRequest`]s from the UI
//! - transport events from the current connection
//! - a periodic tick for command timeouts
//!
//! Each input is handled to completion before the next one is taken.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use blinds_core::prelude::*;
use blinds_core::{LifecycleEvent, Operation, SessionEvent, TransportMessage};
use blinds_hub::{TcpTransport, Transport};

use crate::config::Settings;
use crate::lifecycle::LifecycleSignal;
use crate::session::{Session, SessionOptions};
use crate::store::KeyValueStore;

/// Capacity of the request and transport channels
const CHANNEL_CAPACITY: usize = 64;

/// How often outstanding commands are checked for timeout
pub const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Something the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Connect,
    Disconnect,
    /// The single Connect/Disconnect button
    ToggleConnection,
    SetAddress(String),
    SelectController(usize),
    ListControllers,
    SendCommand(String),
    Operate {
        controller: String,
        operation: Operation,
    },
    /// Persist the intent and stop the loop
    Shutdown,
}

/// Owns a [`Session`] and feeds it every input in order
pub struct Engine<T: Transport, S: KeyValueStore> {
    session: Session<T, S>,
    transport_rx: mpsc::Receiver<TransportMessage>,
    request_tx: mpsc::Sender<SessionRequest>,
    request_rx: mpsc::Receiver<SessionRequest>,
    /// `None` once the host dropped its lifecycle signal
    lifecycle_rx: Option<broadcast::Receiver<LifecycleEvent>>,
    tick: Duration,
}

impl<S: KeyValueStore> Engine<TcpTransport, S> {
    /// Engine talking TCP to the hub, tuned from `settings`
    pub fn with_settings(settings: &Settings, store: S, lifecycle: &LifecycleSignal) -> Self {
        let transport = TcpTransport::new(settings.connection.connect_timeout());
        Self::new(
            transport,
            store,
            SessionOptions::from_settings(settings),
            lifecycle,
        )
    }
}

impl<T: Transport, S: KeyValueStore> Engine<T, S> {
    pub fn new(
        transport: T,
        store: S,
        options: SessionOptions,
        lifecycle: &LifecycleSignal,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);

        Self {
            session: Session::new(transport, store, options, transport_tx),
            transport_rx,
            request_tx,
            request_rx,
            lifecycle_rx: Some(lifecycle.subscribe()),
            tick: TIMEOUT_CHECK_INTERVAL,
        }
    }

    /// Override the timeout check interval
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sender for user requests. Clone freely.
    pub fn request_sender(&self) -> mpsc::Sender<SessionRequest> {
        self.request_tx.clone()
    }

    /// Subscribe to session events.
    ///
    /// If the subscriber falls behind, older events are dropped
    /// (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub fn session(&self) -> &Session<T, S> {
        &self.session
    }

    /// Apply one user request. Returns `false` when the loop should stop.
    pub async fn handle_request(&mut self, request: SessionRequest) -> bool {
        debug!("Request: {:?}", request);

        // Command failures are surfaced as alerts by the session
        match request {
            SessionRequest::Connect => self.session.connect(true),
            SessionRequest::Disconnect => self.session.disconnect(true),
            SessionRequest::ToggleConnection => self.session.toggle_connection(),
            SessionRequest::SetAddress(address) => self.session.set_address(address).await,
            SessionRequest::SelectController(index) => self.session.select_controller(index),
            SessionRequest::ListControllers => {
                let _ = self.session.list_controllers();
            }
            SessionRequest::SendCommand(command) => {
                let _ = self.session.send_command(&command);
            }
            SessionRequest::Operate {
                controller,
                operation,
            } => {
                let _ = self.session.operate(&controller, operation);
            }
            SessionRequest::Shutdown => {
                info!("Shutting down session engine");
                self.session.deactivate().await;
                return false;
            }
        }
        true
    }

    pub async fn handle_lifecycle(&mut self, event: LifecycleEvent) {
        info!("App became {:?}", event);
        match event {
            LifecycleEvent::Active => self.session.activate().await,
            LifecycleEvent::Inactive => self.session.deactivate().await,
        }
    }

    /// Run until a [`SessionRequest::Shutdown`] arrives
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Session engine started");

        loop {
            tokio::select! {
                lifecycle = next_lifecycle(&mut self.lifecycle_rx) => match lifecycle {
                    Ok(event) => self.handle_lifecycle(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} lifecycle events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Lifecycle signal dropped");
                        self.lifecycle_rx = None;
                    }
                },
                request = self.request_rx.recv() => match request {
                    Some(request) => {
                        if !self.handle_request(request).await {
                            break;
                        }
                    }
                    // Unreachable while the engine holds a sender
                    None => return Err(Error::ChannelClosed),
                },
                Some(message) = self.transport_rx.recv() => {
                    self.session.handle_transport(message);
                }
                _ = ticker.tick() => {
                    self.session.check_timeouts();
                }
            }
        }

        info!("Session engine stopped");
        Ok(())
    }
}

impl<T, S> Engine<T, S>
where
    T: Transport + Sync + 'static,
    T::Handle: Sync,
    S: KeyValueStore + Sync + 'static,
{
    /// Run the engine on its own task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

/// Next lifecycle event, or pending forever once the signal is gone
async fn next_lifecycle(
    rx: &mut Option<broadcast::Receiver<LifecycleEvent>>,
) -> std::result::Result<LifecycleEvent, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::INTENT_KEY;
    use crate::store::MemoryStore;
    use blinds_core::{ConnectionId, ConnectionStatus, TransportEvent};
    use blinds_hub::test_utils::MockTransport;

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session event channel closed")
    }

    async fn wait_for_status(rx: &mut broadcast::Receiver<SessionEvent>, status: ConnectionStatus) {
        loop {
            if next_event(rx).await == SessionEvent::StatusChanged(status) {
                return;
            }
        }
    }

    async fn wait_for_writes(transport: &MockTransport, connection: ConnectionId, count: usize) {
        for _ in 0..500 {
            if transport.writes(connection).len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} writes on {}", count, connection);
    }

    #[tokio::test]
    async fn test_request_handling_connects() {
        let transport = MockTransport::new();
        let lifecycle = LifecycleSignal::new();
        let mut engine = Engine::new(
            transport.clone(),
            MemoryStore::new(),
            SessionOptions::default(),
            &lifecycle,
        );

        assert!(engine.handle_request(SessionRequest::ToggleConnection).await);
        assert_eq!(engine.session().status(), ConnectionStatus::Connecting);
        assert_eq!(transport.open_count(), 1);

        assert!(engine.handle_request(SessionRequest::Disconnect).await);
        assert_eq!(engine.session().status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_persists_intent() {
        let store = MemoryStore::new();
        let lifecycle = LifecycleSignal::new();
        let mut engine = Engine::new(
            MockTransport::new(),
            store.clone(),
            SessionOptions::default(),
            &lifecycle,
        );

        engine
            .handle_request(SessionRequest::SelectController(3))
            .await;
        assert!(!engine.handle_request(SessionRequest::Shutdown).await);

        let saved = crate::intent::load_intent(&store, "unused").await;
        assert_eq!(saved.selected_controller_index, 3);
    }

    #[tokio::test]
    async fn test_run_loop_end_to_end_with_mock() {
        let transport = MockTransport::new();
        let store = MemoryStore::with_entries([(
            INTENT_KEY,
            r#"{"desiredAddress":"10.0.2.2","shouldStayConnected":true,"selectedControllerIndex":0}"#,
        )]);
        let lifecycle = LifecycleSignal::new();

        let engine = Engine::new(
            transport.clone(),
            store.clone(),
            SessionOptions::default(),
            &lifecycle,
        );
        let requests = engine.request_sender();
        let mut events = engine.subscribe();
        let task = engine.spawn();

        lifecycle.activate();
        wait_for_status(&mut events, ConnectionStatus::Connecting).await;

        let connection = transport.last_connection().unwrap();
        transport.emit(connection, TransportEvent::Connected).await;
        wait_for_status(&mut events, ConnectionStatus::Connected).await;

        transport
            .emit(
                connection,
                TransportEvent::Data(br#"[{"name":"Kitchen"}]"#.to_vec()),
            )
            .await;
        loop {
            if let SessionEvent::ControllersChanged(Some(list)) = next_event(&mut events).await {
                assert_eq!(list.names(), vec!["Kitchen"]);
                break;
            }
        }

        requests
            .send(SessionRequest::Operate {
                controller: "Kitchen".to_string(),
                operation: Operation::Down,
            })
            .await
            .unwrap();
        wait_for_writes(&transport, connection, 2).await;

        lifecycle.deactivate();
        wait_for_status(&mut events, ConnectionStatus::Disconnected).await;

        requests.send(SessionRequest::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(
            transport.writes(connection),
            vec!["list;", "broadcast Kitchen down;"]
        );
        assert!(transport.is_closed(connection));

        let saved = crate::intent::load_intent(&store, "unused").await;
        assert!(saved.should_stay_connected);
    }

    #[tokio::test]
    async fn test_run_loop_times_out_commands() {
        let transport = MockTransport::new();
        let lifecycle = LifecycleSignal::new();
        let options = SessionOptions::default().with_command_timeout(Duration::from_millis(20));

        let engine = Engine::new(transport.clone(), MemoryStore::new(), options, &lifecycle)
            .with_tick(Duration::from_millis(5));
        let requests = engine.request_sender();
        let mut events = engine.subscribe();
        let task = engine.spawn();

        requests.send(SessionRequest::Connect).await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Connecting).await;
        let connection = transport.last_connection().unwrap();
        transport.emit(connection, TransportEvent::Connected).await;
        wait_for_status(&mut events, ConnectionStatus::Connected).await;

        // Hub never answers list;
        let mut alerted = false;
        loop {
            match next_event(&mut events).await {
                SessionEvent::Alert { message, .. } => {
                    assert!(message.contains("no response"));
                    alerted = true;
                }
                SessionEvent::StatusChanged(ConnectionStatus::Disconnected) => break,
                _ => {}
            }
        }
        assert!(alerted);

        requests.send(SessionRequest::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }
}
