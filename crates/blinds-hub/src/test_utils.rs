//! Test utilities for hub transports
//!
//! [`MockTransport`] records what the session opens, writes and closes, and
//! lets a test inject transport events as if they came from the hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use blinds_core::prelude::*;
use blinds_core::{ConnectionId, TransportEvent, TransportMessage};

use super::transport::{Transport, TransportHandle};

/// One `open` call seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    pub address: String,
    pub port: u16,
    pub connection: ConnectionId,
}

#[derive(Default)]
struct MockState {
    opens: Vec<OpenRecord>,
    senders: HashMap<ConnectionId, mpsc::Sender<TransportMessage>>,
    writes: HashMap<ConnectionId, Vec<String>>,
    closed: Vec<ConnectionId>,
    fail_writes: bool,
}

/// In-memory [`Transport`] that never touches the network.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// session.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock transport state poisoned")
    }

    /// Make every subsequent `write` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Deliver an event as if the given connection produced it
    pub async fn emit(&self, connection: ConnectionId, event: TransportEvent) {
        let sender = self
            .state()
            .senders
            .get(&connection)
            .cloned()
            .expect("emit on a connection that was never opened");
        sender
            .send(TransportMessage::new(connection, event))
            .await
            .expect("session event receiver dropped");
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.state().opens.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state().opens.len()
    }

    /// Connection from the most recent `open`
    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.state().opens.last().map(|o| o.connection)
    }

    /// Everything written on one connection, in order
    pub fn writes(&self, connection: ConnectionId) -> Vec<String> {
        self.state()
            .writes
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_closed(&self, connection: ConnectionId) -> bool {
        self.state().closed.contains(&connection)
    }
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn open(
        &mut self,
        address: &str,
        port: u16,
        connection: ConnectionId,
        events: mpsc::Sender<TransportMessage>,
    ) -> MockHandle {
        let mut state = self.state();
        state.opens.push(OpenRecord {
            address: address.to_string(),
            port,
            connection,
        });
        state.senders.insert(connection, events);
        drop(state);

        MockHandle {
            connection,
            transport: self.clone(),
            closed: false,
        }
    }
}

/// Handle returned by [`MockTransport::open`]
pub struct MockHandle {
    connection: ConnectionId,
    transport: MockTransport,
    closed: bool,
}

impl TransportHandle for MockHandle {
    fn connection(&self) -> ConnectionId {
        self.connection
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::transport("socket is closed"));
        }

        let mut state = self.transport.state();
        if state.fail_writes {
            return Err(Error::transport("simulated write failure"));
        }
        state
            .writes
            .entry(self.connection)
            .or_default()
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.transport.state().closed.push(self.connection);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_writes_and_events() {
        let mut transport = MockTransport::new();
        let probe = transport.clone();
        let (tx, mut rx) = mpsc::channel(4);

        let connection = ConnectionId::next();
        let mut handle = transport.open("10.0.0.5", 1234, connection, tx);

        assert_eq!(probe.open_count(), 1);
        assert_eq!(probe.last_connection(), Some(connection));
        assert_eq!(probe.opens()[0].address, "10.0.0.5");

        handle.write(b"list;").unwrap();
        assert_eq!(probe.writes(connection), vec!["list;"]);

        probe.emit(connection, TransportEvent::Connected).await;
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.connection, connection);
        assert_eq!(msg.event, TransportEvent::Connected);
    }

    #[test]
    fn test_mock_close_and_fail_writes() {
        let mut transport = MockTransport::new();
        let (tx, _rx) = mpsc::channel(4);
        let connection = ConnectionId::next();
        let mut handle = transport.open("h", 1, connection, tx);

        transport.set_fail_writes(true);
        assert!(handle.write(b"list;").is_err());
        transport.set_fail_writes(false);

        handle.close();
        handle.close();
        assert!(transport.is_closed(connection));
        assert!(handle.write(b"list;").is_err());
        assert!(transport.writes(connection).is_empty());
    }
}
