//! TCP transport to the controller hub
//!
//! A [`Transport`] opens connections; each connection is represented by a
//! [`TransportHandle`] owned by the session. All I/O happens in a background
//! task that reports back through an mpsc channel of [`TransportMessage`]s,
//! each tagged with the connection's [`ConnectionId`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use blinds_core::prelude::*;
use blinds_core::{ConnectionId, TransportEvent, TransportMessage};

/// Default time allowed for the TCP handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the per-connection write queue
const WRITE_QUEUE_CAPACITY: usize = 32;

/// Size of the socket read buffer
const READ_BUFFER_SIZE: usize = 4096;

/// Opens connections to the hub
pub trait Transport: Send {
    type Handle: TransportHandle;

    /// Start connecting to `address:port`.
    ///
    /// Returns immediately. The outcome is reported on `events` as exactly
    /// one `Connected` or `Error`, followed by `Data`/`Error` events for the
    /// lifetime of the connection.
    fn open(
        &mut self,
        address: &str,
        port: u16,
        connection: ConnectionId,
        events: mpsc::Sender<TransportMessage>,
    ) -> Self::Handle;
}

/// One live (or pending) hub connection
pub trait TransportHandle: Send {
    fn connection(&self) -> ConnectionId;

    /// Queue bytes for the hub. Fails once the socket is closed.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Tear the connection down. Safe to call more than once.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

// ─────────────────────────────────────────────────────────
// TCP implementation
// ─────────────────────────────────────────────────────────

/// [`Transport`] backed by a tokio `TcpStream`
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Transport for TcpTransport {
    type Handle = TcpHandle;

    fn open(
        &mut self,
        address: &str,
        port: u16,
        connection: ConnectionId,
        events: mpsc::Sender<TransportMessage>,
    ) -> TcpHandle {
        info!("Connecting {} to {}:{}", connection, address, port);

        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_connection(
            ConnectionTarget {
                address: address.to_string(),
                port,
                connection,
                connect_timeout: self.connect_timeout,
            },
            events,
            write_rx,
            kill_rx,
            Arc::clone(&closed),
        ));

        TcpHandle {
            connection,
            write_tx,
            kill_tx: Some(kill_tx),
            closed,
        }
    }
}

/// Handle to a TCP connection task.
///
/// Dropping the handle closes the connection.
pub struct TcpHandle {
    connection: ConnectionId,
    write_tx: mpsc::Sender<Vec<u8>>,
    /// Tells the connection task to shut down. Consumed on first close.
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set once the socket is gone, by either side.
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for TcpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpHandle")
            .field("connection", &self.connection)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TransportHandle for TcpHandle {
    fn connection(&self) -> ConnectionId {
        self.connection
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport("socket is closed"));
        }

        self.write_tx
            .try_send(bytes.to_vec())
            .map_err(|e| match e {
                TrySendError::Full(_) => Error::transport("write queue is full"),
                TrySendError::Closed(_) => Error::transport("socket is closed"),
            })
    }

    fn close(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            debug!("Closing connection {}", self.connection);
            let _ = kill_tx.send(());
        }
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for TcpHandle {
    fn drop(&mut self) {
        self.close();
    }
}

struct ConnectionTarget {
    address: String,
    port: u16,
    connection: ConnectionId,
    connect_timeout: Duration,
}

/// Background task: connect, then pump reads and writes until closed.
///
/// Three ways the task can end:
/// 1. `kill_rx` fires (handle closed or dropped) - no event is emitted.
/// 2. The hub closes the socket - `Error("connection closed by hub")`.
/// 3. An I/O error - `Error(<message>)`.
async fn run_connection(
    target: ConnectionTarget,
    events: mpsc::Sender<TransportMessage>,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    mut kill_rx: oneshot::Receiver<()>,
    closed: Arc<AtomicBool>,
) {
    let connection = target.connection;
    let emit = |event: TransportEvent| TransportMessage::new(connection, event);

    let connect = tokio::time::timeout(
        target.connect_timeout,
        TcpStream::connect((target.address.as_str(), target.port)),
    );

    let stream = tokio::select! {
        result = connect => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("Connection {} failed: {}", connection, e);
                closed.store(true, Ordering::Release);
                let _ = events.send(emit(TransportEvent::Error(e.to_string()))).await;
                return;
            }
            Err(_) => {
                warn!("Connection {} timed out", connection);
                closed.store(true, Ordering::Release);
                let message = format!("connect timed out after {:?}", target.connect_timeout);
                let _ = events.send(emit(TransportEvent::Error(message))).await;
                return;
            }
        },
        _ = &mut kill_rx => {
            debug!("Connection {} closed before connecting", connection);
            closed.store(true, Ordering::Release);
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed on {}: {}", connection, e);
    }

    info!("Connection {} established", connection);
    if events.send(emit(TransportEvent::Connected)).await.is_err() {
        debug!("event channel closed");
        closed.store(true, Ordering::Release);
        return;
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = &mut kill_rx => {
                debug!("Kill signal received for connection {}", connection);
                let _ = writer.shutdown().await;
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Hub closed connection {}", connection);
                    closed.store(true, Ordering::Release);
                    let message = "connection closed by hub".to_string();
                    let _ = events.send(emit(TransportEvent::Error(message))).await;
                    break;
                }
                Ok(n) => {
                    trace!("recv {} bytes on {}", n, connection);
                    if events.send(emit(TransportEvent::Data(buf[..n].to_vec()))).await.is_err() {
                        debug!("event channel closed");
                        break;
                    }
                }
                Err(e) => {
                    error!("Read failed on {}: {}", connection, e);
                    closed.store(true, Ordering::Release);
                    let _ = events.send(emit(TransportEvent::Error(e.to_string()))).await;
                    break;
                }
            },
            Some(bytes) = write_rx.recv() => {
                debug!("Sending to hub: {}", String::from_utf8_lossy(&bytes));
                let result = match writer.write_all(&bytes).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    error!("Write failed on {}: {}", connection, e);
                    closed.store(true, Ordering::Release);
                    let _ = events.send(emit(TransportEvent::Error(e.to_string()))).await;
                    break;
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
    debug!("Connection {} task finished", connection);
}
