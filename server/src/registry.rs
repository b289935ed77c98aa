//! Connection lifecycle management for the event loop
//!
//! The registry is owned by the event loop task and is never shared. Each
//! accepted socket gets a reader task that performs bounded reads and forwards
//! the raw bytes as [`ConnectionEvent`]s; decoding and every state change
//! happen back in the event loop. Closing a connection aborts its reader,
//! which drops the socket.

use log::{error, info};
use shared::LineDecoder;
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type ConnectionId = u32;

/// Messages sent from reader tasks to the event loop
#[derive(Debug)]
pub enum ConnectionEvent {
    Data { id: ConnectionId, bytes: Vec<u8> },
    Closed { id: ConnectionId },
    Failed { id: ConnectionId, error: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Reading,
    Closed,
}

/// An open client connection and its framing state
#[derive(Debug)]
pub struct Connection {
    /// Identifier assigned by the registry
    pub id: ConnectionId,
    /// Remote address reported by `accept`
    pub peer: SocketAddr,
    pub state: ConnectionState,
    /// Leftover partial token between reads
    pub decoder: LineDecoder,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new(id: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            state: ConnectionState::Accepted,
            decoder: LineDecoder::new(),
            reader: None,
        }
    }

    fn start_reading(&mut self, reader: JoinHandle<()>) {
        self.reader = Some(reader);
        self.state = ConnectionState::Reading;
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.state = ConnectionState::Closed;
    }
}

/// Ordered collection of live connections
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
    next_id: ConnectionId,
    read_buffer_size: usize,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionRegistry {
    pub fn new(events_tx: mpsc::UnboundedSender<ConnectionEvent>, read_buffer_size: usize) -> Self {
        Self {
            connections: Vec::new(),
            next_id: 1,
            read_buffer_size,
            events_tx,
        }
    }

    /// Registers a freshly accepted socket and starts reading from it
    pub fn accept(&mut self, stream: TcpStream, peer: SocketAddr) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;

        let mut connection = Connection::new(id, peer);
        let reader = spawn_reader(id, stream, self.read_buffer_size, self.events_tx.clone());
        connection.start_reading(reader);

        info!("Connection {} accepted from {}", id, peer);
        self.connections.push(connection);
        id
    }

    /// Closes and removes a connection.
    ///
    /// Returns the closed record, or None if it was already removed.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let index = self.connections.iter().position(|c| c.id == id)?;
        let mut connection = self.connections.remove(index);
        connection.close();
        info!("Connection {} from {} closed", id, connection.peer);
        Some(connection)
    }

    /// Finds a live connection by ID
    ///
    /// Used by the event loop to reach a connection's decoder. Returns None
    /// once the connection has been removed.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id == id)
    }

    /// Snapshot of the live connections in accept order
    pub fn list(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.connections.iter().map(|c| (c.id, c.peer)).collect()
    }

    /// Closes every remaining connection, returning how many were open
    pub fn close_all(&mut self) -> usize {
        let count = self.connections.len();
        for mut connection in self.connections.drain(..) {
            connection.close();
        }
        if count > 0 {
            info!("Closed {} remaining connections", count);
        }
        count
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Spawns the task pumping bytes from a socket into the event loop
fn spawn_reader(
    id: ConnectionId,
    mut stream: TcpStream,
    buffer_size: usize,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];

        loop {
            let event = match stream.read(&mut buffer).await {
                Ok(0) => ConnectionEvent::Closed { id },
                Ok(len) => ConnectionEvent::Data {
                    id,
                    bytes: buffer[..len].to_vec(),
                },
                Err(error) => ConnectionEvent::Failed { id, error },
            };
            let last = !matches!(event, ConnectionEvent::Data { .. });

            if let Err(e) = events_tx.send(event) {
                error!("Failed to forward event for connection {}: {}", id, e);
                break;
            }
            if last {
                break;
            }
        }
    })
}
