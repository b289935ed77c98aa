//! Server network layer: listener, event loop and shutdown coordination

use crate::config::ServerConfig;
use crate::dedup::{DedupStore, Observation, StatsSnapshot};
use crate::error::ServerError;
use crate::persist::persist_tokens;
use crate::registry::{ConnectionEvent, ConnectionId, ConnectionRegistry};
use crate::reporter::{PeriodicReporter, ReporterHandle};
use log::{debug, error, info, warn};
use shared::{is_terminate, CodecError};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Terminating,
    Stopped,
}

/// Final counters reported once the server stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub unique: u64,
    pub duplicates: u64,
    /// Output file, or None if persisting failed
    pub persisted: Option<PathBuf>,
}

/// What the event loop should do after a batch of tokens
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Terminate,
    Drop(CodecError),
}

/// Binds `primary`, switching to `fallback` if that fails
pub async fn bind_with_fallback(primary: &str, fallback: &str) -> Result<TcpListener, ServerError> {
    match TcpListener::bind(primary).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!(
                "The address {} is unavailable ({}), switching to {}",
                primary, e, fallback
            );
            TcpListener::bind(fallback)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: fallback.to_string(),
                    source,
                })
        }
    }
}

/// TCP server deduplicating newline-delimited tokens from all clients
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: ConnectionRegistry,
    store: DedupStore,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    reporter: Option<ReporterHandle>,
    report_interval: Duration,
    output_path: PathBuf,
    state: ServerState,
    summary: Option<ShutdownSummary>,
}

impl Server {
    /// Creates a server bound to the configured address
    ///
    /// Validates the configuration and falls back to the fallback port if the
    /// main one cannot be bound. The reporter is not started until the server
    /// runs.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = bind_with_fallback(&config.address(), &config.fallback_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            local_addr,
            registry: ConnectionRegistry::new(events_tx, config.read_buffer_size),
            store: DedupStore::new(),
            events_rx,
            reporter: None,
            report_interval: config.report_interval,
            output_path: config.output_path,
            state: ServerState::Running,
            summary: None,
        })
    }

    /// Address actually bound, which may be the fallback port
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Read access to the dedup store
    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Returns the number of open client connections
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Live counters, readable from any task
    pub fn stats(&self) -> watch::Receiver<StatsSnapshot> {
        self.store.subscribe()
    }

    /// Runs until a client sends the termination keyword
    pub async fn run(&mut self) -> Result<ShutdownSummary, ServerError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs until the termination keyword arrives or `shutdown_signal` resolves,
    /// then shuts down and returns the final counters
    pub async fn run_until<F>(&mut self, shutdown_signal: F) -> Result<ShutdownSummary, ServerError>
    where
        F: Future,
    {
        if self.state == ServerState::Running {
            self.reporter = Some(PeriodicReporter::spawn(
                self.store.subscribe(),
                self.report_interval,
            ));
            info!("Server started successfully");
        }

        tokio::pin!(shutdown_signal);

        while self.state == ServerState::Running {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            self.registry.accept(stream, peer);
                        }
                        Err(e) => accept_backoff(e).await,
                    }
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                },

                _ = &mut shutdown_signal => {
                    info!("Shutdown signal received");
                    self.state = ServerState::Terminating;
                },
            }
        }

        Ok(self.shutdown().await)
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Data { id, bytes } => self.handle_data(id, &bytes),
            ConnectionEvent::Closed { id } => self.handle_closed(id),
            ConnectionEvent::Failed { id, error } => {
                warn!("Read from connection {} failed: {}", id, error);
                self.registry.remove(id);
            }
        }
    }

    /// Decodes a chunk and feeds its tokens to the dedup store
    fn handle_data(&mut self, id: ConnectionId, bytes: &[u8]) {
        let Some(connection) = self.registry.get_mut(id) else {
            debug!("Ignoring data for closed connection {}", id);
            return;
        };

        let peer = connection.peer;
        let tokens = connection.decoder.decode(bytes);
        // The keyword also counts when it is the unterminated tail of a read
        let trailing_terminate = is_terminate(connection.decoder.pending_token());

        match observe_tokens(&mut self.store, peer, tokens) {
            Flow::Terminate => self.begin_termination(peer),
            Flow::Continue if trailing_terminate => self.begin_termination(peer),
            Flow::Continue => {}
            Flow::Drop(e) => {
                warn!("Dropping connection {} from {}: {}", id, peer, e);
                self.registry.remove(id);
            }
        }
    }

    /// Removes a connection whose peer closed, keeping any final fragment
    fn handle_closed(&mut self, id: ConnectionId) {
        let Some(mut connection) = self.registry.remove(id) else {
            return;
        };

        if let Some(token) = connection.decoder.finish() {
            match observe_tokens(&mut self.store, connection.peer, std::iter::once(token)) {
                Flow::Terminate => self.begin_termination(connection.peer),
                Flow::Continue => {}
                Flow::Drop(e) => warn!(
                    "Discarding final fragment from {}: {}",
                    connection.peer, e
                ),
            }
        }
    }

    fn begin_termination(&mut self, peer: SocketAddr) {
        info!("Termination requested by {}", peer);
        self.state = ServerState::Terminating;
    }

    /// Closes all connections, stops the reporter and persists the unique tokens.
    ///
    /// Only the first call does any work; later calls return the same summary.
    pub async fn shutdown(&mut self) -> ShutdownSummary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }

        self.state = ServerState::Terminating;
        self.registry.close_all();

        if let Some(reporter) = self.reporter.take() {
            reporter.stop().await;
        }

        let snapshot = self.store.snapshot();
        let persisted = match persist_tokens(&self.output_path, self.store.tokens()).await {
            Ok(count) => {
                info!(
                    "Wrote {} unique numbers to {}",
                    count,
                    self.output_path.display()
                );
                Some(self.output_path.clone())
            }
            Err(e) => {
                error!("Skipping persistence: {}", e);
                None
            }
        };

        info!(
            "Server stopped: {} unique numbers, {} duplicates",
            snapshot.unique, snapshot.duplicates
        );

        self.state = ServerState::Stopped;
        let summary = ShutdownSummary {
            unique: snapshot.unique,
            duplicates: snapshot.duplicates,
            persisted,
        };
        self.summary = Some(summary.clone());
        summary
    }
}

/// Pauses after a failed accept; errors such as EMFILE would otherwise spin the loop
async fn accept_backoff(error: std::io::Error) {
    warn!(
        "Failed to accept connection: {}, retrying in {:?}",
        error, ACCEPT_RETRY_DELAY
    );
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

/// Applies decoded tokens in order, stopping at the keyword or the first error
fn observe_tokens<I>(store: &mut DedupStore, peer: SocketAddr, tokens: I) -> Flow
where
    I: IntoIterator<Item = Result<String, CodecError>>,
{
    for token in tokens {
        match token {
            Ok(token) if is_terminate(token.as_bytes()) => return Flow::Terminate,
            Ok(token) => match store.observe(&token) {
                Observation::New => debug!("New number {} from {}", token, peer),
                Observation::Duplicate => debug!("Duplicate number {} from {}", token, peer),
            },
            Err(e) => return Flow::Drop(e),
        }
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn peer() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_config(output_dir: &Path) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            fallback_port: 0,
            report_interval: Duration::from_secs(60),
            output_path: output_dir.join("numbers.log"),
            ..ServerConfig::default()
        }
    }

    fn tokens(items: &[&str]) -> Vec<Result<String, CodecError>> {
        items.iter().map(|s| Ok(s.to_string())).collect()
    }

    #[test]
    fn test_observe_tokens_counts_duplicates() {
        let mut store = DedupStore::new();
        let flow = observe_tokens(&mut store, peer(), tokens(&["1", "2", "1"]));

        assert_eq!(flow, Flow::Continue);
        assert_eq!(store.snapshot().unique, 2);
        assert_eq!(store.snapshot().duplicates, 1);
    }

    #[test]
    fn test_observe_tokens_stops_at_keyword() {
        let mut store = DedupStore::new();
        let flow = observe_tokens(&mut store, peer(), tokens(&["1", "terminate", "2"]));

        assert_eq!(flow, Flow::Terminate);
        assert!(store.contains("1"));
        assert!(!store.contains("2"));
    }

    #[test]
    fn test_observe_tokens_stops_at_decode_error() {
        let mut store = DedupStore::new();
        let batch = vec![
            Ok("1".to_string()),
            Err(CodecError::InvalidUtf8 { valid_up_to: 0 }),
            Ok("2".to_string()),
        ];

        let flow = observe_tokens(&mut store, peer(), batch);

        assert_eq!(flow, Flow::Drop(CodecError::InvalidUtf8 { valid_up_to: 0 }));
        assert_eq!(store.snapshot().unique, 1);
    }

    #[tokio::test]
    async fn test_accept_backoff_waits_before_retry() {
        let start = tokio::time::Instant::now();
        accept_backoff(std::io::Error::new(std::io::ErrorKind::Other, "too many open files")).await;
        assert!(start.elapsed() >= ACCEPT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_events_update_store_and_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::new(test_config(dir.path())).await.unwrap();
        let _client = TcpStream::connect(server.local_addr()).await.unwrap();
        let (stream, peer) = server.listener.accept().await.unwrap();
        let id = server.registry.accept(stream, peer);
        assert_eq!(server.connection_count(), 1);

        server.handle_event(ConnectionEvent::Data {
            id,
            bytes: b"000000001\n000000001\n0000".to_vec(),
        });
        assert_eq!(server.store().unique_count(), 1);
        assert_eq!(server.store().duplicate_count(), 1);
        assert_eq!(server.state(), ServerState::Running);

        // A trailing keyword followed by \r stops the server while the peer is still connected
        server.handle_event(ConnectionEvent::Data {
            id,
            bytes: b"00002\nterminate\r".to_vec(),
        });
        assert!(server.store().contains("000000002"));
        assert_eq!(server.state(), ServerState::Terminating);
        assert_eq!(server.connection_count(), 1);

        server.handle_event(ConnectionEvent::Closed { id });
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.store().unique_count(), 2);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_with_fallback_uses_primary_when_free() {
        let listener = bind_with_fallback("127.0.0.1:0", "127.0.0.1:0").await.unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn test_bind_with_fallback_switches_when_port_taken() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = occupied.local_addr().unwrap();

        let listener = bind_with_fallback(&taken.to_string(), "127.0.0.1:0")
            .await
            .unwrap();

        assert_ne!(listener.local_addr().unwrap().port(), taken.port());
    }

    #[tokio::test]
    async fn test_bind_fails_when_both_ports_taken() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = occupied.local_addr().unwrap().to_string();

        let result = bind_with_fallback(&taken, &taken).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            read_buffer_size: 0,
            ..test_config(dir.path())
        };

        assert!(matches!(
            Server::new(config).await,
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::new(test_config(dir.path())).await.unwrap();

        let first = server.shutdown().await;
        let second = server.shutdown().await;

        assert_eq!(first, second);
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(first.persisted, Some(dir.path().join("numbers.log")));
    }

    #[tokio::test]
    async fn test_shutdown_survives_persist_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            output_path: dir.path().join("missing").join("numbers.log"),
            ..test_config(dir.path())
        };
        let mut server = Server::new(config).await.unwrap();

        let summary = server.shutdown().await;

        assert_eq!(summary.persisted, None);
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::new(test_config(dir.path())).await.unwrap();

        let summary = timeout(Duration::from_secs(5), server.run_until(async {}))
            .await
            .expect("server did not stop")
            .unwrap();

        assert_eq!(summary.unique, 0);
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_terminate_closes_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::new(test_config(dir.path())).await.unwrap();
        let addr = server.local_addr();

        let handle = tokio::spawn(async move { server.run().await });

        let mut idle = TcpStream::connect(addr).await.unwrap();
        let mut sender = TcpStream::connect(addr).await.unwrap();
        sender.write_all(b"000000001\nterminate\n").await.unwrap();

        let summary = timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(summary.unique, 1);

        let mut buf = [0u8; 8];
        let read = timeout(Duration::from_secs(5), idle.read(&mut buf))
            .await
            .expect("idle connection was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
