use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{encode_token, DEFAULT_PORT, MAX_TOKEN_VALUE, TERMINATE_KEYWORD};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection to {addr} refused")]
    ConnectionRefused { addr: String },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address to connect to
    pub server_addr: String,
    /// Number of tokens to send
    pub count: usize,
    /// Pause after each token
    pub interval: Duration,
    /// Whether to finish with the termination keyword
    pub send_terminate: bool,
    /// Seed for reproducible tokens
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            count: 10,
            interval: Duration::ZERO,
            send_terminate: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSummary {
    pub sent: usize,
    pub terminated: bool,
}

/// Scripted sender streaming random tokens to the server
pub struct Client {
    config: ClientConfig,
    rng: StdRng,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Client { config, rng }
    }

    /// Next random token, zero-padded and newline-terminated
    pub fn next_token(&mut self) -> String {
        encode_token(self.rng.gen_range(0..=MAX_TOKEN_VALUE))
    }

    pub async fn run(&mut self) -> Result<SendSummary, ClientError> {
        let addr = self.config.server_addr.clone();
        let mut stream = TcpStream::connect(&addr).await.map_err(|source| {
            if source.kind() == io::ErrorKind::ConnectionRefused {
                ClientError::ConnectionRefused { addr: addr.clone() }
            } else {
                ClientError::Connect {
                    addr: addr.clone(),
                    source,
                }
            }
        })?;
        info!("Connected to {}", addr);

        let tokens: Vec<String> = (0..self.config.count).map(|_| self.next_token()).collect();
        let summary = send_tokens(
            &mut stream,
            tokens,
            self.config.interval,
            self.config.send_terminate,
        )
        .await?;

        stream.shutdown().await?;
        info!("Sent {} numbers to {}", summary.sent, addr);
        Ok(summary)
    }
}

/// Writes each token, then the keyword without a trailing newline
pub async fn send_tokens<W, I>(
    writer: &mut W,
    tokens: I,
    interval: Duration,
    send_terminate: bool,
) -> Result<SendSummary, ClientError>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = String>,
{
    let mut sent = 0;

    for token in tokens {
        writer.write_all(token.as_bytes()).await?;
        debug!("Sent {}", token.trim_end());
        sent += 1;

        if !interval.is_zero() {
            sleep(interval).await;
        }
    }

    if send_terminate {
        writer.write_all(TERMINATE_KEYWORD.as_bytes()).await?;
    }
    writer.flush().await?;

    Ok(SendSummary {
        sent,
        terminated: send_terminate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn seeded(seed: u64) -> Client {
        Client::new(ClientConfig {
            seed: Some(seed),
            ..ClientConfig::default()
        })
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:4000");
        assert_eq!(config.count, 10);
        assert!(config.send_terminate);
    }

    #[test]
    fn test_tokens_are_fixed_width_digits() {
        let mut client = seeded(7);

        for _ in 0..100 {
            let token = client.next_token();
            assert_eq!(token.len(), 10);
            assert!(token.ends_with('\n'));
            assert!(token.trim_end().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_same_seed_same_tokens() {
        let mut a = seeded(42);
        let mut b = seeded(42);

        let first: Vec<String> = (0..20).map(|_| a.next_token()).collect();
        let second: Vec<String> = (0..20).map(|_| b.next_token()).collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_send_tokens_then_keyword() {
        let mut mock = Builder::new()
            .write(b"000000001\n")
            .write(b"000000002\n")
            .write(b"terminate")
            .build();

        let summary = send_tokens(
            &mut mock,
            vec!["000000001\n".to_string(), "000000002\n".to_string()],
            Duration::ZERO,
            true,
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            SendSummary {
                sent: 2,
                terminated: true
            }
        );
    }

    #[tokio::test]
    async fn test_send_tokens_without_keyword() {
        let mut mock = Builder::new().write(b"000000003\n").build();

        let summary = send_tokens(&mut mock, vec!["000000003\n".to_string()], Duration::ZERO, false)
            .await
            .unwrap();

        assert_eq!(summary.sent, 1);
        assert!(!summary.terminated);
    }

    #[tokio::test]
    async fn test_write_error_is_reported() {
        let mut mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            .build();

        let result = send_tokens(&mut mock, vec!["1\n".to_string()], Duration::ZERO, true).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = Client::new(ClientConfig {
            server_addr: addr.to_string(),
            ..ClientConfig::default()
        });

        assert!(matches!(
            client.run().await,
            Err(ClientError::ConnectionRefused { .. })
        ));
    }
}
