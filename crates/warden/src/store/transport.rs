//! Single-use connections to remote store nodes.
//!
//! A connection carries exactly one round trip (one or more pipelined
//! commands and their replies) and is dropped afterwards. Every step is
//! bounded by the configured timeout.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use warden_common::StoreError;

use super::resp::{self, DecodeError, Reply};

impl From<DecodeError> for StoreError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io(e) => StoreError::ConnectionFailed(e.to_string()),
            other => StoreError::Protocol(other.to_string()),
        }
    }
}

/// An open connection to one node
pub struct Connection {
    stream: BufReader<TcpStream>,
    address: String,
    timeout: Duration,
}

impl Connection {
    /// Connect to `address` (`host:port`), failing after `timeout`
    pub async fn open(address: &str, timeout: Duration) -> Result<Self, StoreError> {
        let stream = with_timeout(timeout, "connect", address, TcpStream::connect(address))
            .await?
            .map_err(|e| StoreError::ConnectionFailed(format!("{}: {}", address, e)))?;

        // Commands are tiny; don't wait for Nagle
        let _ = stream.set_nodelay(true);

        Ok(Self {
            stream: BufReader::new(stream),
            address: address.to_string(),
            timeout,
        })
    }

    /// Write all commands in one frame batch
    pub async fn send<A: AsRef<[u8]>>(&mut self, commands: &[Vec<A>]) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        for command in commands {
            resp::encode_into(command, &mut buf);
        }

        let address = self.address.clone();
        let stream = self.stream.get_mut();
        with_timeout(self.timeout, "write", &address, async {
            stream.write_all(&buf).await?;
            stream.flush().await
        })
        .await?
        .map_err(|e| StoreError::ConnectionFailed(format!("{}: {}", address, e)))
    }

    /// Read one reply
    pub async fn receive(&mut self) -> Result<Reply, StoreError> {
        let address = self.address.clone();
        let reply = with_timeout(self.timeout, "read", &address, resp::decode(&mut self.stream))
            .await??;
        Ok(reply)
    }

    /// Send `commands` pipelined and collect one reply per command, then close
    pub async fn round_trip<A: AsRef<[u8]>>(
        mut self,
        commands: &[Vec<A>],
    ) -> Result<Vec<Reply>, StoreError> {
        self.send(commands).await?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.receive().await?);
        }
        Ok(replies)
    }
}

/// Open a connection, run a single command, and close
pub async fn execute<A: AsRef<[u8]>>(
    address: &str,
    timeout: Duration,
    command: Vec<A>,
) -> Result<Reply, StoreError> {
    let conn = Connection::open(address, timeout).await?;
    let mut replies = conn.round_trip(&[command]).await?;
    replies
        .pop()
        .ok_or_else(|| StoreError::Protocol("missing reply".to_string()))
}

async fn with_timeout<F: Future>(
    timeout: Duration,
    step: &str,
    address: &str,
    fut: F,
) -> Result<F::Output, StoreError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout(format!("{} to {} after {:?}", step, address, timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_millis(300);

    #[tokio::test]
    async fn test_round_trip_pipelined() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"+PONG\r\n$3\r\nbar\r\n").await.unwrap();
        });

        let conn = Connection::open(&addr, TIMEOUT).await.unwrap();
        let replies = conn
            .round_trip(&[vec!["PING"], vec!["GET", "foo"]])
            .await
            .unwrap();

        assert_eq!(
            replies,
            vec![
                Reply::Status("PONG".to_string()),
                Reply::Bulk(Some(b"bar".to_vec()))
            ]
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_not_timeout() {
        // Grab a free port, then close it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = execute(&addr, TIMEOUT, vec!["PING"]).await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Hold the socket open without answering
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let err = execute(&addr, TIMEOUT, vec!["PING"]).await.unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[tokio::test]
    async fn test_closed_mid_reply_is_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"$10\r\nabc").await.unwrap();
        });

        let err = execute(&addr, TIMEOUT, vec!["GET", "k"]).await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_garbage_reply_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"HTTP/1.1 400 Bad Request\r\n").await.unwrap();
        });

        let err = execute(&addr, TIMEOUT, vec!["PING"]).await.unwrap_err();
        assert!(matches!(err, StoreError::Protocol(_)), "{err:?}");
    }
}
