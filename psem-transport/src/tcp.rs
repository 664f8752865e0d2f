//! TCP transport implementation
//!
//! Used for meters reached through a network gateway or RF head-end that
//! terminates the optical link and relays service payloads over a socket.

use crate::stream::Transport;
use async_trait::async_trait;
use psem_core::{PsemError, PsemResult};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStream").finish()
    }
}

/// TCP transport settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub connect_timeout: Duration,
    /// Quiet period after the first chunk that ends a response
    pub idle_timeout: Duration,
}

impl TcpSettings {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_millis(50),
        }
    }
}

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create from an address string such as `"10.0.0.7:1153"`
    pub fn from_address(address: &str) -> PsemResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| PsemError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }

    fn stream_mut(&mut self) -> PsemResult<&mut TcpStream> {
        self.stream.as_mut().map(|s| &mut s.0).ok_or_else(|| {
            PsemError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "TCP stream not connected",
            ))
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> PsemResult<()> {
        if !self.closed {
            return Err(PsemError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let stream = tokio::time::timeout(
            self.settings.connect_timeout,
            TcpStream::connect(self.settings.address),
        )
        .await
        .map_err(|_| PsemError::Timeout)?
        .map_err(PsemError::Connection)?;

        self.stream = Some(DebugTcpStream(stream));
        self.closed = false;
        Ok(())
    }

    async fn close(&mut self) -> PsemResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.0.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn send(&mut self, payload: &[u8]) -> PsemResult<()> {
        let stream = self.stream_mut()?;
        stream.write_all(payload).await.map_err(PsemError::Connection)?;
        stream.flush().await.map_err(PsemError::Connection)
    }

    async fn receive(&mut self, timeout: Duration) -> PsemResult<Vec<u8>> {
        let idle = self.settings.idle_timeout;
        let stream = self.stream_mut()?;

        let mut buf = [0u8; 4096];
        let mut payload = Vec::new();

        // First chunk within the caller's deadline, then drain until the
        // line goes quiet.
        let n = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| PsemError::Timeout)?
            .map_err(PsemError::Connection)?;
        if n == 0 {
            self.closed = true;
            return Err(PsemError::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Connection closed by peer",
            )));
        }
        payload.extend_from_slice(&buf[..n]);

        loop {
            match tokio::time::timeout(idle, stream.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => payload.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => {
                    self.closed = true;
                    return Err(PsemError::Connection(e));
                }
            }
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_settings() {
        let addr: SocketAddr = "127.0.0.1:1153".parse().unwrap();
        let settings = TcpSettings::new(addr);
        assert_eq!(settings.address, addr);
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_from_address_rejects_garbage() {
        assert!(TcpTransport::from_address("not an address").is_err());
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let mut transport = TcpTransport::from_address("127.0.0.1:1153").unwrap();
        assert!(transport.is_closed());
        assert!(transport.send(&[0x20]).await.is_err());
    }

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0x20]);
            socket.write_all(&[0x00, 0x01, 0x02]).await.unwrap();
        });

        let mut transport = TcpTransport::new(TcpSettings::new(addr));
        transport.open().await.unwrap();
        transport.send(&[0x20]).await.unwrap();
        let response = transport
            .receive(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response, vec![0x00, 0x01, 0x02]);
        transport.close().await.unwrap();
        assert!(transport.is_closed());

        server.await.unwrap();
    }
}
