//! Serial port transport implementation
//!
//! Talks to a meter through an optical probe or direct serial line. The
//! probe's link layer delivers whole service payloads; a response is taken
//! to be complete once the line has been quiet for the inter-character
//! timeout.

use crate::stream::Transport;
use async_trait::async_trait;
use psem_core::{PsemError, PsemResult};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

/// Serial transport settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    /// Quiet period after the first chunk that ends a response
    pub idle_timeout: Duration,
}

impl SerialSettings {
    /// 8N1, no flow control
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
            idle_timeout: Duration::from_millis(50),
        }
    }
}

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    pub fn new_simple(port_name: String, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    /// Change the line speed, e.g. after a successful negotiate
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> PsemResult<()> {
        self.settings.baud_rate = baud_rate;
        if let Some(stream) = self.stream.as_mut() {
            tokio_serial::SerialPort::set_baud_rate(&mut stream.0, baud_rate).map_err(|e| {
                PsemError::Connection(std::io::Error::other(format!(
                    "Failed to change baud rate: {}",
                    e
                )))
            })?;
        }
        Ok(())
    }

    fn stream_mut(&mut self) -> PsemResult<&mut SerialStream> {
        self.stream.as_mut().map(|s| &mut s.0).ok_or_else(|| {
            PsemError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Serial stream not connected",
            ))
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> PsemResult<()> {
        if !self.closed {
            return Err(PsemError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = builder.open_native_async().map_err(|e| {
            PsemError::Connection(std::io::Error::other(format!(
                "Failed to open serial port: {}",
                e
            )))
        })?;

        self.stream = Some(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }

    async fn close(&mut self) -> PsemResult<()> {
        self.stream = None;
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

        let n = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| PsemError::Timeout)?
            .map_err(PsemError::Connection)?;
        if n == 0 {
            return Err(PsemError::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Serial port closed",
            )));
        }
        payload.extend_from_slice(&buf[..n]);

        loop {
            match tokio::time::timeout(idle, stream.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => payload.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(PsemError::Connection(e)),
            }
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_settings_defaults() {
        let settings = SerialSettings::new("/dev/ttyUSB0".to_string(), 9600);
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, tokio_serial::DataBits::Eight);
        assert_eq!(settings.parity, tokio_serial::Parity::None);
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let mut transport = SerialTransport::new_simple("/dev/ttyUSB0".to_string(), 9600);
        assert!(transport.is_closed());
        assert!(transport.send(&[0x20]).await.is_err());
    }
}
