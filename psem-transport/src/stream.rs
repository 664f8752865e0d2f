//! Transport trait for the PSEM session layer

use async_trait::async_trait;
use psem_core::PsemResult;
use std::time::Duration;

/// A half-duplex request/response byte channel to a meter
///
/// Implementations deliver complete service payloads: the link-level packet
/// framing and CRC are assumed correct below this interface. The session
/// layer issues exactly one `receive` per `send` and never pipelines.
#[async_trait]
pub trait Transport: Send {
    /// Open the physical channel
    async fn open(&mut self) -> PsemResult<()>;

    /// Close the physical channel
    async fn close(&mut self) -> PsemResult<()>;

    /// Check whether the channel is closed
    fn is_closed(&self) -> bool;

    /// Transmit one complete service request payload
    async fn send(&mut self, payload: &[u8]) -> PsemResult<()>;

    /// Receive one complete service response payload
    ///
    /// # Errors
    ///
    /// `PsemError::Timeout` if no response arrives within `timeout`.
    async fn receive(&mut self, timeout: Duration) -> PsemResult<Vec<u8>>;
}
