//! Table I/O seam
//!
//! Everything above the session layer reads and writes tables through this
//! trait: the table cache, the procedure engine, and the test doubles that
//! stand in for a meter.

use async_trait::async_trait;
use psem_core::{PsemResult, ResponseCode, TableId};

use crate::service::ServiceResponse;

/// Table-level request/response operations against one device
///
/// Non-ok response codes are returned as values; an `Err` means the channel
/// itself failed (or the response could not be parsed).
#[async_trait]
pub trait TableIo: Send {
    /// Read an entire table
    async fn read_full(&mut self, id: TableId) -> PsemResult<ServiceResponse>;

    /// Read `count` octets starting at `offset`
    async fn read_offset(
        &mut self,
        id: TableId,
        offset: u32,
        count: u16,
    ) -> PsemResult<ServiceResponse>;

    /// Overwrite an entire table
    async fn write_full(&mut self, id: TableId, data: &[u8]) -> PsemResult<ResponseCode>;

    /// Overwrite part of a table starting at `offset`
    async fn write_offset(
        &mut self,
        id: TableId,
        offset: u32,
        data: &[u8],
    ) -> PsemResult<ResponseCode>;

    /// Keep the session alive for `seconds` while the caller sleeps
    async fn wait(&mut self, seconds: u8) -> PsemResult<ResponseCode>;

    /// Largest octet count a single offset read may request, derived from
    /// the negotiated packet size and packet count
    fn max_offset_read(&self) -> usize;
}
