//! PSEM session state machine
//!
//! One `Session` owns one transport for the life of a logical connection
//! and drives the C12.18 handshake services. Operations are strictly
//! sequential: the transport is half-duplex request/response and nothing
//! here pipelines or reorders. The type is deliberately not shareable
//! across threads; run one session per physical device.

use async_trait::async_trait;
use psem_core::{PsemError, PsemResult, ResponseCode, TableId};
use psem_transport::Transport;
use std::time::Duration;

use crate::io::TableIo;
use crate::service::{self, ServiceResponse, PACKET_OVERHEAD};
use crate::trace::WireTrace;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// User id sent in the logon service
    pub user_id: u16,
    /// User name sent in the logon service (padded to ten octets)
    pub user: String,
    /// Requested packet size for negotiate
    pub packet_size: u16,
    /// Requested packet count for negotiate
    pub nbr_packets: u8,
    /// Requested baud rate for negotiate
    pub baud_rate: u32,
    /// Deadline for each service response
    pub receive_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: 0,
            user: String::new(),
            packet_size: 256,
            nbr_packets: 8,
            baud_rate: 9600,
            receive_timeout: Duration::from_secs(4),
        }
    }
}

/// Device identity from the identify service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyInfo {
    pub reference_standard: u8,
    pub version: u8,
    pub revision: u8,
}

/// Parameters agreed during negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedParameters {
    pub packet_size: u16,
    pub nbr_packets: u8,
    pub baud_rate: u32,
}

/// A PSEM session over one transport
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    trace: WireTrace,
    identity: Option<IdentifyInfo>,
    negotiated: Option<NegotiatedParameters>,
    logged_on: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            trace: WireTrace::new(),
            identity: None,
            negotiated: None,
            logged_on: false,
        }
    }

    /// Open the underlying transport
    pub async fn open(&mut self) -> PsemResult<()> {
        self.transport.open().await
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> PsemResult<()> {
        self.reset_state();
        self.transport.close().await
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Access the underlying transport, e.g. to retune a serial line after
    /// a successful negotiate
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn trace(&self) -> &WireTrace {
        &self.trace
    }

    pub fn identity(&self) -> Option<IdentifyInfo> {
        self.identity
    }

    pub fn negotiated(&self) -> Option<NegotiatedParameters> {
        self.negotiated
    }

    pub fn is_logged_on(&self) -> bool {
        self.logged_on
    }

    /// Identify service
    ///
    /// A device left mid-session by an aborted predecessor answers with
    /// `InvalidServiceSequence`; identify is then retried exactly once.
    pub async fn identify(&mut self) -> PsemResult<ResponseCode> {
        let request = service::encode_identify();
        let mut raw = self.exchange(&request).await?;
        let mut code = service::parse_code(&raw)?;

        if code == ResponseCode::InvalidServiceSequence {
            log::debug!("identify answered ISSS, retrying once");
            raw = self.exchange(&request).await?;
            code = service::parse_code(&raw)?;
        }

        if code.is_ok() {
            if raw.len() < 4 {
                return Err(PsemError::Protocol(format!(
                    "Identify response truncated: {} octets",
                    raw.len()
                )));
            }
            self.identity = Some(IdentifyInfo {
                reference_standard: raw[1],
                version: raw[2],
                revision: raw[3],
            });
        }
        Ok(code)
    }

    /// Negotiate service; only legal after a successful identify
    pub async fn negotiate(&mut self) -> PsemResult<ResponseCode> {
        if self.identity.is_none() {
            return Err(PsemError::Protocol(
                "Negotiate attempted before a successful identify".to_string(),
            ));
        }
        let baud = service::baud_code(self.config.baud_rate).ok_or_else(|| {
            PsemError::InvalidData(format!(
                "Baud rate {} has no negotiate code",
                self.config.baud_rate
            ))
        })?;
        let request =
            service::encode_negotiate(self.config.packet_size, self.config.nbr_packets, baud);
        let raw = self.exchange(&request).await?;
        let code = service::parse_code(&raw)?;

        if code.is_ok() {
            if raw.len() < 5 {
                return Err(PsemError::Protocol(format!(
                    "Negotiate response truncated: {} octets",
                    raw.len()
                )));
            }
            let packet_size = u16::from_be_bytes([raw[1], raw[2]]);
            let nbr_packets = raw[3];
            let baud_rate = service::baud_rate(raw[4]).unwrap_or(self.config.baud_rate);
            self.negotiated = Some(NegotiatedParameters {
                packet_size,
                nbr_packets,
                baud_rate,
            });
            log::debug!(
                "negotiated packet_size={} nbr_packets={} baud={}",
                packet_size,
                nbr_packets,
                baud_rate
            );
        }
        Ok(code)
    }

    /// Logon service
    pub async fn logon(&mut self) -> PsemResult<ResponseCode> {
        let request = service::encode_logon(self.config.user_id, &self.config.user);
        let raw = self.exchange(&request).await?;
        let code = service::parse_code(&raw)?;
        if code.is_ok() {
            self.logged_on = true;
        }
        Ok(code)
    }

    /// Security service carrying one credential slot
    pub async fn security(&mut self, slot: &[u8]) -> PsemResult<ResponseCode> {
        let request = service::encode_security(slot);
        let raw = self.exchange(&request).await?;
        service::parse_code(&raw)
    }

    /// Logoff service, best-effort: transport errors are swallowed because
    /// the device recovers on its own via its session timeout.
    pub async fn logoff(&mut self) {
        let request = service::encode_logoff();
        if let Err(e) = self.exchange(&request).await {
            log::debug!("logoff failed, device left to time out: {}", e);
        }
        self.reset_state();
    }

    /// Terminate service, best-effort like logoff
    pub async fn terminate(&mut self) {
        let request = service::encode_terminate();
        if let Err(e) = self.exchange(&request).await {
            log::debug!("terminate failed, device left to time out: {}", e);
        }
        self.reset_state();
    }

    fn reset_state(&mut self) {
        self.logged_on = false;
        self.identity = None;
        self.negotiated = None;
    }

    async fn exchange(&mut self, request: &[u8]) -> PsemResult<Vec<u8>> {
        self.trace.tx(request);
        self.transport.send(request).await?;
        let response = self.transport.receive(self.config.receive_timeout).await?;
        self.trace.rx(&response);
        if response.is_empty() {
            return Err(PsemError::Protocol("Empty service response".to_string()));
        }
        Ok(response)
    }
}

#[async_trait]
impl<T: Transport> TableIo for Session<T> {
    async fn read_full(&mut self, id: TableId) -> PsemResult<ServiceResponse> {
        let request = service::encode_read_full(id);
        let raw = self.exchange(&request).await?;
        service::parse_table_response(&raw)
    }

    async fn read_offset(
        &mut self,
        id: TableId,
        offset: u32,
        count: u16,
    ) -> PsemResult<ServiceResponse> {
        let request = service::encode_read_offset(id, offset, count);
        let raw = self.exchange(&request).await?;
        service::parse_table_response(&raw)
    }

    async fn write_full(&mut self, id: TableId, data: &[u8]) -> PsemResult<ResponseCode> {
        let request = service::encode_write_full(id, data)?;
        let raw = self.exchange(&request).await?;
        service::parse_code(&raw)
    }

    async fn write_offset(
        &mut self,
        id: TableId,
        offset: u32,
        data: &[u8],
    ) -> PsemResult<ResponseCode> {
        let request = service::encode_write_offset(id, offset, data)?;
        let raw = self.exchange(&request).await?;
        service::parse_code(&raw)
    }

    async fn wait(&mut self, seconds: u8) -> PsemResult<ResponseCode> {
        let request = service::encode_wait(seconds);
        let raw = self.exchange(&request).await?;
        service::parse_code(&raw)
    }

    fn max_offset_read(&self) -> usize {
        let (packet_size, nbr_packets) = match self.negotiated {
            Some(p) => (p.packet_size, p.nbr_packets),
            None => (self.config.packet_size, self.config.nbr_packets),
        };
        packet_size.saturating_sub(PACKET_OVERHEAD) as usize * nbr_packets as usize
    }
}
