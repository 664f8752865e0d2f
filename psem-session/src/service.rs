//! C12.18 service request/response codec
//!
//! Service headers are big-endian; table *content* stays little-endian per
//! C12.19. Table-carrying responses and write payloads carry a 16-bit octet
//! count and a 2's-complement checksum over the data octets.

use bytes::{BufMut, BytesMut};
use psem_core::{PsemError, PsemResult, ResponseCode, TableId};

/// Service request codes
pub mod request {
    pub const IDENTIFY: u8 = 0x20;
    pub const TERMINATE: u8 = 0x21;
    pub const READ_FULL: u8 = 0x30;
    pub const READ_OFFSET: u8 = 0x3F;
    pub const WRITE_FULL: u8 = 0x40;
    pub const WRITE_OFFSET: u8 = 0x4F;
    pub const LOGON: u8 = 0x50;
    pub const SECURITY: u8 = 0x51;
    pub const LOGOFF: u8 = 0x52;
    pub const NEGOTIATE: u8 = 0x61;
    pub const WAIT: u8 = 0x70;
}

/// Length of the user field in a logon request
pub const USER_LENGTH: usize = 10;

/// Per-packet service overhead subtracted when sizing offset reads
pub const PACKET_OVERHEAD: u16 = 8;

/// A decoded service response: the response code plus any table data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub code: ResponseCode,
    pub data: Vec<u8>,
}

impl ServiceResponse {
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            code: ResponseCode::Ok,
            data,
        }
    }

    pub fn nok(code: ResponseCode) -> Self {
        Self { code, data: Vec::new() }
    }
}

/// 2's-complement checksum over the data octets
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Map a baud rate to its C12.18 negotiate code
pub fn baud_code(baud_rate: u32) -> Option<u8> {
    match baud_rate {
        300 => Some(1),
        600 => Some(2),
        1200 => Some(3),
        2400 => Some(4),
        4800 => Some(5),
        9600 => Some(6),
        14400 => Some(7),
        19200 => Some(8),
        28800 => Some(9),
        57600 => Some(10),
        _ => None,
    }
}

/// Map a C12.18 negotiate code back to a baud rate
pub fn baud_rate(code: u8) -> Option<u32> {
    match code {
        1 => Some(300),
        2 => Some(600),
        3 => Some(1200),
        4 => Some(2400),
        5 => Some(4800),
        6 => Some(9600),
        7 => Some(14400),
        8 => Some(19200),
        9 => Some(28800),
        10 => Some(57600),
        _ => None,
    }
}

pub fn encode_identify() -> Vec<u8> {
    vec![request::IDENTIFY]
}

pub fn encode_terminate() -> Vec<u8> {
    vec![request::TERMINATE]
}

pub fn encode_logoff() -> Vec<u8> {
    vec![request::LOGOFF]
}

pub fn encode_wait(seconds: u8) -> Vec<u8> {
    vec![request::WAIT, seconds]
}

pub fn encode_negotiate(packet_size: u16, nbr_packets: u8, baud: u8) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(request::NEGOTIATE);
    buf.put_u16(packet_size);
    buf.put_u8(nbr_packets);
    buf.put_u8(baud);
    buf.to_vec()
}

/// Logon request: user id plus the user name padded or truncated to ten
/// octets.
pub fn encode_logon(user_id: u16, user: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(3 + USER_LENGTH);
    buf.put_u8(request::LOGON);
    buf.put_u16(user_id);
    let mut field = [0x20u8; USER_LENGTH];
    for (slot, byte) in field.iter_mut().zip(user.bytes()) {
        *slot = byte;
    }
    buf.put_slice(&field);
    buf.to_vec()
}

/// Security request carrying a full credential slot
pub fn encode_security(slot: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + slot.len());
    buf.put_u8(request::SECURITY);
    buf.put_slice(slot);
    buf.to_vec()
}

pub fn encode_read_full(id: TableId) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(3);
    buf.put_u8(request::READ_FULL);
    buf.put_u16(id.raw());
    buf.to_vec()
}

pub fn encode_read_offset(id: TableId, offset: u32, count: u16) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(request::READ_OFFSET);
    buf.put_u16(id.raw());
    put_u24(&mut buf, offset);
    buf.put_u16(count);
    buf.to_vec()
}

pub fn encode_write_full(id: TableId, data: &[u8]) -> PsemResult<Vec<u8>> {
    if data.len() > u16::MAX as usize {
        return Err(PsemError::InvalidData(format!(
            "Write of {} octets exceeds the service count field",
            data.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(6 + data.len());
    buf.put_u8(request::WRITE_FULL);
    buf.put_u16(id.raw());
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    buf.put_u8(checksum(data));
    Ok(buf.to_vec())
}

pub fn encode_write_offset(id: TableId, offset: u32, data: &[u8]) -> PsemResult<Vec<u8>> {
    if data.len() > u16::MAX as usize {
        return Err(PsemError::InvalidData(format!(
            "Write of {} octets exceeds the service count field",
            data.len()
        )));
    }
    if offset > 0x00FF_FFFF {
        return Err(PsemError::InvalidData(format!(
            "Offset {} exceeds the 24-bit offset field",
            offset
        )));
    }
    let mut buf = BytesMut::with_capacity(9 + data.len());
    buf.put_u8(request::WRITE_OFFSET);
    buf.put_u16(id.raw());
    put_u24(&mut buf, offset);
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    buf.put_u8(checksum(data));
    Ok(buf.to_vec())
}

fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u8((value >> 8) as u8);
    buf.put_u8(value as u8);
}

/// Decode a response that carries no table data: just the code octet
pub fn parse_code(raw: &[u8]) -> PsemResult<ResponseCode> {
    let first = raw
        .first()
        .ok_or_else(|| PsemError::Protocol("Empty service response".to_string()))?;
    Ok(ResponseCode::from_u8(*first))
}

/// Decode a table-carrying response: `<code><count u16><data><cksum>`
///
/// A non-ok code legitimately arrives bare; table data and checksum are only
/// present behind an ok.
pub fn parse_table_response(raw: &[u8]) -> PsemResult<ServiceResponse> {
    let code = parse_code(raw)?;
    if !code.is_ok() {
        return Ok(ServiceResponse::nok(code));
    }
    if raw.len() < 4 {
        return Err(PsemError::Protocol(format!(
            "Table response truncated: {} octets",
            raw.len()
        )));
    }
    let count = u16::from_be_bytes([raw[1], raw[2]]) as usize;
    if raw.len() != 4 + count {
        return Err(PsemError::Protocol(format!(
            "Table response length mismatch: count says {}, payload has {}",
            count,
            raw.len() - 4
        )));
    }
    let data = &raw[3..3 + count];
    let cksum = raw[3 + count];
    if checksum(data) != cksum {
        return Err(PsemError::Protocol(format!(
            "Table data checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
            checksum(data),
            cksum
        )));
    }
    Ok(ServiceResponse::ok(data.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0x00);
        assert_eq!(checksum(&[0x01]), 0xFF);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0xFA);
        // sum + checksum wraps to zero
        let data = [0x55u8, 0xAA, 0x0F, 0xF0];
        let sum = data.iter().fold(checksum(&data), |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn test_baud_codes() {
        assert_eq!(baud_code(9600), Some(6));
        assert_eq!(baud_code(19200), Some(8));
        assert_eq!(baud_code(1234), None);
        assert_eq!(baud_rate(6), Some(9600));
        assert_eq!(baud_rate(0), None);
    }

    #[test]
    fn test_encode_negotiate() {
        let req = encode_negotiate(256, 8, 6);
        assert_eq!(req, vec![0x61, 0x01, 0x00, 0x08, 0x06]);
    }

    #[test]
    fn test_encode_logon_pads_user() {
        let req = encode_logon(2, "reader");
        assert_eq!(req.len(), 13);
        assert_eq!(&req[..3], &[0x50, 0x00, 0x02]);
        assert_eq!(&req[3..9], b"reader");
        assert_eq!(&req[9..], &[0x20; 4]);
    }

    #[test]
    fn test_encode_logon_truncates_user() {
        let req = encode_logon(0, "averylonguserfield");
        assert_eq!(req.len(), 13);
        assert_eq!(&req[3..], b"averylongu");
    }

    #[test]
    fn test_encode_read_offset() {
        let req = encode_read_offset(TableId(64), 0x012345, 300);
        assert_eq!(
            req,
            vec![0x3F, 0x00, 0x40, 0x01, 0x23, 0x45, 0x01, 0x2C]
        );
    }

    #[test]
    fn test_encode_write_full_appends_checksum() {
        let req = encode_write_full(TableId(130), &[0x01, 0x02]).unwrap();
        assert_eq!(req, vec![0x40, 0x00, 0x82, 0x00, 0x02, 0x01, 0x02, 0xFD]);
    }

    #[test]
    fn test_encode_write_offset_rejects_wide_offset() {
        assert!(encode_write_offset(TableId(64), 0x0100_0000, &[0]).is_err());
    }

    #[test]
    fn test_parse_table_response_ok() {
        let raw = vec![0x00, 0x00, 0x03, 0x0A, 0x0B, 0x0C, checksum(&[0x0A, 0x0B, 0x0C])];
        let response = parse_table_response(&raw).unwrap();
        assert_eq!(response.code, ResponseCode::Ok);
        assert_eq!(response.data, vec![0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn test_parse_table_response_nok_is_bare() {
        let response = parse_table_response(&[0x06]).unwrap();
        assert_eq!(response.code, ResponseCode::Busy);
        assert!(response.data.is_empty());
    }

    #[test]
    fn test_parse_table_response_bad_checksum() {
        let raw = vec![0x00, 0x00, 0x02, 0x0A, 0x0B, 0x00];
        assert!(matches!(
            parse_table_response(&raw),
            Err(PsemError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_table_response_length_mismatch() {
        let raw = vec![0x00, 0x00, 0x05, 0x0A, 0x0B, 0x00];
        assert!(matches!(
            parse_table_response(&raw),
            Err(PsemError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_code_empty() {
        assert!(parse_code(&[]).is_err());
    }
}
