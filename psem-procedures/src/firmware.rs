//! Firmware activation encoding
//!
//! Pure binary-layout builders with no protocol interaction: the parameter
//! block handed to the activate-pending procedure, and the pending-event
//! header prepended to staged table writes. Field order and widths are a
//! fleet-compatibility contract; everything is little-endian.

use bytes::{BufMut, BytesMut};
use psem_core::TableId;

/// Trigger condition for a staged (pending) table or firmware image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTrigger {
    /// Activate on the explicit activate procedure, not at a time
    NonTimeActivated,
    /// Activate this many seconds after the trigger is armed
    RelativeTime(u32),
}

/// Trigger code octet values
const TRIGGER_RELATIVE_TIME: u8 = 1;
const TRIGGER_NON_TIME: u8 = 2;

/// Flag bits in the pending-event selector octet
const FLAG_SELF_READ: u8 = 0x08;
const FLAG_DEMAND_RESET: u8 = 0x10;

/// A downloaded firmware image staged in a pending table
///
/// Describes what the activate-pending procedure should switch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    /// Pending table holding the image
    pub table_id: TableId,
    /// Image kind as the device firmware enumerates it
    pub image_type: u8,
    pub version: u8,
    pub revision: u8,
    pub build: u16,
    pub patch: u16,
    /// Device-epoch timestamp at which the image becomes eligible
    pub activation_time: u32,
}

impl PendingImage {
    /// Parameter block for the activate-pending procedure
    ///
    /// Layout, little-endian:
    ///
    /// | octets | field           |
    /// |--------|-----------------|
    /// | 0..2   | table id        |
    /// | 2      | image type      |
    /// | 3      | version         |
    /// | 4      | revision        |
    /// | 5..7   | build           |
    /// | 7..9   | patch           |
    /// | 9..13  | activation time |
    pub fn activation_parameters(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(13);
        buf.put_u16_le(self.table_id.raw());
        buf.put_u8(self.image_type);
        buf.put_u8(self.version);
        buf.put_u8(self.revision);
        buf.put_u16_le(self.build);
        buf.put_u16_le(self.patch);
        buf.put_u32_le(self.activation_time);
        buf.to_vec()
    }
}

/// Pending-event header prepended to a staged table write
///
/// Layout:
///
/// | octets | field                                              |
/// |--------|----------------------------------------------------|
/// | 0      | selector: trigger code in bits 0..2, self-read in bit 3, demand-reset in bit 4 |
/// | 1      | event code                                         |
/// | 2      | manufacturer event code                            |
/// | 3..7   | relative seconds, little-endian; zero when non-time |
pub fn pending_event_header(
    self_read: bool,
    demand_reset: bool,
    event_code: u8,
    mfg_event_code: u8,
    trigger: ActivationTrigger,
) -> Vec<u8> {
    let (code, seconds) = match trigger {
        ActivationTrigger::NonTimeActivated => (TRIGGER_NON_TIME, 0),
        ActivationTrigger::RelativeTime(seconds) => (TRIGGER_RELATIVE_TIME, seconds),
    };
    let mut selector = code & 0x07;
    if self_read {
        selector |= FLAG_SELF_READ;
    }
    if demand_reset {
        selector |= FLAG_DEMAND_RESET;
    }
    let mut buf = BytesMut::with_capacity(7);
    buf.put_u8(selector);
    buf.put_u8(event_code);
    buf.put_u8(mfg_event_code);
    buf.put_u32_le(seconds);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_parameters_layout() {
        let image = PendingImage {
            table_id: TableId::manufacturer(30),
            image_type: 0x02,
            version: 5,
            revision: 1,
            build: 0x1234,
            patch: 0x00AB,
            activation_time: 0x0102_0304,
        };
        assert_eq!(
            image.activation_parameters(),
            vec![
                0x1E, 0x08, // MT-30
                0x02, // image type
                0x05, 0x01, // version, revision
                0x34, 0x12, // build
                0xAB, 0x00, // patch
                0x04, 0x03, 0x02, 0x01, // activation time
            ]
        );
    }

    #[test]
    fn test_pending_event_header_non_time() {
        let header =
            pending_event_header(false, false, 0x21, 0x42, ActivationTrigger::NonTimeActivated);
        assert_eq!(header, vec![0x02, 0x21, 0x42, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_pending_event_header_relative_time_with_flags() {
        let header = pending_event_header(
            true,
            true,
            0x01,
            0x99,
            ActivationTrigger::RelativeTime(600),
        );
        // selector: relative-time code plus both side-effect flags
        assert_eq!(header[0], 0x01 | 0x08 | 0x10);
        assert_eq!(header[1], 0x01);
        assert_eq!(header[2], 0x99);
        assert_eq!(&header[3..], &600u32.to_le_bytes());
    }

    #[test]
    fn test_header_is_fixed_size() {
        for trigger in [
            ActivationTrigger::NonTimeActivated,
            ActivationTrigger::RelativeTime(1),
        ] {
            assert_eq!(pending_event_header(false, true, 0, 0, trigger).len(), 7);
        }
    }
}
