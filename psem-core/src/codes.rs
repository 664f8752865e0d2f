//! Wire-level code enumerations
//!
//! Two octet enumerations cross the wire on every exchange: the C12.18
//! service response code (first octet of every response) and the C12.19
//! procedure result code (carried in the procedure response table). Both are
//! preserved bit-for-bit against the deployed fleet; unknown octets are kept
//! rather than collapsed so diagnostics can show what the device actually
//! said.

use std::fmt;

/// C12.18 service response code
///
/// The first octet of every service response. `Busy` and `DataNotReady` are
/// transient: the device needs more time before it can service the request.
/// `InvalidServiceSequence` is what a meter answers to an identify when a
/// prior session was aborted without terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Acknowledge (0x00)
    Ok,
    /// Rejection with no reason given (0x01)
    Err,
    /// Service not supported (0x02, SNS)
    ServiceNotSupported,
    /// Insufficient security clearance (0x03, ISC)
    SecurityViolation,
    /// Operation not possible (0x04, ONP)
    OperationNotPossible,
    /// Inappropriate action requested (0x05, IAR)
    InappropriateAction,
    /// Device busy (0x06, BSY)
    Busy,
    /// Data not ready (0x07, DNR)
    DataNotReady,
    /// Data locked (0x08, DLK)
    DataLocked,
    /// Renegotiate request (0x09, RNO)
    RenegotiateRequest,
    /// Invalid service sequence state (0x0A, ISSS)
    InvalidServiceSequence,
    /// Any octet outside the standard enumeration
    Unknown(u8),
}

impl ResponseCode {
    /// Decode from the wire octet. Total: unknown octets are retained.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::Err,
            0x02 => Self::ServiceNotSupported,
            0x03 => Self::SecurityViolation,
            0x04 => Self::OperationNotPossible,
            0x05 => Self::InappropriateAction,
            0x06 => Self::Busy,
            0x07 => Self::DataNotReady,
            0x08 => Self::DataLocked,
            0x09 => Self::RenegotiateRequest,
            0x0A => Self::InvalidServiceSequence,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the wire octet
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::Err => 0x01,
            Self::ServiceNotSupported => 0x02,
            Self::SecurityViolation => 0x03,
            Self::OperationNotPossible => 0x04,
            Self::InappropriateAction => 0x05,
            Self::Busy => 0x06,
            Self::DataNotReady => 0x07,
            Self::DataLocked => 0x08,
            Self::RenegotiateRequest => 0x09,
            Self::InvalidServiceSequence => 0x0A,
            Self::Unknown(other) => other,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Busy / data-not-ready: the device will service the request if asked
    /// again after a delay.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Busy | Self::DataNotReady)
    }

    pub fn is_security(self) -> bool {
        matches!(self, Self::SecurityViolation)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown(0x{:02X})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// C12.19 procedure result code
///
/// Carried in the fourth octet of the procedure response table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureResult {
    /// Procedure completed (0)
    Completed,
    /// Procedure accepted but not fully completed (1)
    NotFullyCompleted,
    /// Invalid parameter, procedure ignored (2)
    InvalidParam,
    /// Procedure conflicts with the current device setup, ignored (3)
    DeviceSetupConflict,
    /// Timing constraint, procedure ignored (4)
    TimingConstraint,
    /// No authorization, procedure ignored (5)
    NoAuthorization,
    /// Unrecognized procedure, ignored (6)
    UnrecognizedProcedure,
    /// Any octet outside the standard enumeration
    Error(u8),
}

impl ProcedureResult {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Completed,
            1 => Self::NotFullyCompleted,
            2 => Self::InvalidParam,
            3 => Self::DeviceSetupConflict,
            4 => Self::TimingConstraint,
            5 => Self::NoAuthorization,
            6 => Self::UnrecognizedProcedure,
            other => Self::Error(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::NotFullyCompleted => 1,
            Self::InvalidParam => 2,
            Self::DeviceSetupConflict => 3,
            Self::TimingConstraint => 4,
            Self::NoAuthorization => 5,
            Self::UnrecognizedProcedure => 6,
            Self::Error(other) => other,
        }
    }

    /// The device accepted the procedure but has not finished it yet; the
    /// caller may poll again.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::NotFullyCompleted | Self::TimingConstraint)
    }
}

impl fmt::Display for ProcedureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(code) => write!(f, "Error({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_round_trip() {
        for value in 0x00..=0x0A {
            assert_eq!(ResponseCode::from_u8(value).to_u8(), value);
        }
        assert_eq!(ResponseCode::from_u8(0x7F), ResponseCode::Unknown(0x7F));
        assert_eq!(ResponseCode::Unknown(0x7F).to_u8(), 0x7F);
    }

    #[test]
    fn test_response_code_wire_values() {
        assert_eq!(ResponseCode::Ok.to_u8(), 0x00);
        assert_eq!(ResponseCode::SecurityViolation.to_u8(), 0x03);
        assert_eq!(ResponseCode::Busy.to_u8(), 0x06);
        assert_eq!(ResponseCode::DataNotReady.to_u8(), 0x07);
        assert_eq!(ResponseCode::InvalidServiceSequence.to_u8(), 0x0A);
    }

    #[test]
    fn test_response_code_transient() {
        assert!(ResponseCode::Busy.is_transient());
        assert!(ResponseCode::DataNotReady.is_transient());
        assert!(!ResponseCode::Ok.is_transient());
        assert!(!ResponseCode::SecurityViolation.is_transient());
        assert!(!ResponseCode::DataLocked.is_transient());
    }

    #[test]
    fn test_procedure_result_wire_values() {
        assert_eq!(ProcedureResult::Completed.to_u8(), 0);
        assert_eq!(ProcedureResult::NotFullyCompleted.to_u8(), 1);
        assert_eq!(ProcedureResult::InvalidParam.to_u8(), 2);
        assert_eq!(ProcedureResult::DeviceSetupConflict.to_u8(), 3);
        assert_eq!(ProcedureResult::TimingConstraint.to_u8(), 4);
        assert_eq!(ProcedureResult::NoAuthorization.to_u8(), 5);
        assert_eq!(ProcedureResult::UnrecognizedProcedure.to_u8(), 6);
    }

    #[test]
    fn test_procedure_result_pending() {
        assert!(ProcedureResult::NotFullyCompleted.is_pending());
        assert!(ProcedureResult::TimingConstraint.is_pending());
        assert!(!ProcedureResult::Completed.is_pending());
        assert!(!ProcedureResult::NoAuthorization.is_pending());
        assert!(!ProcedureResult::Error(9).is_pending());
    }

    #[test]
    fn test_procedure_result_unknown_kept() {
        assert_eq!(ProcedureResult::from_u8(200), ProcedureResult::Error(200));
        assert_eq!(ProcedureResult::Error(200).to_u8(), 200);
    }
}
