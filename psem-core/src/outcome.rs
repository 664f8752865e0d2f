//! Outcome taxonomy and the result translator
//!
//! Every transport response code and every procedure result code maps to
//! exactly one `Outcome`. This module is the single place that mapping
//! lives; call sites branch on the outcome and never re-derive it from the
//! raw codes.

use crate::codes::{ProcedureResult, ResponseCode};
use crate::error::PsemError;

/// Unified outcome of a PSEM operation as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation took effect on the device
    Success,
    /// Credential rejected or insufficient access; never downgraded
    SecurityError,
    /// The device understood the request and does not support it
    UnsupportedOperation,
    /// Everything else: channel failures, busy budgets exhausted, logical
    /// rejections without a more specific bucket
    GenericError,
}

impl Outcome {
    /// Translate a service response code. Total over `ResponseCode`.
    pub fn from_response(code: ResponseCode) -> Self {
        match code {
            ResponseCode::Ok => Self::Success,
            ResponseCode::SecurityViolation => Self::SecurityError,
            ResponseCode::ServiceNotSupported | ResponseCode::InappropriateAction => {
                Self::UnsupportedOperation
            }
            ResponseCode::Err
            | ResponseCode::OperationNotPossible
            | ResponseCode::Busy
            | ResponseCode::DataNotReady
            | ResponseCode::DataLocked
            | ResponseCode::RenegotiateRequest
            | ResponseCode::InvalidServiceSequence
            | ResponseCode::Unknown(_) => Self::GenericError,
        }
    }

    /// Translate a procedure result code. Total over `ProcedureResult`.
    pub fn from_procedure(result: ProcedureResult) -> Self {
        match result {
            ProcedureResult::Completed => Self::Success,
            ProcedureResult::NoAuthorization => Self::SecurityError,
            ProcedureResult::UnrecognizedProcedure => Self::UnsupportedOperation,
            ProcedureResult::NotFullyCompleted
            | ProcedureResult::InvalidParam
            | ProcedureResult::DeviceSetupConflict
            | ProcedureResult::TimingConstraint
            | ProcedureResult::Error(_) => Self::GenericError,
        }
    }

    /// Translate an error. `Rejected` carries the device's code through the
    /// response mapping so an ISC rejection stays a security error.
    pub fn from_error(error: &PsemError) -> Self {
        match error {
            PsemError::Security(_) => Self::SecurityError,
            PsemError::Rejected(code) => Self::from_response(*code),
            PsemError::Connection(_)
            | PsemError::Timeout
            | PsemError::Protocol(_)
            | PsemError::InvalidData(_) => Self::GenericError,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
