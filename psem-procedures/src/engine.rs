//! Procedure execution engine
//!
//! One generic write-then-poll loop driven by the per-procedure
//! [`RetryPolicy`](crate::policy::RetryPolicy). The invocation is written
//! to the procedure initiate table with a bounded retry on busy/not-ready;
//! the response table is then polled until the decoded result leaves the
//! pending states or the policy's budget runs out. The response must echo
//! the invocation's identifier and sequence number.

use bytes::{BufMut, BytesMut};
use psem_core::{Outcome, ProcedureResult, PsemError, PsemResult, ResponseCode, TableId};
use psem_session::TableIo;

use crate::ids::ProcedureId;
use crate::policy::PolicyTable;

/// Keep-alive period requested from the device while polling
pub const WAIT_SECONDS: u8 = 30;

/// Extra attempts after a transient busy/not-ready invocation write
const WRITE_RETRY_LIMIT: u32 = 3;

/// Decoded result of one procedure invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureOutcome {
    pub result: ProcedureResult,
    /// Procedure-specific response octets following the result code
    pub response: Vec<u8>,
}

impl ProcedureOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.result, ProcedureResult::Completed)
    }

    /// Translate through the unified outcome taxonomy
    pub fn outcome(&self) -> Outcome {
        Outcome::from_procedure(self.result)
    }
}

enum PollStep {
    Decoded(ProcedureOutcome),
    NotReady(ResponseCode),
}

/// Write-then-poll state machine over one session
#[derive(Debug)]
pub struct ProcedureExecutor {
    policies: PolicyTable,
    sequence: u8,
}

impl ProcedureExecutor {
    pub fn new() -> Self {
        Self::with_policies(PolicyTable::builtin())
    }

    pub fn with_policies(policies: PolicyTable) -> Self {
        Self {
            policies,
            sequence: 0,
        }
    }

    pub fn policies_mut(&mut self) -> &mut PolicyTable {
        &mut self.policies
    }

    /// Invoke `id` with `params` and poll to a terminal result
    ///
    /// # Errors
    ///
    /// A non-ok invocation write after the busy retries is surfaced as
    /// `PsemError::Rejected` without the result table ever being polled.
    /// Channel failures and malformed/mismatched response entries surface
    /// as their respective errors; a pending result at budget exhaustion
    /// is returned as a value, not an error.
    pub async fn execute<IO: TableIo>(
        &mut self,
        io: &mut IO,
        id: ProcedureId,
        params: &[u8],
    ) -> PsemResult<ProcedureOutcome> {
        let policy = self.policies.policy_for(id);
        self.sequence = self.sequence.wrapping_add(1);
        let seq = self.sequence;
        let request = encode_invocation(id, seq, params);

        let mut write_attempts = 0;
        loop {
            let code = io.write_full(TableId::PROCEDURE_INITIATE, &request).await?;
            if code.is_ok() {
                break;
            }
            if code.is_transient() && write_attempts < WRITE_RETRY_LIMIT {
                write_attempts += 1;
                log::debug!(
                    "{} invocation write answered {}, retry {}",
                    id,
                    code,
                    write_attempts
                );
                tokio::time::sleep(policy.class.busy_write_delay()).await;
                continue;
            }
            log::warn!("{} invocation write failed: {}", id, code);
            return Err(PsemError::Rejected(code));
        }

        if !policy.initial_sleep.is_zero() {
            if policy.send_wait {
                io.wait(WAIT_SECONDS).await?;
            }
            tokio::time::sleep(policy.initial_sleep).await;
        }

        let mut polls = 0;
        let mut last_decoded: Option<ProcedureOutcome> = None;
        let mut last_transient = ResponseCode::DataNotReady;
        loop {
            polls += 1;
            match poll_once(io, id, seq).await? {
                PollStep::Decoded(outcome) => {
                    let pending = outcome.result.is_pending();
                    last_decoded = Some(outcome);
                    if !pending || policy.accept_in_progress {
                        break;
                    }
                }
                PollStep::NotReady(code) => last_transient = code,
            }
            if polls >= policy.max_polls {
                break;
            }
            if policy.send_wait {
                io.wait(WAIT_SECONDS).await?;
            }
            tokio::time::sleep(policy.poll_interval).await;
        }

        match last_decoded {
            Some(outcome) => {
                log::debug!("{} finished after {} polls: {}", id, polls, outcome.result);
                Ok(outcome)
            }
            // the result table never produced a decodable entry
            None => Err(PsemError::Rejected(last_transient)),
        }
    }
}

impl Default for ProcedureExecutor {
    fn default() -> Self {
        Self::new()
    }
}

async fn poll_once<IO: TableIo>(
    io: &mut IO,
    id: ProcedureId,
    seq: u8,
) -> PsemResult<PollStep> {
    let response = io.read_full(TableId::PROCEDURE_RESPONSE).await?;
    if response.code.is_transient() {
        return Ok(PollStep::NotReady(response.code));
    }
    if !response.code.is_ok() {
        return Err(PsemError::Rejected(response.code));
    }
    decode_response(id, seq, &response.data).map(PollStep::Decoded)
}

/// Procedure initiate entry: identifier word, sequence octet, parameters;
/// table content is little-endian
fn encode_invocation(id: ProcedureId, seq: u8, params: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(3 + params.len());
    buf.put_u16_le(id.raw());
    buf.put_u8(seq);
    buf.put_slice(params);
    buf.to_vec()
}

/// Procedure response entry: echoed identifier word and sequence octet,
/// result code, response octets
fn decode_response(id: ProcedureId, seq: u8, data: &[u8]) -> PsemResult<ProcedureOutcome> {
    if data.len() < 4 {
        return Err(PsemError::Protocol(format!(
            "Procedure response entry truncated: {} octets",
            data.len()
        )));
    }
    let echo_id = u16::from_le_bytes([data[0], data[1]]);
    if echo_id != id.raw() {
        return Err(PsemError::Protocol(format!(
            "Procedure response for id {} while waiting on {}",
            echo_id,
            id.raw()
        )));
    }
    if data[2] != seq {
        return Err(PsemError::Protocol(format!(
            "Procedure response sequence {} while waiting on {}",
            data[2], seq
        )));
    }
    Ok(ProcedureOutcome {
        result: ProcedureResult::from_u8(data[3]),
        response: data[4..].to_vec(),
    })
}
