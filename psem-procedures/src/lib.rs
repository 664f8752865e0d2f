//! Procedure execution engine for the PSEM protocol
//!
//! A procedure is invoked by writing its identifier and parameter block to
//! the procedure initiate table, then polling the procedure response table
//! until a terminal result or an exhausted budget. Completion latency
//! varies by three orders of magnitude across procedures, so polling is
//! driven by a per-procedure [`RetryPolicy`] rather than a global timeout.

pub mod engine;
pub mod firmware;
pub mod ids;
pub mod policy;

pub use engine::{ProcedureExecutor, ProcedureOutcome, WAIT_SECONDS};
pub use firmware::{pending_event_header, ActivationTrigger, PendingImage};
pub use ids::ProcedureId;
pub use policy::{PolicyTable, ProcedureClass, RetryPolicy};
