//! High-level PSEM meter client
//!
//! [`Meter`] wires one session to the table cache, the procedure engine,
//! and the security manager, and exposes the operations a caller actually
//! performs against a device: logon, table reads and writes, procedure
//! invocations, and pending-table activation.

pub mod builder;
pub mod meter;

pub use builder::MeterBuilder;
pub use meter::Meter;
