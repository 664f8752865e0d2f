//! psem_rs - Rust client for the ANSI C12.18/C12.19 "PSEM" protocol
//!
//! A table-oriented metering protocol client: the device is a set of
//! numbered tables (readable/writable byte blobs) and procedures
//! (remote-invoked operations with polled results), behind an
//! identify/negotiate/logon/security session.
//!
//! # Architecture
//!
//! This library is organized as a workspace with one crate per layer:
//!
//! - `psem-core`: error type, wire codes, outcome taxonomy, table ids
//! - `psem-transport`: duplex byte channel (Serial, TCP)
//! - `psem-session`: C12.18 service codec and session state machine
//! - `psem-security`: credentials, credential store, security manager
//! - `psem-tables`: lazy table cache with dependency-aware reads
//! - `psem-procedures`: procedure execution engine and retry policies
//! - `psem-client`: the high-level `Meter` facade
//!
//! # Usage
//!
//! ```no_run
//! use psem::client::MeterBuilder;
//! use psem::security::{Credential, MemoryStore};
//! use psem::transport::TcpTransport;
//! use psem::TableId;
//!
//! # async fn run() -> psem::PsemResult<()> {
//! let transport = TcpTransport::from_address("10.0.0.7:1153")?;
//! let mut meter = MeterBuilder::new(transport, MemoryStore::new())
//!     .user(2, "reader")
//!     .build();
//!
//! meter.open().await?;
//! let outcome = meter.logon(&[Credential::from("00000000")], true).await?;
//! assert!(outcome.is_success());
//!
//! let mfg_id = meter.read_table(TableId::standard(1)).await?;
//! println!("manufacturer block: {:02X?}", mfg_id);
//!
//! meter.logoff().await;
//! meter.close().await?;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use psem_core::{Outcome, ProcedureResult, PsemError, PsemResult, ResponseCode, TableId};

// Re-export client API
pub mod client {
    pub use psem_client::*;
}

// Re-export transport layer
pub mod transport {
    pub use psem_transport::*;
}

// Re-export session layer
pub mod session {
    pub use psem_session::*;
}

// Re-export security layer
pub mod security {
    pub use psem_security::*;
}

// Re-export table cache
pub mod tables {
    pub use psem_tables::*;
}

// Re-export procedure engine
pub mod procedures {
    pub use psem_procedures::*;
}
