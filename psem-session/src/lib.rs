//! Session layer for the PSEM protocol
//!
//! This crate encodes and decodes the C12.18 service layer and drives the
//! identify / negotiate / logon / security / logoff / terminate session
//! state machine over a [`psem_transport::Transport`]. Table traffic is
//! exposed through the [`TableIo`] trait, the seam the table cache and the
//! procedure engine are written against.

pub mod io;
pub mod service;
pub mod session;
pub mod trace;

pub use io::TableIo;
pub use service::{baud_code, ServiceResponse};
pub use session::{IdentifyInfo, NegotiatedParameters, Session, SessionConfig};
pub use trace::{RedactionScope, WireTrace};
