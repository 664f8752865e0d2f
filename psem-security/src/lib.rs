//! Security layer for the PSEM protocol
//!
//! Credentials are fixed-slot passwords issued through the session's
//! security service. The [`SecurityManager`] walks an ordered candidate
//! list, persists the first accepted credential for later session
//! re-establishment, and keeps credential octets out of the wire trace.

pub mod credential;
pub mod manager;
pub mod store;

pub use credential::{Credential, CredentialSet};
pub use manager::SecurityManager;
pub use store::{CredentialStore, MemoryStore, LAST_ACCEPTED_KEY};
