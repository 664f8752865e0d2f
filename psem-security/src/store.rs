//! Credential persistence
//!
//! The manager persists the last accepted credential under a fixed logical
//! name so a dropped session can be re-established without re-prompting.
//! The backing store is supplied by the embedding application (OS keyring,
//! encrypted file, HSM); [`MemoryStore`] covers tests and short-lived tools.

use std::collections::HashMap;

/// Logical name the last accepted credential persists under
pub const LAST_ACCEPTED_KEY: &str = "psem.last_accepted";

/// A key/value byte store for credentials
pub trait CredentialStore: Send {
    fn get(&self, name: &str) -> Option<Vec<u8>>;
    fn put(&mut self, name: &str, value: &[u8]);
    fn delete(&mut self, name: &str);
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.get(name).cloned()
    }

    fn put(&mut self, name: &str, value: &[u8]) {
        self.entries.insert(name.to_string(), value.to_vec());
    }

    fn delete(&mut self, name: &str) {
        self.entries.remove(name);
    }
}
