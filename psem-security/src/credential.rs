//! Credential type
//!
//! A credential is an ordered byte string transmitted in a fixed 20-octet
//! slot: longer values are truncated, shorter ones zero-padded. The octets
//! never appear in `Debug`/`Display` output; diagnostic visibility is the
//! wire trace's decision, not this type's.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed size of the device's credential slot
pub const SLOT_SIZE: usize = 20;

/// A meter password
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

impl Credential {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The wire form: truncated or zero-padded to the slot size
    pub fn to_slot(&self) -> [u8; SLOT_SIZE] {
        let mut slot = [0u8; SLOT_SIZE];
        for (dst, src) in slot.iter_mut().zip(self.bytes.iter()) {
            *dst = *src;
        }
        slot
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(****)")
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Credential {
    fn from(value: &[u8]) -> Self {
        Self::new(value.to_vec())
    }
}

/// The device's four named credential slots
///
/// Candidate order follows slot precedence: primary, secondary, tertiary,
/// then the limited-reconfigure password.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    pub primary: Option<Credential>,
    pub secondary: Option<Credential>,
    pub tertiary: Option<Credential>,
    pub limited_reconfigure: Option<Credential>,
}

impl CredentialSet {
    /// The populated slots in precedence order, ready for the security
    /// manager
    pub fn candidates(&self) -> Vec<Credential> {
        [
            &self.primary,
            &self.secondary,
            &self.tertiary,
            &self.limited_reconfigure,
        ]
        .into_iter()
        .filter_map(|slot| slot.clone())
        .collect()
    }
}
