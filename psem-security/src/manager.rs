//! Security manager
//!
//! Walks an ordered list of credential candidates through the session's
//! security service, stopping at the first one the device accepts. The
//! accepted credential is persisted under [`LAST_ACCEPTED_KEY`] so a
//! dropped session can resume without re-prompting.

use psem_core::{Outcome, PsemError, PsemResult};
use psem_session::Session;
use psem_transport::Transport;

use crate::credential::Credential;
use crate::store::{CredentialStore, LAST_ACCEPTED_KEY};

/// Credential issuing and persistence for one session
#[derive(Debug)]
pub struct SecurityManager<S: CredentialStore> {
    store: S,
}

impl<S: CredentialStore> SecurityManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issue `candidates` in order until one is accepted or all are
    /// exhausted.
    ///
    /// With `redact` set, outgoing payload logging is suspended for the
    /// whole call and restored on every exit path, including a transport
    /// failure mid-candidate.
    ///
    /// # Errors
    ///
    /// An empty candidate list is a `PsemError::Security`: the manager
    /// never lets a session proceed without having issued a credential.
    /// Channel failures propagate as-is.
    pub async fn authenticate<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        candidates: &[Credential],
        redact: bool,
    ) -> PsemResult<Outcome> {
        if candidates.is_empty() {
            return Err(PsemError::Security(
                "No credential candidates supplied".to_string(),
            ));
        }

        let _scope = if redact {
            Some(session.trace().redact())
        } else {
            None
        };

        for (index, candidate) in candidates.iter().enumerate() {
            let code = session.security(&candidate.to_slot()).await?;
            if code.is_ok() {
                self.store.put(LAST_ACCEPTED_KEY, candidate.as_bytes());
                log::debug!("credential candidate {} accepted", index);
                return Ok(Outcome::Success);
            }
            log::debug!("credential candidate {} rejected: {}", index, code);
        }

        Ok(Outcome::SecurityError)
    }

    /// Replay the persisted credential to resume a dropped session
    pub async fn reauthenticate_from_store<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        redact: bool,
    ) -> PsemResult<Outcome> {
        let stored = self.store.get(LAST_ACCEPTED_KEY).ok_or_else(|| {
            PsemError::Security("No persisted credential to resume with".to_string())
        })?;
        let candidate = Credential::new(stored);
        self.authenticate(session, std::slice::from_ref(&candidate), redact)
            .await
    }
}
