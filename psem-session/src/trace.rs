//! Wire-level diagnostic tracing
//!
//! Outgoing and incoming service payloads are logged through the `log`
//! facade at trace level. Credential transmission must not leak into logs:
//! [`WireTrace::redact`] hands out an RAII scope that suspends payload
//! logging and restores the prior state when dropped, whichever way the
//! enclosing call exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tx/rx trace attached to a session
#[derive(Debug, Clone)]
pub struct WireTrace {
    suspended: Arc<AtomicBool>,
}

impl WireTrace {
    pub fn new() -> Self {
        Self {
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether payload logging is currently suspended
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    /// Suspend outgoing payload logging until the returned scope drops
    pub fn redact(&self) -> RedactionScope {
        let prior = self.suspended.swap(true, Ordering::Relaxed);
        RedactionScope {
            flag: Arc::clone(&self.suspended),
            prior,
        }
    }

    pub fn tx(&self, payload: &[u8]) {
        if self.is_suspended() {
            log::trace!("tx {} octets (redacted)", payload.len());
        } else {
            log::trace!("tx {} octets: {}", payload.len(), hex(payload));
        }
    }

    pub fn rx(&self, payload: &[u8]) {
        log::trace!("rx {} octets: {}", payload.len(), hex(payload));
    }
}

impl Default for WireTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope during which outgoing payloads are redacted from the trace
///
/// Restores the trace's previous state on drop.
#[must_use = "dropping the scope immediately re-enables payload logging"]
pub struct RedactionScope {
    flag: Arc<AtomicBool>,
    prior: bool,
}

impl Drop for RedactionScope {
    fn drop(&mut self) {
        self.flag.store(self.prior, Ordering::Relaxed);
    }
}

fn hex(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction_scope_restores() {
        let trace = WireTrace::new();
        assert!(!trace.is_suspended());
        {
            let _scope = trace.redact();
            assert!(trace.is_suspended());
        }
        assert!(!trace.is_suspended());
    }

    #[test]
    fn test_nested_scopes_restore_in_order() {
        let trace = WireTrace::new();
        let outer = trace.redact();
        {
            let _inner = trace.redact();
            assert!(trace.is_suspended());
        }
        // outer scope still active
        assert!(trace.is_suspended());
        drop(outer);
        assert!(!trace.is_suspended());
    }

    #[test]
    fn test_scope_restores_on_early_exit() {
        let trace = WireTrace::new();
        let result: Result<(), ()> = (|| {
            let _scope = trace.redact();
            Err(())
        })();
        assert!(result.is_err());
        assert!(!trace.is_suspended());
    }
}
