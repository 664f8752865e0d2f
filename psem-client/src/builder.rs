//! Meter builder
//!
//! Assembles a [`Meter`] from a transport and a credential store, with the
//! session configuration, table catalog, and retry policies overridable
//! before building.

use psem_procedures::{PolicyTable, ProcedureExecutor, ProcedureId, RetryPolicy};
use psem_security::{CredentialStore, SecurityManager};
use psem_session::{Session, SessionConfig};
use psem_tables::{standard_catalog, TableCache, TableCatalog};
use psem_transport::Transport;

use crate::meter::Meter;

/// Builder for [`Meter`]
pub struct MeterBuilder<T: Transport, S: CredentialStore> {
    transport: T,
    store: S,
    config: SessionConfig,
    catalog: Option<TableCatalog>,
    policies: PolicyTable,
}

impl<T: Transport, S: CredentialStore> MeterBuilder<T, S> {
    pub fn new(transport: T, store: S) -> Self {
        Self {
            transport,
            store,
            config: SessionConfig::default(),
            catalog: None,
            policies: PolicyTable::builtin(),
        }
    }

    /// Replace the whole session configuration
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the logon user id and name
    pub fn user(mut self, user_id: u16, user: impl Into<String>) -> Self {
        self.config.user_id = user_id;
        self.config.user = user.into();
        self
    }

    /// Use a device-variant table catalog instead of the standard one
    pub fn catalog(mut self, catalog: TableCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Register or override one retry policy
    pub fn policy(mut self, id: ProcedureId, policy: RetryPolicy) -> Self {
        self.policies.register(id, policy);
        self
    }

    pub fn build(self) -> Meter<T, S> {
        let catalog = self.catalog.unwrap_or_else(standard_catalog);
        Meter::new(
            Session::new(self.transport, self.config),
            TableCache::new(catalog),
            ProcedureExecutor::with_policies(self.policies),
            SecurityManager::new(self.store),
        )
    }
}
