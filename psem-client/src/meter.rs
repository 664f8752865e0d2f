//! Meter facade
//!
//! One `Meter` owns one logical connection: the session, its table cache,
//! the procedure executor, and the security manager. Logon runs the
//! identify, negotiate, logon, and security steps in order,
//! short-circuiting on the first failure; logoff and terminate are
//! best-effort and always leave the cache empty, since bytes cached under
//! a previous logical session must never be reinterpreted.

use psem_core::{Outcome, PsemResult, TableId};
use psem_procedures::ids::ACTIVATE_PENDING;
use psem_procedures::{PendingImage, ProcedureExecutor, ProcedureId, ProcedureOutcome};
use psem_security::{Credential, CredentialStore, SecurityManager};
use psem_session::{IdentifyInfo, Session};
use psem_tables::{catalog_for_device_class, TableCache, TableCatalog};
use psem_transport::Transport;

/// High-level client for one meter
pub struct Meter<T: Transport, S: CredentialStore> {
    session: Session<T>,
    cache: TableCache,
    executor: ProcedureExecutor,
    security: SecurityManager<S>,
}

impl<T: Transport, S: CredentialStore> Meter<T, S> {
    pub fn new(
        session: Session<T>,
        cache: TableCache,
        executor: ProcedureExecutor,
        security: SecurityManager<S>,
    ) -> Self {
        Self {
            session,
            cache,
            executor,
            security,
        }
    }

    /// Open the transport
    pub async fn open(&mut self) -> PsemResult<()> {
        self.session.open().await
    }

    /// Close the transport; the cache does not survive
    pub async fn close(&mut self) -> PsemResult<()> {
        self.cache.invalidate_all();
        self.session.close().await
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn identity(&self) -> Option<IdentifyInfo> {
        self.session.identity()
    }

    pub fn is_logged_on(&self) -> bool {
        self.session.is_logged_on()
    }

    /// Adjust per-procedure retry policies
    pub fn policies_mut(&mut self) -> &mut psem_procedures::PolicyTable {
        self.executor.policies_mut()
    }

    /// Establish the session: identify, negotiate, logon, then credentials
    ///
    /// Short-circuits on the first step the device rejects; the returned
    /// outcome is the translation of that step's response. Success arms a
    /// fresh table cache for this logical session.
    pub async fn logon(&mut self, candidates: &[Credential], redact: bool) -> PsemResult<Outcome> {
        let code = self.session.identify().await?;
        if !code.is_ok() {
            log::debug!("identify rejected: {}", code);
            return Ok(Outcome::from_response(code));
        }
        let code = self.session.negotiate().await?;
        if !code.is_ok() {
            log::debug!("negotiate rejected: {}", code);
            return Ok(Outcome::from_response(code));
        }
        let code = self.session.logon().await?;
        if !code.is_ok() {
            log::debug!("logon rejected: {}", code);
            return Ok(Outcome::from_response(code));
        }
        let outcome = self
            .security
            .authenticate(&mut self.session, candidates, redact)
            .await?;
        if outcome.is_success() {
            self.cache.invalidate_all();
        }
        Ok(outcome)
    }

    /// Resume a dropped session with the persisted credential
    pub async fn relogon(&mut self, redact: bool) -> PsemResult<Outcome> {
        let code = self.session.identify().await?;
        if !code.is_ok() {
            return Ok(Outcome::from_response(code));
        }
        let code = self.session.negotiate().await?;
        if !code.is_ok() {
            return Ok(Outcome::from_response(code));
        }
        let code = self.session.logon().await?;
        if !code.is_ok() {
            return Ok(Outcome::from_response(code));
        }
        let outcome = self
            .security
            .reauthenticate_from_store(&mut self.session, redact)
            .await?;
        if outcome.is_success() {
            self.cache.invalidate_all();
        }
        Ok(outcome)
    }

    /// Best-effort logoff; every cached table is invalidated
    pub async fn logoff(&mut self) {
        self.session.logoff().await;
        self.cache.invalidate_all();
    }

    /// Best-effort terminate; every cached table is invalidated
    pub async fn terminate(&mut self) {
        self.session.terminate().await;
        self.cache.invalidate_all();
    }

    /// The table catalog the cache currently resolves against
    pub fn catalog(&self) -> &TableCatalog {
        self.cache.catalog()
    }

    /// Select the device-variant table catalog from the model field of
    /// the manufacturer identification table; call once after logon
    ///
    /// The cache is rebuilt around the selected catalog, so previously
    /// loaded tables are dropped.
    pub async fn select_device_catalog(&mut self) -> PsemResult<()> {
        let ident = self.read_table(TableId::standard(1)).await?;
        let model = ident.get(4..12).unwrap_or_default();
        let class = String::from_utf8_lossy(model);
        let catalog = catalog_for_device_class(class.trim_end_matches(|c| c == ' ' || c == '\0'));
        self.cache = TableCache::new(catalog);
        Ok(())
    }

    /// Lazy table read through the cache
    pub async fn read_table(&mut self, id: TableId) -> PsemResult<Vec<u8>> {
        self.cache.read(&mut self.session, id).await
    }

    /// Uncached offset read
    pub async fn read_table_range(
        &mut self,
        id: TableId,
        offset: u32,
        len: usize,
    ) -> PsemResult<Vec<u8>> {
        self.cache
            .read_range(&mut self.session, id, offset, len)
            .await
    }

    /// Full table write
    pub async fn write_table(&mut self, id: TableId, data: &[u8]) -> PsemResult<Outcome> {
        self.cache.write(&mut self.session, id, data).await
    }

    /// Offset table write
    pub async fn write_table_range(
        &mut self,
        id: TableId,
        offset: u32,
        data: &[u8],
    ) -> PsemResult<Outcome> {
        self.cache
            .write_range(&mut self.session, id, offset, data)
            .await
    }

    pub fn is_table_loaded(&self, id: TableId) -> bool {
        self.cache.is_loaded(id)
    }

    pub fn invalidate_table(&mut self, id: TableId) {
        self.cache.invalidate(id);
    }

    /// Loaded table identifiers; the export enumeration surface
    pub fn loaded_tables(&self) -> Vec<TableId> {
        self.cache.loaded_tables()
    }

    /// Cached bytes of one loaded table
    pub fn table_bytes(&self, id: TableId) -> Option<&[u8]> {
        self.cache.bytes(id)
    }

    /// Invoke a procedure and poll it to a terminal result
    pub async fn execute(
        &mut self,
        id: ProcedureId,
        params: &[u8],
    ) -> PsemResult<ProcedureOutcome> {
        self.executor.execute(&mut self.session, id, params).await
    }

    /// Activate a staged firmware image through the activate-pending
    /// procedure
    pub async fn activate_pending_table(
        &mut self,
        image: &PendingImage,
    ) -> PsemResult<ProcedureOutcome> {
        self.execute(ACTIVATE_PENDING, &image.activation_parameters())
            .await
    }
}
