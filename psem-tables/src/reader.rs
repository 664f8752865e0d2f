//! Table read/write engine
//!
//! Reads are lazy and dependency-first: the catalog's declared dependencies
//! are brought into the cache before the requested table, in topological
//! order (cycles are broken at the point of re-entry rather than recursed
//! into). A table whose effective length exceeds the negotiated transfer
//! size is fetched in successive offset chunks; append-only logs are then
//! re-validated against their status counters, re-reading only the trailing
//! blocks that moved.

use psem_core::{Outcome, PsemError, PsemResult, TableId};
use psem_session::TableIo;
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::TableCache;
use crate::registry::{CountersFn, LengthFn, LengthRule};

/// Extra attempts after a transient busy/data-not-ready read response
const READ_RETRY_LIMIT: u32 = 2;
/// Backoff between transient read retries
const READ_RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Block re-reads tolerated before a moving log is accepted as-is
const MAX_RECONCILE_PASSES: u32 = 2;

/// Log linkage with the fn pointers copied out of the catalog so no
/// borrow is held across wire traffic
#[derive(Clone, Copy)]
struct LogPlan {
    status_table: TableId,
    block_len: LengthFn,
    parse_counters: CountersFn,
}

impl TableCache {
    /// Lazy read: cached content if loaded, otherwise dependencies first,
    /// then the table itself
    pub async fn read<IO: TableIo>(&mut self, io: &mut IO, id: TableId) -> PsemResult<Vec<u8>> {
        if let Some(cached) = self.bytes(id) {
            return Ok(cached.to_vec());
        }
        for dep in self.dependency_order(id) {
            if !self.is_loaded(dep) {
                self.read_single(io, dep).await?;
            }
        }
        self.read_single(io, id).await
    }

    /// Uncached offset read
    pub async fn read_range<IO: TableIo>(
        &self,
        io: &mut IO,
        id: TableId,
        offset: u32,
        len: usize,
    ) -> PsemResult<Vec<u8>> {
        read_range_chunks(io, id, offset, len).await
    }

    /// Full write; on acceptance the written table and its dependents are
    /// invalidated so the next read sees the device's view
    pub async fn write<IO: TableIo>(
        &mut self,
        io: &mut IO,
        id: TableId,
        data: &[u8],
    ) -> PsemResult<Outcome> {
        let code = io.write_full(id, data).await?;
        if code.is_ok() {
            self.invalidate_with_dependents(id);
        }
        Ok(Outcome::from_response(code))
    }

    /// Offset write, invalidating like [`TableCache::write`]
    pub async fn write_range<IO: TableIo>(
        &mut self,
        io: &mut IO,
        id: TableId,
        offset: u32,
        data: &[u8],
    ) -> PsemResult<Outcome> {
        let code = io.write_offset(id, offset, data).await?;
        if code.is_ok() {
            self.invalidate_with_dependents(id);
        }
        Ok(Outcome::from_response(code))
    }

    /// Transitive dependencies of `id` in load order, `id` excluded
    fn dependency_order(&self, root: TableId) -> Vec<TableId> {
        let mut order = Vec::new();
        // false while a node is open on the stack; cycles re-entering an
        // open node are skipped instead of recursed
        let mut state: HashMap<TableId, bool> = HashMap::new();
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                if node != root {
                    order.push(node);
                }
                state.insert(node, true);
                continue;
            }
            if state.contains_key(&node) {
                continue;
            }
            state.insert(node, false);
            stack.push((node, true));
            if let Some(spec) = self.catalog().get(node) {
                for dep in spec.deps {
                    if !state.contains_key(dep) {
                        stack.push((*dep, false));
                    }
                }
            }
        }
        order
    }

    /// Read one table, dependencies assumed present
    async fn read_single<IO: TableIo>(
        &mut self,
        io: &mut IO,
        id: TableId,
    ) -> PsemResult<Vec<u8>> {
        let resolved = match self.catalog().get(id).map(|spec| &spec.length) {
            Some(LengthRule::Fixed(n)) => Some(*n),
            Some(LengthRule::FromTables(f)) => match f(self) {
                Some(n) => Some(n),
                None => {
                    return Err(PsemError::InvalidData(format!(
                        "Length of {} cannot be resolved from its gating tables",
                        id
                    )));
                }
            },
            Some(LengthRule::WireDecides) | None => None,
        };
        let log_plan = self
            .catalog()
            .get(id)
            .and_then(|spec| spec.log.as_ref())
            .map(|log| LogPlan {
                status_table: log.status_table,
                block_len: log.block_len,
                parse_counters: log.parse_counters,
            });

        let data = match resolved {
            // reading a zero-length table is illegal on some devices
            Some(0) => Vec::new(),
            Some(total) if total > io.max_offset_read() => {
                let mut data = read_range_chunks(io, id, 0, total).await?;
                if let Some(plan) = log_plan {
                    self.reconcile_log(io, id, plan, &mut data).await?;
                }
                data
            }
            _ => service_read_full(io, id).await?,
        };

        self.insert(id, data.clone());
        Ok(data)
    }

    /// Re-validate a chunk-read log against its status counters
    ///
    /// The counters cached before the transfer are compared with a fresh
    /// read; if they moved, only the trailing blocks from the previous
    /// write position onward are fetched again. After
    /// `MAX_RECONCILE_PASSES` block re-reads the snapshot is accepted
    /// best-effort.
    async fn reconcile_log<IO: TableIo>(
        &mut self,
        io: &mut IO,
        id: TableId,
        plan: LogPlan,
        data: &mut Vec<u8>,
    ) -> PsemResult<()> {
        let mut before = match self
            .bytes(plan.status_table)
            .and_then(|bytes| (plan.parse_counters)(bytes))
        {
            Some(counters) => counters,
            None => return Ok(()),
        };

        let mut passes = 0;
        loop {
            let status = service_read_full(io, plan.status_table).await?;
            let after = match (plan.parse_counters)(&status) {
                Some(counters) => counters,
                None => return Ok(()),
            };
            self.insert(plan.status_table, status);

            if after == before {
                break;
            }
            if passes >= MAX_RECONCILE_PASSES {
                log::warn!(
                    "{} counters still moving after {} passes, accepting snapshot",
                    id,
                    passes
                );
                break;
            }

            let block_len = match (plan.block_len)(self) {
                Some(n) if n > 0 => n,
                _ => break,
            };
            let new_len = after.valid_blocks as usize * block_len;
            let start = (before.last_block.min(after.last_block) as usize * block_len)
                .min(new_len);
            data.resize(new_len, 0);
            if start < new_len {
                let tail = read_range_chunks(io, id, start as u32, new_len - start).await?;
                data[start..start + tail.len()].copy_from_slice(&tail);
            }
            log::debug!(
                "{} moved while being read, refreshed blocks {}..{}",
                id,
                before.last_block.min(after.last_block),
                after.valid_blocks
            );

            before = after;
            passes += 1;
        }
        Ok(())
    }
}

/// Full read with the transient-response retry budget
async fn service_read_full<IO: TableIo>(io: &mut IO, id: TableId) -> PsemResult<Vec<u8>> {
    let mut attempts = 0;
    loop {
        let response = io.read_full(id).await?;
        if response.code.is_ok() {
            return Ok(response.data);
        }
        if response.code.is_transient() && attempts < READ_RETRY_LIMIT {
            attempts += 1;
            log::debug!("{} read answered {}, retry {}", id, response.code, attempts);
            tokio::time::sleep(READ_RETRY_BACKOFF).await;
            continue;
        }
        return Err(PsemError::Rejected(response.code));
    }
}

/// Offset read with the transient-response retry budget
async fn service_read_offset<IO: TableIo>(
    io: &mut IO,
    id: TableId,
    offset: u32,
    count: u16,
) -> PsemResult<Vec<u8>> {
    let mut attempts = 0;
    loop {
        let response = io.read_offset(id, offset, count).await?;
        if response.code.is_ok() {
            return Ok(response.data);
        }
        if response.code.is_transient() && attempts < READ_RETRY_LIMIT {
            attempts += 1;
            log::debug!(
                "{} offset read answered {}, retry {}",
                id,
                response.code,
                attempts
            );
            tokio::time::sleep(READ_RETRY_BACKOFF).await;
            continue;
        }
        return Err(PsemError::Rejected(response.code));
    }
}

/// Read `len` octets starting at `offset` in transfer-sized chunks
async fn read_range_chunks<IO: TableIo>(
    io: &mut IO,
    id: TableId,
    offset: u32,
    len: usize,
) -> PsemResult<Vec<u8>> {
    let chunk = io.max_offset_read().clamp(1, u16::MAX as usize);
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let count = (len - data.len()).min(chunk) as u16;
        let part = service_read_offset(io, id, offset + data.len() as u32, count).await?;
        if part.is_empty() {
            return Err(PsemError::Protocol(format!(
                "Zero-length chunk reading {}",
                id
            )));
        }
        data.extend_from_slice(&part);
    }
    data.truncate(len);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        standard_catalog, ST_LP_DATA, ST_LP_LIMITS, ST_LP_STATUS,
    };
    use async_trait::async_trait;
    use psem_core::ResponseCode;
    use psem_session::ServiceResponse;

    type MutHook = Box<dyn FnMut(&mut HashMap<TableId, Vec<u8>>) + Send>;

    /// Table-IO double backed by an in-memory table map, with call
    /// recording and optional mutation hooks that model a device whose
    /// log keeps appending while it is being read.
    struct FakeIo {
        tables: HashMap<TableId, Vec<u8>>,
        max_read: usize,
        full_reads: Vec<TableId>,
        offset_reads: Vec<(TableId, u32, u16)>,
        writes: Vec<(TableId, Vec<u8>)>,
        busy_remaining: HashMap<TableId, u32>,
        /// fire once, after the Nth offset read of the given table
        after_offset_read: Option<(TableId, usize, MutHook)>,
        /// fire after every full read of the given table
        after_full_read: Option<(TableId, MutHook)>,
        write_code: ResponseCode,
    }

    impl FakeIo {
        fn new(max_read: usize) -> Self {
            Self {
                tables: HashMap::new(),
                max_read,
                full_reads: Vec::new(),
                offset_reads: Vec::new(),
                writes: Vec::new(),
                busy_remaining: HashMap::new(),
                after_offset_read: None,
                after_full_read: None,
                write_code: ResponseCode::Ok,
            }
        }

        fn with_table(mut self, id: TableId, data: Vec<u8>) -> Self {
            self.tables.insert(id, data);
            self
        }

        fn full_reads_of(&self, id: TableId) -> usize {
            self.full_reads.iter().filter(|t| **t == id).count()
        }

        fn offset_reads_of(&self, id: TableId) -> usize {
            self.offset_reads.iter().filter(|(t, _, _)| *t == id).count()
        }

        fn serve_busy(&mut self, id: TableId) -> bool {
            if let Some(remaining) = self.busy_remaining.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return true;
                }
            }
            false
        }
    }

    #[async_trait]
    impl TableIo for FakeIo {
        async fn read_full(&mut self, id: TableId) -> PsemResult<ServiceResponse> {
            self.full_reads.push(id);
            if self.serve_busy(id) {
                return Ok(ServiceResponse::nok(ResponseCode::Busy));
            }
            let response = match self.tables.get(&id) {
                Some(data) => ServiceResponse::ok(data.clone()),
                None => ServiceResponse::nok(ResponseCode::OperationNotPossible),
            };
            if let Some((tid, hook)) = self.after_full_read.as_mut() {
                if *tid == id {
                    hook(&mut self.tables);
                }
            }
            Ok(response)
        }

        async fn read_offset(
            &mut self,
            id: TableId,
            offset: u32,
            count: u16,
        ) -> PsemResult<ServiceResponse> {
            self.offset_reads.push((id, offset, count));
            if self.serve_busy(id) {
                return Ok(ServiceResponse::nok(ResponseCode::Busy));
            }
            let response = match self.tables.get(&id) {
                Some(data) => {
                    let start = (offset as usize).min(data.len());
                    let end = (start + count as usize).min(data.len());
                    ServiceResponse::ok(data[start..end].to_vec())
                }
                None => ServiceResponse::nok(ResponseCode::OperationNotPossible),
            };
            let fire = match self.after_offset_read.as_mut() {
                Some((tid, remaining, _)) if *tid == id => {
                    *remaining -= 1;
                    *remaining == 0
                }
                _ => false,
            };
            if fire {
                if let Some((_, _, mut hook)) = self.after_offset_read.take() {
                    hook(&mut self.tables);
                }
            }
            Ok(response)
        }

        async fn write_full(&mut self, id: TableId, data: &[u8]) -> PsemResult<ResponseCode> {
            self.writes.push((id, data.to_vec()));
            if self.write_code.is_ok() {
                self.tables.insert(id, data.to_vec());
            }
            Ok(self.write_code)
        }

        async fn write_offset(
            &mut self,
            id: TableId,
            offset: u32,
            data: &[u8],
        ) -> PsemResult<ResponseCode> {
            self.writes.push((id, data.to_vec()));
            if self.write_code.is_ok() {
                if let Some(table) = self.tables.get_mut(&id) {
                    let end = offset as usize + data.len();
                    if table.len() < end {
                        table.resize(end, 0);
                    }
                    table[offset as usize..end].copy_from_slice(data);
                }
            }
            Ok(self.write_code)
        }

        async fn wait(&mut self, _seconds: u8) -> PsemResult<ResponseCode> {
            Ok(ResponseCode::Ok)
        }

        fn max_offset_read(&self) -> usize {
            self.max_read
        }
    }

    fn lp_limits(nbr_blocks: u16, block_len: u16) -> Vec<u8> {
        let mut limits = vec![0u8; 8];
        limits[4..6].copy_from_slice(&nbr_blocks.to_le_bytes());
        limits[6..8].copy_from_slice(&block_len.to_le_bytes());
        limits
    }

    fn lp_status(valid_blocks: u16, last_block: u16, valid_intervals: u16) -> Vec<u8> {
        let mut status = vec![0u8; 7];
        status[1..3].copy_from_slice(&valid_blocks.to_le_bytes());
        status[3..5].copy_from_slice(&last_block.to_le_bytes());
        status[5..7].copy_from_slice(&valid_intervals.to_le_bytes());
        status
    }

    #[tokio::test]
    async fn test_read_is_lazy_and_invalidate_forces_fresh_read() {
        let mut io = FakeIo::new(64).with_table(TableId(1), vec![0xAB; 32]);
        let mut cache = TableCache::new(standard_catalog());

        cache.read(&mut io, TableId(1)).await.unwrap();
        cache.read(&mut io, TableId(1)).await.unwrap();
        assert_eq!(io.full_reads_of(TableId(1)), 1);

        cache.invalidate(TableId(1));
        assert!(!cache.is_loaded(TableId(1)));
        cache.read(&mut io, TableId(1)).await.unwrap();
        assert_eq!(io.full_reads_of(TableId(1)), 2);
    }

    #[tokio::test]
    async fn test_dependencies_read_before_table() {
        let mut io = FakeIo::new(64)
            .with_table(ST_LP_LIMITS, lp_limits(3, 4))
            .with_table(ST_LP_STATUS, lp_status(3, 2, 9))
            .with_table(ST_LP_DATA, (0u8..12).collect());
        let mut cache = TableCache::new(standard_catalog());

        let data = cache.read(&mut io, ST_LP_DATA).await.unwrap();
        assert_eq!(data.len(), 12);
        assert!(cache.is_loaded(ST_LP_LIMITS));
        assert!(cache.is_loaded(ST_LP_STATUS));
        // limits and status went over the wire before the data table
        assert_eq!(io.full_reads[0], ST_LP_LIMITS);
        assert_eq!(io.full_reads[1], ST_LP_STATUS);
    }

    #[tokio::test]
    async fn test_unresolvable_gating_field_fails_without_decode_error() {
        // limits table exists but is truncated: the length function cannot
        // resolve, and the data table must not be read at all
        let mut io = FakeIo::new(64)
            .with_table(ST_LP_LIMITS, vec![0u8; 3])
            .with_table(ST_LP_STATUS, lp_status(3, 2, 9))
            .with_table(ST_LP_DATA, (0u8..12).collect());
        let mut cache = TableCache::new(standard_catalog());

        let result = cache.read(&mut io, ST_LP_DATA).await;
        assert!(matches!(result, Err(PsemError::InvalidData(_))));
        assert_eq!(io.full_reads_of(ST_LP_DATA), 0);
        assert_eq!(io.offset_reads_of(ST_LP_DATA), 0);
    }

    #[tokio::test]
    async fn test_zero_length_table_never_touches_the_wire() {
        let mut io = FakeIo::new(64)
            .with_table(ST_LP_LIMITS, lp_limits(0, 4))
            .with_table(ST_LP_STATUS, lp_status(0, 0, 0));
        let mut cache = TableCache::new(standard_catalog());

        let data = cache.read(&mut io, ST_LP_DATA).await.unwrap();
        assert!(data.is_empty());
        assert!(cache.is_loaded(ST_LP_DATA));
        assert_eq!(io.full_reads_of(ST_LP_DATA), 0);
        assert_eq!(io.offset_reads_of(ST_LP_DATA), 0);
    }

    #[tokio::test]
    async fn test_large_table_read_in_chunks() {
        let mut io = FakeIo::new(8)
            .with_table(ST_LP_LIMITS, lp_limits(4, 4))
            .with_table(ST_LP_STATUS, lp_status(4, 3, 16))
            .with_table(ST_LP_DATA, (0u8..16).collect());
        let mut cache = TableCache::new(standard_catalog());

        let data = cache.read(&mut io, ST_LP_DATA).await.unwrap();
        assert_eq!(data, (0u8..16).collect::<Vec<u8>>());
        assert_eq!(
            io.offset_reads,
            vec![(ST_LP_DATA, 0, 8), (ST_LP_DATA, 8, 8)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_retried_twice_then_succeeds() {
        let mut io = FakeIo::new(64).with_table(TableId(1), vec![0xCD; 32]);
        io.busy_remaining.insert(TableId(1), 2);
        let mut cache = TableCache::new(standard_catalog());

        let data = cache.read(&mut io, TableId(1)).await.unwrap();
        assert_eq!(data.len(), 32);
        assert_eq!(io.full_reads_of(TableId(1)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_budget_exhausted() {
        let mut io = FakeIo::new(64).with_table(TableId(1), vec![0xCD; 32]);
        io.busy_remaining.insert(TableId(1), 3);
        let mut cache = TableCache::new(standard_catalog());

        let result = cache.read(&mut io, TableId(1)).await;
        assert!(matches!(
            result,
            Err(PsemError::Rejected(ResponseCode::Busy))
        ));
        assert_eq!(io.full_reads_of(TableId(1)), 3);
        assert!(!cache.is_loaded(TableId(1)));
    }

    #[tokio::test]
    async fn test_log_counters_change_once_triggers_one_extra_pass() {
        // three 4-octet blocks; a fourth block appears while the second
        // chunk is being served
        let mut io = FakeIo::new(8)
            .with_table(ST_LP_LIMITS, lp_limits(8, 4))
            .with_table(ST_LP_STATUS, lp_status(3, 2, 9))
            .with_table(ST_LP_DATA, (0u8..12).collect());
        io.after_offset_read = Some((
            ST_LP_DATA,
            1,
            Box::new(|tables| {
                tables.insert(ST_LP_DATA, (0u8..16).collect());
                tables.insert(ST_LP_STATUS, lp_status(4, 3, 12));
            }),
        ));
        let mut cache = TableCache::new(standard_catalog());

        let data = cache.read(&mut io, ST_LP_DATA).await.unwrap();
        assert_eq!(data, (0u8..16).collect::<Vec<u8>>());
        // one dependency read plus exactly two stability checks
        assert_eq!(io.full_reads_of(ST_LP_STATUS), 3);
        // initial two chunks plus one trailing-block refresh
        assert_eq!(io.offset_reads_of(ST_LP_DATA), 3);
        // the refreshed status is what the cache now holds
        assert_eq!(cache.bytes(ST_LP_STATUS).unwrap(), &lp_status(4, 3, 12)[..]);
    }

    #[tokio::test]
    async fn test_log_counters_moving_forever_bounded_at_two_passes() {
        let mut io = FakeIo::new(8)
            .with_table(ST_LP_LIMITS, lp_limits(16, 4))
            .with_table(ST_LP_STATUS, lp_status(3, 2, 9))
            .with_table(ST_LP_DATA, (0u8..12).collect());
        // every status read is followed by another appended block
        let mut appended: u16 = 3;
        io.after_full_read = Some((
            ST_LP_STATUS,
            Box::new(move |tables| {
                appended += 1;
                let len = appended as usize * 4;
                tables.insert(ST_LP_DATA, (0..len as u8).collect());
                tables.insert(
                    ST_LP_STATUS,
                    lp_status(appended, appended - 1, appended * 4),
                );
            }),
        ));
        let mut cache = TableCache::new(standard_catalog());

        let data = cache.read(&mut io, ST_LP_DATA).await.unwrap();
        // dependency read plus three stability checks, then best effort
        assert_eq!(io.full_reads_of(ST_LP_STATUS), 4);
        // two trailing-block refreshes on top of the two initial chunks
        assert_eq!(io.offset_reads_of(ST_LP_DATA), 4);
        // snapshot reflects the last refresh that was actually performed
        assert_eq!(data.len(), 20);
    }

    #[tokio::test]
    async fn test_write_invalidates_dependents() {
        let mut io = FakeIo::new(64)
            .with_table(ST_LP_LIMITS, lp_limits(3, 4))
            .with_table(ST_LP_STATUS, lp_status(3, 2, 9))
            .with_table(ST_LP_DATA, (0u8..12).collect());
        let mut cache = TableCache::new(standard_catalog());
        cache.read(&mut io, ST_LP_DATA).await.unwrap();
        assert!(cache.is_loaded(ST_LP_LIMITS));

        let outcome = cache
            .write(&mut io, ST_LP_LIMITS, &lp_limits(3, 8))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);
        assert!(!cache.is_loaded(ST_LP_LIMITS));
        assert!(!cache.is_loaded(ST_LP_STATUS));
        assert!(!cache.is_loaded(ST_LP_DATA));
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_cache_and_translates() {
        let mut io = FakeIo::new(64).with_table(TableId(1), vec![0u8; 32]);
        io.write_code = ResponseCode::SecurityViolation;
        let mut cache = TableCache::new(standard_catalog());
        cache.read(&mut io, TableId(1)).await.unwrap();

        let outcome = cache.write(&mut io, TableId(1), &[0xFF; 32]).await.unwrap();
        assert_eq!(outcome, Outcome::SecurityError);
        assert!(cache.is_loaded(TableId(1)));
    }

    #[tokio::test]
    async fn test_read_range_is_uncached() {
        let mut io = FakeIo::new(8).with_table(TableId(1), (0u8..32).collect());
        let cache = TableCache::new(standard_catalog());

        let data = cache.read_range(&mut io, TableId(1), 4, 10).await.unwrap();
        assert_eq!(data, (4u8..14).collect::<Vec<u8>>());
        assert!(!cache.is_loaded(TableId(1)));
        assert_eq!(io.offset_reads, vec![(TableId(1), 4, 8), (TableId(1), 12, 2)]);
    }
}
