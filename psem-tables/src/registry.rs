//! Table catalog
//!
//! Per-table metadata consulted before every read: declared dependencies,
//! the rule that yields the table's effective length, and for append-only
//! logs the status-counter linkage used to re-validate chunked transfers.
//! Device variants extend the standard catalog with their manufacturer
//! tables at logon time; there is no per-model subclassing.

use psem_core::TableId;
use std::collections::HashMap;

use crate::cache::TableCache;

/// Counters an append-only log exposes through its status table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCounters {
    pub valid_blocks: u16,
    pub last_block: u16,
    pub valid_intervals: u16,
}

/// Resolves a length from other tables' cached fields. `None` while a
/// gating table is not in the cache.
pub type LengthFn = fn(&TableCache) -> Option<usize>;

/// Parses a status table's counter fields. `None` on a malformed table.
pub type CountersFn = fn(&[u8]) -> Option<LogCounters>;

/// How a table's effective length is established
pub enum LengthRule {
    /// Known fixed size
    Fixed(usize),
    /// Computed from cached dependency tables
    FromTables(LengthFn),
    /// Whatever a full read returns
    WireDecides,
}

/// Linkage between a log data table and its mutating status counters
pub struct LogSpec {
    /// Table carrying the counters
    pub status_table: TableId,
    /// Octets per log block, resolved from cached configuration tables
    pub block_len: LengthFn,
    /// Counter field parser for the status table
    pub parse_counters: CountersFn,
}

/// Static description of one table
pub struct TableSpec {
    pub id: TableId,
    pub name: &'static str,
    /// Tables that must be cached before this one is read
    pub deps: &'static [TableId],
    pub length: LengthRule,
    pub log: Option<LogSpec>,
}

/// Catalog of table specs for one device variant
#[derive(Default)]
pub struct TableCatalog {
    specs: HashMap<TableId, TableSpec>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: TableSpec) {
        self.specs.insert(spec.id, spec);
    }

    pub fn get(&self, id: TableId) -> Option<&TableSpec> {
        self.specs.get(&id)
    }

    /// Tables that declare `id` as a dependency
    pub fn dependents_of(&self, id: TableId) -> Vec<TableId> {
        let mut dependents: Vec<TableId> = self
            .specs
            .values()
            .filter(|spec| spec.deps.contains(&id))
            .map(|spec| spec.id)
            .collect();
        dependents.sort();
        dependents
    }
}

const ST_GEN_CONFIG: TableId = TableId(0);
const ST_GENERAL_MFG_ID: TableId = TableId(1);

/// Load-profile limits: memory length u32, block count u16, block length
/// u16; all little-endian
pub const ST_LP_LIMITS: TableId = TableId(61);
/// Load-profile status: flags u8, valid blocks u16, last block u16, valid
/// intervals u16; all little-endian
pub const ST_LP_STATUS: TableId = TableId(63);
/// Load-profile data set
pub const ST_LP_DATA: TableId = TableId(64);

fn lp_block_len(cache: &TableCache) -> Option<usize> {
    let limits = cache.bytes(ST_LP_LIMITS)?;
    let raw = limits.get(6..8)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]) as usize)
}

fn lp_data_len(cache: &TableCache) -> Option<usize> {
    let block_len = lp_block_len(cache)?;
    let status = cache.bytes(ST_LP_STATUS)?;
    let raw = status.get(1..3)?;
    let valid_blocks = u16::from_le_bytes([raw[0], raw[1]]) as usize;
    Some(valid_blocks * block_len)
}

/// Counter fields of the load-profile status table
pub fn lp_parse_counters(status: &[u8]) -> Option<LogCounters> {
    if status.len() < 7 {
        return None;
    }
    Some(LogCounters {
        valid_blocks: u16::from_le_bytes([status[1], status[2]]),
        last_block: u16::from_le_bytes([status[3], status[4]]),
        valid_intervals: u16::from_le_bytes([status[5], status[6]]),
    })
}

/// The standard tables the core touches
pub fn standard_catalog() -> TableCatalog {
    let mut catalog = TableCatalog::new();
    catalog.insert(TableSpec {
        id: ST_GEN_CONFIG,
        name: "GEN_CONFIG",
        deps: &[],
        length: LengthRule::WireDecides,
        log: None,
    });
    catalog.insert(TableSpec {
        id: ST_GENERAL_MFG_ID,
        name: "GENERAL_MFG_ID",
        deps: &[],
        length: LengthRule::Fixed(32),
        log: None,
    });
    catalog.insert(TableSpec {
        id: ST_LP_LIMITS,
        name: "ACTUAL_LP_LIMITS",
        deps: &[],
        length: LengthRule::Fixed(8),
        log: None,
    });
    catalog.insert(TableSpec {
        id: ST_LP_STATUS,
        name: "LP_STATUS",
        deps: &[ST_LP_LIMITS],
        length: LengthRule::Fixed(7),
        log: None,
    });
    catalog.insert(TableSpec {
        id: ST_LP_DATA,
        name: "LP_DATA_SET",
        deps: &[ST_LP_LIMITS, ST_LP_STATUS],
        length: LengthRule::FromTables(lp_data_len),
        log: Some(LogSpec {
            status_table: ST_LP_STATUS,
            block_len: lp_block_len,
            parse_counters: lp_parse_counters,
        }),
    });
    catalog
}

/// AX-family event-log status: flags u8, valid entries u16, last entry
/// u16, entry length u8; all little-endian
pub const MT_EVENT_LOG_STATUS: TableId = TableId::manufacturer(75);
/// AX-family event-log data
pub const MT_EVENT_LOG_DATA: TableId = TableId::manufacturer(76);

fn ax_event_entry_len(cache: &TableCache) -> Option<usize> {
    let status = cache.bytes(MT_EVENT_LOG_STATUS)?;
    status.get(5).map(|len| *len as usize)
}

fn ax_event_data_len(cache: &TableCache) -> Option<usize> {
    let entry_len = ax_event_entry_len(cache)?;
    let status = cache.bytes(MT_EVENT_LOG_STATUS)?;
    let raw = status.get(1..3)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]) as usize * entry_len)
}

fn ax_event_counters(status: &[u8]) -> Option<LogCounters> {
    if status.len() < 6 {
        return None;
    }
    let valid = u16::from_le_bytes([status[1], status[2]]);
    Some(LogCounters {
        valid_blocks: valid,
        last_block: u16::from_le_bytes([status[3], status[4]]),
        valid_intervals: valid,
    })
}

/// Standard catalog extended with the AX family's manufacturer event log
pub fn ax_catalog() -> TableCatalog {
    let mut catalog = standard_catalog();
    catalog.insert(TableSpec {
        id: MT_EVENT_LOG_STATUS,
        name: "MFG_EVENT_LOG_STATUS",
        deps: &[],
        length: LengthRule::Fixed(6),
        log: None,
    });
    catalog.insert(TableSpec {
        id: MT_EVENT_LOG_DATA,
        name: "MFG_EVENT_LOG_DATA",
        deps: &[MT_EVENT_LOG_STATUS],
        length: LengthRule::FromTables(ax_event_data_len),
        log: Some(LogSpec {
            status_table: MT_EVENT_LOG_STATUS,
            block_len: ax_event_entry_len,
            parse_counters: ax_event_counters,
        }),
    });
    catalog
}

/// Select the catalog for a device class string, as reported in the
/// manufacturer identification table
pub fn catalog_for_device_class(device_class: &str) -> TableCatalog {
    match device_class {
        "AX" | "A3" => ax_catalog(),
        _ => standard_catalog(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_dependencies() {
        let catalog = standard_catalog();
        let lp = catalog.get(ST_LP_DATA).unwrap();
        assert_eq!(lp.deps, &[ST_LP_LIMITS, ST_LP_STATUS]);
        assert!(lp.log.is_some());
    }

    #[test]
    fn test_dependents_of() {
        let catalog = standard_catalog();
        assert_eq!(
            catalog.dependents_of(ST_LP_LIMITS),
            vec![ST_LP_STATUS, ST_LP_DATA]
        );
        assert_eq!(catalog.dependents_of(ST_GEN_CONFIG), Vec::<TableId>::new());
    }

    #[test]
    fn test_device_class_dispatch() {
        let ax = catalog_for_device_class("AX");
        assert!(ax.get(MT_EVENT_LOG_DATA).is_some());
        assert_eq!(
            ax.get(MT_EVENT_LOG_DATA).unwrap().deps,
            &[MT_EVENT_LOG_STATUS]
        );
        // the variant keeps the standard tables
        assert!(ax.get(ST_LP_DATA).is_some());

        let generic = catalog_for_device_class("SOMETHING ELSE");
        assert!(generic.get(MT_EVENT_LOG_DATA).is_none());
    }

    #[test]
    fn test_ax_event_counters() {
        let status = [0x00, 0x10, 0x00, 0x0F, 0x00, 19];
        let counters = ax_event_counters(&status).unwrap();
        assert_eq!(counters.valid_blocks, 16);
        assert_eq!(counters.last_block, 15);
        assert_eq!(ax_event_counters(&status[..4]), None);
    }

    #[test]
    fn test_lp_parse_counters() {
        let status = [0x00, 0x03, 0x00, 0x02, 0x00, 0x2A, 0x00];
        assert_eq!(
            lp_parse_counters(&status),
            Some(LogCounters {
                valid_blocks: 3,
                last_block: 2,
                valid_intervals: 42
            })
        );
        assert_eq!(lp_parse_counters(&status[..5]), None);
    }
}
