//! Table slot arena
//!
//! The cache owns every table for the life of one logical session. Slots
//! are invalidated wholesale at logoff/terminate; stale bytes from a prior
//! session are never reinterpreted.

use psem_core::TableId;
use std::collections::HashMap;

use crate::registry::{LengthRule, TableCatalog};

/// In-memory arena of table slots keyed by identifier
pub struct TableCache {
    catalog: TableCatalog,
    slots: HashMap<TableId, Vec<u8>>,
}

impl TableCache {
    pub fn new(catalog: TableCatalog) -> Self {
        Self {
            catalog,
            slots: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn is_loaded(&self, id: TableId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Cached content, if the table is loaded
    pub fn bytes(&self, id: TableId) -> Option<&[u8]> {
        self.slots.get(&id).map(|v| v.as_slice())
    }

    /// Install decoded content for a table
    pub fn insert(&mut self, id: TableId, data: Vec<u8>) {
        self.slots.insert(id, data);
    }

    /// Drop one slot; the next read goes to the wire
    pub fn invalidate(&mut self, id: TableId) {
        self.slots.remove(&id);
    }

    /// Drop one slot plus every table that declares it as a dependency
    pub fn invalidate_with_dependents(&mut self, id: TableId) {
        self.slots.remove(&id);
        for dependent in self.catalog.dependents_of(id) {
            self.slots.remove(&dependent);
        }
    }

    /// Drop every slot; used at logoff/terminate
    pub fn invalidate_all(&mut self) {
        self.slots.clear();
    }

    /// Loaded table identifiers, sorted; the export enumeration surface
    pub fn loaded_tables(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.slots.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Resolve the table's effective length against the catalog
    ///
    /// `None` means the length cannot be established yet: an unlisted
    /// table, a wire-decided table not yet loaded, or a gating dependency
    /// missing from the cache. Never a decode error.
    pub fn effective_length(&self, id: TableId) -> Option<usize> {
        match self.catalog.get(id).map(|spec| &spec.length) {
            Some(LengthRule::Fixed(n)) => Some(*n),
            Some(LengthRule::FromTables(f)) => f(self),
            Some(LengthRule::WireDecides) | None => self.bytes(id).map(|b| b.len()),
        }
    }

    /// Whether the table currently has a nonzero effective length; `None`
    /// while that cannot be determined without touching the wire
    pub fn has_nonzero_length(&self, id: TableId) -> Option<bool> {
        self.effective_length(id).map(|len| len > 0)
    }
}
