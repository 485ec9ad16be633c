//! Accumulator for recovered directory records.

use crate::ondisk::Entry;
use crate::types::Xid;
use serde::Serialize;
use std::collections::BTreeMap;

/// Transaction id → volume name → records, in append order.
pub type RecoveredEntries = BTreeMap<Xid, BTreeMap<String, Vec<Entry>>>;

/// Merged result of a walk. Constructed fresh per walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileEntryStore {
    entries: RecoveredEntries,
}

impl FileEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every volume of `source` under `xid`, renaming volumes to
    /// `volume` when given. Never deduplicates or reorders. A volume with no
    /// records still gets a key; a source with no volumes adds nothing.
    pub fn merge(&mut self, source: RecoveredEntries, xid: Xid, volume: Option<&str>) {
        for (name, entries) in source.into_values().flatten() {
            let key = volume.map_or(name, str::to_owned);
            self.entries
                .entry(xid)
                .or_default()
                .entry(key)
                .or_default()
                .extend(entries);
        }
    }

    pub fn get(&self, xid: Xid, volume: &str) -> Option<&[Entry]> {
        self.entries
            .get(&xid)
            .and_then(|volumes| volumes.get(volume))
            .map(Vec::as_slice)
    }

    /// Total number of records across all transactions and volumes.
    pub fn entry_count(&self) -> usize {
        self.entries
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &RecoveredEntries {
        &self.entries
    }

    pub fn into_entries(self) -> RecoveredEntries {
        self.entries
    }
}

impl From<FileEntryStore> for RecoveredEntries {
    fn from(store: FileEntryStore) -> Self {
        store.into_entries()
    }
}
