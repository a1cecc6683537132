//! In-memory shard table
//!
//! Maps database name to its current set of shard-placement records.
//! Written by exactly one task (the shard-map cache subscriber), read by
//! arbitrarily many. `lookup` hands out an `Arc` snapshot of the per-database
//! set, so a reader never observes a half-applied replacement.

use crate::common::{key_hash, Error, Result};
use crate::shards::record::ShardRecord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Concurrent database → shard-record-set map.
///
/// The sole failure mode is structural: a panic inside a critical section
/// poisons the lock, after which every operation reports
/// [`Error::TableCorrupted`]. That condition is fatal to the owning cache
/// and is never retried here.
#[derive(Default)]
pub struct ShardTable {
    inner: RwLock<HashMap<String, Arc<Vec<ShardRecord>>>>,
}

impl ShardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically discard all records for `database` and install `records`.
    pub fn replace(&self, database: &str, records: Vec<ShardRecord>) -> Result<()> {
        let mut map = self.write()?;
        map.insert(database.to_string(), Arc::new(records));
        Ok(())
    }

    /// Atomically discard all records for `database`. Absent key is a no-op.
    pub fn remove(&self, database: &str) -> Result<()> {
        let mut map = self.write()?;
        map.remove(database);
        Ok(())
    }

    /// Snapshot of the current record set for `database`, or `None` if the
    /// database is unknown.
    pub fn lookup(&self, database: &str) -> Result<Option<Arc<Vec<ShardRecord>>>> {
        let map = self.read()?;
        Ok(map.get(database).cloned())
    }

    /// Records of `database` whose range owns the hash of `key`: the
    /// shards a document-level request must be routed to.
    pub fn lookup_key(&self, database: &str, key: &str) -> Result<Vec<ShardRecord>> {
        let h = key_hash(key);
        let records = self.lookup(database)?;
        Ok(records
            .map(|set| {
                set.iter()
                    .filter(|r| r.range.contains(h))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// All databases currently known to the table.
    pub fn databases(&self) -> Result<Vec<String>> {
        let map = self.read()?;
        Ok(map.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Vec<ShardRecord>>>>> {
        self.inner
            .read()
            .map_err(|e| Error::TableCorrupted(e.to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Vec<ShardRecord>>>>> {
        self.inner
            .write()
            .map_err(|e| Error::TableCorrupted(e.to_string()))
    }

    /// Poison the storage lock by panicking inside the critical section,
    /// simulating structural corruption.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = self.inner.write().unwrap();
                    panic!("poisoning shard table");
                })
                .join()
        });
    }
}
