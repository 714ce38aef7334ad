//! In-process table store implementing the storage seam.
//!
//! Transactions buffer their inserts and only touch shared state on commit,
//! so uncommitted rows are visible to nothing but the owning transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, ShardError};
use crate::routing::key::KeyValue;
use crate::storage::{Backend, BackendTxn, Record};

type Tables = HashMap<String, BTreeMap<KeyValue, serde_json::Value>>;

/// Read-committed in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A read replica sharing this backend's committed data.
    pub fn replica(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::clone(&self.tables),
        }
    }

    /// Insert and commit a row immediately.
    pub fn insert_committed(&self, record: Record) -> Result<u64> {
        let mut tables = self.tables.write();
        let table = tables.entry(record.table.clone()).or_default();
        if table.contains_key(&record.key) {
            return Err(duplicate(&self.name, &record));
        }
        table.insert(record.key, record.row);
        Ok(1)
    }

    /// Drop every row of every table.
    pub fn clear(&self) {
        self.tables.write().clear();
    }

    pub fn contains(&self, table: &str, key: &KeyValue) -> bool {
        self.tables
            .read()
            .get(table)
            .map(|t| t.contains_key(key))
            .unwrap_or(false)
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self) -> Result<Box<dyn BackendTxn>> {
        Ok(Box::new(MemoryTxn {
            backend: self.name.clone(),
            tables: Arc::clone(&self.tables),
            pending: Vec::new(),
        }))
    }

    fn count(&self, table: &str) -> Result<u64> {
        Ok(self.tables.read().get(table).map(|t| t.len()).unwrap_or(0) as u64)
    }
}

struct MemoryTxn {
    backend: String,
    tables: Arc<RwLock<Tables>>,
    pending: Vec<Record>,
}

impl MemoryTxn {
    fn is_pending(&self, record: &Record) -> bool {
        self.pending
            .iter()
            .any(|p| p.table == record.table && p.key == record.key)
    }
}

impl BackendTxn for MemoryTxn {
    fn insert(&mut self, record: &Record) -> Result<u64> {
        let committed = self
            .tables
            .read()
            .get(&record.table)
            .map(|t| t.contains_key(&record.key))
            .unwrap_or(false);
        if committed || self.is_pending(record) {
            return Err(duplicate(&self.backend, record));
        }
        self.pending.push(record.clone());
        Ok(1)
    }

    fn count(&self, table: &str) -> Result<u64> {
        let committed = self.tables.read().get(table).map(|t| t.len()).unwrap_or(0);
        let pending = self.pending.iter().filter(|p| p.table == table).count();
        Ok((committed + pending) as u64)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTxn {
            backend,
            tables,
            pending,
        } = *self;
        let mut tables = tables.write();
        // All-or-nothing: a row committed elsewhere since our insert aborts the whole txn.
        for record in &pending {
            if tables
                .get(&record.table)
                .map(|t| t.contains_key(&record.key))
                .unwrap_or(false)
            {
                return Err(duplicate(&backend, record));
            }
        }
        for record in pending {
            tables
                .entry(record.table)
                .or_default()
                .insert(record.key, record.row);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn duplicate(backend: &str, record: &Record) -> ShardError {
    ShardError::Backend(format!(
        "duplicate key {} in {}.{}",
        record.key, backend, record.table
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: i64) -> Record {
        Record::new("users", id, json!({ "id": id }))
    }

    #[test]
    fn test_txn_isolation() {
        let db = MemoryBackend::new("db-a");
        db.insert_committed(user(1)).unwrap();

        let mut txn = db.begin().unwrap();
        assert_eq!(txn.insert(&user(2)).unwrap(), 1);
        assert_eq!(txn.count("users").unwrap(), 2);
        assert_eq!(db.count("users").unwrap(), 1);

        txn.commit().unwrap();
        assert_eq!(db.count("users").unwrap(), 2);
    }

    #[test]
    fn test_rollback_discards() {
        let db = MemoryBackend::new("db-a");
        let mut txn = db.begin().unwrap();
        txn.insert(&user(1)).unwrap();
        txn.rollback().unwrap();
        assert_eq!(db.count("users").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_insert() {
        let db = MemoryBackend::new("db-a");
        db.insert_committed(user(1)).unwrap();
        let mut txn = db.begin().unwrap();
        assert!(matches!(txn.insert(&user(1)), Err(ShardError::Backend(_))));
        txn.insert(&user(2)).unwrap();
        assert!(txn.insert(&user(2)).is_err());
    }

    #[test]
    fn test_commit_conflict_applies_nothing() {
        let db = MemoryBackend::new("db-a");
        let mut txn = db.begin().unwrap();
        txn.insert(&user(1)).unwrap();
        txn.insert(&user(2)).unwrap();
        db.insert_committed(user(2)).unwrap();

        assert!(txn.commit().is_err());
        assert_eq!(db.count("users").unwrap(), 1);
        assert!(!db.contains("users", &KeyValue::Int(1)));
    }

    #[test]
    fn test_replica_shares_data() {
        let db = MemoryBackend::new("db-a");
        let replica = db.replica("db-a-ro");
        db.insert_committed(user(1)).unwrap();
        assert_eq!(replica.count("users").unwrap(), 1);
        assert_eq!(replica.name(), "db-a-ro");
        db.clear();
        assert_eq!(replica.count("users").unwrap(), 0);
    }
}
