//! Session — one transactional interaction with a shard.
//!
//! A session starts idle, opens a backend transaction on its first
//! mutation, and becomes terminal after `commit` or `rollback` until it is
//! rearmed with `init`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Result, ShardError};
use crate::routing::key::RoutingKey;
use crate::routing::slot_router::ShardId;
use crate::storage::{BackendTxn, Handle, Record};

/// How a session's last transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed,
    RolledBack,
    /// The backend rejected the commit; nothing was applied.
    Failed,
}

enum TxnSlot {
    Idle,
    Open(Box<dyn BackendTxn>),
    Finished(TxnOutcome),
}

struct SessionState {
    txn: TxnSlot,
    ops: Vec<Record>,
}

/// A bound, stateful handle for one shard.
pub struct Session {
    id: u64,
    shard: ShardId,
    key: RoutingKey,
    handle: Handle,
    state: Mutex<SessionState>,
}

/// Sessions are shared between their creator and the coordinator's registry.
pub type SharedSession = Arc<Session>;

impl Session {
    /// Bind a fresh, inactive session to a shard handle.
    pub fn new(id: u64, shard: impl Into<ShardId>, handle: Handle, key: RoutingKey) -> Self {
        Self {
            id,
            shard: shard.into(),
            key,
            handle,
            state: Mutex::new(SessionState {
                txn: TxnSlot::Idle,
                ops: Vec::new(),
            }),
        }
    }

    /// Apply a mutation inside this session's transaction, opening one if needed.
    pub fn insert(&self, record: &Record) -> Result<u64> {
        let mut state = self.state.lock();
        if let TxnSlot::Finished(_) = state.txn {
            return Err(ShardError::WrongTx);
        }
        if let TxnSlot::Idle = state.txn {
            state.txn = TxnSlot::Open(self.handle.begin()?);
        }
        let affected = match &mut state.txn {
            TxnSlot::Open(txn) => txn.insert(record)?,
            _ => return Err(ShardError::WrongTx),
        };
        state.ops.push(record.clone());
        Ok(affected)
    }

    /// Row count of `table`, including this session's uncommitted writes.
    pub fn count(&self, table: &str) -> Result<u64> {
        let state = self.state.lock();
        match &state.txn {
            TxnSlot::Open(txn) => txn.count(table),
            _ => self.handle.count(table),
        }
    }

    /// Commit the open transaction. Committing an idle session is a no-op.
    pub fn commit(&self) -> Result<()> {
        self.finish(true)
    }

    /// Discard the open transaction. Rolling back an idle session is a no-op.
    pub fn rollback(&self) -> Result<()> {
        self.finish(false)
    }

    fn finish(&self, commit: bool) -> Result<()> {
        let mut state = self.state.lock();
        let txn = match std::mem::replace(&mut state.txn, TxnSlot::Idle) {
            TxnSlot::Idle => return Ok(()),
            TxnSlot::Open(txn) => txn,
            finished @ TxnSlot::Finished(_) => {
                state.txn = finished;
                return Err(ShardError::WrongTx);
            }
        };
        state.ops.clear();
        let (result, outcome) = if commit {
            match txn.commit() {
                Ok(()) => (Ok(()), TxnOutcome::Committed),
                Err(e) => (Err(e), TxnOutcome::Failed),
            }
        } else {
            (txn.rollback(), TxnOutcome::RolledBack)
        };
        state.txn = TxnSlot::Finished(outcome);
        result
    }

    /// Rearm the session so the next mutation opens a new transaction.
    pub fn init(&self) {
        let mut state = self.state.lock();
        if let TxnSlot::Open(txn) = std::mem::replace(&mut state.txn, TxnSlot::Idle) {
            warn!(
                "session {} on shard {}: init discards an open transaction with {} pending ops",
                self.id,
                self.shard,
                state.ops.len()
            );
            if let Err(e) = txn.rollback() {
                warn!("session {}: rollback during init failed: {e}", self.id);
            }
        }
        state.ops.clear();
    }

    /// Whether a transaction is currently open.
    pub fn is_active(&self) -> bool {
        matches!(self.state.lock().txn, TxnSlot::Open(_))
    }

    /// Outcome of the last transaction, until the next `init`.
    pub fn outcome(&self) -> Option<TxnOutcome> {
        match self.state.lock().txn {
            TxnSlot::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Mutations applied in the open transaction.
    pub fn pending_ops(&self) -> usize {
        self.state.lock().ops.len()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn routing_key(&self) -> &RoutingKey {
        &self.key
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("shard", &self.shard)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use crate::storage::Backend;
    use serde_json::json;

    fn user(id: i64) -> Record {
        Record::new("users", id, json!({ "id": id }))
    }

    fn seeded() -> MemoryBackend {
        let db = MemoryBackend::new("db-a");
        for id in 1..=3 {
            db.insert_committed(user(id)).unwrap();
        }
        db
    }

    fn session(db: &MemoryBackend) -> Session {
        Session::new(1, "a", Arc::new(db.clone()), RoutingKey::bare(1i64))
    }

    #[test]
    fn test_session_lifecycle() {
        let db = seeded();
        let s = session(&db);
        assert!(!s.is_active());
        assert_eq!(s.count("users").unwrap(), 3);

        assert_eq!(s.insert(&user(4)).unwrap(), 1);
        assert!(s.is_active());
        assert_eq!(s.pending_ops(), 1);
        assert_eq!(s.count("users").unwrap(), 4);
        assert_eq!(db.count("users").unwrap(), 3);

        s.commit().unwrap();
        assert_eq!(s.outcome(), Some(TxnOutcome::Committed));
        assert_eq!(db.count("users").unwrap(), 4);
        assert_eq!(s.pending_ops(), 0);
    }

    #[test]
    fn test_rollback_then_init() {
        let db = seeded();
        let s = session(&db);
        s.insert(&user(4)).unwrap();
        s.rollback().unwrap();
        s.init();
        assert_eq!(s.outcome(), None);
        assert_eq!(s.count("users").unwrap(), 3);

        // rearmed: a new transaction scope on the same handle
        s.insert(&user(5)).unwrap();
        assert!(s.is_active());
    }

    #[test]
    fn test_terminated_session_rejects_operations() {
        let db = seeded();
        let s = session(&db);
        s.insert(&user(4)).unwrap();
        s.rollback().unwrap();
        assert!(matches!(s.rollback(), Err(ShardError::WrongTx)));
        assert!(matches!(s.commit(), Err(ShardError::WrongTx)));
        assert!(matches!(s.insert(&user(5)), Err(ShardError::WrongTx)));
        assert_eq!(s.outcome(), Some(TxnOutcome::RolledBack));
    }

    #[test]
    fn test_idle_finish_is_noop() {
        let db = seeded();
        let s = session(&db);
        s.rollback().unwrap();
        s.commit().unwrap();
        assert_eq!(s.outcome(), None);
    }

    #[test]
    fn test_insert_error_surfaces_unmodified() {
        let db = seeded();
        let s = session(&db);
        let err = s.insert(&user(1)).unwrap_err();
        assert!(matches!(err, ShardError::Backend(msg) if msg.contains("duplicate key 1")));
        // the transaction stays usable
        s.insert(&user(4)).unwrap();
        s.commit().unwrap();
        assert_eq!(db.count("users").unwrap(), 4);
    }

    #[test]
    fn test_init_discards_open_txn() {
        let db = seeded();
        let s = session(&db);
        s.insert(&user(4)).unwrap();
        s.init();
        assert!(!s.is_active());
        assert_eq!(db.count("users").unwrap(), 3);
    }

    #[test]
    fn test_failed_commit() {
        let db = seeded();
        let s = session(&db);
        s.insert(&user(4)).unwrap();
        db.insert_committed(user(4)).unwrap();
        assert!(s.commit().is_err());
        assert_eq!(s.outcome(), Some(TxnOutcome::Failed));
    }
}
