//! Registry of the one open session per shard.
//!
//! A single mutex covers the whole map: lookups, check-and-insert and
//! group sweeps all run under it, so two racing registrations for the same
//! shard can never both win.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, ShardError, SweepError};
use crate::routing::slot_router::ShardId;
use crate::txn::session::{Session, SharedSession};

/// Result of a registration attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The session was added.
    Inserted,
    /// The same session was already registered for the shard.
    AlreadyRegistered,
}

/// Shard → session map; at most one entry per shard.
#[derive(Debug, Default)]
pub struct TxnRegistry {
    entries: Mutex<BTreeMap<ShardId, SharedSession>>,
}

impl TxnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, shard: &str) -> Option<SharedSession> {
        self.entries.lock().get(shard).cloned()
    }

    /// Return the registered session for `shard`, creating and registering
    /// one with `make` if there is none. The flag is true when `make` ran.
    pub fn get_or_insert_with(
        &self,
        shard: &str,
        make: impl FnOnce() -> SharedSession,
    ) -> (SharedSession, bool) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(shard) {
            return (Arc::clone(existing), false);
        }
        let session = make();
        entries.insert(shard.to_string(), Arc::clone(&session));
        (session, true)
    }

    /// Register `session` for `shard` unless a different session holds it.
    pub fn register(&self, shard: &str, session: &SharedSession) -> Result<Registration> {
        let mut entries = self.entries.lock();
        match entries.get(shard) {
            Some(existing) if Arc::ptr_eq(existing, session) => Ok(Registration::AlreadyRegistered),
            Some(_) => Err(ShardError::DuplicateTx),
            None if session.shard() != shard => Err(ShardError::WrongTx),
            None => {
                entries.insert(shard.to_string(), Arc::clone(session));
                Ok(Registration::Inserted)
            }
        }
    }

    /// Remove the entry for `shard` only if it is `session`.
    pub fn remove_if(&self, shard: &str, session: &SharedSession) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(shard) {
            Some(existing) if Arc::ptr_eq(existing, session) => {
                entries.remove(shard);
                true
            }
            _ => false,
        }
    }

    /// Run `op` on every entry in shard order while holding the lock.
    ///
    /// Entries whose `op` succeeds are removed; failed entries stay
    /// registered and their errors are collected in order.
    pub fn sweep(&self, mut op: impl FnMut(&str, &Session) -> Result<()>) -> SweepError {
        let mut errors = SweepError::default();
        self.entries.lock().retain(|shard, session| match op(shard.as_str(), session.as_ref()) {
            Ok(()) => false,
            Err(e) => {
                errors.push(shard.as_str(), e);
                true
            }
        });
        errors
    }

    pub fn shards(&self) -> Vec<ShardId> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
