//! Transaction Coordinator.
//!
//! Hands out sessions for routing keys, keeps at most one registered
//! session per shard, and commits or rolls back the registered set as a
//! group. Group operations are best effort: every entry is attempted and
//! failures are aggregated, there is no two-phase commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::{Result, ShardError};
use crate::routing::key::{KeyValue, Routable, RoutingKey};
use crate::routing::shard_registry::{ShardHandles, ShardRegistry};
use crate::routing::slot_router::ShardId;
use crate::storage::Handle;
use crate::txn::registry::{Registration, TxnRegistry};
use crate::txn::session::{Session, SharedSession};

/// Coordinates sessions across shards.
pub struct TxnCoordinator {
    shards: Arc<ShardRegistry>,
    transactions: TxnRegistry,
    auto_transaction: AtomicBool,
    read_only: AtomicBool,
    next_session_id: AtomicU64,
}

impl TxnCoordinator {
    /// Create a coordinator over the given shards, with both flags off.
    pub fn new(shards: Arc<ShardRegistry>) -> Arc<Self> {
        Arc::new(Self {
            shards,
            transactions: TxnRegistry::new(),
            auto_transaction: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Build the shard registry from config and a coordinator on top of it.
    pub fn from_config(
        cfg: &ClusterConfig,
        handles: &HashMap<String, ShardHandles>,
    ) -> Result<Arc<Self>> {
        let registry = ShardRegistry::from_config(cfg, handles)?;
        let coord = Self::new(Arc::new(registry));
        coord.set_auto_transaction(cfg.auto_transaction);
        coord.set_read_only(cfg.read_only);
        Ok(coord)
    }

    fn open_session(&self, shard: &str, handle: Handle, key: RoutingKey) -> SharedSession {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!("open session {id} on shard {shard} for key {key}");
        Arc::new(Session::new(id, shard, handle, key))
    }

    /// Open a session that is never registered, so group sweeps never touch it.
    pub fn force_new_transaction(&self, key: impl Routable) -> Result<SharedSession> {
        let key = key.routing_key();
        let shard = self.shards.resolve(&key)?;
        Ok(self.open_session(&shard.name, shard.handles.primary.clone(), key))
    }

    /// Return the registered session for the key's shard, registering a new one if absent.
    pub fn transaction(&self, key: impl Routable) -> Result<SharedSession> {
        self.registered_or_new(key.routing_key())
    }

    /// Like [`transaction`](Self::transaction), routing on `descriptor` + `key`.
    pub fn transaction_by_key(
        &self,
        descriptor: &str,
        key: impl Into<KeyValue>,
    ) -> Result<SharedSession> {
        self.registered_or_new(RoutingKey::new(descriptor, key))
    }

    fn registered_or_new(&self, key: RoutingKey) -> Result<SharedSession> {
        let shard = self.shards.resolve(&key)?;
        let (session, created) = self.transactions.get_or_insert_with(&shard.name, || {
            self.open_session(&shard.name, shard.handles.primary.clone(), key)
        });
        if created {
            debug!("registered session {} for shard {}", session.id(), shard.name);
        }
        Ok(session)
    }

    /// Enroll `session` in the group for the key's shard, if auto-transaction is on.
    ///
    /// Re-registering the same session is fine; a different session already
    /// holding the shard is `DuplicateTx`.
    pub fn auto_transaction(&self, key: impl Routable, session: &SharedSession) -> Result<()> {
        if !self.auto_transaction_enabled() {
            return Ok(());
        }
        let shard = self.shards.resolve(&key.routing_key())?;
        match self.transactions.register(&shard.name, session)? {
            Registration::Inserted => {
                debug!("auto-registered session {} for shard {}", session.id(), shard.name)
            }
            Registration::AlreadyRegistered => {}
        }
        Ok(())
    }

    pub fn set_auto_transaction(&self, enabled: bool) {
        self.auto_transaction.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_transaction_enabled(&self) -> bool {
        self.auto_transaction.load(Ordering::SeqCst)
    }

    /// While read-only, group commit/rollback are skipped and report success.
    pub fn set_read_only(&self, enabled: bool) {
        self.read_only.store(enabled, Ordering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    /// Commit every registered session.
    pub fn commit_all(&self) -> Result<()> {
        self.sweep("commit", Session::commit)
    }

    /// Roll back every registered session.
    pub fn rollback_all(&self) -> Result<()> {
        self.sweep("rollback", Session::rollback)
    }

    fn sweep(&self, action: &str, op: fn(&Session) -> Result<()>) -> Result<()> {
        if self.is_read_only() {
            debug!("read only: {action} sweep skipped");
            return Ok(());
        }
        let mut attempted = 0usize;
        let errors = self.transactions.sweep(|shard, session| {
            attempted += 1;
            op(session).map_err(|e| {
                warn!("{action} failed on shard {shard} (session {}): {e}", session.id());
                e
            })
        });
        info!(
            "{action} sweep: {} of {attempted} sessions done, {} failed",
            attempted - errors.len(),
            errors.len()
        );
        errors.into_result()
    }

    /// Commit the registered session for the key's shard and unregister it.
    pub fn commit(&self, key: impl Routable) -> Result<()> {
        self.finish_one(key.routing_key(), Session::commit)
    }

    /// Roll back the registered session for the key's shard and unregister it.
    pub fn rollback(&self, key: impl Routable) -> Result<()> {
        self.finish_one(key.routing_key(), Session::rollback)
    }

    fn finish_one(&self, key: RoutingKey, op: fn(&Session) -> Result<()>) -> Result<()> {
        let session = self.registered(&key)?;
        op(&session)?;
        self.transactions.remove_if(session.shard(), &session);
        Ok(())
    }

    /// The session registered for the key's shard.
    pub fn registered(&self, key: impl Routable) -> Result<SharedSession> {
        let shard = self.shards.resolve(&key.routing_key())?;
        self.transactions
            .get(&shard.name)
            .ok_or_else(|| ShardError::NoSession(shard.name.clone()))
    }

    /// A session on the key's primary.
    ///
    /// With auto-transaction on, this is the session already registered for
    /// the shard (if any), so reads observe the group's pending writes.
    pub fn new_master_session(&self, key: impl Routable) -> Result<SharedSession> {
        let key = key.routing_key();
        let shard = self.shards.resolve(&key)?;
        if self.auto_transaction_enabled() {
            if let Some(registered) = self.transactions.get(&shard.name) {
                return Ok(registered);
            }
        }
        Ok(self.open_session(&shard.name, shard.handles.primary.clone(), key))
    }

    /// A fresh session on the key's read handle.
    pub fn new_slave_session(&self, key: impl Routable) -> Result<SharedSession> {
        let key = key.routing_key();
        let shard = self.shards.resolve(&key)?;
        let handle = self.shards.slave(&key)?;
        Ok(self.open_session(&shard.name, handle, key))
    }

    pub fn master(&self, key: impl Routable) -> Result<Handle> {
        self.shards.master(&key.routing_key())
    }

    pub fn slave(&self, key: impl Routable) -> Result<Handle> {
        self.shards.slave(&key.routing_key())
    }

    /// Number of registered sessions.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Shards that currently have a registered session, in sweep order.
    pub fn registered_shards(&self) -> Vec<ShardId> {
        self.transactions.shards()
    }

    pub fn shards(&self) -> &Arc<ShardRegistry> {
        &self.shards
    }
}
