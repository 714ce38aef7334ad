//! shardtx — slot-range shard routing with grouped per-shard transactions.
//!
//! Resolves a routing key to the shard that owns it, hands out sessions
//! on that shard, and commits or rolls back all registered sessions
//! together with aggregated errors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Application code                    │
//! ├─────────────────────────────────────────────────┤
//! │  TxnCoordinator                                  │
//! │   ├─ TxnRegistry (shard → Session, one each)    │
//! │   └─ ShardRegistry                               │
//! │       ├─ SlotRouter (sorted slot ranges)        │
//! │       └─ ShardHandles (primary / secondary)     │
//! ├─────────────────────────────────────────────────┤
//! │  storage::Backend (engine per shard)             │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Group commit is best effort. Every registered session is attempted, and
//! failed ones stay registered. There is no two-phase commit.

pub mod config;
pub mod error;
pub mod routing;
pub mod storage;
pub mod txn;

pub use crate::config::{ClusterConfig, ShardSpec};
pub use crate::error::{Result, ShardError, SweepError, SweepFailure};
pub use crate::routing::key::{KeyValue, Routable, RoutingKey};
pub use crate::routing::shard_registry::{ShardConfig, ShardHandles, ShardRegistry};
pub use crate::routing::slot_router::{ShardId, SlotRange, SlotRouter};
pub use crate::storage::memory::MemoryBackend;
pub use crate::storage::{Backend, BackendTxn, Handle, Record};
pub use crate::txn::coordinator::TxnCoordinator;
pub use crate::txn::session::{Session, SharedSession, TxnOutcome};
