//! Storage seam: the queryable handle behind each shard.
//!
//! The coordinator never talks to a database directly. It only needs to
//! open a transaction on a shard's handle, push mutations through it, count
//! rows, and finish it. Real engines implement [`Backend`]; [`memory`] ships
//! an in-process implementation.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::routing::key::KeyValue;

/// A row to be written into a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: String,
    pub key: KeyValue,
    pub row: serde_json::Value,
}

impl Record {
    pub fn new(table: impl Into<String>, key: impl Into<KeyValue>, row: serde_json::Value) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            row,
        }
    }
}

/// The queryable object for one shard (a primary or a read replica).
pub trait Backend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Open a new transaction scope.
    fn begin(&self) -> Result<Box<dyn BackendTxn>>;

    /// Count committed rows in `table`.
    fn count(&self, table: &str) -> Result<u64>;
}

/// An open transaction on a [`Backend`].
pub trait BackendTxn: Send {
    /// Apply a mutation; returns the number of affected rows.
    fn insert(&mut self, record: &Record) -> Result<u64>;

    /// Count rows in `table` as seen from inside this transaction.
    fn count(&self, table: &str) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Shared handle to a shard backend.
pub type Handle = Arc<dyn Backend>;
