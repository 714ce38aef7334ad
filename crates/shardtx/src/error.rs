//! Error types for shard routing and transaction coordination.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while routing keys or coordinating sessions.
#[derive(Debug, Error)]
pub enum ShardError {
    /// No shard is configured under the given name.
    #[error("cannot find db, name={0}")]
    NilDb(String),
    /// No slot range covers the resolved slot.
    #[error("cannot find db for slot, slot={slot}")]
    SlotRange { slot: i64 },
    /// Range minimum is not a positive integer.
    #[error("minimum slot size must be positive integer, value={0}")]
    SlotSizeMin(i64),
    /// Range maximum lies outside the configured ceiling.
    #[error("maximum slot size is out of range, DefinedSize={ceiling} GivenSize={max}")]
    SlotSizeMax { max: i64, ceiling: i64 },
    #[error("minimum slot size is overlapped, value={0}")]
    SlotMinOverlapped(i64),
    #[error("maximum slot size is overlapped, value={0}")]
    SlotMaxOverlapped(i64),
    /// No session is registered for the shard.
    #[error("cannot find session, name={0}")]
    NoSession(String),
    /// A different session is already registered for the shard.
    #[error("transaction already exists")]
    DuplicateTx,
    /// The session's transaction is in the wrong state for the operation.
    #[error("something wrong with the transaction")]
    WrongTx,
    /// One or more entries failed during a group commit/rollback.
    #[error(transparent)]
    CommitAll(#[from] SweepError),
    /// Error reported by the storage collaborator.
    #[error("backend: {0}")]
    Backend(String),
    #[error("config error: {0}")]
    Config(String),
}

impl ShardError {
    /// Stable numeric code for the error kind.
    pub fn code(&self) -> u32 {
        match self {
            Self::NilDb(_) => 10000,
            Self::SlotRange { .. } => 11001,
            Self::SlotSizeMin(_) => 11002,
            Self::SlotSizeMax { .. } => 11003,
            Self::SlotMinOverlapped(_) => 11004,
            Self::SlotMaxOverlapped(_) => 11005,
            Self::NoSession(_) => 20001,
            Self::DuplicateTx => 20002,
            Self::WrongTx => 20003,
            Self::CommitAll(_) => 20004,
            Self::Backend(_) | Self::Config(_) => 1,
        }
    }

    /// True for errors raised while building or consulting the partition table.
    pub fn is_configuration(&self) -> bool {
        matches!(self.code(), 10000..=11999)
    }
}

impl From<serde_json::Error> for ShardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// A single entry that failed during a group sweep.
#[derive(Debug)]
pub struct SweepFailure {
    pub shard: String,
    pub error: ShardError,
}

/// Aggregated failures of one `commit_all` / `rollback_all` pass, in sweep order.
#[derive(Debug, Default)]
pub struct SweepError {
    pub failures: Vec<SweepFailure>,
}

impl SweepError {
    pub fn push(&mut self, shard: impl Into<String>, error: ShardError) {
        self.failures.push(SweepFailure {
            shard: shard.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Shards whose entries failed, in sweep order.
    pub fn shards(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.shard.as_str())
    }

    /// `Ok(())` when nothing failed, otherwise the aggregate as a `CommitAll` error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ShardError::CommitAll(self))
        }
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit all error: ")?;
        for failure in &self.failures {
            write!(f, " {}", failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for SweepError {}

/// Result alias for shard operations.
pub type Result<T> = std::result::Result<T, ShardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ShardError::NilDb("a".into()).code(), 10000);
        assert_eq!(ShardError::SlotRange { slot: 3 }.code(), 11001);
        assert_eq!(ShardError::DuplicateTx.code(), 20002);
        assert_eq!(ShardError::CommitAll(SweepError::default()).code(), 20004);
        assert!(ShardError::SlotSizeMin(0).is_configuration());
        assert!(!ShardError::WrongTx.is_configuration());
    }

    #[test]
    fn test_sweep_error_message_keeps_order() {
        let mut errs = SweepError::default();
        errs.push("a", ShardError::WrongTx);
        errs.push("b", ShardError::Backend("disk full".into()));
        let msg = ShardError::from(errs).to_string();
        assert_eq!(
            msg,
            "commit all error:  something wrong with the transaction backend: disk full"
        );
    }

    #[test]
    fn test_empty_sweep_is_ok() {
        assert!(SweepError::default().into_result().is_ok());
    }
}
