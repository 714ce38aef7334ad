//! Partition and coordinator configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};

/// Slot range assignment for one configured shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    /// Shard name, used for handle lookup.
    pub name: String,
    /// First slot owned by the shard (inclusive).
    pub slot_min: i64,
    /// Last slot owned by the shard (inclusive).
    pub slot_max: i64,
}

/// Configuration for a sharded cluster and its transaction coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Global slot ceiling; every range must end at or below it.
    pub max_slot: i64,
    /// Initial value of the coordinator's auto-transaction flag.
    pub auto_transaction: bool,
    /// Initial value of the coordinator's readonly flag.
    pub read_only: bool,
    pub shards: Vec<ShardSpec>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_slot: 1024,
            auto_transaction: false,
            read_only: false,
            shards: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Parse a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: ClusterConfig = serde_json::from_str(raw)?;
        Ok(cfg)
    }

    /// Append a shard spec, builder style.
    pub fn with_shard(mut self, name: impl Into<String>, slot_min: i64, slot_max: i64) -> Self {
        self.shards.push(ShardSpec {
            name: name.into(),
            slot_min,
            slot_max,
        });
        self
    }

    /// Structural checks. Slot math is validated by the router.
    pub fn validate(&self) -> Result<()> {
        if self.max_slot <= 0 {
            return Err(ShardError::Config(format!(
                "max_slot must be > 0, got {}",
                self.max_slot
            )));
        }
        let mut seen = HashSet::new();
        for spec in &self.shards {
            if spec.name.is_empty() {
                return Err(ShardError::Config("shard name must not be empty".to_string()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ShardError::Config(format!(
                    "duplicate shard name: {}",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}
