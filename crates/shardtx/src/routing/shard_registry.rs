//! ShardRegistry — configured shards, their handles, and the frozen router.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::{Result, ShardError};
use crate::routing::key::Routable;
use crate::routing::slot_router::{ShardId, SlotRouter};
use crate::storage::Handle;

/// Physical handles for one shard.
#[derive(Debug, Clone)]
pub struct ShardHandles {
    pub primary: Handle,
    pub secondary: Option<Handle>,
}

impl ShardHandles {
    pub fn primary(primary: Handle) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Handle) -> Self {
        self.secondary = Some(secondary);
        self
    }
}

/// A configured shard.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub name: ShardId,
    pub handles: ShardHandles,
}

/// Lookup table from shard names to handles, plus the slot router that
/// picks a shard for a routing key.
///
/// Built once at startup; after that it is shared behind an `Arc` and only read.
#[derive(Debug)]
pub struct ShardRegistry {
    router: SlotRouter,
    shards: HashMap<ShardId, ShardConfig>,
}

impl ShardRegistry {
    /// Create an empty registry for the slot domain `1..=max_slot`.
    pub fn new(max_slot: i64) -> Self {
        Self {
            router: SlotRouter::new(max_slot),
            shards: HashMap::new(),
        }
    }

    /// Build a registry from config, taking each shard's handles from `handles`.
    pub fn from_config(cfg: &ClusterConfig, handles: &HashMap<String, ShardHandles>) -> Result<Self> {
        cfg.validate()?;
        let mut registry = Self::new(cfg.max_slot);
        for spec in &cfg.shards {
            let shard_handles = handles
                .get(&spec.name)
                .cloned()
                .ok_or_else(|| ShardError::NilDb(spec.name.clone()))?;
            registry.register(&spec.name, spec.slot_min, spec.slot_max, shard_handles)?;
        }

        let gaps = registry.router.gaps();
        if !gaps.is_empty() {
            warn!("slot domain 1..={} has uncovered ranges: {gaps:?}", cfg.max_slot);
        }
        info!(
            "shard registry ready: {} shards, max slot {}",
            registry.shards.len(),
            cfg.max_slot
        );
        Ok(registry)
    }

    /// Register a shard owning `[slot_min, slot_max]`.
    pub fn register(
        &mut self,
        name: &str,
        slot_min: i64,
        slot_max: i64,
        handles: ShardHandles,
    ) -> Result<()> {
        if self.shards.contains_key(name) {
            return Err(ShardError::Config(format!("shard {name} already registered")));
        }
        self.router.register_range(slot_min, slot_max, name)?;
        debug!("registered shard {name} for slots {slot_min}..={slot_max}");
        self.shards.insert(
            name.to_string(),
            ShardConfig {
                name: name.to_string(),
                handles,
            },
        );
        Ok(())
    }

    /// Get a shard by name.
    pub fn lookup(&self, name: &str) -> Result<&ShardConfig> {
        self.shards
            .get(name)
            .ok_or_else(|| ShardError::NilDb(name.to_string()))
    }

    /// Resolve a routing key to its shard.
    pub fn resolve(&self, key: &impl Routable) -> Result<&ShardConfig> {
        if self.shards.is_empty() {
            return Err(ShardError::NilDb(key.routing_key().to_string()));
        }
        let name = self.router.resolve(key)?;
        self.lookup(name)
    }

    /// Primary handle for a routing key.
    pub fn master(&self, key: &impl Routable) -> Result<Handle> {
        Ok(self.resolve(key)?.handles.primary.clone())
    }

    /// Read handle for a routing key; the primary when no secondary is configured.
    pub fn slave(&self, key: &impl Routable) -> Result<Handle> {
        let shard = self.resolve(key)?;
        match &shard.handles.secondary {
            Some(secondary) => Ok(secondary.clone()),
            None => {
                debug!("shard {} has no secondary, reading from primary", shard.name);
                Ok(shard.handles.primary.clone())
            }
        }
    }

    /// Names of all configured shards.
    pub fn shard_names(&self) -> impl Iterator<Item = &str> {
        self.shards.keys().map(String::as_str)
    }

    pub fn router(&self) -> &SlotRouter {
        &self.router
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
