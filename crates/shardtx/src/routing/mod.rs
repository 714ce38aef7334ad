//! Key → slot → shard resolution.

pub mod key;
pub mod shard_registry;
pub mod slot_router;
