//! Sessions, the per-shard session registry, and the group coordinator.

pub mod coordinator;
pub mod registry;
pub mod session;
