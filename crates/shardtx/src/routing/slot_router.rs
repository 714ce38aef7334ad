//! Shard routing via ordered slot ranges.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};
use crate::routing::key::Routable;

/// Identifier of a configured shard.
pub type ShardId = String;

/// A contiguous, inclusive block of slots owned by one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub min: i64,
    pub max: i64,
    pub shard: ShardId,
}

impl SlotRange {
    pub fn contains(&self, slot: i64) -> bool {
        self.min <= slot && slot <= self.max
    }
}

/// Partition table mapping routing keys to shards.
///
/// Ranges are kept sorted by `min` and never overlap, so both registration
/// and resolution are a single binary search.
#[derive(Debug, Clone)]
pub struct SlotRouter {
    ranges: Vec<SlotRange>,
    ceiling: i64,
}

impl SlotRouter {
    /// Create an empty router for the slot domain `1..=ceiling`.
    pub fn new(ceiling: i64) -> Self {
        Self {
            ranges: Vec::new(),
            ceiling,
        }
    }

    /// Register `[min, max]` for `shard`, rejecting invalid bounds and overlaps.
    pub fn register_range(&mut self, min: i64, max: i64, shard: impl Into<ShardId>) -> Result<()> {
        if min <= 0 {
            return Err(ShardError::SlotSizeMin(min));
        }
        if max > self.ceiling || max < min {
            return Err(ShardError::SlotSizeMax {
                max,
                ceiling: self.ceiling,
            });
        }

        let idx = self.ranges.partition_point(|r| r.min <= min);
        if idx > 0 && self.ranges[idx - 1].contains(min) {
            return Err(ShardError::SlotMinOverlapped(min));
        }
        if let Some(next) = self.ranges.get(idx) {
            if next.min <= max {
                // Either `max` lands inside `next`, or the new range swallows it whole.
                return Err(if max <= next.max {
                    ShardError::SlotMaxOverlapped(max)
                } else {
                    ShardError::SlotMinOverlapped(min)
                });
            }
        }

        self.ranges.insert(
            idx,
            SlotRange {
                min,
                max,
                shard: shard.into(),
            },
        );
        Ok(())
    }

    /// Slot a key maps to in this router's domain.
    pub fn slot_for(&self, key: &impl Routable) -> i64 {
        key.routing_key().slot(self.ceiling)
    }

    /// Route a key to its owning shard.
    pub fn resolve(&self, key: &impl Routable) -> Result<&ShardId> {
        self.resolve_slot(self.slot_for(key))
    }

    /// Route a raw slot to its owning shard.
    pub fn resolve_slot(&self, slot: i64) -> Result<&ShardId> {
        let idx = self.ranges.partition_point(|r| r.min <= slot);
        match idx.checked_sub(1).map(|i| &self.ranges[i]) {
            Some(range) if range.contains(slot) => Ok(&range.shard),
            _ => Err(ShardError::SlotRange { slot }),
        }
    }

    /// Slots in `1..=ceiling` that no range covers.
    pub fn gaps(&self) -> Vec<(i64, i64)> {
        let mut gaps = Vec::new();
        let mut next = 1;
        for range in &self.ranges {
            if range.min > next {
                gaps.push((next, range.min - 1));
            }
            match range.max.checked_add(1) {
                Some(n) => next = n,
                None => return gaps,
            }
        }
        if next <= self.ceiling {
            gaps.push((next, self.ceiling));
        }
        gaps
    }

    pub fn ranges(&self) -> &[SlotRange] {
        &self.ranges
    }

    pub fn ceiling(&self) -> i64 {
        self.ceiling
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
