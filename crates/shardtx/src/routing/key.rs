//! Routing keys and their stable mapping onto slots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The value part of a routing key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Map the value into `1..=ceiling`.
    ///
    /// Integers inside the domain are their own slot; text is hashed with
    /// CRC32 so the mapping stays identical across processes and releases.
    pub fn slot(&self, ceiling: i64) -> i64 {
        let ceiling = ceiling.max(1);
        match self {
            KeyValue::Int(v) => ((*v as i128 - 1).rem_euclid(ceiling as i128) + 1) as i64,
            KeyValue::Text(s) => (crc32fast::hash(s.as_bytes()) as i64).rem_euclid(ceiling) + 1,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

/// Two-part routing key: an optional entity descriptor plus the key value.
///
/// Only the value takes part in slot derivation, so `("user", 1)` and a
/// bare `1` resolve to the same shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    pub descriptor: Option<String>,
    pub value: KeyValue,
}

impl RoutingKey {
    pub fn new(descriptor: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        Self {
            descriptor: Some(descriptor.into()),
            value: value.into(),
        }
    }

    pub fn bare(value: impl Into<KeyValue>) -> Self {
        Self {
            descriptor: None,
            value: value.into(),
        }
    }

    pub fn slot(&self, ceiling: i64) -> i64 {
        self.value.slot(ceiling)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.descriptor {
            Some(d) => write!(f, "{d}/{}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Anything that can be routed to a shard.
pub trait Routable {
    fn routing_key(&self) -> RoutingKey;
}

impl Routable for RoutingKey {
    fn routing_key(&self) -> RoutingKey {
        self.clone()
    }
}

impl Routable for KeyValue {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::bare(self.clone())
    }
}

impl Routable for i64 {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::bare(*self)
    }
}

impl Routable for str {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::bare(self)
    }
}

impl Routable for String {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::bare(self.as_str())
    }
}

impl<T: Routable + ?Sized> Routable for &T {
    fn routing_key(&self) -> RoutingKey {
        (**self).routing_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_slot_is_identity_inside_domain() {
        assert_eq!(KeyValue::Int(1).slot(1000), 1);
        assert_eq!(KeyValue::Int(500).slot(1000), 500);
        assert_eq!(KeyValue::Int(1000).slot(1000), 1000);
    }

    #[test]
    fn test_int_slot_wraps() {
        assert_eq!(KeyValue::Int(1001).slot(1000), 1);
        assert_eq!(KeyValue::Int(0).slot(1000), 1000);
        assert_eq!(KeyValue::Int(-1).slot(1000), 999);
        assert_eq!(KeyValue::Int(i64::MIN).slot(1000), 192);
        assert_eq!(KeyValue::Int(i64::MAX).slot(1000), 807);
        assert_eq!(KeyValue::Int(i64::MAX).slot(i64::MAX), i64::MAX);
        assert_eq!(KeyValue::Int(i64::MIN).slot(i64::MAX), i64::MAX - 1);
    }

    #[test]
    fn test_text_slot_is_stable() {
        let a = KeyValue::from("user-42").slot(4096);
        let b = KeyValue::from("user-42".to_string()).slot(4096);
        assert_eq!(a, b);
        assert_eq!(a, (crc32fast::hash(b"user-42") as i64) % 4096 + 1);
        for i in 0..200 {
            let s = KeyValue::Text(format!("k{i}")).slot(16);
            assert!((1..=16).contains(&s));
        }
    }

    #[test]
    fn test_descriptor_does_not_change_slot() {
        let keyed = RoutingKey::new("user", 7i64);
        assert_eq!(keyed.slot(100), 7i64.routing_key().slot(100));
        assert_eq!(keyed.to_string(), "user/7");
    }
}
