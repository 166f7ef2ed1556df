//! Seam to the external append-only timestamp authority.
//!
//! The real registry is assumed to live on-chain; this crate only needs the
//! publish operation, which must be idempotent on the registry side (the
//! same root always maps to its first stored timestamp).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;

use crate::ts;

/// Anything that can anchor a Merkle root in time.
#[async_trait]
pub trait RegistryPublisher: Send + Sync {
    /// Register `root` and return the timestamp the registry stored for it.
    async fn publish(&self, root: &[u8]) -> anyhow::Result<NaiveDateTime>;
}

/// Stand-in sink wired by the daemon: logs each root and answers with the
/// local clock.
#[derive(Debug, Default)]
pub struct LogRegistry;

#[async_trait]
impl RegistryPublisher for LogRegistry {
    async fn publish(&self, root: &[u8]) -> anyhow::Result<NaiveDateTime> {
        let stamp = ts::now();
        tracing::info!(
            root = %hex::encode(root),
            timestamp = %ts::format_micros(&stamp),
            "root accepted by stand-in registry"
        );
        Ok(stamp)
    }
}

/// In-memory registry mirroring the on-chain contract: each root keeps the
/// timestamp of its first publication, and re-publishing is a no-op.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    slots: Mutex<BTreeMap<String, NaiveDateTime>>,
}

impl MemoryRegistry {
    /// Stored timestamp for `root`, if it was ever published.
    pub fn timestamp_for(&self, root: &[u8]) -> Option<NaiveDateTime> {
        self.slots.lock().get(&hex::encode(root)).copied()
    }

    /// Number of distinct roots registered.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no root has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[async_trait]
impl RegistryPublisher for MemoryRegistry {
    async fn publish(&self, root: &[u8]) -> anyhow::Result<NaiveDateTime> {
        let mut slots = self.slots.lock();
        let stamp = *slots.entry(hex::encode(root)).or_insert_with(ts::now);
        Ok(stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn republishing_keeps_the_first_timestamp() {
        let registry = MemoryRegistry::default();
        let root = crate::merkle::keccak256(b"a batch root");

        let first = registry.publish(&root).await.unwrap();
        let second = registry.publish(&root).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.timestamp_for(&root), Some(first));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn distinct_roots_get_distinct_slots() {
        let registry = MemoryRegistry::default();
        registry
            .publish(&crate::merkle::keccak256(b"one"))
            .await
            .unwrap();
        registry
            .publish(&crate::merkle::keccak256(b"two"))
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
