//! # Driver Registry
//!
//! Thread-safe map from [`DriverKind`] to a live driver. Callers pick a
//! driver per request; nothing is hard-wired at construction.

use super::memory::MemoryStore;
use super::redis_pooled::RedisPooledDriver;
use super::redis_sync::RedisSyncDriver;
use super::{DriverKind, StoreDriver};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tq_core::{Result, StoreConfig};

#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<DriverKind, Arc<dyn StoreDriver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both Redis drivers for `config`. Neither connects until first use.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let registry = Self::new();
        registry.add(Arc::new(RedisSyncDriver::new(config)?)).await;
        registry.add(Arc::new(RedisPooledDriver::new(config)?)).await;
        Ok(registry)
    }

    /// Register an in-process store alongside whatever is already present.
    pub async fn with_memory(self, store: Arc<MemoryStore>) -> Self {
        self.add(store).await;
        self
    }

    /// Register a driver, replacing any previous one of the same kind.
    pub async fn add(&self, driver: Arc<dyn StoreDriver>) {
        let kind = driver.kind();
        let previous = self.drivers.write().await.insert(kind, driver);
        if previous.is_some() {
            tracing::info!("Replaced {} driver", kind);
        } else {
            tracing::info!("Registered {} driver", kind);
        }
    }

    pub async fn get(&self, kind: DriverKind) -> Option<Arc<dyn StoreDriver>> {
        self.drivers.read().await.get(&kind).cloned()
    }

    /// Registered kinds, sorted.
    pub async fn list(&self) -> Vec<DriverKind> {
        let mut kinds: Vec<DriverKind> = self.drivers.read().await.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_registers_redis_drivers() {
        let registry = DriverRegistry::from_config(&StoreConfig::default())
            .await
            .unwrap();
        assert_eq!(registry.list().await, vec![DriverKind::Sync, DriverKind::Pooled]);
        assert!(registry.get(DriverKind::Memory).await.is_none());
    }

    #[tokio::test]
    async fn test_with_memory() {
        let registry = DriverRegistry::new()
            .with_memory(Arc::new(MemoryStore::default()))
            .await;
        let driver = registry.get(DriverKind::Memory).await.unwrap();
        assert_eq!(driver.kind(), DriverKind::Memory);
    }

    #[tokio::test]
    async fn test_add_replaces_same_kind() {
        let registry = DriverRegistry::new();
        registry.add(Arc::new(MemoryStore::new(1))).await;
        registry.add(Arc::new(MemoryStore::new(2))).await;
        assert_eq!(registry.list().await, vec![DriverKind::Memory]);
    }
}
