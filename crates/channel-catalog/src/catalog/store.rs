//! Persisted channel store.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::model::{ChannelRecord, Namespace, PersistedCatalog, PersistedChannel};
use crate::error::{CatalogError, Result};

/// Store collaborator.
///
/// Writes are limited to single-channel upserts and HD flag updates so a
/// concurrent reader never observes a partially replaced catalog.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_channels(&self, namespace: &Namespace) -> Result<PersistedCatalog>;

    async fn get_channel(
        &self,
        id: &str,
        namespace: &Namespace,
    ) -> Result<Option<PersistedChannel>>;

    async fn update_channel_hd_flag(
        &self,
        id: &str,
        namespace: &Namespace,
        is_hd: bool,
    ) -> Result<()>;

    /// Upsert `channels` into the namespace. Channels not listed are left alone.
    async fn save_instance(&self, namespace: &Namespace, channels: &[ChannelRecord]) -> Result<()>;
}

/// Process-local store, also used as the test double.
#[derive(Debug, Default)]
pub struct InMemoryChannelStore {
    channels: RwLock<FxHashMap<Namespace, PersistedCatalog>>,
    writes: AtomicUsize,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace without counting writes.
    pub fn with_channels(self, namespace: &Namespace, channels: &[ChannelRecord]) -> Self {
        {
            let mut guard = self.channels.write();
            let catalog = guard.entry(namespace.clone()).or_default();
            for record in channels {
                catalog.insert(record.id.clone(), PersistedChannel::from(record));
            }
        }
        self
    }

    /// Number of channel rows written since creation.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelStore for InMemoryChannelStore {
    async fn get_channels(&self, namespace: &Namespace) -> Result<PersistedCatalog> {
        Ok(self
            .channels
            .read()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_channel(
        &self,
        id: &str,
        namespace: &Namespace,
    ) -> Result<Option<PersistedChannel>> {
        Ok(self
            .channels
            .read()
            .get(namespace)
            .and_then(|catalog| catalog.get(id))
            .cloned())
    }

    async fn update_channel_hd_flag(
        &self,
        id: &str,
        namespace: &Namespace,
        is_hd: bool,
    ) -> Result<()> {
        let mut guard = self.channels.write();
        let channel = guard
            .get_mut(namespace)
            .and_then(|catalog| catalog.get_mut(id))
            .ok_or_else(|| CatalogError::store(format!("channel {id} not found in {namespace}")))?;
        channel.is_hd = is_hd;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn save_instance(&self, namespace: &Namespace, channels: &[ChannelRecord]) -> Result<()> {
        let mut guard = self.channels.write();
        let catalog = guard.entry(namespace.clone()).or_default();
        for record in channels {
            catalog.insert(record.id.clone(), PersistedChannel::from(record));
        }
        self.writes.fetch_add(channels.len(), Ordering::Relaxed);
        Ok(())
    }
}
