//! Catalog builds and on-demand stream resolution for configured instances.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{
    CatalogReconciler, ChannelRecord, ChannelStore, HttpZoneListing, Namespace, PersistedCatalog,
    ReferenceEntry, ReferenceSource, StaticReferenceList, StaticZoneListing, ZoneChannel,
    ZoneListingSource, group_by_zone, renumber,
};
use crate::config::{CatalogConfig, InstanceConfig, ReferenceSourceMode};
use crate::error::{CatalogError, Result};
use crate::extract::parse_channel_listing;
use crate::fetch::Fetcher;
use crate::resolver::VariantPlaylistResolver;

type Snapshot = Arc<Vec<ChannelRecord>>;

/// Entry point for catalog consumers.
///
/// Each namespace has a live snapshot that is replaced in one step at the end
/// of a successful build, so readers see either the old or the new catalog.
pub struct CatalogPipeline {
    config: CatalogConfig,
    fetcher: Arc<Fetcher>,
    resolver: Arc<VariantPlaylistResolver>,
    store: Arc<dyn ChannelStore>,
    references: Arc<dyn ReferenceSource>,
    zones: Arc<dyn ZoneListingSource>,
    live: RwLock<FxHashMap<Namespace, Snapshot>>,
}

impl CatalogPipeline {
    /// Taxonomy and zone sources are derived from `config`; see
    /// [`CatalogPipeline::with_reference_source`] and
    /// [`CatalogPipeline::with_zone_listing`] to replace them.
    pub fn new(config: CatalogConfig, fetcher: Arc<Fetcher>, store: Arc<dyn ChannelStore>) -> Self {
        let references: Arc<dyn ReferenceSource> = match &config.reference_list_path {
            Some(path) => Arc::new(StaticReferenceList::from_path(path)),
            None => Arc::new(StaticReferenceList::default()),
        };
        let zones: Arc<dyn ZoneListingSource> = match &config.zone_listing_url {
            Some(template) => Arc::new(HttpZoneListing::new(fetcher.clone(), template.clone())),
            None => Arc::new(StaticZoneListing::new()),
        };
        let resolver = Arc::new(VariantPlaylistResolver::new(
            fetcher.clone(),
            config.provider.clone(),
        ));

        Self {
            config,
            fetcher,
            resolver,
            store,
            references,
            zones,
            live: RwLock::new(FxHashMap::default()),
        }
    }

    /// Pipeline over a real HTTP client.
    pub fn from_config(config: CatalogConfig, store: Arc<dyn ChannelStore>) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(Fetcher::from_config(&config.fetch)?);
        Ok(Self::new(config, fetcher, store))
    }

    pub fn with_reference_source(mut self, references: Arc<dyn ReferenceSource>) -> Self {
        self.references = references;
        self
    }

    pub fn with_zone_listing(mut self, zones: Arc<dyn ZoneListingSource>) -> Self {
        self.zones = zones;
        self
    }

    pub fn references(&self) -> &Arc<dyn ReferenceSource> {
        &self.references
    }

    /// The live catalog of `namespace`, empty before its first build.
    pub fn current(&self, namespace: &Namespace) -> Snapshot {
        self.live.read().get(namespace).cloned().unwrap_or_default()
    }

    /// Rebuild the catalog of `instance`.
    ///
    /// Never fails: on any problem the prior catalog is returned unchanged.
    #[instrument(skip_all, fields(namespace = %instance.namespace()))]
    pub async fn build_catalog(
        &self,
        instance: &InstanceConfig,
        cancel: &CancellationToken,
    ) -> Snapshot {
        let namespace = instance.namespace();
        if !instance.enabled {
            debug!("Instance disabled, keeping current catalog");
            return self.current(&namespace);
        }

        let persisted = match self.store.get_channels(&namespace).await {
            Ok(persisted) => persisted,
            Err(e) => {
                error!(error = %e, "Unable to read stored channels, keeping current catalog");
                return self.current(&namespace);
            }
        };

        match self.try_build(instance, &namespace, &persisted, cancel).await {
            Ok(Some(channels)) => {
                let snapshot = Arc::new(channels);
                self.live.write().insert(namespace, snapshot.clone());
                snapshot
            }
            Ok(None) => self.prior_catalog(&namespace, &persisted),
            Err(CatalogError::Cancelled) => {
                info!("Catalog build cancelled, keeping current catalog");
                self.prior_catalog(&namespace, &persisted)
            }
            Err(e) => {
                warn!(error = %e, "Catalog build failed, keeping current catalog");
                self.prior_catalog(&namespace, &persisted)
            }
        }
    }

    /// `Ok(None)` when the provider gave nothing to build from.
    async fn try_build(
        &self,
        instance: &InstanceConfig,
        namespace: &Namespace,
        persisted: &PersistedCatalog,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<ChannelRecord>>> {
        let (references, known) = match instance.reference_source {
            ReferenceSourceMode::All => match self.load_taxonomy().await? {
                Some(taxonomy) => taxonomy,
                None => return Ok(None),
            },
            ReferenceSourceMode::None => (Vec::new(), Vec::new()),
        };

        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let listing_url = self.config.provider.channel_listing();
        let Some(page) = self
            .fetcher
            .fetch_text(&listing_url, Some(&self.listing_headers()))
            .await?
        else {
            warn!("Channel list is empty from provider, not updating");
            return Ok(None);
        };

        let fresh = parse_channel_listing(&page);
        if fresh.is_empty() {
            warn!("Channel list is empty from provider, not updating");
            return Ok(None);
        }
        info!(count = fresh.len(), "Found stations on provider");

        let reconciler = CatalogReconciler::new(
            self.resolver.clone(),
            self.config.provider.user_agent.clone(),
            self.config.workers,
        );
        let reconciliation = reconciler
            .reconcile(&fresh, persisted, &references, &known, cancel)
            .await?;

        let changes = &reconciliation.changes;
        if changes.is_empty() {
            debug!("Stored catalog is up to date");
        } else {
            info!(
                upserts = changes.upserts.len(),
                hd_flips = changes.hd_flips.len(),
                "Saving catalog changes"
            );
        }
        if !changes.upserts.is_empty() {
            if let Err(e) = self.store.save_instance(namespace, &changes.upserts).await {
                error!(error = %e, "Unable to save channels");
            }
        }
        for flip in &changes.hd_flips {
            if let Err(e) = self
                .store
                .update_channel_hd_flag(&flip.id, namespace, flip.is_hd)
                .await
            {
                error!(id = %flip.id, error = %e, "Unable to update HD flag");
            }
        }

        Ok(Some(reconciliation.channels))
    }

    /// Taxonomy entries sorted by zone, and the known channels of every zone.
    /// `Ok(None)` when a zone listing could not be read.
    async fn load_taxonomy(&self) -> Result<Option<(Vec<ReferenceEntry>, Vec<ZoneChannel>)>> {
        let mut references = self.references.load_reference_list().await?;
        references.sort_by(|a, b| a.zone.cmp(&b.zone));

        let mut known = Vec::new();
        for (plugin, zone, ids) in group_by_zone(&references) {
            match self.zones.zone_channels(&plugin, &zone, &ids).await {
                Some(channels) => known.extend(channels),
                None => {
                    warn!(%plugin, %zone, "Zone listing unavailable, not updating");
                    return Ok(None);
                }
            }
        }
        Ok(Some((references, known)))
    }

    /// The live snapshot, or the stored catalog when nothing was built yet.
    fn prior_catalog(&self, namespace: &Namespace, persisted: &PersistedCatalog) -> Snapshot {
        let current = self.current(namespace);
        if !current.is_empty() || persisted.is_empty() {
            return current;
        }
        let mut channels: Vec<_> = persisted.values().map(|c| c.to_record()).collect();
        // Map iteration order is arbitrary; ties on name must still sort the same way.
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        renumber(&mut channels);
        Arc::new(channels)
    }

    /// URI of the best stream of `channel_id`, or `None` with the reason in the logs.
    #[instrument(skip(self, instance), fields(namespace = %instance.namespace()))]
    pub async fn resolve_playable_uri(
        &self,
        instance: &InstanceConfig,
        channel_id: &str,
    ) -> Option<String> {
        if !instance.enabled {
            debug!("Instance disabled");
            return None;
        }
        let namespace = instance.namespace();
        let stored = match self.store.get_channel(channel_id, &namespace).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                info!("Unknown channel");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Unable to read stored channel");
                return None;
            }
        };
        if !stored.enabled {
            debug!("Channel disabled");
            return None;
        }
        if stored.ref_url.is_none() {
            info!("Channel unreachable until the next catalog build");
            return None;
        }

        let selection = match self.resolver.resolve(channel_id).await {
            Ok(Some(selection)) => selection,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Unable to resolve stream");
                return None;
            }
        };

        if let Some(is_hd) = selection.is_hd {
            if is_hd != stored.is_hd {
                match self
                    .store
                    .update_channel_hd_flag(channel_id, &namespace, is_hd)
                    .await
                {
                    Ok(()) => self.set_live_hd_flag(&namespace, channel_id, is_hd),
                    Err(e) => warn!(error = %e, "Unable to update HD flag"),
                }
            }
        }

        Some(selection.uri)
    }

    fn set_live_hd_flag(&self, namespace: &Namespace, channel_id: &str, is_hd: bool) {
        let mut live = self.live.write();
        let Some(snapshot) = live.get_mut(namespace) else {
            return;
        };
        if snapshot.iter().any(|c| c.id == channel_id) {
            let mut channels = snapshot.as_ref().clone();
            for channel in channels.iter_mut().filter(|c| c.id == channel_id) {
                channel.is_hd = is_hd;
            }
            *snapshot = Arc::new(channels);
        }
    }

    fn listing_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.config.provider.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        headers
    }
}
