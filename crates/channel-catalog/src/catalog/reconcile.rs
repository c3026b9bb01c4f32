//! Merge a fresh listing scrape with the persisted catalog and the taxonomy.

use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{
    ChangeSet, ChannelHeader, ChannelRecord, PersistedCatalog, ReferenceEntry, ScrapedEntry,
    ZoneChannel, channel_header, renumber,
};
use crate::error::{CatalogError, Result};

/// Per-channel lookups a reconciliation pass needs from the network.
#[async_trait]
pub trait ChannelProbe: Send + Sync {
    /// The embed URL that serves as a channel's referer, `None` on a miss.
    async fn reference_url(&self, channel_id: &str) -> Result<Option<String>>;

    /// Byte length of the thumbnail at `url`.
    async fn thumbnail_size(&self, url: &str) -> Option<u64>;
}

/// Output of one pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Sorted by name and numbered 1..=N.
    pub channels: Vec<ChannelRecord>,
    pub changes: ChangeSet,
    /// Zone listing entries whose name the provider no longer lists.
    pub missing: Vec<ReferenceEntry>,
}

/// Network work still owed by a planned record.
struct PendingProbe {
    index: usize,
    id: String,
    resolve_ref: bool,
    thumbnail: Option<String>,
}

struct ProbeResult {
    index: usize,
    ref_url: Option<Option<String>>,
    thumbnail_size: Option<Option<u64>>,
}

pub struct CatalogReconciler {
    probe: Arc<dyn ChannelProbe>,
    user_agent: String,
    workers: usize,
}

impl CatalogReconciler {
    pub fn new(probe: Arc<dyn ChannelProbe>, user_agent: impl Into<String>, workers: usize) -> Self {
        Self {
            probe,
            user_agent: user_agent.into(),
            workers: workers.max(1),
        }
    }

    /// Run one pass.
    ///
    /// `known` holds the zone listing entries for the taxonomy. The only error
    /// is [`CatalogError::Cancelled`].
    pub async fn reconcile(
        &self,
        fresh: &[ScrapedEntry],
        persisted: &PersistedCatalog,
        references: &[ReferenceEntry],
        known: &[ZoneChannel],
        cancel: &CancellationToken,
    ) -> Result<Reconciliation> {
        let mut references_by_name: FxHashMap<&str, &ReferenceEntry> = FxHashMap::default();
        for entry in references {
            references_by_name.entry(entry.name.as_str()).or_insert(entry);
        }
        let mut known_by_id: FxHashMap<&str, &ZoneChannel> = FxHashMap::default();
        for channel in known {
            known_by_id.entry(channel.id.as_str()).or_insert(channel);
        }

        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut matched: FxHashSet<&str> = FxHashSet::default();
        let mut channels = Vec::with_capacity(fresh.len());
        let mut pending = Vec::new();

        for entry in fresh {
            if !seen.insert(entry.id.as_str()) {
                debug!(id = %entry.id, name = %entry.name, "Duplicate channel in listing, keeping the first");
                continue;
            }
            let index = channels.len();
            let reference = references_by_name.get(entry.name.as_str());
            if let Some(reference) = reference {
                matched.insert(reference.id.as_str());
            }
            let known_match =
                reference.and_then(|reference| known_by_id.get(reference.id.as_str()));

            let (record, probe) = match known_match {
                Some(zone) => self.plan_known(index, entry, zone, persisted),
                None => self.plan_synthesized(index, entry, persisted),
            };
            channels.push(record);
            if probe.resolve_ref || probe.thumbnail.is_some() {
                pending.push(probe);
            }
        }

        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let mut results = pin!(
            stream::iter(pending)
                .map(|job| self.run_probe(job))
                .buffer_unordered(self.workers)
        );
        while let Some(result) = results.next().await {
            self.apply(&mut channels[result.index], result);
            if cancel.is_cancelled() {
                info!("Catalog reconciliation cancelled");
                return Err(CatalogError::Cancelled);
            }
        }

        let mut missing = Vec::new();
        let mut warned: FxHashSet<&str> = FxHashSet::default();
        for reference in references {
            let id = reference.id.as_str();
            if !known_by_id.contains_key(id) || matched.contains(id) || !warned.insert(id) {
                continue;
            }
            warn!(
                id = %reference.id,
                name = %reference.name,
                "Channel from reference list not found on provider site"
            );
            missing.push(reference.clone());
        }

        renumber(&mut channels);
        let changes = ChangeSet::diff(&channels, persisted);
        Ok(Reconciliation {
            channels,
            changes,
            missing,
        })
    }

    /// A scraped entry the taxonomy knows about.
    fn plan_known(
        &self,
        index: usize,
        entry: &ScrapedEntry,
        zone: &ZoneChannel,
        persisted: &PersistedCatalog,
    ) -> (ChannelRecord, PendingProbe) {
        let callsign = zone.callsign.clone().unwrap_or_else(|| entry.id.clone());
        match persisted.get(&entry.id) {
            Some(stored) => {
                let (thumbnail_size, thumbnail) = if stored.thumbnail == zone.thumbnail {
                    (stored.thumbnail_size, None)
                } else {
                    (None, zone.thumbnail.clone())
                };
                let record = ChannelRecord {
                    id: stored.uid.clone(),
                    enabled: stored.enabled,
                    callsign,
                    number: 0,
                    name: stored.display_name.clone(),
                    is_hd: stored.is_hd,
                    thumbnail: zone.thumbnail.clone(),
                    thumbnail_size,
                    ref_url: stored.ref_url.clone(),
                    header: stored.header.clone(),
                    uses_date_key: false,
                };
                let probe = PendingProbe {
                    index,
                    id: entry.id.clone(),
                    resolve_ref: stored.ref_url.is_none(),
                    thumbnail,
                };
                (record, probe)
            }
            None => {
                debug!(id = %entry.id, name = %entry.name, "Adding channel from reference list");
                let record = ChannelRecord {
                    id: entry.id.clone(),
                    enabled: true,
                    callsign,
                    number: 0,
                    name: entry.name.clone(),
                    is_hd: zone.is_hd,
                    thumbnail: zone.thumbnail.clone(),
                    thumbnail_size: None,
                    ref_url: None,
                    header: None,
                    uses_date_key: false,
                };
                let probe = PendingProbe {
                    index,
                    id: entry.id.clone(),
                    resolve_ref: true,
                    thumbnail: zone.thumbnail.clone(),
                };
                (record, probe)
            }
        }
    }

    /// A scraped entry outside the taxonomy.
    fn plan_synthesized(
        &self,
        index: usize,
        entry: &ScrapedEntry,
        persisted: &PersistedCatalog,
    ) -> (ChannelRecord, PendingProbe) {
        let mut record = ChannelRecord {
            id: entry.id.clone(),
            enabled: true,
            callsign: entry.id.clone(),
            number: 0,
            name: entry.name.clone(),
            is_hd: false,
            thumbnail: None,
            thumbnail_size: None,
            ref_url: None,
            header: None,
            uses_date_key: false,
        };
        match persisted.get(&entry.id) {
            Some(stored) => {
                record.enabled = stored.enabled;
                record.is_hd = stored.is_hd;
                record.thumbnail = stored.thumbnail.clone();
                record.thumbnail_size = stored.thumbnail_size;
                record.ref_url = stored.ref_url.clone();
                record.header = self.header_for(&record.ref_url);
            }
            None => debug!(id = %entry.id, name = %entry.name, "Adding channel"),
        }
        // Stored channels without a referer get another lookup on every pass.
        let resolve_ref = record.ref_url.is_none();
        let probe = PendingProbe {
            index,
            id: entry.id.clone(),
            resolve_ref,
            thumbnail: None,
        };
        (record, probe)
    }

    async fn run_probe(&self, job: PendingProbe) -> ProbeResult {
        let ref_url = if job.resolve_ref {
            let resolved = match self.probe.reference_url(&job.id).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(id = %job.id, error = %e, "Unable to resolve reference url");
                    None
                }
            };
            Some(resolved)
        } else {
            None
        };
        let thumbnail_size = match &job.thumbnail {
            Some(url) => Some(self.probe.thumbnail_size(url).await),
            None => None,
        };
        ProbeResult {
            index: job.index,
            ref_url,
            thumbnail_size,
        }
    }

    fn apply(&self, record: &mut ChannelRecord, result: ProbeResult) {
        if let Some(size) = result.thumbnail_size {
            record.thumbnail_size = size;
        }
        if let Some(ref_url) = result.ref_url {
            if ref_url.is_none() {
                warn!(id = %record.id, name = %record.name, "Bad channel found");
            }
            record.header = self.header_for(&ref_url);
            record.ref_url = ref_url;
        }
    }

    fn header_for(&self, ref_url: &Option<String>) -> Option<ChannelHeader> {
        ref_url
            .as_deref()
            .map(|referer| channel_header(&self.user_agent, referer))
    }
}
