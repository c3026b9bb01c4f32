//! Curated channel taxonomy and the zone listings that describe its channels.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, warn};

use super::model::{ReferenceEntry, ZoneChannel};
use crate::error::Result;
use crate::fetch::Fetcher;

/// Source of the taxonomy.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn load_reference_list(&self) -> Result<Vec<ReferenceEntry>>;
}

/// Source of the already-known channels of one zone.
#[async_trait]
pub trait ZoneListingSource: Send + Sync {
    /// Channels of `zone` restricted to `ids`. `None` means the zone could not
    /// be read and the caller should not trust a partial taxonomy.
    async fn zone_channels(&self, plugin: &str, zone: &str, ids: &[String])
    -> Option<Vec<ZoneChannel>>;
}

/// Taxonomy held in memory, optionally loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceList {
    entries: Vec<ReferenceEntry>,
    path: Option<PathBuf>,
}

impl StaticReferenceList {
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self {
            entries,
            path: None,
        }
    }

    /// Read lazily from `path` on every load, so edits are picked up between builds.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            entries: Vec::new(),
            path: Some(path.as_ref().to_path_buf()),
        }
    }
}

#[async_trait]
impl ReferenceSource for StaticReferenceList {
    async fn load_reference_list(&self) -> Result<Vec<ReferenceEntry>> {
        let Some(path) = &self.path else {
            return Ok(self.entries.clone());
        };
        let raw = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str::<Vec<ReferenceEntry>>(&raw) {
            Ok(entries) => {
                debug!(path = %path.display(), count = entries.len(), "Loaded reference list");
                Ok(entries)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Reference list is not valid JSON");
                Ok(Vec::new())
            }
        }
    }
}

/// Zone listings served as JSON arrays of [`ZoneChannel`].
pub struct HttpZoneListing {
    fetcher: Arc<Fetcher>,
    url_template: String,
}

impl HttpZoneListing {
    /// `url_template` contains `{plugin}` and `{zone}` placeholders.
    pub fn new(fetcher: Arc<Fetcher>, url_template: impl Into<String>) -> Self {
        Self {
            fetcher,
            url_template: url_template.into(),
        }
    }

    fn zone_url(&self, plugin: &str, zone: &str) -> String {
        self.url_template
            .replace("{plugin}", plugin)
            .replace("{zone}", zone)
    }
}

#[async_trait]
impl ZoneListingSource for HttpZoneListing {
    async fn zone_channels(
        &self,
        plugin: &str,
        zone: &str,
        ids: &[String],
    ) -> Option<Vec<ZoneChannel>> {
        let url = self.zone_url(plugin, zone);
        let body = match self.fetcher.fetch_text(&url, None).await {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                warn!(plugin, zone, error = %e, "Zone listing unavailable");
                return None;
            }
        };
        match serde_json::from_str::<Vec<ZoneChannel>>(&body) {
            Ok(channels) => Some(filter_by_ids(channels, ids)),
            Err(e) => {
                error!(plugin, zone, error = %e, "Zone listing is not valid JSON");
                None
            }
        }
    }
}

/// Zone listings held in memory, keyed by `(plugin, zone)`.
#[derive(Debug, Clone, Default)]
pub struct StaticZoneListing {
    zones: FxHashMap<(String, String), Vec<ZoneChannel>>,
}

impl StaticZoneListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(
        mut self,
        plugin: impl Into<String>,
        zone: impl Into<String>,
        channels: Vec<ZoneChannel>,
    ) -> Self {
        self.zones.insert((plugin.into(), zone.into()), channels);
        self
    }
}

#[async_trait]
impl ZoneListingSource for StaticZoneListing {
    async fn zone_channels(
        &self,
        plugin: &str,
        zone: &str,
        ids: &[String],
    ) -> Option<Vec<ZoneChannel>> {
        self.zones
            .get(&(plugin.to_owned(), zone.to_owned()))
            .map(|channels| filter_by_ids(channels.clone(), ids))
    }
}

fn filter_by_ids(channels: Vec<ZoneChannel>, ids: &[String]) -> Vec<ZoneChannel> {
    let wanted: FxHashSet<&str> = ids.iter().map(String::as_str).collect();
    channels
        .into_iter()
        .filter(|channel| wanted.contains(channel.id.as_str()))
        .collect()
}

/// Group entries by plugin, then zone, keeping first-seen order within each.
pub fn group_by_zone(entries: &[ReferenceEntry]) -> Vec<(String, String, Vec<String>)> {
    let mut groups: Vec<(String, String, Vec<String>)> = Vec::new();
    for entry in entries {
        match groups
            .iter_mut()
            .find(|(plugin, zone, _)| *plugin == entry.plugin && *zone == entry.zone)
        {
            Some((_, _, ids)) => ids.push(entry.id.clone()),
            None => groups.push((entry.plugin.clone(), entry.zone.clone(), vec![entry.id.clone()])),
        }
    }
    groups.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str, zone: &str, plugin: &str) -> ReferenceEntry {
        ReferenceEntry {
            id: id.into(),
            name: name.into(),
            zone: zone.into(),
            plugin: plugin.into(),
        }
    }

    fn zone_channel(id: &str) -> ZoneChannel {
        ZoneChannel {
            id: id.into(),
            name: format!("Channel {id}"),
            callsign: None,
            is_hd: false,
            thumbnail: None,
        }
    }

    #[test]
    fn groups_by_plugin_then_zone() {
        let entries = vec![
            entry("3", "C", "us", "tvguide"),
            entry("1", "A", "uk", "epg"),
            entry("2", "B", "us", "tvguide"),
        ];
        let groups = group_by_zone(&entries);
        assert_eq!(
            groups,
            vec![
                ("epg".into(), "uk".into(), vec!["1".to_owned()]),
                ("tvguide".into(), "us".into(), vec!["3".to_owned(), "2".to_owned()]),
            ]
        );
    }

    #[tokio::test]
    async fn static_zone_listing_filters_ids() {
        let listing = StaticZoneListing::new().with_zone(
            "tvguide",
            "us",
            vec![zone_channel("1"), zone_channel("2"), zone_channel("3")],
        );
        let channels = listing
            .zone_channels("tvguide", "us", &["3".into(), "1".into()])
            .await
            .unwrap();
        let ids: Vec<_> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
        assert!(listing.zone_channels("tvguide", "ca", &[]).await.is_none());
    }

    #[tokio::test]
    async fn reference_list_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.json");
        std::fs::write(
            &path,
            r#"[{"id": "7", "name": "Golf Channel", "zone": "us", "plugin": "tvguide"}]"#,
        )
        .unwrap();

        let entries = StaticReferenceList::from_path(&path)
            .load_reference_list()
            .await
            .unwrap();
        assert_eq!(entries, vec![entry("7", "Golf Channel", "us", "tvguide")]);
    }

    #[tokio::test]
    async fn unreadable_reference_json_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.json");
        std::fs::write(&path, "{not json").unwrap();

        let entries = StaticReferenceList::from_path(&path)
            .load_reference_list()
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn zone_channel_reads_hd_key() {
        let channel: ZoneChannel =
            serde_json::from_str(r#"{"id": "1", "name": "One", "HD": true}"#).unwrap();
        assert!(channel.is_hd);
        assert_eq!(channel.callsign, None);
    }
}
