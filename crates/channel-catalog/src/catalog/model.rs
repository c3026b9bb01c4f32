use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Outbound headers a player must send to fetch a channel's stream.
pub type ChannelHeader = BTreeMap<String, String>;

/// Provider + instance; channel ids are unique within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    pub provider: String,
    pub instance: String,
}

impl Namespace {
    pub fn new(provider: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.instance)
    }
}

/// A channel in the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub id: String,
    pub enabled: bool,
    pub callsign: String,
    /// 1-based position after sorting the catalog by name.
    pub number: u32,
    pub name: String,
    #[serde(rename = "isHD")]
    pub is_hd: bool,
    pub thumbnail: Option<String>,
    pub thumbnail_size: Option<u64>,
    /// Referer the stream host expects. `None` means unreachable until the next pass.
    pub ref_url: Option<String>,
    pub header: Option<ChannelHeader>,
    pub uses_date_key: bool,
}

impl ChannelRecord {
    /// Only enabled channels with a reference url may be scheduled for playback.
    pub fn is_playable(&self) -> bool {
        self.enabled && self.ref_url.is_some()
    }
}

/// The stored counterpart of a [`ChannelRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedChannel {
    pub uid: String,
    pub enabled: bool,
    pub display_name: String,
    pub number: u32,
    pub callsign: String,
    pub is_hd: bool,
    pub thumbnail: Option<String>,
    pub thumbnail_size: Option<u64>,
    pub ref_url: Option<String>,
    pub header: Option<ChannelHeader>,
    pub uses_date_key: bool,
}

impl PersistedChannel {
    pub fn to_record(&self) -> ChannelRecord {
        ChannelRecord {
            id: self.uid.clone(),
            enabled: self.enabled,
            callsign: self.callsign.clone(),
            number: self.number,
            name: self.display_name.clone(),
            is_hd: self.is_hd,
            thumbnail: self.thumbnail.clone(),
            thumbnail_size: self.thumbnail_size,
            ref_url: self.ref_url.clone(),
            header: self.header.clone(),
            uses_date_key: self.uses_date_key,
        }
    }

    /// Whether storing `record` would change anything besides the HD flag and
    /// the derived channel number.
    pub fn differs_from(&self, record: &ChannelRecord) -> bool {
        self.enabled != record.enabled
            || self.display_name != record.name
            || self.callsign != record.callsign
            || self.thumbnail != record.thumbnail
            || self.thumbnail_size != record.thumbnail_size
            || self.ref_url != record.ref_url
            || self.header != record.header
            || self.uses_date_key != record.uses_date_key
    }
}

impl From<&ChannelRecord> for PersistedChannel {
    fn from(record: &ChannelRecord) -> Self {
        Self {
            uid: record.id.clone(),
            enabled: record.enabled,
            display_name: record.name.clone(),
            number: record.number,
            callsign: record.callsign.clone(),
            is_hd: record.is_hd,
            thumbnail: record.thumbnail.clone(),
            thumbnail_size: record.thumbnail_size,
            ref_url: record.ref_url.clone(),
            header: record.header.clone(),
            uses_date_key: record.uses_date_key,
        }
    }
}

/// Persisted channels of one namespace, keyed by id.
pub type PersistedCatalog = FxHashMap<String, PersistedChannel>;

/// One item of the provider's channel listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedEntry {
    pub id: String,
    pub name: String,
    pub href: String,
}

/// An entry of the curated channel taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub name: String,
    pub zone: String,
    /// Listing source that knows this zone.
    pub plugin: String,
}

/// A channel as described by the zone listing for a taxonomy entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default, rename = "HD")]
    pub is_hd: bool,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// An HD flag that changed against the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdFlip {
    pub id: String,
    pub is_hd: bool,
}

/// Writes a reconciliation pass needs to make, and nothing more.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Existing channels whose only change is the HD flag.
    pub hd_flips: Vec<HdFlip>,
    /// New channels, or existing ones with changed stored fields.
    pub upserts: Vec<ChannelRecord>,
}

impl ChangeSet {
    /// Compare a pass's output with what is stored.
    pub fn diff(channels: &[ChannelRecord], persisted: &PersistedCatalog) -> Self {
        let mut changes = Self::default();
        for record in channels {
            match persisted.get(&record.id) {
                None => changes.upserts.push(record.clone()),
                Some(stored) if stored.differs_from(record) => {
                    changes.upserts.push(record.clone())
                }
                Some(stored) if stored.is_hd != record.is_hd => changes.hd_flips.push(HdFlip {
                    id: record.id.clone(),
                    is_hd: record.is_hd,
                }),
                Some(_) => {}
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.hd_flips.is_empty() && self.upserts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hd_flips.len() + self.upserts.len()
    }
}

/// Stable sort by name, then number 1..=N.
///
/// The result depends only on the names, never on previous numbering.
pub fn renumber(channels: &mut [ChannelRecord]) {
    channels.sort_by(|a, b| a.name.cmp(&b.name));
    for (number, channel) in (1u32..).zip(channels.iter_mut()) {
        channel.number = number;
    }
}

/// Headers for a channel whose stream host checks the referer.
pub fn channel_header(user_agent: &str, referer: &str) -> ChannelHeader {
    ChannelHeader::from([
        ("User-agent".to_owned(), user_agent.to_owned()),
        ("Referer".to_owned(), referer.to_owned()),
    ])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(id: &str, name: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_owned(),
            enabled: true,
            callsign: id.to_owned(),
            number: 0,
            name: name.to_owned(),
            is_hd: false,
            thumbnail: None,
            thumbnail_size: None,
            ref_url: Some(format!("https://embed.test/{id}")),
            header: None,
            uses_date_key: false,
        }
    }

    #[test]
    fn renumber_ignores_prior_numbers() {
        let mut a = vec![record("1", "Zed"), record("2", "Alpha"), record("3", "Mid")];
        let mut b = a.clone();
        for (i, channel) in b.iter_mut().enumerate() {
            channel.number = 100 - i as u32;
        }
        b.reverse();

        renumber(&mut a);
        renumber(&mut b);

        let numbered = |v: &[ChannelRecord]| {
            v.iter()
                .map(|c| (c.name.clone(), c.number))
                .collect::<Vec<_>>()
        };
        assert_eq!(numbered(&a), numbered(&b));
        assert_eq!(
            numbered(&a),
            vec![
                ("Alpha".to_owned(), 1),
                ("Mid".to_owned(), 2),
                ("Zed".to_owned(), 3)
            ]
        );
    }

    #[test]
    fn renumber_is_stable_for_equal_names() {
        let mut channels = vec![record("9", "Same"), record("4", "Same")];
        renumber(&mut channels);
        assert_eq!(channels[0].id, "9");
        assert_eq!(channels[1].number, 2);
    }

    #[test]
    fn diff_separates_hd_flips_from_upserts() {
        let stored = record("1", "One");
        let changed = record("2", "Two");
        let mut persisted = PersistedCatalog::default();
        persisted.insert("1".into(), PersistedChannel::from(&stored));
        persisted.insert("2".into(), PersistedChannel::from(&changed));

        let mut flipped = stored.clone();
        flipped.is_hd = true;
        let mut renamed = changed.clone();
        renamed.ref_url = None;
        let fresh = record("3", "Three");

        let changes = ChangeSet::diff(&[flipped, renamed, fresh], &persisted);
        assert_eq!(
            changes.hd_flips,
            vec![HdFlip {
                id: "1".into(),
                is_hd: true
            }]
        );
        let upserted: Vec<_> = changes.upserts.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(upserted, ["2", "3"]);
    }

    #[test]
    fn unchanged_catalog_has_no_writes() {
        let mut channels = vec![record("1", "One"), record("2", "Two")];
        renumber(&mut channels);
        let persisted: PersistedCatalog = channels
            .iter()
            .map(|c| (c.id.clone(), PersistedChannel::from(c)))
            .collect();
        assert!(ChangeSet::diff(&channels, &persisted).is_empty());
    }

    #[test]
    fn unreachable_channel_is_not_playable() {
        let mut channel = record("1", "One");
        assert!(channel.is_playable());
        channel.ref_url = None;
        assert!(!channel.is_playable());
    }

    #[test]
    fn record_serializes_with_hd_key() {
        let json = serde_json::to_value(record("1", "One")).unwrap();
        assert_eq!(json["isHD"], false);
        assert_eq!(json["refUrl"], "https://embed.test/1");
        assert!(json.get("usesDateKey").is_some());
    }
}
