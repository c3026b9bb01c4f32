//! Reference page → embedded player → manifest → best variant.

mod variant;

pub use variant::{HD_MIN_HEIGHT, VariantStream, select_best_variant};

use std::sync::Arc;

use async_trait::async_trait;
use m3u8_rs::Playlist;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::catalog::ChannelProbe;
use crate::config::ProviderEndpoints;
use crate::error::Result;
use crate::extract::{EMBED_FRAME_REGEX, MANIFEST_SOURCE_REGEX, extract_first};
use crate::fetch::{FetchOutcome, Fetcher};

/// The stream chosen for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSelection {
    pub uri: String,
    /// `None` when the manifest itself is the stream.
    pub is_hd: Option<bool>,
    /// `None` when the manifest itself is the stream.
    pub variant: Option<VariantStream>,
}

impl StreamSelection {
    fn single(uri: String) -> Self {
        Self {
            uri,
            is_hd: None,
            variant: None,
        }
    }
}

pub struct VariantPlaylistResolver {
    fetcher: Arc<Fetcher>,
    endpoints: ProviderEndpoints,
}

impl VariantPlaylistResolver {
    pub fn new(fetcher: Arc<Fetcher>, endpoints: ProviderEndpoints) -> Self {
        Self { fetcher, endpoints }
    }

    /// Embedded player URL on the channel's reference page.
    ///
    /// `Ok(None)` on any fetch failure or extraction miss; a timeout is returned as an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn reference_url(&self, channel_id: &str) -> Result<Option<String>> {
        let page_url = self.endpoints.reference_page(channel_id);
        let headers = self.request_headers(None);
        let Some(page) = self.fetcher.fetch(&page_url, Some(&headers)).await?.into_bytes() else {
            return Ok(None);
        };
        let embed_url = extract_first(&page, &EMBED_FRAME_REGEX);
        if embed_url.is_none() {
            info!(channel_id, "Unable to obtain url, aborting");
        }
        Ok(embed_url)
    }

    /// Resolve the playable stream of `channel_id`.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(&self, channel_id: &str) -> Result<Option<StreamSelection>> {
        let Some(embed_url) = self.reference_url(channel_id).await? else {
            return Ok(None);
        };

        let headers = self.request_headers(Some(&self.endpoints.reference_page(channel_id)));
        let Some(player) = self.fetcher.fetch(&embed_url, Some(&headers)).await?.into_bytes() else {
            return Ok(None);
        };
        let Some(manifest_url) = extract_first(&player, &MANIFEST_SOURCE_REGEX) else {
            info!(channel_id, "Unable to obtain m3u8, aborting");
            return Ok(None);
        };

        let headers = self.request_headers(Some(&embed_url));
        let Some(manifest) = self.fetcher.fetch(&manifest_url, Some(&headers)).await?.into_bytes()
        else {
            info!(channel_id, "Unable to obtain m3u file, aborting stream");
            return Ok(None);
        };

        let playlist = match m3u8_rs::parse_playlist_res(&manifest) {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(channel_id, url = %manifest_url, error = %e, "Unparseable manifest");
                return Ok(None);
            }
        };

        let master = match playlist {
            Playlist::MasterPlaylist(master) => master,
            Playlist::MediaPlaylist(_) => {
                debug!(channel_id, "No variant streams found, assuming single stream only");
                return Ok(Some(StreamSelection::single(manifest_url)));
            }
        };

        let base_url = Url::parse(&manifest_url).ok();
        let variants = variant::collect_variants(&master, base_url.as_ref());
        debug!(channel_id, count = variants.len(), "Found playlist variants");

        if variants.is_empty() {
            debug!(channel_id, "No variant streams found, assuming single stream only");
            return Ok(Some(StreamSelection::single(manifest_url)));
        }
        let Some(best) = select_best_variant(&variants) else {
            info!(channel_id, "No variant advertises a resolution, aborting stream");
            return Ok(None);
        };

        info!(
            channel_id,
            width = ?best.resolution_width,
            height = ?best.resolution_height,
            bandwidth = best.bandwidth,
            "Selected stream variant"
        );
        Ok(Some(StreamSelection {
            uri: best.uri.clone(),
            is_hd: best.is_hd(),
            variant: Some(best.clone()),
        }))
    }

    fn request_headers(&self, referer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.endpoints.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        if let Some(referer) = referer {
            match HeaderValue::from_str(referer) {
                Ok(value) => {
                    headers.insert(REFERER, value);
                }
                Err(_) => debug!(referer, "Referer is not a valid header value, omitting"),
            }
        }
        headers
    }
}

#[async_trait]
impl ChannelProbe for VariantPlaylistResolver {
    async fn reference_url(&self, channel_id: &str) -> Result<Option<String>> {
        VariantPlaylistResolver::reference_url(self, channel_id).await
    }

    async fn thumbnail_size(&self, url: &str) -> Option<u64> {
        match self.fetcher.fetch_once(url, None).await {
            FetchOutcome::Success(bytes) => u64::try_from(bytes.len()).ok(),
            FetchOutcome::Empty => Some(0),
            FetchOutcome::Failure(kind) => {
                debug!(url, kind = ?kind, "Unable to size thumbnail");
                None
            }
        }
    }
}
