//! A scripted provider site shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use channel_catalog::catalog::InMemoryChannelStore;
use channel_catalog::config::{CatalogConfig, ProviderEndpoints};
use channel_catalog::fetch::{HttpTransport, RetryPolicy, Sleeper, TransportError};
use channel_catalog::{CatalogPipeline, Fetcher};
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, REFERER};
use rustc_hash::FxHashMap;

pub const BASE_URL: &str = "https://site.test";

type Reply = Result<Bytes, TransportError>;

/// Serves fixed bodies by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<FxHashMap<String, Bytes>>,
    scripted: Mutex<FxHashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, body: impl Into<String>) {
        self.pages
            .lock()
            .insert(url.to_owned(), Bytes::from(body.into()));
    }

    /// One-shot replies for `url`, served before any fixed page.
    pub fn script(&self, url: &str, replies: Vec<Reply>) {
        self.scripted
            .lock()
            .entry(url.to_owned())
            .or_default()
            .extend(replies);
    }

    /// Listing page plus reference page, player and manifest for every channel.
    pub fn provider(&self, channels: &[(&str, &str)], manifest: &str) {
        let items: String = channels
            .iter()
            .map(|(id, name)| {
                format!(
                    r#"<div class="grid-item"><a href="/stream/stream-{id}.php" target="_blank"><strong>{name}</strong></a></div>"#
                )
            })
            .collect();
        self.listing(&format!(
            r#"<html><body><div class="grid-container">{items}</div></body></html>"#
        ));
        for (id, _) in channels {
            self.channel(id, manifest);
        }
    }

    pub fn listing(&self, html: &str) {
        self.page(&format!("{BASE_URL}/24-7-channels.php"), html);
    }

    pub fn channel(&self, id: &str, manifest: &str) {
        self.page(
            &reference_page(id),
            format!(r#"<iframe src="{}" width="100%" height="100%"></iframe>"#, embed_url(id)),
        );
        self.page(
            &embed_url(id),
            format!("new Clappr.Player({{source:'{}', autoplay: true}});", manifest_url(id)),
        );
        self.page(&manifest_url(id), manifest);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn referer_of(&self, url: &str) -> Option<String> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|(requested, _)| requested == url)
            .and_then(|(_, referer)| referer.clone())
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl HttpTransport for FakeSite {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Reply {
        let referer = headers
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.requests.lock().push((url.to_owned(), referer));

        if let Some(reply) = self
            .scripted
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.pages
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: StatusCode::NOT_FOUND,
                url: url.to_owned(),
            })
    }
}

/// Records pauses instead of sleeping.
#[derive(Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn total(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

pub fn reference_page(id: &str) -> String {
    format!("{BASE_URL}/stream/stream-{id}.php")
}

pub fn embed_url(id: &str) -> String {
    format!("https://embed.test/premium{id}/index.html")
}

pub fn manifest_url(id: &str) -> String {
    format!("https://cdn.test/hls/{id}/mono.m3u8")
}

pub const MASTER_720_1080: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1280x720
720/a.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1280x720
720/b.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1920x1080
1080/index.m3u8
";

pub const MASTER_SD: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360/index.m3u8
";

pub const MASTER_UNSIZED: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=900000
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=4000000
high/index.m3u8
";

pub const MEDIA_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:1
#EXTINF:6.0,
seg1.ts
#EXTINF:6.0,
seg2.ts
";

pub fn test_config() -> CatalogConfig {
    CatalogConfig {
        provider: ProviderEndpoints {
            base_url: BASE_URL.to_owned(),
            ..Default::default()
        },
        workers: 2,
        ..Default::default()
    }
}

pub fn fetcher(site: Arc<FakeSite>, sleeper: Arc<InstantSleeper>) -> Arc<Fetcher> {
    Arc::new(Fetcher::new(site, sleeper, RetryPolicy::default()))
}

pub struct Harness {
    pub site: Arc<FakeSite>,
    pub sleeper: Arc<InstantSleeper>,
    pub store: Arc<InMemoryChannelStore>,
    pub pipeline: CatalogPipeline,
}

pub fn harness(store: InMemoryChannelStore) -> Harness {
    let site = FakeSite::new();
    let sleeper = Arc::new(InstantSleeper::default());
    let store = Arc::new(store);
    let pipeline = CatalogPipeline::new(
        test_config(),
        fetcher(site.clone(), sleeper.clone()),
        store.clone(),
    );
    Harness {
        site,
        sleeper,
        store,
        pipeline,
    }
}
