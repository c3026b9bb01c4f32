//! Stream resolution and fetch recovery against a scripted provider site.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use channel_catalog::catalog::ChannelProbe;
use channel_catalog::fetch::{HttpTransport, RetryPolicy, TransportError, validate_request_target};
use channel_catalog::{CatalogError, FetchOutcome, Fetcher, VariantPlaylistResolver};
use common::*;
use reqwest::header::HeaderMap;

/// Rejects request targets the way the reqwest transport does.
struct StrictSite(Arc<FakeSite>);

#[async_trait]
impl HttpTransport for StrictSite {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Bytes, TransportError> {
        validate_request_target(url)?;
        self.0.get(url, headers).await
    }
}

fn resolver(site: Arc<FakeSite>, sleeper: Arc<InstantSleeper>) -> VariantPlaylistResolver {
    VariantPlaylistResolver::new(fetcher(site, sleeper), test_config().provider)
}

#[tokio::test]
async fn picks_highest_resolution_variant() {
    let site = FakeSite::new();
    site.channel("51", MASTER_720_1080);
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    let selection = resolver.resolve("51").await.unwrap().unwrap();
    assert_eq!(selection.uri, "https://cdn.test/hls/51/1080/index.m3u8");
    assert_eq!(selection.is_hd, Some(true));
    assert_eq!(selection.variant.unwrap().bandwidth, 2_000_000);
}

#[tokio::test]
async fn sd_variant_is_not_hd() {
    let site = FakeSite::new();
    site.channel("51", MASTER_SD);
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    let selection = resolver.resolve("51").await.unwrap().unwrap();
    assert_eq!(selection.is_hd, Some(false));
}

#[tokio::test]
async fn master_without_resolutions_yields_no_stream() {
    let site = FakeSite::new();
    site.channel("51", MASTER_UNSIZED);
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    assert_eq!(resolver.resolve("51").await.unwrap(), None);
}

#[tokio::test]
async fn missing_player_frame_aborts() {
    let site = FakeSite::new();
    site.page(&reference_page("51"), "<html>offline</html>");
    let resolver = resolver(site.clone(), Arc::new(InstantSleeper::default()));

    assert_eq!(resolver.resolve("51").await.unwrap(), None);
    assert_eq!(site.requests(), vec![reference_page("51")]);
}

#[tokio::test]
async fn missing_manifest_source_aborts() {
    let site = FakeSite::new();
    site.channel("51", MASTER_SD);
    site.page(&embed_url("51"), "<script>var player;</script>");
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    assert_eq!(resolver.resolve("51").await.unwrap(), None);
}

#[tokio::test]
async fn not_found_degrades_after_extended_pause() {
    let site = FakeSite::new();
    let sleeper = Arc::new(InstantSleeper::default());
    let resolver = resolver(site.clone(), sleeper.clone());

    assert_eq!(resolver.resolve("51").await.unwrap(), None);
    assert!(sleeper.total() >= Duration::from_secs(7));
    assert_eq!(site.requests().len(), 2);
}

#[tokio::test]
async fn manifest_timeout_propagates() {
    let site = FakeSite::new();
    site.channel("51", MASTER_SD);
    site.script(
        &manifest_url("51"),
        vec![Err(TransportError::Timeout), Err(TransportError::Timeout)],
    );
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    let err = resolver.resolve("51").await.unwrap_err();
    assert!(matches!(err, CatalogError::Timeout { .. }));
}

#[tokio::test]
async fn timeout_then_other_failure_degrades() {
    let site = FakeSite::new();
    site.channel("51", MASTER_SD);
    site.script(
        &manifest_url("51"),
        vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connection("reset".into())),
        ],
    );
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    assert_eq!(resolver.resolve("51").await.unwrap(), None);
}

#[tokio::test]
async fn malformed_url_is_retried_once_encoded() {
    let site = FakeSite::new();
    site.page("https://site.test/logos/my%20channel.png", "png");
    let fetcher = Fetcher::new(
        Arc::new(StrictSite(site.clone())),
        Arc::new(InstantSleeper::default()),
        RetryPolicy::default(),
    );

    let outcome = fetcher
        .fetch("https://site.test/logos/my channel.png", None)
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Success(Bytes::from_static(b"png")));
    assert_eq!(
        site.requests(),
        vec!["https://site.test/logos/my%20channel.png".to_owned()]
    );
}

#[tokio::test]
async fn thumbnail_size_is_body_length() {
    let site = FakeSite::new();
    site.page("https://img.test/abc.png", "x".repeat(2048));
    let resolver = resolver(site, Arc::new(InstantSleeper::default()));

    assert_eq!(resolver.thumbnail_size("https://img.test/abc.png").await, Some(2048));
    assert_eq!(resolver.thumbnail_size("https://img.test/none.png").await, None);
}
