use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::Namespace;
use crate::error::{CatalogError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Top-level configuration for the catalog core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub provider: ProviderEndpoints,
    pub fetch: FetchConfig,
    /// Upper bound on concurrent per-channel resolutions during a build.
    pub workers: usize,
    /// JSON taxonomy file (`[{"id", "name", "zone", "plugin"}]`).
    pub reference_list_path: Option<PathBuf>,
    /// Zone listing endpoint template; `{plugin}` and `{zone}` are substituted.
    pub zone_listing_url: Option<String>,
}

impl CatalogConfig {
    /// Reject settings no build could succeed with.
    pub fn validate(&self) -> Result<()> {
        match Url::parse(&self.provider.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(CatalogError::config(format!(
                    "provider base_url must be an http(s) URL, got {:?}",
                    self.provider.base_url
                )));
            }
        }
        if !self.provider.stream_path.contains("{}") {
            return Err(CatalogError::config(
                "provider stream_path needs a {} placeholder for the channel id",
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(CatalogError::config("fetch max_attempts must be at least 1"));
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            provider: ProviderEndpoints::default(),
            fetch: FetchConfig::default(),
            workers: 4,
            reference_list_path: None,
            zone_listing_url: None,
        }
    }
}

/// Upstream site layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    pub base_url: String,
    /// Per-channel reference page, `{}` is replaced by the channel id.
    pub stream_path: String,
    /// Full channel listing page.
    pub channels_path: String,
    pub user_agent: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            base_url: "https://daddylive.example".to_owned(),
            stream_path: "/stream/stream-{}.php".to_owned(),
            channels_path: "/24-7-channels.php".to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl ProviderEndpoints {
    /// URL of the reference page for `channel_id`.
    pub fn reference_page(&self, channel_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.stream_path.replace("{}", channel_id)
        )
    }

    pub fn channel_listing(&self) -> String {
        format!("{}{}", self.base_url, self.channels_path)
    }
}

/// Retry and timeout settings for the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Hard per-call timeout applied by the transport.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Total attempts per fetch, including the first one.
    pub max_attempts: u32,
    /// Pause after every failed attempt.
    pub retry_delay_ms: u64,
    /// Extra pause after a "not found" response, which this upstream uses for overload.
    pub rate_limit_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            connect_timeout_secs: 10,
            max_attempts: 2,
            retry_delay_ms: 1_000,
            rate_limit_delay_ms: 6_000,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

/// Where the reference taxonomy comes from for an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSourceMode {
    /// Use the full static taxonomy and its zone listings.
    All,
    /// Treat the taxonomy as empty; every scraped entry is synthesized.
    #[default]
    None,
}

/// One configured provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub provider: String,
    pub instance: String,
    pub enabled: bool,
    pub reference_source: ReferenceSourceMode,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            provider: "DaddyLive".to_owned(),
            instance: "default".to_owned(),
            enabled: true,
            reference_source: ReferenceSourceMode::None,
        }
    }
}

impl InstanceConfig {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.provider, &self.instance)
    }
}
