//! Live channel catalog ingestion.
//!
//! The crate scrapes a provider's channel listing, reconciles it against the
//! persisted catalog and resolves each channel's playable HLS variant:
//!
//! - [`fetch`]: single HTTP retrieval with bounded retries and failure classification
//! - [`extract`]: pattern extraction over raw page bytes and listing parsing
//! - [`resolver`]: reference page → embed → manifest → best variant
//! - [`catalog`]: data model, stores, taxonomy sources and the reconciler
//! - [`pipeline`]: the externally consumed catalog build and on-demand resolution

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod resolver;

pub use catalog::{
    ChangeSet, ChannelRecord, ChannelStore, Namespace, PersistedChannel, ReferenceEntry,
    ScrapedEntry, ZoneChannel,
};
pub use config::{CatalogConfig, InstanceConfig, ReferenceSourceMode};
pub use error::{CatalogError, Result};
pub use fetch::{FailureKind, FetchOutcome, Fetcher};
pub use pipeline::CatalogPipeline;
pub use resolver::{StreamSelection, VariantPlaylistResolver, VariantStream};
