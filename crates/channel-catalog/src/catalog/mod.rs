//! Channel catalog: data model, persistence, taxonomy and reconciliation.

mod model;
mod reconcile;
mod reference;
mod sqlite;
mod store;

pub use model::{
    ChangeSet, ChannelHeader, ChannelRecord, HdFlip, Namespace, PersistedCatalog,
    PersistedChannel, ReferenceEntry, ScrapedEntry, ZoneChannel, channel_header, renumber,
};
pub use reconcile::{CatalogReconciler, ChannelProbe, Reconciliation};
pub use reference::{
    HttpZoneListing, ReferenceSource, StaticReferenceList, StaticZoneListing, ZoneListingSource,
    group_by_zone,
};
pub use sqlite::SqliteChannelStore;
pub use store::{ChannelStore, InMemoryChannelStore};
