//! In-memory cache for collections and their source connections.
//!
//! This module provides:
//! - Lazy, memoized fetching of the collections list and of source connections per collection
//! - At most one request in flight per key, shared by every caller that asks for it
//! - Loading/error state as a snapshot that can be watched for changes
//! - Invalidation of the collections list from lifecycle events

mod inflight;
mod snapshot;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use snapshot::CacheSnapshot;
pub use store::{CollectionsCache, COLLECTIONS_RESOURCE};
