//! Client-side cache for collections and their source connections.
//!
//! [`cache::CollectionsCache`] memoizes both resource lists, keeps at most one
//! request per key in flight and refreshes the collections list when an
//! [`event::EventBus`] reports that collections changed.

pub mod api;
pub mod cache;
pub mod config;
pub mod event;
pub mod logging;
