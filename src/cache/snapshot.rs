use std::collections::HashMap;

use crate::api::types::{Collection, SourceConnection};

/// Point-in-time view of the cache for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
  pub collections: Vec<Collection>,
  /// A collections fetch is in flight
  pub is_loading: bool,
  /// Message of the most recent failed fetch, cleared when a new fetch starts
  pub error: Option<String>,
  /// Fetched source connections by collection id
  pub source_connections: HashMap<String, Vec<SourceConnection>>,
  /// Collection ids with a source connections fetch in flight
  pub source_connections_loading: HashMap<String, bool>,
}

impl CacheSnapshot {
  /// Source connections of one collection, empty if never fetched.
  pub fn connections_for(&self, collection_id: &str) -> &[SourceConnection] {
    self
      .source_connections
      .get(collection_id)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn is_loading_connections(&self, collection_id: &str) -> bool {
    self
      .source_connections_loading
      .get(collection_id)
      .copied()
      .unwrap_or(false)
  }
}
