//! Serde-deserializable types matching the backend API responses.
//!
//! These types are separate from domain types so that the wire format can
//! carry fields the cache does not care about.

use serde::Deserialize;

use super::types::{Collection, SourceConnection};

// ============================================================================
// Collections endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCollection {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub readable_id: String,
  #[serde(default)]
  pub status: String,
}

// ============================================================================
// Source connections endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSourceConnection {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub short_name: String,
  #[serde(default)]
  pub collection: String,
  pub status: Option<String>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiCollection> for Collection {
  fn from(c: ApiCollection) -> Self {
    Collection {
      id: c.id,
      name: c.name,
      readable_id: c.readable_id,
      status: c.status,
    }
  }
}

impl From<ApiSourceConnection> for SourceConnection {
  fn from(sc: ApiSourceConnection) -> Self {
    SourceConnection {
      id: sc.id,
      name: sc.name,
      short_name: sc.short_name,
      collection: sc.collection,
      // Some deployments send an empty string instead of null
      status: sc.status.filter(|s| !s.is_empty()),
    }
  }
}
