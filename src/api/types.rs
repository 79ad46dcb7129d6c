use serde::Serialize;

/// A named grouping of synced data on the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
  pub id: String,
  pub name: String,
  pub readable_id: String,
  pub status: String,
}

/// Connection from an external data source into a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceConnection {
  pub id: String,
  pub name: String,
  pub short_name: String,
  /// Identifier of the owning collection
  pub collection: String,
  pub status: Option<String>,
}
