pub mod api_types;
pub mod client;
pub mod types;

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;

use types::{Collection, SourceConnection};

/// Backend operations the cache depends on.
///
/// Implemented by [`client::ApiClient`] for the real backend and by test fakes.
pub trait CollectionsApi: Send + Sync + 'static {
  /// List all collections visible to the caller, in backend order.
  fn list_collections(&self) -> impl Future<Output = Result<Vec<Collection>>> + Send;

  /// List the source connections that belong to one collection.
  fn list_source_connections(
    &self,
    collection_id: &str,
  ) -> impl Future<Output = Result<Vec<SourceConnection>>> + Send;
}

impl<T: CollectionsApi> CollectionsApi for Arc<T> {
  fn list_collections(&self) -> impl Future<Output = Result<Vec<Collection>>> + Send {
    (**self).list_collections()
  }

  fn list_source_connections(
    &self,
    collection_id: &str,
  ) -> impl Future<Output = Result<Vec<SourceConnection>>> + Send {
    (**self).list_source_connections(collection_id)
  }
}
