//! Collections cache: memoized fetching with request de-duplication.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::inflight::{InFlight, SharedResult};
use super::snapshot::CacheSnapshot;
use crate::api::types::{Collection, SourceConnection};
use crate::api::CollectionsApi;
use crate::event::{EventBus, LifecycleKind, Subscription};

/// Resource type of collection lifecycle events
pub const COLLECTIONS_RESOURCE: &str = "collections";

#[derive(Default)]
struct CacheState {
  collections: Vec<Collection>,
  collections_fetched_at: Option<DateTime<Utc>>,
  source_connections: HashMap<String, Vec<SourceConnection>>,
  source_connections_fetched_at: HashMap<String, DateTime<Utc>>,
  error: Option<String>,
  /// Pending entries double as the loading flags
  collections_flight: InFlight<(), Vec<Collection>>,
  connections_flight: InFlight<String, Vec<SourceConnection>>,
}

impl CacheState {
  fn reset(&mut self) {
    self.collections.clear();
    self.collections_fetched_at = None;
    self.source_connections.clear();
    self.source_connections_fetched_at.clear();
    self.error = None;
    self.collections_flight.clear();
    self.connections_flight.clear();
  }

  fn snapshot(&self) -> CacheSnapshot {
    CacheSnapshot {
      collections: self.collections.clone(),
      is_loading: self.collections_flight.is_pending(&()),
      error: self.error.clone(),
      source_connections: self.source_connections.clone(),
      source_connections_loading: self
        .connections_flight
        .pending_keys()
        .map(|id| (id.clone(), true))
        .collect(),
    }
  }
}

struct Inner<A> {
  api: A,
  state: Mutex<CacheState>,
  snapshot_tx: watch::Sender<CacheSnapshot>,
}

/// In-memory cache of collections and their source connections.
///
/// Cloning is cheap and every clone shares the same state. At most one
/// request per key is in flight; callers asking for a key that is already
/// loading await that request instead of starting another one. Fetch
/// failures never reach the caller: they are recorded in [`Self::error`].
pub struct CollectionsCache<A: CollectionsApi> {
  inner: Arc<Inner<A>>,
  /// How long before cached data is considered stale. None means never.
  stale_time: Option<Duration>,
}

impl<A: CollectionsApi> CollectionsCache<A> {
  pub fn new(api: A) -> Self {
    let (snapshot_tx, _) = watch::channel(CacheSnapshot::default());
    Self {
      inner: Arc::new(Inner {
        api,
        state: Mutex::new(CacheState::default()),
        snapshot_tx,
      }),
      stale_time: None,
    }
  }

  /// Treat cached entries older than `stale_time` as missing.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  fn is_stale(&self, fetched_at: Option<DateTime<Utc>>) -> bool {
    match (self.stale_time, fetched_at) {
      (Some(stale_time), Some(fetched_at)) => Utc::now() - fetched_at >= stale_time,
      _ => false,
    }
  }

  /// Get the collections list.
  ///
  /// A non-empty cached list is returned without network access unless
  /// `force_refresh` is set. On failure the previously cached list is returned
  /// unchanged.
  pub async fn fetch_collections(&self, force_refresh: bool) -> Vec<Collection> {
    let pending = {
      let mut state = self.inner.lock_state();

      if !force_refresh
        && !state.collections.is_empty()
        && !self.is_stale(state.collections_fetched_at)
      {
        trace!("collections cache hit");
        return state.collections.clone();
      }

      match state.collections_flight.get(&()) {
        Some(pending) if !force_refresh => {
          debug!("joining in-flight collections fetch");
          pending
        }
        _ => self.inner.start_collections_fetch(&mut state),
      }
    };

    pending.await
  }

  /// Get the source connections of one collection.
  ///
  /// Any cached entry, including an empty one, is returned without network
  /// access unless `force_refresh` is set. On failure the entry becomes empty.
  pub async fn fetch_source_connections(
    &self,
    collection_id: &str,
    force_refresh: bool,
  ) -> Vec<SourceConnection> {
    let pending = {
      let mut state = self.inner.lock_state();

      if !force_refresh {
        let fetched_at = state
          .source_connections_fetched_at
          .get(collection_id)
          .copied();
        if let Some(cached) = state.source_connections.get(collection_id) {
          if !self.is_stale(fetched_at) {
            trace!(collection_id, "source connections cache hit");
            return cached.clone();
          }
        }
      }

      match state.connections_flight.get(&collection_id.to_string()) {
        Some(pending) if !force_refresh => {
          debug!(collection_id, "joining in-flight source connections fetch");
          pending
        }
        _ => self
          .inner
          .start_connections_fetch(&mut state, collection_id.to_string()),
      }
    };

    pending.await
  }

  /// Refresh the collections list whenever a collection is created, updated or deleted.
  ///
  /// Source connection entries are left alone. The listeners are removed when
  /// the returned subscription is unsubscribed or dropped.
  ///
  /// The runtime current at subscription time runs the refreshes, so events
  /// may be published from threads outside of it.
  pub fn subscribe_to_events(&self, bus: &EventBus) -> Subscription {
    let subscribed_on = Handle::try_current().ok();
    let ids = LifecycleKind::ALL
      .iter()
      .map(|&kind| {
        let cache = self.clone();
        let subscribed_on = subscribed_on.clone();
        bus.on(COLLECTIONS_RESOURCE, kind, move |event| {
          debug!(kind = %event.kind, "collections changed, refreshing");
          match subscribed_on.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => {
              let cache = cache.clone();
              runtime.spawn(async move {
                cache.fetch_collections(true).await;
              });
            }
            None => warn!(kind = %event.kind, "no async runtime, skipping collections refresh"),
          }
        })
      })
      .collect();

    Subscription::new(bus.clone(), ids)
  }

  /// Drop all cached data, loading flags and the last error.
  ///
  /// Requests still in flight settle normally but their results are discarded.
  pub fn clear(&self) {
    let mut state = self.inner.lock_state();
    state.reset();
    debug!("cache cleared");
    self.inner.publish(&state);
  }

  pub fn collections(&self) -> Vec<Collection> {
    self.inner.lock_state().collections.clone()
  }

  /// Cached source connections, None if never fetched.
  pub fn source_connections(&self, collection_id: &str) -> Option<Vec<SourceConnection>> {
    self
      .inner
      .lock_state()
      .source_connections
      .get(collection_id)
      .cloned()
  }

  pub fn is_loading(&self) -> bool {
    self.inner.lock_state().collections_flight.is_pending(&())
  }

  pub fn is_loading_source_connections(&self, collection_id: &str) -> bool {
    self
      .inner
      .lock_state()
      .connections_flight
      .is_pending(&collection_id.to_string())
  }

  pub fn error(&self) -> Option<String> {
    self.inner.lock_state().error.clone()
  }

  pub fn snapshot(&self) -> CacheSnapshot {
    self.inner.lock_state().snapshot()
  }

  /// Receiver that sees a new snapshot after every state change.
  pub fn watch(&self) -> watch::Receiver<CacheSnapshot> {
    self.inner.snapshot_tx.subscribe()
  }
}

impl<A: CollectionsApi> Clone for CollectionsCache<A> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      stale_time: self.stale_time,
    }
  }
}

impl<A: CollectionsApi> Inner<A> {
  fn lock_state(&self) -> MutexGuard<'_, CacheState> {
    // The lock is never held across an await or a call into user code
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self, state: &CacheState) {
    self.snapshot_tx.send_replace(state.snapshot());
  }

  fn start_collections_fetch(
    self: &Arc<Self>,
    state: &mut CacheState,
  ) -> SharedResult<Vec<Collection>> {
    state.error = None;
    let id = state.collections_flight.next_id();
    debug!(request = id, "fetching collections");

    let inner = Arc::clone(self);
    let task = tokio::spawn(async move { inner.load_collections(id).await });
    let inner = Arc::downgrade(self);
    let on_failure = move || {
      inner
        .upgrade()
        .map(|inner| inner.abandon_collections(id))
        .unwrap_or_default()
    };
    let pending = state
      .collections_flight
      .insert((), id, join_task(task, on_failure));

    self.publish(state);
    pending
  }

  fn start_connections_fetch(
    self: &Arc<Self>,
    state: &mut CacheState,
    collection_id: String,
  ) -> SharedResult<Vec<SourceConnection>> {
    state.error = None;
    let id = state.connections_flight.next_id();
    debug!(request = id, %collection_id, "fetching source connections");

    let inner = Arc::clone(self);
    let key = collection_id.clone();
    let task = tokio::spawn(async move { inner.load_connections(key, id).await });
    let inner = Arc::downgrade(self);
    let key = collection_id.clone();
    let on_failure = move || {
      inner
        .upgrade()
        .map(|inner| inner.abandon_connections(&key, id))
        .unwrap_or_default()
    };
    let pending = state
      .connections_flight
      .insert(collection_id, id, join_task(task, on_failure));

    self.publish(state);
    pending
  }

  async fn load_collections(self: Arc<Self>, id: u64) -> Vec<Collection> {
    let result = self.api.list_collections().await;

    let mut state = self.lock_state();
    let current = state.collections_flight.settle(&(), id);
    if !current {
      debug!(request = id, "collections fetch superseded, result not cached");
    }

    let collections = match result {
      Ok(collections) => {
        debug!(request = id, count = collections.len(), "fetched collections");
        if current {
          state.collections = collections.clone();
          state.collections_fetched_at = Some(Utc::now());
        }
        collections
      }
      Err(e) => {
        let message = format!("Failed to fetch collections: {}", e);
        warn!(request = id, "{}", message);
        if current {
          state.error = Some(message);
        }
        // Keep serving what we had
        state.collections.clone()
      }
    };

    if current {
      self.publish(&state);
    }
    collections
  }

  /// Settle a collections request whose task died, keeping the cached list.
  fn abandon_collections(&self, id: u64) -> Vec<Collection> {
    let mut state = self.lock_state();
    if state.collections_flight.settle(&(), id) {
      self.publish(&state);
    }
    state.collections.clone()
  }

  /// Settle a source connections request whose task died, keeping any cached entry.
  fn abandon_connections(&self, collection_id: &str, id: u64) -> Vec<SourceConnection> {
    let mut state = self.lock_state();
    if state
      .connections_flight
      .settle(&collection_id.to_string(), id)
    {
      self.publish(&state);
    }
    state
      .source_connections
      .get(collection_id)
      .cloned()
      .unwrap_or_default()
  }

  async fn load_connections(
    self: Arc<Self>,
    collection_id: String,
    id: u64,
  ) -> Vec<SourceConnection> {
    let result = self.api.list_source_connections(&collection_id).await;

    let mut state = self.lock_state();
    let current = state.connections_flight.settle(&collection_id, id);
    if !current {
      debug!(
        request = id,
        %collection_id,
        "source connections fetch superseded, result not cached"
      );
    }

    let connections = match result {
      Ok(connections) => {
        debug!(
          request = id,
          %collection_id,
          count = connections.len(),
          "fetched source connections"
        );
        connections
      }
      Err(e) => {
        let message = format!(
          "Failed to fetch source connections for collection {}: {}",
          collection_id, e
        );
        warn!(request = id, "{}", message);
        if current {
          state.error = Some(message);
        }
        // A failed lookup is recorded as "no connections"
        Vec::new()
      }
    };

    if current {
      state
        .source_connections
        .insert(collection_id.clone(), connections.clone());
      state
        .source_connections_fetched_at
        .insert(collection_id, Utc::now());
      self.publish(&state);
    }
    connections
  }
}

/// Await a spawned fetch. The task runs to completion even if every caller goes away.
///
/// If the task panics `on_failure` settles the request and supplies the result.
fn join_task<V, F>(task: JoinHandle<V>, on_failure: F) -> BoxFuture<'static, V>
where
  V: Send + 'static,
  F: FnOnce() -> V + Send + 'static,
{
  async move {
    match task.await {
      Ok(value) => value,
      Err(e) => {
        error!(error = %e, "cache fetch task failed");
        on_failure()
      }
    }
  }
  .boxed()
}
