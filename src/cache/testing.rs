//! Scripted backend for cache tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::api::types::{Collection, SourceConnection};
use crate::api::CollectionsApi;

pub fn collection(id: &str, name: &str) -> Collection {
  Collection {
    id: id.to_string(),
    name: name.to_string(),
    readable_id: format!("{}-readable", id),
    status: "active".to_string(),
  }
}

pub fn connection(id: &str, collection_id: &str) -> SourceConnection {
  SourceConnection {
    id: id.to_string(),
    name: format!("Connection {}", id),
    short_name: "slack".to_string(),
    collection: collection_id.to_string(),
    status: None,
  }
}

/// Fake API that answers from scripted responses and counts calls.
///
/// Responses are captured when a call starts, so changing the script while a
/// call is held does not affect that call. After [`FakeApi::hold`], calls wait
/// until [`FakeApi::release`] hands out a permit.
pub struct FakeApi {
  collections: Mutex<Result<Vec<Collection>, String>>,
  connections: Mutex<HashMap<String, Result<Vec<SourceConnection>, String>>>,
  collection_calls: AtomicUsize,
  connection_calls: Mutex<HashMap<String, usize>>,
  held: AtomicBool,
  gate: Semaphore,
  panics: AtomicBool,
}

impl FakeApi {
  pub fn new() -> Self {
    Self {
      collections: Mutex::new(Ok(Vec::new())),
      connections: Mutex::new(HashMap::new()),
      collection_calls: AtomicUsize::new(0),
      connection_calls: Mutex::new(HashMap::new()),
      held: AtomicBool::new(false),
      gate: Semaphore::new(0),
      panics: AtomicBool::new(false),
    }
  }

  pub fn set_collections(&self, collections: Vec<Collection>) {
    *self.collections.lock().unwrap() = Ok(collections);
  }

  pub fn fail_collections(&self, message: &str) {
    *self.collections.lock().unwrap() = Err(message.to_string());
  }

  pub fn set_connections(&self, collection_id: &str, connections: Vec<SourceConnection>) {
    self
      .connections
      .lock()
      .unwrap()
      .insert(collection_id.to_string(), Ok(connections));
  }

  pub fn fail_connections(&self, collection_id: &str, message: &str) {
    self
      .connections
      .lock()
      .unwrap()
      .insert(collection_id.to_string(), Err(message.to_string()));
  }

  /// Make every following call panic instead of answering.
  pub fn panic_on_call(&self) {
    self.panics.store(true, Ordering::SeqCst);
  }

  pub fn hold(&self) {
    self.held.store(true, Ordering::SeqCst);
  }

  pub fn release(&self, calls: usize) {
    self.gate.add_permits(calls);
  }

  pub fn collection_calls(&self) -> usize {
    self.collection_calls.load(Ordering::SeqCst)
  }

  pub fn connection_calls(&self, collection_id: &str) -> usize {
    self
      .connection_calls
      .lock()
      .unwrap()
      .get(collection_id)
      .copied()
      .unwrap_or(0)
  }

  async fn pass_gate(&self) {
    if self.held.load(Ordering::SeqCst) {
      self.gate.acquire().await.unwrap().forget();
    }
    if self.panics.load(Ordering::SeqCst) {
      panic!("fake backend crashed");
    }
  }
}

impl CollectionsApi for FakeApi {
  async fn list_collections(&self) -> Result<Vec<Collection>> {
    self.collection_calls.fetch_add(1, Ordering::SeqCst);
    let response = self.collections.lock().unwrap().clone();
    self.pass_gate().await;
    response.map_err(|e| eyre!(e))
  }

  async fn list_source_connections(&self, collection_id: &str) -> Result<Vec<SourceConnection>> {
    *self
      .connection_calls
      .lock()
      .unwrap()
      .entry(collection_id.to_string())
      .or_insert(0) += 1;
    let response = self
      .connections
      .lock()
      .unwrap()
      .get(collection_id)
      .cloned()
      .unwrap_or_else(|| Ok(Vec::new()));
    self.pass_gate().await;
    response.map_err(|e| eyre!(e))
  }
}

/// Wait until `condition` holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
  tokio::time::timeout(Duration::from_secs(2), async {
    while !condition() {
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
  })
  .await
  .expect("condition not reached in time");
}
