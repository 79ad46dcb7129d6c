//! Registry of pending fetches, one per cache key.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::hash::Hash;

/// Result handle that any number of callers can await.
pub type SharedResult<V> = Shared<BoxFuture<'static, V>>;

struct Pending<V: Clone> {
  id: u64,
  result: SharedResult<V>,
}

/// Tracks the request currently in flight for each key.
///
/// Every request gets a fresh id. Only the request whose id is registered
/// for a key counts as current; an entry replaced by a newer request stays
/// pending until the newer one settles.
pub struct InFlight<K, V: Clone> {
  pending: HashMap<K, Pending<V>>,
  next_id: u64,
}

impl<K: Eq + Hash, V: Clone> InFlight<K, V> {
  pub fn new() -> Self {
    Self {
      pending: HashMap::new(),
      next_id: 0,
    }
  }

  /// Reserve an id for a request that is about to start.
  pub fn next_id(&mut self) -> u64 {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Handle to the request in flight for `key`, if any.
  pub fn get(&self, key: &K) -> Option<SharedResult<V>> {
    self.pending.get(key).map(|p| p.result.clone())
  }

  pub fn is_pending(&self, key: &K) -> bool {
    self.pending.contains_key(key)
  }

  /// Register `future` as the current request for `key`, replacing any older one.
  pub fn insert(&mut self, key: K, id: u64, future: BoxFuture<'static, V>) -> SharedResult<V> {
    let result = future.shared();
    self.pending.insert(
      key,
      Pending {
        id,
        result: result.clone(),
      },
    );
    result
  }

  /// Mark request `id` for `key` as settled.
  ///
  /// Returns true if it was the current request, in which case the key is no
  /// longer pending.
  pub fn settle(&mut self, key: &K, id: u64) -> bool {
    match self.pending.get(key) {
      Some(p) if p.id == id => {
        self.pending.remove(key);
        true
      }
      _ => false,
    }
  }

  pub fn pending_keys(&self) -> impl Iterator<Item = &K> {
    self.pending.keys()
  }

  /// Forget all pending requests. Ids keep increasing so that requests
  /// started before the clear can never match a later registration.
  pub fn clear(&mut self) {
    self.pending.clear();
  }
}

impl<K: Eq + Hash, V: Clone> Default for InFlight<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::future;

  #[test]
  fn test_settle_current_request() {
    let mut flights: InFlight<&str, u32> = InFlight::new();
    let id = flights.next_id();
    let _ = flights.insert("a", id, future::ready(1).boxed());

    assert!(flights.is_pending(&"a"));
    assert!(flights.settle(&"a", id));
    assert!(!flights.is_pending(&"a"));
    assert!(!flights.settle(&"a", id));
  }

  #[test]
  fn test_superseded_request_does_not_clear_newer() {
    let mut flights: InFlight<&str, u32> = InFlight::new();
    let old = flights.next_id();
    let _ = flights.insert("a", old, future::ready(1).boxed());
    let new = flights.next_id();
    let _ = flights.insert("a", new, future::ready(2).boxed());

    assert!(!flights.settle(&"a", old));
    assert!(flights.is_pending(&"a"));
    assert!(flights.settle(&"a", new));
  }

  #[test]
  fn test_ids_survive_clear() {
    let mut flights: InFlight<&str, u32> = InFlight::new();
    let before = flights.next_id();
    let _ = flights.insert("a", before, future::ready(1).boxed());
    flights.clear();

    let after = flights.next_id();
    assert_ne!(before, after);
    let _ = flights.insert("a", after, future::ready(2).boxed());
    assert!(!flights.settle(&"a", before));
    assert!(flights.is_pending(&"a"));
  }

  #[tokio::test]
  async fn test_joined_callers_share_result() {
    let mut flights: InFlight<(), String> = InFlight::new();
    let id = flights.next_id();
    let first = flights.insert((), id, async { "done".to_string() }.boxed());
    let second = flights.get(&()).unwrap();

    let (a, b) = futures::join!(first, second);
    assert_eq!(a, "done");
    assert_eq!(b, "done");
  }
}
