//! In-process publish/subscribe bus for backend resource lifecycle events.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Kind of change that happened to a backend resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
  Created,
  Updated,
  Deleted,
}

impl LifecycleKind {
  pub const ALL: [LifecycleKind; 3] = [
    LifecycleKind::Created,
    LifecycleKind::Updated,
    LifecycleKind::Deleted,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      LifecycleKind::Created => "created",
      LifecycleKind::Updated => "updated",
      LifecycleKind::Deleted => "deleted",
    }
  }
}

impl fmt::Display for LifecycleKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A lifecycle event, e.g. `collections` / `created`
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
  /// Resource type the event is about
  pub resource: String,
  pub kind: LifecycleKind,
  /// Opaque event body, listeners may ignore it
  pub payload: Value,
}

impl LifecycleEvent {
  pub fn new(resource: impl Into<String>, kind: LifecycleKind) -> Self {
    Self {
      resource: resource.into(),
      kind,
      payload: Value::Null,
    }
  }

  pub fn with_payload(mut self, payload: Value) -> Self {
    self.payload = payload;
    self
  }
}

/// Identifies one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Listener {
  resource: String,
  kind: LifecycleKind,
  handler: Handler,
}

#[derive(Default)]
struct BusInner {
  listeners: Mutex<HashMap<ListenerId, Listener>>,
  next_id: AtomicU64,
}

/// Event bus that delivers lifecycle events to listeners registered per resource and kind.
///
/// Handlers run synchronously on the publishing thread, outside the bus lock,
/// so a handler may register or remove listeners itself.
#[derive(Clone, Default)]
pub struct EventBus {
  inner: Arc<BusInner>,
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler for one resource/kind pair.
  pub fn on<F>(&self, resource: &str, kind: LifecycleKind, handler: F) -> ListenerId
  where
    F: Fn(&LifecycleEvent) + Send + Sync + 'static,
  {
    let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
    self.lock().insert(
      id,
      Listener {
        resource: resource.to_string(),
        kind,
        handler: Arc::new(handler),
      },
    );
    trace!(resource, %kind, ?id, "listener registered");
    id
  }

  /// Remove a handler. Returns false if it was not registered.
  pub fn off(&self, id: ListenerId) -> bool {
    self.lock().remove(&id).is_some()
  }

  /// Deliver an event to every matching handler. Returns how many handlers ran.
  pub fn publish(&self, event: &LifecycleEvent) -> usize {
    let handlers: Vec<Handler> = self
      .lock()
      .values()
      .filter(|l| l.resource == event.resource && l.kind == event.kind)
      .map(|l| Arc::clone(&l.handler))
      .collect();

    trace!(resource = %event.resource, kind = %event.kind, handlers = handlers.len(), "publish");

    for handler in &handlers {
      handler(event);
    }
    handlers.len()
  }

  pub fn listener_count(&self) -> usize {
    self.lock().len()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ListenerId, Listener>> {
    // Handlers never run under the lock, so a poisoned map is still consistent
    self
      .inner
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

/// A group of listeners that are removed together.
///
/// Listeners are removed on [`Subscription::unsubscribe`] or when the handle is dropped.
#[must_use = "dropping a Subscription removes its listeners"]
pub struct Subscription {
  bus: EventBus,
  ids: Vec<ListenerId>,
}

impl Subscription {
  pub fn new(bus: EventBus, ids: Vec<ListenerId>) -> Self {
    Self { bus, ids }
  }

  pub fn unsubscribe(self) {
    drop(self);
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    for id in self.ids.drain(..) {
      self.bus.off(id);
    }
  }
}
