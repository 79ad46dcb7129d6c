use colcache::api::client::ApiClient;
use colcache::api::types::{Collection, SourceConnection};
use colcache::cache::{CacheSnapshot, CollectionsCache, COLLECTIONS_RESOURCE};
use colcache::config::Config;
use colcache::event::{EventBus, LifecycleEvent, LifecycleKind};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// What the user asked for on the command line
#[derive(Debug, Clone)]
pub enum Action {
  Collections { refresh: bool, json: bool },
  Connections { collection_id: String, refresh: bool, json: bool },
  Watch { interval: Duration },
}

/// Main application state
pub struct App {
  cache: CollectionsCache<ApiClient>,
  bus: EventBus,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let api = ApiClient::new(config)?;

    let mut cache = CollectionsCache::new(api);
    if let Some(secs) = config.cache.stale_after_secs {
      let stale_time = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| eyre!("cache.stale_after_secs is out of range: {}", secs))?;
      cache = cache.with_stale_time(stale_time);
    }

    Ok(Self {
      cache,
      bus: EventBus::new(),
    })
  }

  pub async fn run(&self, action: Action) -> Result<()> {
    match action {
      Action::Collections { refresh, json } => {
        let collections = self.cache.fetch_collections(refresh).await;
        self.fail_on_error()?;
        print_collections(&collections, json)
      }
      Action::Connections {
        collection_id,
        refresh,
        json,
      } => {
        let connections = self
          .cache
          .fetch_source_connections(&collection_id, refresh)
          .await;
        self.fail_on_error()?;
        print_connections(&connections, json)
      }
      Action::Watch { interval } => self.watch(interval).await,
    }
  }

  /// Keep the collections list fresh by emitting an `updated` event every
  /// `interval`, printing the collections whenever the cache changes.
  async fn watch(&self, interval: Duration) -> Result<()> {
    let subscription = self.cache.subscribe_to_events(&self.bus);
    let mut snapshots = self.cache.watch();
    let mut ticker = tokio::time::interval(interval);
    let mut ticks: u64 = 0;
    let mut last_printed: Option<CacheSnapshot> = None;

    info!(interval_secs = interval.as_secs_f64(), "watching collections");
    self.cache.fetch_collections(false).await;
    // The first tick is immediate and the list was just fetched
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          ticks += 1;
          let event = LifecycleEvent::new(COLLECTIONS_RESOURCE, LifecycleKind::Updated)
            .with_payload(serde_json::json!({ "tick": ticks }));
          self.bus.publish(&event);
        }
        changed = snapshots.changed() => {
          if changed.is_err() {
            break;
          }
          let snapshot = snapshots.borrow_and_update().clone();
          // Skip the loading transitions, only show settled state
          if snapshot.is_loading || last_printed.as_ref() == Some(&snapshot) {
            continue;
          }
          print_snapshot(&snapshot);
          last_printed = Some(snapshot);
        }
        _ = &mut ctrl_c => {
          info!("interrupted");
          break;
        }
      }
    }

    subscription.unsubscribe();
    self.cache.clear();
    Ok(())
  }

  fn fail_on_error(&self) -> Result<()> {
    match self.cache.error() {
      Some(message) => Err(eyre!(message)),
      None => Ok(()),
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let text =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", text);
  Ok(())
}

fn print_collections(collections: &[Collection], json: bool) -> Result<()> {
  if json {
    return print_json(&collections);
  }
  if collections.is_empty() {
    println!("No collections");
    return Ok(());
  }
  for c in collections {
    println!("{:<38} {:<24} {:<32} {}", c.id, c.readable_id, c.name, c.status);
  }
  Ok(())
}

fn print_connections(connections: &[SourceConnection], json: bool) -> Result<()> {
  if json {
    return print_json(&connections);
  }
  if connections.is_empty() {
    println!("No source connections");
    return Ok(());
  }
  for sc in connections {
    println!(
      "{:<38} {:<16} {:<32} {}",
      sc.id,
      sc.short_name,
      sc.name,
      sc.status.as_deref().unwrap_or("-")
    );
  }
  Ok(())
}

fn print_snapshot(snapshot: &CacheSnapshot) {
  let now = chrono::Local::now().format("%H:%M:%S");
  match &snapshot.error {
    Some(error) => println!("[{}] {}", now, error),
    None => println!("[{}] {} collections", now, snapshot.collections.len()),
  }
  for c in &snapshot.collections {
    println!("  {:<24} {:<32} {}", c.readable_id, c.name, c.status);
  }
}
