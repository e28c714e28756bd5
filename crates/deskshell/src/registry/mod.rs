/*!
Window resource registry.

One entry per open window, independent of the process ledger: a window may host
code that never asks for a process context. Each entry tracks the listeners,
timers, bus subscriptions and external connections bound to the window's
visual lifetime, plus its root surface and recency.

Entries are removed exactly once, either by `force_cleanup` or by the
graceful-then-forced `cleanup` race. Handles issued for a removed entry go
stale: their acquisitions fail and their releases are no-ops, even if a new
entry is later registered under the same id.

## Module Structure

- `mod.rs` - registry, lookups, LRU ranking
- `entry.rs` - per-window bookkeeping and the `WindowResources` handle
- `cleanup.rs` - forced teardown and the timeout race
*/

mod cleanup;
mod entry;

pub use cleanup::CleanupOutcome;
pub use entry::{ShutdownHook, WindowResources};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bus::EventBus;
use crate::config::RegistryConfig;
use crate::host::Host;
use crate::resources::{ResourceCounts, ResourceSet};
use crate::types::{AppId, SurfaceId};
use entry::RegistryEntry;

struct RegistryInner {
  host: Arc<dyn Host>,
  bus: EventBus,
  config: RegistryConfig,
  entries: Mutex<HashMap<AppId, RegistryEntry>>,
  /// Entry generations; also the insertion order used to break LRU ties.
  next_seq: AtomicU64,
  next_connection: AtomicU64,
}

/// Per-window resource registry. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct WindowRegistry {
  inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for WindowRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WindowRegistry")
      .field("entries", &self.inner.entries.lock().len())
      .finish_non_exhaustive()
  }
}

impl WindowRegistry {
  /// Create an empty registry.
  pub fn new(host: Arc<dyn Host>, bus: EventBus, config: RegistryConfig) -> Self {
    Self {
      inner: Arc::new(RegistryInner {
        host,
        bus,
        config,
        entries: Mutex::new(HashMap::new()),
        next_seq: AtomicU64::new(1),
        next_connection: AtomicU64::new(1),
      }),
    }
  }

  /// Create the entry for a window and return its resource handle.
  ///
  /// An entry still registered under `id` (for example one kept by a
  /// `LogOnly` timeout fallback) is torn down first.
  pub fn register(&self, id: impl Into<AppId>, surface: Option<SurfaceId>) -> WindowResources {
    let id = id.into();
    if self.contains(&id) {
      log::warn!("Window {id} registered twice; releasing the stale entry");
      self.force_cleanup(&id);
    }

    let now = self.inner.host.now();
    let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
    self.inner.entries.lock().insert(
      id.clone(),
      RegistryEntry {
        seq,
        resources: ResourceSet::default(),
        surface,
        created_at: now,
        last_active: now,
        shutdown: None,
      },
    );
    log::debug!("Window {id} registered");
    WindowResources::new(id, seq, self.clone())
  }

  /// Handle for the live entry of `id`, if any.
  pub fn resources(&self, id: &AppId) -> Option<WindowResources> {
    let seq = self.inner.entries.lock().get(id).map(|entry| entry.seq)?;
    Some(WindowResources::new(id.clone(), seq, self.clone()))
  }

  /// True if `id` has a live entry.
  pub fn contains(&self, id: &AppId) -> bool {
    self.inner.entries.lock().contains_key(id)
  }

  /// Number of tracked windows.
  pub fn len(&self) -> usize {
    self.inner.entries.lock().len()
  }

  /// True when no window is tracked.
  pub fn is_empty(&self) -> bool {
    self.inner.entries.lock().is_empty()
  }

  /// Ids of all live entries, sorted.
  pub fn ids(&self) -> Vec<AppId> {
    let mut ids: Vec<AppId> = self.inner.entries.lock().keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Mark `id` as active now. Returns false if it is not registered.
  pub fn touch(&self, id: &AppId) -> bool {
    let now = self.inner.host.now();
    match self.inner.entries.lock().get_mut(id) {
      Some(entry) => {
        entry.last_active = now;
        true
      }
      None => false,
    }
  }

  /// Host time of the last activity on `id`.
  pub fn last_active(&self, id: &AppId) -> Option<Duration> {
    self.inner.entries.lock().get(id).map(|entry| entry.last_active)
  }

  /// Host time `id` was registered.
  pub fn created_at(&self, id: &AppId) -> Option<Duration> {
    self.inner.entries.lock().get(id).map(|entry| entry.created_at)
  }

  /// Live resource counts. All zero when `id` is not registered.
  pub fn resource_count(&self, id: &AppId) -> ResourceCounts {
    self
      .inner
      .entries
      .lock()
      .get(id)
      .map(|entry| entry.resources.counts())
      .unwrap_or_default()
  }

  /// Up to `n` ids ordered by last activity, oldest first. Ties keep
  /// registration order.
  pub fn get_least_recently_used(&self, n: usize) -> Vec<AppId> {
    let mut ranked: Vec<(Duration, u64, AppId)> = self
      .inner
      .entries
      .lock()
      .iter()
      .map(|(id, entry)| (entry.last_active, entry.seq, id.clone()))
      .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked.into_iter().take(n).map(|(_, _, id)| id).collect()
  }

  fn next_connection_id(&self) -> u64 {
    self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
  }
}
