/*!
Store collaborator.

The shell persists open state, stacking order and positions through
[`AppStore`]. Calls are fire-and-forget from the shell's point of view; the
storage medium is up to the implementation. [`MemoryStore`] keeps everything
in process.
*/

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::types::{AppId, AppMetadata, AppPatch, AppRecord};

/// Persistence interface the compositor writes through.
pub trait AppStore: Send + Sync + 'static {
  fn get_app(&self, id: &AppId) -> Option<AppRecord>;

  /// Merge `patch` into the record for `id`, creating it if needed.
  fn update_app(&self, id: &AppId, patch: AppPatch);

  /// Register static metadata exported by an app module.
  fn set_app_metadata(&self, id: &AppId, metadata: AppMetadata);

  /// Module path of an app registered for lazy loading.
  fn get_lazy_app_path(&self, id: &AppId) -> Option<String>;
}

#[derive(Default)]
struct StoreState {
  apps: HashMap<AppId, AppRecord>,
  lazy: HashMap<AppId, String>,
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<StoreState>,
}

impl std::fmt::Debug for MemoryStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("MemoryStore")
      .field("apps", &state.apps.len())
      .field("lazy", &state.lazy.len())
      .finish()
  }
}

impl MemoryStore {
  /// An empty store.
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an app whose metadata is known up front.
  pub fn register_app(&self, metadata: AppMetadata) {
    let id = metadata.id.clone();
    self.set_app_metadata(&id, metadata);
  }

  /// Register an app that is only loaded on first open.
  pub fn register_lazy(&self, id: impl Into<AppId>, path: impl Into<String>) {
    self.state.lock().lazy.insert(id.into(), path.into());
  }

  /// Every stored record, sorted by id.
  pub fn records(&self) -> Vec<AppRecord> {
    let mut records: Vec<AppRecord> = self.state.lock().apps.values().cloned().collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
  }
}

impl AppStore for MemoryStore {
  fn get_app(&self, id: &AppId) -> Option<AppRecord> {
    self.state.lock().apps.get(id).cloned()
  }

  fn update_app(&self, id: &AppId, patch: AppPatch) {
    self
      .state
      .lock()
      .apps
      .entry(id.clone())
      .or_insert_with(|| AppRecord::new(id.clone()))
      .apply(&patch);
  }

  fn set_app_metadata(&self, id: &AppId, metadata: AppMetadata) {
    self
      .state
      .lock()
      .apps
      .entry(id.clone())
      .or_insert_with(|| AppRecord::new(id.clone()))
      .metadata = Some(metadata);
  }

  fn get_lazy_app_path(&self, id: &AppId) -> Option<String> {
    self.state.lock().lazy.get(id).cloned()
  }
}
