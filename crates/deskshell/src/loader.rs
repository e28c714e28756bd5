/*!
Lazy app loading.

Apps registered only by module path have no metadata until first open. The
[`Loader`] imports the module through a [`ModuleSource`], registers the static
metadata it exports and hands back a [`ModuleDescriptor`]. When the module
declares a different id than the one requested, the descriptor says so via
[`ModuleDescriptor::redirect`] and the caller opens that id instead.
*/

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::isolate::guarded;
use crate::ledger::ProcessContext;
use crate::store::AppStore;
use crate::types::{AppId, AppMetadata, BoxFuture, LoadError};

/// Optional setup hook exported by an app module.
pub type InitFn = Arc<dyn Fn(&ProcessContext) -> Result<(), String> + Send + Sync>;

/// What an imported module exports.
#[derive(Clone, Default)]
pub struct AppModule {
  pub metadata: Option<AppMetadata>,
  pub init: Option<InitFn>,
}

impl std::fmt::Debug for AppModule {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppModule")
      .field("metadata", &self.metadata)
      .field("init", &self.init.is_some())
      .finish()
  }
}

impl AppModule {
  /// A module exporting `metadata` and no init hook.
  pub fn new(metadata: AppMetadata) -> Self {
    Self {
      metadata: Some(metadata),
      init: None,
    }
  }

  /// Attach an init hook, run once with the app's process context.
  #[must_use]
  pub fn with_init(
    mut self,
    init: impl Fn(&ProcessContext) -> Result<(), String> + Send + Sync + 'static,
  ) -> Self {
    self.init = Some(Arc::new(init));
    self
  }
}

/// Where modules come from.
pub trait ModuleSource: Send + Sync + 'static {
  fn import(&self, path: &str) -> BoxFuture<'_, Result<AppModule, LoadError>>;
}

/// Builds a module on import.
pub type ModuleFactory = Arc<dyn Fn() -> Result<AppModule, String> + Send + Sync>;

/// In-process module source: a map from path to factory.
#[derive(Default)]
pub struct ModuleCatalog {
  modules: Mutex<HashMap<String, ModuleFactory>>,
  imports: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for ModuleCatalog {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut paths: Vec<String> = self.modules.lock().keys().cloned().collect();
    paths.sort();
    f.debug_struct("ModuleCatalog").field("paths", &paths).finish()
  }
}

impl ModuleCatalog {
  /// An empty catalog.
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `factory` to build the module at `path` on every import.
  pub fn register(
    &self,
    path: impl Into<String>,
    factory: impl Fn() -> Result<AppModule, String> + Send + Sync + 'static,
  ) {
    self.modules.lock().insert(path.into(), Arc::new(factory));
  }

  /// Register a module that exports `module` as-is.
  pub fn register_module(&self, path: impl Into<String>, module: AppModule) {
    self.register(path, move || Ok(module.clone()));
  }

  /// How many times `path` was imported.
  pub fn import_count(&self, path: &str) -> usize {
    self.imports.lock().get(path).copied().unwrap_or(0)
  }
}

impl ModuleSource for ModuleCatalog {
  fn import(&self, path: &str) -> BoxFuture<'_, Result<AppModule, LoadError>> {
    let path = path.to_string();
    Box::pin(async move {
      *self.imports.lock().entry(path.clone()).or_default() += 1;
      let factory = self.modules.lock().get(&path).cloned();
      let Some(factory) = factory else {
        return Err(LoadError::Import {
          path,
          reason: "module not found".to_string(),
        });
      };
      match guarded(&format!("module factory '{path}'"), || factory()) {
        Some(Ok(module)) => Ok(module),
        Some(Err(reason)) => Err(LoadError::Import { path, reason }),
        None => Err(LoadError::Import {
          path,
          reason: "module factory panicked".to_string(),
        }),
      }
    })
  }
}

/// A resolved lazy app.
#[derive(Clone)]
pub struct ModuleDescriptor {
  pub requested: AppId,
  pub path: String,
  pub metadata: AppMetadata,
  pub init: Option<InitFn>,
}

impl std::fmt::Debug for ModuleDescriptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModuleDescriptor")
      .field("requested", &self.requested)
      .field("path", &self.path)
      .field("metadata", &self.metadata)
      .field("init", &self.init.is_some())
      .finish()
  }
}

impl ModuleDescriptor {
  /// The id to open instead, when the module declares a different one.
  pub fn redirect(&self) -> Option<&AppId> {
    (self.metadata.id != self.requested).then_some(&self.metadata.id)
  }

  /// Id the app should be opened under.
  pub const fn id(&self) -> &AppId {
    &self.metadata.id
  }

  /// Run the module's init hook. Failures are logged and otherwise ignored.
  pub fn run_init(&self, ctx: &ProcessContext) -> bool {
    let Some(init) = &self.init else {
      return true;
    };
    match guarded(&format!("init of {}", self.metadata.id), || init(ctx)) {
      Some(Ok(())) => true,
      Some(Err(reason)) => {
        log::error!("Init of {} failed: {reason}", self.metadata.id);
        false
      }
      None => false,
    }
  }
}

/// Resolves lazily registered apps.
#[derive(Clone)]
pub struct Loader {
  store: Arc<dyn AppStore>,
  source: Arc<dyn ModuleSource>,
  /// Requested id -> id the module declared.
  redirects: Arc<Mutex<HashMap<AppId, AppId>>>,
}

impl std::fmt::Debug for Loader {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Loader")
      .field("redirects", &self.redirects.lock().len())
      .finish_non_exhaustive()
  }
}

impl Loader {
  /// Create a loader that reads lazy paths from `store` and imports from `source`.
  pub fn new(store: Arc<dyn AppStore>, source: Arc<dyn ModuleSource>) -> Self {
    Self {
      store,
      source,
      redirects: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// The id a previous load of `id` redirected to, or `id` itself.
  pub fn alias(&self, id: &AppId) -> AppId {
    self
      .redirects
      .lock()
      .get(id)
      .cloned()
      .unwrap_or_else(|| id.clone())
  }

  /// Import the module registered for `id` and register its metadata.
  pub async fn resolve(&self, id: &AppId) -> Result<ModuleDescriptor, LoadError> {
    let path = self
      .store
      .get_lazy_app_path(id)
      .ok_or_else(|| LoadError::NoModulePath(id.clone()))?;

    log::debug!("Loading {id} from '{path}'");
    let module = self.source.import(&path).await?;
    let metadata = module
      .metadata
      .ok_or_else(|| LoadError::MissingMetadata { path: path.clone() })?;

    self.store.set_app_metadata(&metadata.id, metadata.clone());
    if metadata.id != *id {
      log::debug!("Module '{path}' redirects {id} to {}", metadata.id);
      self.redirects.lock().insert(id.clone(), metadata.id.clone());
    }

    Ok(ModuleDescriptor {
      requested: id.clone(),
      path,
      metadata,
      init: module.init,
    })
  }
}
