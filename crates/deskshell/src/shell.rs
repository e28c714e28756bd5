/*!
Shell wiring - builds the services and owns them.

```ignore
let shell = Shell::builder()
    .host(host)
    .store(store)
    .module_source(catalog)
    .memory_probe(probe)
    .build();

shell.start_monitor()?;
shell.compositor().open("notes", true).await?;
```

Every service is an explicit value reachable from the `Shell`; nothing is
global. `system:close_window` requests on the bus are routed to
`Compositor::close` on the ambient tokio runtime.
*/

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use ts_rs::TS;

use crate::bus::EventBus;
use crate::compositor::Compositor;
use crate::config::ShellConfig;
use crate::host::{Host, LoopHost, MemoryProbe, UnsupportedMemoryProbe};
use crate::ledger::{ProcessLedger, ProcessStatus};
use crate::loader::{Loader, ModuleCatalog, ModuleSource};
use crate::monitor::{CloseRequest, MemoryMonitor, MonitorHandle, MonitorStatus};
use crate::registry::WindowRegistry;
use crate::resources::ResourceCounts;
use crate::store::{AppStore, MemoryStore};
use crate::types::{
  topics, AppId, AppRef, BusEvent, ShellResult, SubscriptionId, WindowRecord,
};

/// One process as reported by `Shell::snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProcessSummary {
  pub id: AppId,
  pub status: ProcessStatus,
  pub resources: ResourceCounts,
}

/// Serializable view of the whole shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShellSnapshot {
  /// Open windows and services, back to front.
  pub windows: Vec<WindowRecord>,
  pub active: Option<AppId>,
  pub processes: Vec<ProcessSummary>,
  pub monitor: MonitorStatus,
}

/// Builder for a [`Shell`]. Unset collaborators get in-process defaults:
/// a [`LoopHost`], a [`MemoryStore`], an empty [`ModuleCatalog`] and a probe
/// that reports no memory support.
#[derive(Default)]
#[must_use = "Builder does nothing until .build() is called"]
pub struct ShellBuilder {
  host: Option<Arc<dyn Host>>,
  store: Option<Arc<dyn AppStore>>,
  source: Option<Arc<dyn ModuleSource>>,
  probe: Option<Arc<dyn MemoryProbe>>,
  close: Option<CloseRequest>,
  config: ShellConfig,
}

impl std::fmt::Debug for ShellBuilder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ShellBuilder")
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

impl ShellBuilder {
  /// Host the shell runs on. Defaults to a fresh `LoopHost`.
  pub fn host(mut self, host: Arc<dyn Host>) -> Self {
    self.host = Some(host);
    self
  }

  /// Persistence for app records. Defaults to a `MemoryStore`.
  pub fn store(mut self, store: Arc<dyn AppStore>) -> Self {
    self.store = Some(store);
    self
  }

  /// Where lazily registered apps are imported from.
  pub fn module_source(mut self, source: Arc<dyn ModuleSource>) -> Self {
    self.source = Some(source);
    self
  }

  /// Memory source for the pressure monitor.
  pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
    self.probe = Some(probe);
    self
  }

  /// Callback the memory monitor uses to close evicted windows.
  ///
  /// Without one, evictions go through `system:close_window`, which the shell
  /// routes to the compositor itself.
  pub fn on_close_request(mut self, close: impl Fn(&AppId) + Send + Sync + 'static) -> Self {
    self.close = Some(Arc::new(close));
    self
  }

  /// Override the default settings.
  pub fn config(mut self, config: ShellConfig) -> Self {
    self.config = config;
    self
  }

  /// Build every service and wire them together.
  #[must_use]
  pub fn build(self) -> Shell {
    let host = self
      .host
      .unwrap_or_else(|| Arc::new(LoopHost::new()) as Arc<dyn Host>);
    let store = self
      .store
      .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn AppStore>);
    let source = self
      .source
      .unwrap_or_else(|| Arc::new(ModuleCatalog::new()) as Arc<dyn ModuleSource>);
    let probe = self
      .probe
      .unwrap_or_else(|| Arc::new(UnsupportedMemoryProbe) as Arc<dyn MemoryProbe>);

    let bus = EventBus::new();
    let ledger = ProcessLedger::new(Arc::clone(&host), bus.clone(), self.config.ledger);
    let registry = WindowRegistry::new(Arc::clone(&host), bus.clone(), self.config.registry);
    let loader = Loader::new(Arc::clone(&store), source);
    let compositor = Compositor::new(
      Arc::clone(&host),
      bus.clone(),
      Arc::clone(&store),
      ledger.clone(),
      registry.clone(),
      loader,
      self.config.compositor,
    );
    let monitor = MemoryMonitor::new(
      registry.clone(),
      bus.clone(),
      probe,
      self.close,
      self.config.monitor,
    );
    let close_route = route_close_requests(&bus, &compositor);

    Shell {
      inner: Arc::new(ShellInner {
        host,
        bus,
        store,
        ledger,
        registry,
        compositor,
        monitor,
        monitor_handle: Mutex::new(None),
        close_route,
      }),
    }
  }
}

/// `system:close_window {id}` -> `Compositor::close(id)`.
fn route_close_requests(bus: &EventBus, compositor: &Compositor) -> SubscriptionId {
  let compositor = compositor.clone();
  bus.on(topics::SYSTEM_CLOSE_WINDOW, move |data: &Value| {
    let id = match serde_json::from_value::<AppRef>(data.clone()) {
      Ok(AppRef { id }) => id,
      Err(e) => {
        log::warn!("Ignoring malformed close request {data}: {e}");
        return;
      }
    };
    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => {
        let compositor = compositor.clone();
        runtime.spawn(async move {
          if let Err(e) = compositor.close(&id).await {
            log::debug!("Close request for {id}: {e}");
          }
        });
      }
      Err(e) => log::warn!("Cannot close {id} outside a runtime: {e}"),
    }
  })
}

struct ShellInner {
  host: Arc<dyn Host>,
  bus: EventBus,
  store: Arc<dyn AppStore>,
  ledger: ProcessLedger,
  registry: WindowRegistry,
  compositor: Compositor,
  monitor: MemoryMonitor,
  monitor_handle: Mutex<Option<MonitorHandle>>,
  close_route: SubscriptionId,
}

impl Drop for ShellInner {
  fn drop(&mut self) {
    // The route holds a compositor clone, which holds the bus.
    self.bus.off(topics::SYSTEM_CLOSE_WINDOW, self.close_route);
  }
}

/// The running shell. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct Shell {
  inner: Arc<ShellInner>,
}

impl std::fmt::Debug for Shell {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Shell")
      .field("compositor", &self.inner.compositor)
      .field("monitor", &self.inner.monitor)
      .finish_non_exhaustive()
  }
}

impl Shell {
  /// Shell with every collaborator defaulted.
  #[must_use]
  pub fn new() -> Self {
    Self::builder().build()
  }

  /// Start configuring a shell.
  pub fn builder() -> ShellBuilder {
    ShellBuilder::default()
  }

  /// The host every service schedules on.
  pub fn host(&self) -> &Arc<dyn Host> {
    &self.inner.host
  }

  /// The shared event bus.
  pub fn bus(&self) -> &EventBus {
    &self.inner.bus
  }

  /// The app record store.
  pub fn store(&self) -> &Arc<dyn AppStore> {
    &self.inner.store
  }

  /// The process ledger.
  pub fn ledger(&self) -> &ProcessLedger {
    &self.inner.ledger
  }

  /// The window resource registry.
  pub fn registry(&self) -> &WindowRegistry {
    &self.inner.registry
  }

  /// The window compositor.
  pub fn compositor(&self) -> &Compositor {
    &self.inner.compositor
  }

  /// The memory pressure monitor.
  pub fn monitor(&self) -> &MemoryMonitor {
    &self.inner.monitor
  }

  /// Stream of every bus emit.
  pub fn subscribe(&self) -> async_broadcast::Receiver<BusEvent> {
    self.inner.bus.subscribe()
  }

  /// Start the memory monitor loop; the shell keeps its handle.
  ///
  /// Restarting replaces the previous loop.
  pub fn start_monitor(&self) -> ShellResult<()> {
    let handle = self.inner.monitor.start()?;
    // Swap first so the old handle drops after the new run is active.
    let previous = self.inner.monitor_handle.lock().replace(handle);
    drop(previous);
    Ok(())
  }

  /// Stop the memory monitor loop. No-op when it is not running.
  pub fn stop_monitor(&self) {
    let handle = self.inner.monitor_handle.lock().take();
    if let Some(handle) = handle {
      handle.stop();
    }
  }

  /// Windows, processes and monitor status in one value.
  pub fn snapshot(&self) -> ShellSnapshot {
    let compositor = self.inner.compositor.snapshot();
    let processes = self
      .inner
      .ledger
      .processes()
      .into_iter()
      .map(|(id, status)| ProcessSummary {
        resources: self.inner.ledger.resource_count(&id),
        id,
        status,
      })
      .collect();

    ShellSnapshot {
      windows: compositor.windows,
      active: compositor.active,
      processes,
      monitor: self.inner.monitor.get_status(),
    }
  }
}

impl Default for Shell {
  fn default() -> Self {
    Self::new()
  }
}
