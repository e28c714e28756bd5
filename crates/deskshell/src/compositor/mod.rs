/*!
Window compositor.

Owns window existence, stacking order, focus, drag interaction and lazy
instantiation. All window state lives in one private map; every mutation goes
through a method that keeps the host surface, the store and the bus in step.

Bus events are emitted after the state lock is released, so handlers may call
back into the compositor.

## Window lifecycle

`unmounted -> open -> minimized -> open -> unmounted`. System windows go from
`unmounted` back to `open` on their own after `CompositorConfig::restart_delay`.
Service apps have no surface: opening one only flips its open flag.

## Module Structure

- `mod.rs` - compositor, state, read-only views
- `lifecycle.rs` - open/close/minimize/restore/toggle/rename
- `focus.rs` - stacking order and the active window
- `position.rs` - initial placement rules
- `drag.rs` - pointer state machine shared by windows and desktop icons
*/

mod drag;
mod focus;
mod lifecycle;
mod position;

pub use drag::{DragOutcome, DragTarget, DragTargetKind};
pub use lifecycle::Toggled;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use ts_rs::TS;

use crate::bus::EventBus;
use crate::config::CompositorConfig;
use crate::host::Host;
use crate::ledger::ProcessLedger;
use crate::loader::Loader;
use crate::registry::WindowRegistry;
use crate::store::AppStore;
use crate::types::{AppId, Position, WindowRecord};
use drag::DragMachine;

/// Serializable view of the compositor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompositorSnapshot {
  /// Open windows and services, back to front.
  pub windows: Vec<WindowRecord>,
  pub active: Option<AppId>,
  /// Last stacking order handed out.
  pub z_counter: u32,
}

#[derive(Default)]
struct CompositorState {
  windows: HashMap<AppId, WindowRecord>,
  /// Live icon positions; persisted through the store when a drag ends.
  icons: HashMap<AppId, Position>,
  z_counter: u32,
  active: Option<AppId>,
  drag: DragMachine,
}

struct CompositorInner {
  host: Arc<dyn Host>,
  bus: EventBus,
  store: Arc<dyn AppStore>,
  ledger: ProcessLedger,
  registry: WindowRegistry,
  loader: Loader,
  config: CompositorConfig,
  state: Mutex<CompositorState>,
}

/// The window manager. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct Compositor {
  inner: Arc<CompositorInner>,
}

impl std::fmt::Debug for Compositor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("Compositor")
      .field("windows", &state.windows.len())
      .field("active", &state.active)
      .finish_non_exhaustive()
  }
}

impl Compositor {
  /// Wire a compositor to the services it drives.
  pub fn new(
    host: Arc<dyn Host>,
    bus: EventBus,
    store: Arc<dyn AppStore>,
    ledger: ProcessLedger,
    registry: WindowRegistry,
    loader: Loader,
    config: CompositorConfig,
  ) -> Self {
    Self {
      inner: Arc::new(CompositorInner {
        host,
        bus,
        store,
        ledger,
        registry,
        loader,
        config,
        state: Mutex::new(CompositorState::default()),
      }),
    }
  }

  /// Open windows and services, back to front.
  pub fn windows(&self) -> Vec<WindowRecord> {
    let mut windows: Vec<WindowRecord> =
      self.inner.state.lock().windows.values().cloned().collect();
    windows.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
    windows
  }

  /// Current record of `id`, if it has one.
  pub fn window(&self, id: &AppId) -> Option<WindowRecord> {
    self.inner.state.lock().windows.get(id).cloned()
  }

  /// True while `id` has an open window.
  pub fn is_open(&self, id: &AppId) -> bool {
    self
      .inner
      .state
      .lock()
      .windows
      .get(id)
      .is_some_and(|w| w.open)
  }

  /// The focused window, if any.
  pub fn active_window(&self) -> Option<AppId> {
    self.inner.state.lock().active.clone()
  }

  /// Current icon position: live drag state first, then the store.
  pub fn icon_position(&self, id: &AppId) -> Option<Position> {
    let live = self.inner.state.lock().icons.get(id).copied();
    live.or_else(|| self.inner.store.get_app(id).and_then(|r| r.icon_position))
  }

  /// Windows back to front, plus the focused id.
  pub fn snapshot(&self) -> CompositorSnapshot {
    let windows = self.windows();
    let state = self.inner.state.lock();
    CompositorSnapshot {
      windows,
      active: state.active.clone(),
      z_counter: state.z_counter,
    }
  }

  /// Ledger that owns the process of every open app.
  pub fn ledger(&self) -> &ProcessLedger {
    &self.inner.ledger
  }

  /// Registry that tracks window-scoped resources.
  pub fn registry(&self) -> &WindowRegistry {
    &self.inner.registry
  }

  fn emit<T: Serialize>(&self, topic: &str, payload: &T) {
    self.inner.bus.emit_payload(topic, payload);
  }
}

#[cfg(test)]
mod tests;
