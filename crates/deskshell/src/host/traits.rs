/*!
Host abstraction traits.

These traits define the contract between the shell core and whatever embeds it
(a browser page, a native event loop, a test harness). Core code only talks to
the host through them, never to a concrete host type.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use ts_rs::TS;

use crate::types::{
  AppId, ElementRef, ListenerHandle, Position, SurfaceId, TickHandle, TimerHandle,
};

/// Timer callback. Intervals invoke it repeatedly.
pub type TaskFn = Arc<dyn Fn() + Send + Sync>;

/// Per-frame callback. Receives the frame timestamp.
pub type TickFn = Arc<dyn Fn(Duration) + Send + Sync>;

/// UI-element event callback.
pub type ListenerFn = Arc<dyn Fn(&UiEvent) + Send + Sync>;

/// A UI event delivered to element listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
  pub element: ElementRef,
  pub event_type: String,
  pub detail: Value,
}

/// Options for `Host::add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
  /// Remove the listener after its first delivery.
  pub once: bool,
  /// Deliver during the capture phase.
  pub capture: bool,
  /// Listener promises not to cancel the event.
  pub passive: bool,
}

/// What the host needs to build a window's root surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpec {
  pub app_id: AppId,
  pub title: String,
  pub frameless: bool,
  pub resizable: bool,
}

/// Mutation applied to an existing surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceUpdate {
  Position(Position),
  ZIndex(u32),
  Visible(bool),
}

/// Host memory usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MemoryUsage {
  pub used_bytes: u64,
  pub limit_bytes: u64,
}

impl MemoryUsage {
  /// Used/limit ratio. Zero when the limit is unknown.
  pub fn ratio(&self) -> f64 {
    if self.limit_bytes == 0 {
      return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = self.used_bytes as f64 / self.limit_bytes as f64;
    ratio
  }
}

/// Event-loop services of the embedding environment.
///
/// Implementations must not invoke callbacks synchronously from registration
/// methods; callbacks only ever run from the host's own loop.
pub trait Host: Send + Sync + 'static {
  /// Monotonic time since the host started.
  fn now(&self) -> Duration;

  fn set_timeout(&self, delay: Duration, callback: TaskFn) -> TimerHandle;

  fn set_interval(&self, period: Duration, callback: TaskFn) -> TimerHandle;

  /// Cancel a one-shot or interval timer. Unknown handles are ignored.
  fn clear_timer(&self, handle: TimerHandle);

  /// Run `callback` once on the next rendered frame.
  fn request_tick(&self, callback: TickFn) -> TickHandle;

  fn cancel_tick(&self, handle: TickHandle);

  fn add_listener(
    &self,
    element: ElementRef,
    event_type: &str,
    callback: ListenerFn,
    options: ListenerOptions,
  ) -> ListenerHandle;

  /// Unknown handles are ignored.
  fn remove_listener(&self, handle: ListenerHandle);

  /// Append a new root surface into the desktop container.
  fn create_surface(&self, spec: &SurfaceSpec) -> SurfaceId;

  fn update_surface(&self, surface: SurfaceId, update: SurfaceUpdate);

  /// Detach a surface from its parent. Returns false if it was already detached.
  fn detach_surface(&self, surface: SurfaceId) -> bool;

  fn is_attached(&self, surface: SurfaceId) -> bool;

  /// Show or hide the full-desktop overlay that captures pointer events during a drag.
  fn set_drag_overlay(&self, visible: bool);
}

/// Host memory introspection.
pub trait MemoryProbe: Send + Sync + 'static {
  /// Current usage, or None when the host cannot report it.
  fn sample(&self) -> Option<MemoryUsage>;
}
