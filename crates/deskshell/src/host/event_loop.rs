/*!
Reference single-threaded host.

`LoopHost` owns a virtual clock and the timer, tick, listener and surface
tables a page would own. Nothing runs until the embedder drives it:

- `advance(d)` fires due timers in deadline order and moves the clock,
- `run_ticks()` fires one frame of tick callbacks,
- `dispatch()` delivers a UI event to element listeners.

Tests drive it with virtual time; the WebSocket bridge pumps it with wall-clock
time. Callbacks never run while the internal lock is held, so they may call
back into the host freely.
*/

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::traits::{
  Host, ListenerFn, ListenerOptions, SurfaceSpec, SurfaceUpdate, TaskFn, TickFn, UiEvent,
};
use crate::isolate::guarded;
use crate::types::{ElementRef, ListenerHandle, Position, SurfaceId, TickHandle, TimerHandle};

/// Intervals shorter than this are clamped so `advance` always terminates.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct Timer {
  deadline: Duration,
  period: Option<Duration>,
  callback: TaskFn,
}

struct Listener {
  element: ElementRef,
  event_type: String,
  callback: ListenerFn,
  options: ListenerOptions,
}

/// Observable state of a surface, for embedders and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceState {
  pub spec: SurfaceSpec,
  pub position: Option<Position>,
  pub z_index: u32,
  pub visible: bool,
  pub attached: bool,
}

#[derive(Default)]
struct LoopState {
  now: Duration,
  next_handle: u64,
  timers: HashMap<TimerHandle, Timer>,
  ticks: BTreeMap<TickHandle, TickFn>,
  listeners: BTreeMap<ListenerHandle, Listener>,
  surfaces: BTreeMap<SurfaceId, SurfaceState>,
  drag_overlay: bool,
}

impl LoopState {
  fn next_handle(&mut self) -> u64 {
    self.next_handle += 1;
    self.next_handle
  }

  /// Earliest timer due at or before `limit`. Ties resolve by handle (creation order).
  fn next_due(&self, limit: Duration) -> Option<TimerHandle> {
    self
      .timers
      .iter()
      .filter(|(_, t)| t.deadline <= limit)
      .min_by_key(|(handle, t)| (t.deadline, **handle))
      .map(|(handle, _)| *handle)
  }
}

/// Deterministic event-loop host with a virtual clock.
#[derive(Default)]
pub struct LoopHost {
  state: Mutex<LoopState>,
}

impl std::fmt::Debug for LoopHost {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("LoopHost")
      .field("now", &state.now)
      .field("timers", &state.timers.len())
      .field("ticks", &state.ticks.len())
      .field("listeners", &state.listeners.len())
      .field("surfaces", &state.surfaces.len())
      .finish()
  }
}

impl LoopHost {
  /// A host with its clock at zero.
  pub fn new() -> Self {
    Self::default()
  }

  /// Move the clock forward by `by`, firing every timer that comes due.
  ///
  /// Returns the number of timer callbacks invoked.
  pub fn advance(&self, by: Duration) -> usize {
    let target = self.state.lock().now + by;
    let mut fired = 0;

    loop {
      let callback = {
        let mut state = self.state.lock();
        let Some(handle) = state.next_due(target) else {
          break;
        };
        let Some(timer) = state.timers.get_mut(&handle) else {
          break;
        };
        let deadline = timer.deadline;
        let callback = std::sync::Arc::clone(&timer.callback);
        match timer.period {
          Some(period) => timer.deadline = deadline + period.max(MIN_INTERVAL),
          None => {
            state.timers.remove(&handle);
          }
        }
        state.now = state.now.max(deadline);
        callback
      };

      guarded("timer callback", || callback());
      fired += 1;
    }

    let mut state = self.state.lock();
    state.now = state.now.max(target);
    fired
  }

  /// Move the clock without firing anything, as if a callback kept the loop busy.
  pub fn block_for(&self, by: Duration) {
    self.state.lock().now += by;
  }

  /// Fire every tick callback registered before this frame began.
  ///
  /// Returns the number of callbacks invoked.
  pub fn run_ticks(&self) -> usize {
    let (frame, now) = {
      let mut state = self.state.lock();
      (std::mem::take(&mut state.ticks), state.now)
    };
    let count = frame.len();
    for callback in frame.into_values() {
      guarded("tick callback", || callback(now));
    }
    count
  }

  /// Advance by `elapsed` and run one frame.
  pub fn pump(&self, elapsed: Duration) -> usize {
    self.advance(elapsed) + self.run_ticks()
  }

  /// Deliver a UI event to every listener on `element` for `event_type`.
  ///
  /// Capture listeners run before bubble listeners; within a phase, in
  /// registration order. Returns the number of listeners invoked.
  pub fn dispatch(&self, element: ElementRef, event_type: &str, detail: Value) -> usize {
    let targets: Vec<ListenerFn> = {
      let mut state = self.state.lock();
      let mut matching: Vec<(bool, ListenerHandle)> = state
        .listeners
        .iter()
        .filter(|(_, l)| l.element == element && l.event_type == event_type)
        .map(|(handle, l)| (!l.options.capture, *handle))
        .collect();
      matching.sort();

      let mut callbacks = Vec::with_capacity(matching.len());
      for (_, handle) in matching {
        let once = state.listeners.get(&handle).is_some_and(|l| l.options.once);
        let callback = if once {
          state.listeners.remove(&handle).map(|l| l.callback)
        } else {
          state.listeners.get(&handle).map(|l| std::sync::Arc::clone(&l.callback))
        };
        callbacks.extend(callback);
      }
      callbacks
    };

    let event = UiEvent {
      element,
      event_type: event_type.to_string(),
      detail,
    };
    for callback in &targets {
      guarded("element listener", || callback(&event));
    }
    targets.len()
  }

  /// Timers scheduled and not yet fired or cleared.
  pub fn pending_timers(&self) -> usize {
    self.state.lock().timers.len()
  }

  /// Frame callbacks waiting for the next `run_ticks`.
  pub fn pending_ticks(&self) -> usize {
    self.state.lock().ticks.len()
  }

  /// Attached element listeners.
  pub fn listener_count(&self) -> usize {
    self.state.lock().listeners.len()
  }

  /// Last known state of `surface`.
  pub fn surface(&self, surface: SurfaceId) -> Option<SurfaceState> {
    self.state.lock().surfaces.get(&surface).cloned()
  }

  /// Surfaces currently attached to the desktop container.
  pub fn attached_surfaces(&self) -> Vec<SurfaceId> {
    self
      .state
      .lock()
      .surfaces
      .iter()
      .filter(|(_, s)| s.attached)
      .map(|(id, _)| *id)
      .collect()
  }

  /// Whether the drag overlay is currently shown.
  pub fn drag_overlay_visible(&self) -> bool {
    self.state.lock().drag_overlay
  }
}

impl Host for LoopHost {
  fn now(&self) -> Duration {
    self.state.lock().now
  }

  fn set_timeout(&self, delay: Duration, callback: TaskFn) -> TimerHandle {
    let mut state = self.state.lock();
    let handle = TimerHandle(state.next_handle());
    let deadline = state.now + delay;
    state.timers.insert(
      handle,
      Timer {
        deadline,
        period: None,
        callback,
      },
    );
    handle
  }

  fn set_interval(&self, period: Duration, callback: TaskFn) -> TimerHandle {
    let mut state = self.state.lock();
    let handle = TimerHandle(state.next_handle());
    let period = period.max(MIN_INTERVAL);
    let deadline = state.now + period;
    state.timers.insert(
      handle,
      Timer {
        deadline,
        period: Some(period),
        callback,
      },
    );
    handle
  }

  fn clear_timer(&self, handle: TimerHandle) {
    self.state.lock().timers.remove(&handle);
  }

  fn request_tick(&self, callback: TickFn) -> TickHandle {
    let mut state = self.state.lock();
    let handle = TickHandle(state.next_handle());
    state.ticks.insert(handle, callback);
    handle
  }

  fn cancel_tick(&self, handle: TickHandle) {
    self.state.lock().ticks.remove(&handle);
  }

  fn add_listener(
    &self,
    element: ElementRef,
    event_type: &str,
    callback: ListenerFn,
    options: ListenerOptions,
  ) -> ListenerHandle {
    let mut state = self.state.lock();
    let handle = ListenerHandle(state.next_handle());
    state.listeners.insert(
      handle,
      Listener {
        element,
        event_type: event_type.to_string(),
        callback,
        options,
      },
    );
    handle
  }

  fn remove_listener(&self, handle: ListenerHandle) {
    self.state.lock().listeners.remove(&handle);
  }

  fn create_surface(&self, spec: &SurfaceSpec) -> SurfaceId {
    let mut state = self.state.lock();
    let id = SurfaceId(state.next_handle());
    state.surfaces.insert(
      id,
      SurfaceState {
        spec: spec.clone(),
        position: None,
        z_index: 0,
        visible: true,
        attached: true,
      },
    );
    id
  }

  fn update_surface(&self, surface: SurfaceId, update: SurfaceUpdate) {
    let mut state = self.state.lock();
    let Some(s) = state.surfaces.get_mut(&surface) else {
      log::debug!("update_surface: unknown surface {surface}");
      return;
    };
    match update {
      SurfaceUpdate::Position(position) => s.position = Some(position),
      SurfaceUpdate::ZIndex(z) => s.z_index = z,
      SurfaceUpdate::Visible(visible) => s.visible = visible,
    }
  }

  fn detach_surface(&self, surface: SurfaceId) -> bool {
    let mut state = self.state.lock();
    match state.surfaces.get_mut(&surface) {
      Some(s) if s.attached => {
        s.attached = false;
        true
      }
      _ => false,
    }
  }

  fn is_attached(&self, surface: SurfaceId) -> bool {
    self
      .state
      .lock()
      .surfaces
      .get(&surface)
      .is_some_and(|s| s.attached)
  }

  fn set_drag_overlay(&self, visible: bool) {
    self.state.lock().drag_overlay = visible;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::AppId;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  fn counter() -> (Arc<AtomicUsize>, TaskFn) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, Arc::new(move || {
      c.fetch_add(1, Ordering::SeqCst);
    }))
  }

  #[test]
  fn timeout_fires_once_at_deadline() {
    let host = LoopHost::new();
    let (count, cb) = counter();
    host.set_timeout(Duration::from_millis(100), cb);

    assert_eq!(host.advance(Duration::from_millis(99)), 0);
    assert_eq!(host.advance(Duration::from_millis(1)), 1);
    assert_eq!(host.advance(Duration::from_secs(10)), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(host.pending_timers(), 0);
  }

  #[test]
  fn interval_rearms_until_cleared() {
    let host = LoopHost::new();
    let (count, cb) = counter();
    let handle = host.set_interval(Duration::from_millis(10), cb);

    host.advance(Duration::from_millis(35));
    assert_eq!(count.load(Ordering::SeqCst), 3);

    host.clear_timer(handle);
    host.advance(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn timers_fire_in_deadline_order() {
    let host = LoopHost::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for (name, ms) in [("late", 30), ("early", 10), ("mid", 20)] {
      let order = Arc::clone(&order);
      host.set_timeout(Duration::from_millis(ms), Arc::new(move || order.lock().push(name)));
    }

    host.advance(Duration::from_millis(50));
    assert_eq!(*order.lock(), vec!["early", "mid", "late"]);
  }

  #[test]
  fn clock_reads_deadline_inside_callback() {
    let host = Arc::new(LoopHost::new());
    let seen = Arc::new(Mutex::new(Duration::ZERO));
    let (h, s) = (Arc::clone(&host), Arc::clone(&seen));
    host.set_timeout(Duration::from_millis(40), Arc::new(move || *s.lock() = h.now()));

    host.advance(Duration::from_millis(100));
    assert_eq!(*seen.lock(), Duration::from_millis(40));
    assert_eq!(host.now(), Duration::from_millis(100));
  }

  #[test]
  fn ticks_are_one_shot_per_frame() {
    let host = LoopHost::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    host.request_tick(Arc::new(move |_: Duration| {
      c.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(host.run_ticks(), 1);
    assert_eq!(host.run_ticks(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn dispatch_honours_once_and_capture() {
    let host = LoopHost::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let element = ElementRef(1);
    let push = |name: &'static str| -> ListenerFn {
      let order = Arc::clone(&order);
      Arc::new(move |_: &UiEvent| order.lock().push(name))
    };

    host.add_listener(element, "click", push("bubble"), ListenerOptions::default());
    host.add_listener(
      element,
      "click",
      push("capture-once"),
      ListenerOptions {
        once: true,
        capture: true,
        ..ListenerOptions::default()
      },
    );
    host.add_listener(ElementRef(2), "click", push("other"), ListenerOptions::default());

    assert_eq!(host.dispatch(element, "click", Value::Null), 2);
    assert_eq!(host.dispatch(element, "click", Value::Null), 1);
    assert_eq!(*order.lock(), vec!["capture-once", "bubble", "bubble"]);
  }

  #[test]
  fn surfaces_detach_once() {
    let host = LoopHost::new();
    let surface = host.create_surface(&SurfaceSpec {
      app_id: AppId::from("notes"),
      title: "Notes".into(),
      frameless: false,
      resizable: true,
    });

    assert!(host.is_attached(surface));
    assert!(host.detach_surface(surface));
    assert!(!host.detach_surface(surface));
    assert!(host.attached_surfaces().is_empty());
  }
}
