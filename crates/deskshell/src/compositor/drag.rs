/*!
Pointer drag state machine, shared by windows and desktop icons.

```text
idle --press on draggable--> pending --move >= threshold--> dragging
  ^                             |                              |
  +---------- release ----------+----------- release ----------+
```

A press on a control or on a fixed window never leaves `idle`. While
dragging, every move applies the live position and the drag overlay is shown.
Releasing persists the final position exactly once, and only if the session
actually reached `dragging`; a release from `pending` is a click.
*/

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::Compositor;
use crate::host::SurfaceUpdate;
use crate::types::{AppId, AppPatch, DragFinished, Point, Position};

/// What is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DragTargetKind {
  Window,
  Icon,
}

/// A draggable thing on the desktop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DragTarget {
  pub id: AppId,
  pub kind: DragTargetKind,
}

impl DragTarget {
  /// The window of app `id`.
  pub fn window(id: impl Into<AppId>) -> Self {
    Self {
      id: id.into(),
      kind: DragTargetKind::Window,
    }
  }

  /// The desktop icon of app `id`.
  pub fn icon(id: impl Into<AppId>) -> Self {
    Self {
      id: id.into(),
      kind: DragTargetKind::Icon,
    }
  }
}

/// How a pointer session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
  /// No session was in progress.
  None,
  /// Pressed and released without crossing the threshold.
  Click(DragTarget),
  /// Dragged; the final position was persisted.
  Dropped(DragTarget, DragFinished),
}

#[derive(Debug, Clone)]
struct Session {
  target: DragTarget,
  start: Point,
  /// Target position at press time.
  origin: Position,
  /// Last applied position while dragging.
  current: Position,
}

#[derive(Debug, Clone, Default)]
enum Phase {
  #[default]
  Idle,
  Pending(Session),
  Dragging(Session),
}

/// Result of feeding one pointer move to the machine.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Step {
  Ignored,
  Held,
  /// Crossed the threshold on this move.
  Started(DragTarget, Position),
  Moved(DragTarget, Position),
}

/// Pure state machine; the compositor applies its side effects.
#[derive(Debug, Default)]
pub(super) struct DragMachine {
  phase: Phase,
}

impl DragMachine {
  pub(super) fn press(&mut self, target: DragTarget, at: Point, origin: Position) {
    self.phase = Phase::Pending(Session {
      target,
      start: at,
      origin,
      current: origin,
    });
  }

  pub(super) fn motion(&mut self, at: Point, threshold: f64) -> Step {
    match std::mem::take(&mut self.phase) {
      Phase::Idle => Step::Ignored,
      Phase::Pending(mut session) => {
        if !at.moved_from(session.start, threshold) {
          self.phase = Phase::Pending(session);
          return Step::Held;
        }
        session.current = session.origin.translated(at.minus(session.start));
        let step = Step::Started(session.target.clone(), session.current);
        self.phase = Phase::Dragging(session);
        step
      }
      Phase::Dragging(mut session) => {
        session.current = session.origin.translated(at.minus(session.start));
        let step = Step::Moved(session.target.clone(), session.current);
        self.phase = Phase::Dragging(session);
        step
      }
    }
  }

  /// End the session. Returns the target and, if it was dragged, the final position.
  pub(super) fn release(&mut self) -> Option<(DragTarget, Option<Position>)> {
    match std::mem::take(&mut self.phase) {
      Phase::Idle => None,
      Phase::Pending(session) => Some((session.target, None)),
      Phase::Dragging(session) => Some((session.target, Some(session.current))),
    }
  }

  pub(super) const fn is_dragging(&self) -> bool {
    matches!(self.phase, Phase::Dragging(_))
  }

  pub(super) const fn target(&self) -> Option<&DragTarget> {
    match &self.phase {
      Phase::Idle => None,
      Phase::Pending(session) | Phase::Dragging(session) => Some(&session.target),
    }
  }
}

impl Compositor {
  /// Pointer pressed on `target` at `at`. `on_control` marks presses on
  /// interactive controls (buttons, inputs) inside the target.
  ///
  /// Pressing a window focuses it. Returns true if a drag session started.
  pub fn pointer_down(&self, target: DragTarget, at: Point, on_control: bool) -> bool {
    let origin = match target.kind {
      DragTargetKind::Window => {
        let Some(window) = self.window(&target.id).filter(|w| w.is_visible()) else {
          return false;
        };
        if let Err(e) = self.bring_to_front(&target.id) {
          log::debug!("pointer_down: could not focus {}: {e}", target.id);
        }
        if on_control || window.fixed {
          return false;
        }
        window.position
      }
      DragTargetKind::Icon => {
        if on_control {
          return false;
        }
        self.icon_position(&target.id).unwrap_or_default()
      }
    };

    self.inner.state.lock().drag.press(target, at, origin);
    true
  }

  /// Pointer moved. Returns the live position once the session is dragging.
  pub fn pointer_move(&self, at: Point) -> Option<Position> {
    let threshold = self.inner.config.drag_threshold;
    let step = self.inner.state.lock().drag.motion(at, threshold);
    let (target, position) = match step {
      Step::Ignored | Step::Held => return None,
      Step::Started(target, position) => {
        self.inner.host.set_drag_overlay(true);
        log::trace!("Drag started on {}", target.id);
        (target, position)
      }
      Step::Moved(target, position) => (target, position),
    };
    self.apply_drag_position(&target, position);
    Some(position)
  }

  /// Pointer released. Persists the final position if a drag happened.
  pub fn pointer_up(&self) -> DragOutcome {
    let released = self.inner.state.lock().drag.release();
    let Some((target, dropped)) = released else {
      return DragOutcome::None;
    };
    let Some(position) = dropped else {
      return DragOutcome::Click(target);
    };

    self.inner.host.set_drag_overlay(false);
    let patch = match target.kind {
      DragTargetKind::Window => AppPatch::position(position),
      DragTargetKind::Icon => AppPatch::icon_position(position),
    };
    self.inner.store.update_app(&target.id, patch);
    log::debug!("Drag of {} ended at {position:?}", target.id);
    DragOutcome::Dropped(
      target.clone(),
      DragFinished {
        id: target.id,
        position,
      },
    )
  }

  /// Abandon a session without persisting anything (pointer lost, window closed).
  pub fn cancel_drag(&self) {
    let was_dragging = {
      let mut state = self.inner.state.lock();
      let dragging = state.drag.is_dragging();
      state.drag.release();
      dragging
    };
    if was_dragging {
      self.inner.host.set_drag_overlay(false);
    }
  }

  /// Cancel the session if it is dragging the window of `id`.
  pub(super) fn cancel_window_drag(&self, id: &AppId) {
    let pressed = self
      .inner
      .state
      .lock()
      .drag
      .target()
      .is_some_and(|t| t.kind == DragTargetKind::Window && t.id == *id);
    if pressed {
      log::debug!("Cancelling drag of closing window {id}");
      self.cancel_drag();
    }
  }

  /// True while a session is past the drag threshold.
  pub fn is_dragging(&self) -> bool {
    self.inner.state.lock().drag.is_dragging()
  }

  fn apply_drag_position(&self, target: &DragTarget, position: Position) {
    match target.kind {
      DragTargetKind::Window => {
        let surface = {
          let mut state = self.inner.state.lock();
          state.windows.get_mut(&target.id).and_then(|window| {
            window.position = position;
            window.surface
          })
        };
        if let Some(surface) = surface {
          self
            .inner
            .host
            .update_surface(surface, SurfaceUpdate::Position(position));
        }
      }
      DragTargetKind::Icon => {
        self
          .inner
          .state
          .lock()
          .icons
          .insert(target.id.clone(), position);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pressed() -> DragMachine {
    let mut machine = DragMachine::default();
    machine.press(
      DragTarget::window("w"),
      Point::new(10.0, 10.0),
      Position::absolute(100.0, 100.0),
    );
    machine
  }

  #[test]
  fn small_moves_stay_pending() {
    let mut machine = pressed();
    assert_eq!(machine.motion(Point::new(12.0, 11.0), 5.0), Step::Held);
    assert_eq!(machine.release(), Some((DragTarget::window("w"), None)));
    assert_eq!(machine.release(), None);
  }

  #[test]
  fn crossing_threshold_starts_drag_and_tracks_pointer() {
    let mut machine = pressed();
    assert_eq!(
      machine.motion(Point::new(15.0, 10.0), 5.0),
      Step::Started(DragTarget::window("w"), Position::absolute(105.0, 100.0))
    );
    assert_eq!(
      machine.motion(Point::new(11.0, 12.0), 5.0),
      Step::Moved(DragTarget::window("w"), Position::absolute(101.0, 102.0)),
      "once dragging, small moves still apply"
    );
    assert_eq!(
      machine.release(),
      Some((DragTarget::window("w"), Some(Position::absolute(101.0, 102.0))))
    );
  }

  #[test]
  fn target_follows_the_session() {
    let mut machine = pressed();
    assert_eq!(machine.target(), Some(&DragTarget::window("w")));
    machine.motion(Point::new(30.0, 10.0), 5.0);
    assert_eq!(machine.target(), Some(&DragTarget::window("w")));
    machine.release();
    assert_eq!(machine.target(), None);
  }

  #[test]
  fn idle_ignores_moves_and_releases() {
    let mut machine = DragMachine::default();
    assert_eq!(machine.motion(Point::new(50.0, 50.0), 5.0), Step::Ignored);
    assert_eq!(machine.release(), None);
  }
}
