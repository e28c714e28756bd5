/*! Stacking order and the active window. */

use super::{Compositor, CompositorState};
use crate::host::SurfaceUpdate;
use crate::types::{topics, AppId, AppPatch, AppRef, ShellError, ShellResult, WindowFocused};

impl Compositor {
  /// Raise `id` above every other window and make it the active one.
  ///
  /// Each call hands out the next value of a counter that never decreases, so
  /// repeated focus changes always produce strictly increasing z-indexes. A
  /// minimized window is restored first.
  pub fn bring_to_front(&self, id: &AppId) -> ShellResult<u32> {
    if self.window(id).is_some_and(|w| w.minimized) {
      self.restore(id)?;
    }

    let (z_index, surface, blurred) = {
      let mut guard = self.inner.state.lock();
      let state = &mut *guard;
      let window = state
        .windows
        .get_mut(id)
        .ok_or_else(|| ShellError::WindowNotFound(id.clone()))?;
      let Some(surface) = window.surface.filter(|_| window.open) else {
        return Err(ShellError::NotOpen(id.clone()));
      };

      state.z_counter += 1;
      window.z_index = state.z_counter;
      let blurred = state.active.replace(id.clone()).filter(|prev| prev != id);
      (state.z_counter, surface, blurred)
    };

    self
      .inner
      .host
      .update_surface(surface, SurfaceUpdate::ZIndex(z_index));
    self.inner.store.update_app(id, AppPatch::z_index(z_index));
    self.inner.registry.touch(id);

    if let Some(prev) = blurred {
      self.emit(topics::WINDOW_BLUR, &AppRef { id: prev });
    }
    self.emit(
      topics::WINDOW_FOCUS,
      &WindowFocused {
        id: id.clone(),
        z_index,
      },
    );
    log::trace!("Focused {id} (z {z_index})");
    Ok(z_index)
  }

  /// Drop focus from `id` if it holds it. Returns true when it did.
  pub(super) fn release_focus(state: &mut CompositorState, id: &AppId) -> bool {
    if state.active.as_ref() == Some(id) {
      state.active = None;
      true
    } else {
      false
    }
  }
}
