/*!
Window lifecycle: open (with lazy loading), close, minimize, restore, toggle.
*/

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::position::initial_position;
use super::Compositor;
use crate::host::{SurfaceSpec, SurfaceUpdate};
use crate::types::{
  topics, AppId, AppKind, AppMetadata, AppOpened, AppPatch, AppRef, AppRenamed, ShellError,
  ShellResult, Speak, WindowRecord,
};

/// What `toggle` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Toggled {
  Opened,
  Restored,
  Minimized,
  Focused,
  /// Service apps have no window to minimize; toggling an open one closes it.
  Closed,
}

impl Compositor {
  /// Open `id`, loading it first if it was only registered lazily.
  ///
  /// Returns the id the app was opened under, which differs from `id` when
  /// the loaded module redirects. Load failures are announced on
  /// `system:speak` and leave nothing open.
  pub async fn open(&self, id: impl Into<AppId>, announce: bool) -> ShellResult<AppId> {
    let id = self.inner.loader.alias(&id.into());
    if let Some(metadata) = self.inner.store.get_app(&id).and_then(|r| r.metadata) {
      self.open_with(&metadata, announce);
      return Ok(id);
    }

    let descriptor = match self.inner.loader.resolve(&id).await {
      Ok(descriptor) => descriptor,
      Err(err) => {
        log::error!("Failed to load {id}: {err}");
        self.emit(
          topics::SYSTEM_SPEAK,
          &Speak {
            text: format!("Sorry, {id} could not be opened"),
          },
        );
        return Err(err.into());
      }
    };

    let ctx = self.inner.ledger.get_context(descriptor.id().clone());
    descriptor.run_init(&ctx);

    if let Some(actual) = descriptor.redirect() {
      log::debug!("Opening {actual} in place of {id}");
    }
    self.open_with(&descriptor.metadata, announce);
    Ok(descriptor.id().clone())
  }

  /// Open an app whose metadata is known.
  fn open_with(&self, meta: &AppMetadata, announce: bool) {
    let id = &meta.id;
    if let Some(existing) = self.window(id).filter(|w| w.open) {
      if existing.kind.has_surface() {
        if let Err(e) = self.bring_to_front(id) {
          log::warn!("Could not focus already open {id}: {e}");
        }
      }
      return;
    }

    if announce {
      self.emit(
        topics::SYSTEM_SPEAK,
        &Speak {
          text: format!("Opening {}", meta.title),
        },
      );
    }

    let persisted = self.inner.store.get_app(id).and_then(|r| r.position);
    let mut record = WindowRecord::from_metadata(meta, initial_position(meta, persisted));
    record.open = true;

    if meta.kind.has_surface() {
      let surface = self.inner.host.create_surface(&SurfaceSpec {
        app_id: id.clone(),
        title: meta.title.clone(),
        frameless: meta.frameless,
        resizable: meta.resizable,
      });
      self
        .inner
        .host
        .update_surface(surface, SurfaceUpdate::Position(record.position));
      record.surface = Some(surface);
      self.inner.registry.register(id.clone(), Some(surface));
    }
    self.inner.state.lock().windows.insert(id.clone(), record);

    if meta.kind.has_surface() {
      if let Err(e) = self.bring_to_front(id) {
        log::warn!("Could not focus newly opened {id}: {e}");
      }
    }
    self.inner.store.update_app(
      id,
      AppPatch {
        open: Some(true),
        minimized: Some(false),
        ..AppPatch::default()
      },
    );

    let opened = AppOpened {
      id: id.clone(),
      title: meta.title.clone(),
      windowed: meta.kind.has_surface(),
    };
    self.emit(topics::APP_OPENED, &opened);
    self.emit(&topics::app_ready(id), &opened);
    log::debug!("Opened {id}");
  }

  /// Tear `id` down: detach its surface, persist it closed, announce the
  /// destruction, kill its process and clean up its window resources.
  ///
  /// System windows are reopened after `restart_delay`.
  pub async fn close(&self, id: &AppId) -> ShellResult<()> {
    let id = &self.inner.loader.alias(id);
    self.cancel_window_drag(id);
    let record = {
      let mut state = self.inner.state.lock();
      let Some(record) = state.windows.remove(id) else {
        return Err(ShellError::NotOpen(id.clone()));
      };
      Self::release_focus(&mut state, id);
      record
    };

    if let Some(surface) = record.surface {
      self.inner.host.detach_surface(surface);
    }
    self.inner.store.update_app(
      id,
      AppPatch {
        open: Some(false),
        minimized: Some(false),
        ..AppPatch::default()
      },
    );

    let payload = AppRef { id: id.clone() };
    self.emit(topics::APP_CLOSED, &payload);
    self.emit(&topics::app_closed(id), &payload);
    self.emit(topics::APP_DESTROYED, &payload);

    self.inner.ledger.kill(id);
    self.inner.registry.cleanup(id).await;
    log::debug!("Closed {id}");

    if record.kind == AppKind::System {
      self.schedule_restart(id.clone());
    }
    Ok(())
  }

  fn schedule_restart(&self, id: AppId) {
    let delay = self.inner.config.restart_delay;
    let compositor = self.clone();
    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => {
        log::debug!("Restarting system window {id} in {delay:?}");
        runtime.spawn(async move {
          tokio::time::sleep(delay).await;
          if let Err(e) = compositor.open(id.clone(), false).await {
            log::error!("Restart of system window {id} failed: {e}");
          }
        });
      }
      Err(e) => log::warn!("Cannot restart system window {id}: {e}"),
    }
  }

  /// Hide `id` without releasing anything. Clears focus if it held it.
  pub fn minimize(&self, id: &AppId) -> ShellResult<()> {
    let id = &self.inner.loader.alias(id);
    let (surface, blurred) = {
      let mut guard = self.inner.state.lock();
      let state = &mut *guard;
      let window = state
        .windows
        .get_mut(id)
        .ok_or_else(|| ShellError::NotOpen(id.clone()))?;
      let Some(surface) = window.surface else {
        return Err(ShellError::WindowNotFound(id.clone()));
      };
      if window.minimized {
        return Ok(());
      }
      window.minimized = true;
      (surface, Self::release_focus(state, id))
    };

    self
      .inner
      .host
      .update_surface(surface, SurfaceUpdate::Visible(false));
    self.inner.store.update_app(id, AppPatch::minimized(true));

    let payload = AppRef { id: id.clone() };
    self.emit(topics::APP_MINIMIZED, &payload);
    if blurred {
      self.emit(topics::WINDOW_BLUR, &payload);
    }
    Ok(())
  }

  /// Show a minimized window again. Does not focus it.
  pub fn restore(&self, id: &AppId) -> ShellResult<()> {
    let id = &self.inner.loader.alias(id);
    let surface = {
      let mut state = self.inner.state.lock();
      let window = state
        .windows
        .get_mut(id)
        .ok_or_else(|| ShellError::NotOpen(id.clone()))?;
      let Some(surface) = window.surface else {
        return Err(ShellError::WindowNotFound(id.clone()));
      };
      if !window.minimized {
        return Ok(());
      }
      window.minimized = false;
      surface
    };

    self
      .inner
      .host
      .update_surface(surface, SurfaceUpdate::Visible(true));
    self.inner.store.update_app(id, AppPatch::minimized(false));
    Ok(())
  }

  /// Taskbar behaviour, in this order of precedence:
  /// not open -> open; minimized -> restore and focus; focused -> minimize;
  /// open but not focused -> focus.
  ///
  /// An id that a lazy load redirected acts on the window it opened.
  pub async fn toggle(&self, id: &AppId) -> ShellResult<Toggled> {
    let id = &self.inner.loader.alias(id);
    let (window, active) = {
      let state = self.inner.state.lock();
      (state.windows.get(id).cloned(), state.active.clone())
    };

    let Some(window) = window.filter(|w| w.open) else {
      self.open(id.clone(), false).await?;
      return Ok(Toggled::Opened);
    };
    if !window.kind.has_surface() {
      self.close(id).await?;
      return Ok(Toggled::Closed);
    }
    if window.minimized {
      self.restore(id)?;
      self.bring_to_front(id)?;
      return Ok(Toggled::Restored);
    }
    if active.as_ref() == Some(id) {
      self.minimize(id)?;
      return Ok(Toggled::Minimized);
    }
    self.bring_to_front(id)?;
    Ok(Toggled::Focused)
  }

  /// Change the title of an open app and persist it with its metadata.
  pub fn rename(&self, id: &AppId, title: impl Into<String>) -> ShellResult<()> {
    let title = title.into();
    {
      let mut state = self.inner.state.lock();
      let window = state
        .windows
        .get_mut(id)
        .ok_or_else(|| ShellError::NotOpen(id.clone()))?;
      window.title.clone_from(&title);
    }

    if let Some(mut metadata) = self.inner.store.get_app(id).and_then(|r| r.metadata) {
      metadata.title.clone_from(&title);
      self.inner.store.set_app_metadata(id, metadata);
    }
    self.emit(
      topics::APP_RENAMED,
      &AppRenamed {
        id: id.clone(),
        title,
      },
    );
    Ok(())
  }

  /// Close every open app. System windows restart as usual.
  pub async fn close_all(&self) {
    let ids: Vec<AppId> = self.windows().into_iter().map(|w| w.id).collect();
    for id in ids {
      if let Err(e) = self.close(&id).await {
        log::debug!("close_all: {e}");
      }
    }
  }
}
