/*! Static app metadata and the persisted per-app record. */

use super::{AppId, Position};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How an app presents itself on the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AppKind {
  /// Regular window with a visible surface.
  #[default]
  Window,
  /// Capsule/service app: no surface, only a logical open flag.
  Service,
  /// Always-on window. Closing it restarts it after a delay.
  System,
}

impl AppKind {
  pub const fn has_surface(&self) -> bool {
    !matches!(self, Self::Service)
  }
}

/// Static metadata an app module exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppMetadata {
  pub id: AppId,
  pub title: String,
  #[serde(default)]
  pub kind: AppKind,
  /// Default placement before any position was persisted.
  #[serde(default)]
  pub position: Position,
  #[serde(default)]
  pub frameless: bool,
  /// Fixed windows cannot be dragged and prefer their anchored default.
  #[serde(default)]
  pub fixed: bool,
  #[serde(default = "default_true")]
  pub resizable: bool,
}

const fn default_true() -> bool {
  true
}

impl AppMetadata {
  pub fn new(id: impl Into<AppId>, title: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      kind: AppKind::Window,
      position: Position::default(),
      frameless: false,
      fixed: false,
      resizable: true,
    }
  }

  #[must_use]
  pub const fn with_kind(mut self, kind: AppKind) -> Self {
    self.kind = kind;
    self
  }

  #[must_use]
  pub const fn with_position(mut self, position: Position) -> Self {
    self.position = position;
    self
  }

  #[must_use]
  pub const fn fixed(mut self) -> Self {
    self.fixed = true;
    self
  }

  #[must_use]
  pub const fn frameless(mut self) -> Self {
    self.frameless = true;
    self
  }
}

/// Persisted per-app state owned by the store collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct AppRecord {
  pub id: AppId,
  pub metadata: Option<AppMetadata>,
  pub open: bool,
  pub minimized: bool,
  pub position: Option<Position>,
  pub icon_position: Option<Position>,
  pub z_index: Option<u32>,
}

impl AppRecord {
  pub fn new(id: AppId) -> Self {
    Self {
      id,
      ..Self::default()
    }
  }

  /// Apply a partial update. `None` fields are left untouched.
  pub fn apply(&mut self, patch: &AppPatch) {
    if let Some(open) = patch.open {
      self.open = open;
    }
    if let Some(minimized) = patch.minimized {
      self.minimized = minimized;
    }
    if let Some(position) = patch.position {
      self.position = Some(position);
    }
    if let Some(icon_position) = patch.icon_position {
      self.icon_position = Some(icon_position);
    }
    if let Some(z_index) = patch.z_index {
      self.z_index = Some(z_index);
    }
  }
}

/// Partial update for an `AppRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct AppPatch {
  pub open: Option<bool>,
  pub minimized: Option<bool>,
  pub position: Option<Position>,
  pub icon_position: Option<Position>,
  pub z_index: Option<u32>,
}

impl AppPatch {
  pub fn open(open: bool) -> Self {
    Self {
      open: Some(open),
      ..Self::default()
    }
  }

  pub fn minimized(minimized: bool) -> Self {
    Self {
      minimized: Some(minimized),
      ..Self::default()
    }
  }

  pub fn position(position: Position) -> Self {
    Self {
      position: Some(position),
      ..Self::default()
    }
  }

  pub fn icon_position(position: Position) -> Self {
    Self {
      icon_position: Some(position),
      ..Self::default()
    }
  }

  pub fn z_index(z_index: u32) -> Self {
    Self {
      z_index: Some(z_index),
      ..Self::default()
    }
  }
}
