/*! Window record tracked by the compositor. */

use super::{AppId, AppKind, AppMetadata, Position, SurfaceId};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Visible/state properties of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WindowRecord {
  pub id: AppId,
  pub title: String,
  pub kind: AppKind,
  pub position: Position,
  /// Stacking order. Higher is further in front. 0 = never focused.
  pub z_index: u32,
  pub open: bool,
  pub minimized: bool,
  pub frameless: bool,
  pub fixed: bool,
  pub resizable: bool,
  /// Root surface in the desktop container. None once destroyed.
  pub surface: Option<SurfaceId>,
}

impl WindowRecord {
  pub(crate) fn from_metadata(meta: &AppMetadata, position: Position) -> Self {
    Self {
      id: meta.id.clone(),
      title: meta.title.clone(),
      kind: meta.kind,
      position,
      z_index: 0,
      open: false,
      minimized: false,
      frameless: meta.frameless,
      fixed: meta.fixed,
      resizable: meta.resizable,
      surface: None,
    }
  }

  /// Open and not minimized.
  pub const fn is_visible(&self) -> bool {
    self.open && !self.minimized
  }
}
