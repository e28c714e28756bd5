/*! Event-bus topics and payloads produced by the shell core. */

use super::{AppId, Position};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Topic names. Per-app topics are built with the helper functions.
pub mod topics {
  use crate::types::AppId;

  pub const APP_OPENED: &str = "app:opened";
  pub const APP_CLOSED: &str = "app:closed";
  pub const APP_DESTROYED: &str = "app:destroyed";
  pub const APP_MINIMIZED: &str = "app:minimized";
  pub const APP_RENAMED: &str = "app:renamed";
  pub const WINDOW_FOCUS: &str = "window:focus";
  pub const WINDOW_BLUR: &str = "window:blur";
  pub const SYSTEM_SPEAK: &str = "system:speak";
  pub const SYSTEM_CLOSE_WINDOW: &str = "system:close_window";

  /// `app:ready:{id}`
  pub fn app_ready(id: &AppId) -> String {
    format!("app:ready:{id}")
  }

  /// `app:closed:{id}`
  pub fn app_closed(id: &AppId) -> String {
    format!("app:closed:{id}")
  }
}

/// Payload for `app:opened`, `app:ready:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppOpened {
  pub id: AppId,
  pub title: String,
  /// False for service apps, which have no surface.
  pub windowed: bool,
}

/// Payload for `app:closed`, `app:closed:{id}`, `app:destroyed`, `app:minimized`,
/// `window:blur` and `system:close_window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppRef {
  pub id: AppId,
}

/// Payload for `window:focus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WindowFocused {
  pub id: AppId,
  pub z_index: u32,
}

/// Payload for `app:renamed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppRenamed {
  pub id: AppId,
  pub title: String,
}

/// Payload for `system:speak` (user-facing notification).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Speak {
  pub text: String,
}

/// Payload for a finished drag (not a bus topic; returned to callers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DragFinished {
  pub id: AppId,
  pub position: Position,
}

/// An emitted bus event as seen by stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
  #[serde(rename = "event")]
  pub topic: String,
  pub data: serde_json::Value,
}
