/*! Branded ID types for type-safe references to apps and host handles. */

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use ts_rs::TS;

/// Application identifier. Doubles as the process id and the window id:
/// every app has at most one process ledger and at most one window.
#[derive(
  Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct AppId(pub String);

impl AppId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for AppId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl Borrow<str> for AppId {
  fn borrow(&self) -> &str {
    &self.0
  }
}

/// Handle for a host timer (one-shot or interval).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct TimerHandle(pub u64);

/// Handle for a per-frame tick callback.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct TickHandle(pub u64);

/// Handle for a UI-element event listener.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct ListenerHandle(pub u64);

/// Reference to a host UI element (listener target).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct ElementRef(pub u64);

/// Root visual surface of a window.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct SurfaceId(pub u64);

/// Bus subscription token returned by `EventBus::on`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct SubscriptionId(pub u64);

/// External connection registered against a window (e.g. a socket).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct ConnectionId(pub u64);
