/*! Capability object handed to app code. */

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::ProcessLedger;
use crate::host::{ListenerOptions, UiEvent};
use crate::types::{
  AppId, ElementRef, ListenerHandle, ShellResult, SubscriptionId, TickHandle, TimerHandle,
};

/// Tracked equivalents of the host's timer, tick, listener and bus primitives,
/// all scoped to one process.
///
/// Every handle returned here is recorded in the ledger before this call
/// returns. Release functions accept handles of any state; releasing a handle
/// twice is harmless.
#[derive(Clone)]
pub struct ProcessContext {
  id: AppId,
  ledger: ProcessLedger,
}

impl std::fmt::Debug for ProcessContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProcessContext")
      .field("id", &self.id)
      .finish_non_exhaustive()
  }
}

impl ProcessContext {
  pub(super) const fn new(id: AppId, ledger: ProcessLedger) -> Self {
    Self { id, ledger }
  }

  /// Process this context acquires resources for.
  pub const fn id(&self) -> &AppId {
    &self.id
  }

  /// Current host time.
  pub fn now(&self) -> Duration {
    self.ledger.host().now()
  }

  /// Repeating timer, released when the process is killed.
  pub fn set_interval(
    &self,
    period: Duration,
    callback: impl Fn() + Send + Sync + 'static,
  ) -> ShellResult<TimerHandle> {
    self.ledger.set_interval(&self.id, period, Arc::new(callback))
  }

  /// Cancel an interval and drop it from the ledger.
  pub fn clear_interval(&self, handle: TimerHandle) {
    self.ledger.clear_timer(&self.id, handle);
  }

  /// One-shot timer. The handle drops out of the ledger once it fires.
  pub fn set_timeout(
    &self,
    delay: Duration,
    callback: impl Fn() + Send + Sync + 'static,
  ) -> ShellResult<TimerHandle> {
    self.ledger.set_timeout(&self.id, delay, Arc::new(callback))
  }

  /// Cancel a pending timeout.
  pub fn clear_timeout(&self, handle: TimerHandle) {
    self.ledger.clear_timer(&self.id, handle);
  }

  /// Run `callback` on the next frame.
  pub fn request_tick(
    &self,
    callback: impl Fn(Duration) + Send + Sync + 'static,
  ) -> ShellResult<TickHandle> {
    self.ledger.request_tick(&self.id, Arc::new(callback))
  }

  /// Cancel a pending frame callback.
  pub fn cancel_tick(&self, handle: TickHandle) {
    self.ledger.cancel_tick(&self.id, handle);
  }

  /// Listen on a host element. `once` listeners drop out after delivery.
  pub fn add_event_listener(
    &self,
    element: ElementRef,
    event_type: &str,
    callback: impl Fn(&UiEvent) + Send + Sync + 'static,
    options: ListenerOptions,
  ) -> ShellResult<ListenerHandle> {
    self
      .ledger
      .add_listener(&self.id, element, event_type, Arc::new(callback), options)
  }

  /// Detach a listener.
  pub fn remove_event_listener(&self, handle: ListenerHandle) {
    self.ledger.remove_listener(&self.id, handle);
  }

  /// Subscribe to a bus topic for the lifetime of this process.
  pub fn on(
    &self,
    topic: &str,
    handler: impl Fn(&Value) + Send + Sync + 'static,
  ) -> ShellResult<SubscriptionId> {
    self.ledger.subscribe(&self.id, topic, Arc::new(handler))
  }

  /// Drop a bus subscription made through `on`.
  pub fn off(&self, topic: &str, subscription: SubscriptionId) {
    self.ledger.unsubscribe(&self.id, topic, subscription);
  }

  /// Run `cleanup` first when the process is killed.
  pub fn on_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) -> ShellResult<()> {
    self.ledger.on_cleanup(&self.id, Box::new(cleanup))
  }
}
