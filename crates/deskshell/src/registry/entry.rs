/*! Per-window bookkeeping and the handle window code acquires resources through. */

use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::WindowRegistry;
use crate::host::{ListenerOptions, UiEvent};
use crate::resources::{Connection, ListenerRecord, ReleaseReport, ResourceCounts, ResourceSet};
use crate::types::{
  AppId, BoxFuture, ConnectionId, ElementRef, ListenerHandle, ShellError, ShellResult,
  SubscriptionId, SurfaceId, TimerHandle,
};

/// Async shutdown step awaited by `WindowRegistry::cleanup` before the forced
/// teardown. Dropped unfinished if the cleanup timeout wins.
pub type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub(super) struct RegistryEntry {
  pub(super) seq: u64,
  pub(super) resources: ResourceSet,
  pub(super) surface: Option<SurfaceId>,
  pub(super) created_at: Duration,
  pub(super) last_active: Duration,
  pub(super) shutdown: Option<ShutdownHook>,
}

impl WindowRegistry {
  /// Run `f` on the entry for `id` if it is still generation `seq`.
  pub(super) fn with_entry<R>(
    &self,
    id: &AppId,
    seq: u64,
    f: impl FnOnce(&mut RegistryEntry) -> R,
  ) -> Option<R> {
    let mut entries = self.inner.entries.lock();
    match entries.get_mut(id) {
      Some(entry) if entry.seq == seq => Some(f(entry)),
      _ => None,
    }
  }
}

/// Resource handle for one registered window.
///
/// Everything acquired here is released when the window is cleaned up. Once
/// that happens the handle is stale: acquisitions return
/// `ShellError::WindowNotFound` and releases do nothing.
#[derive(Clone)]
pub struct WindowResources {
  id: AppId,
  seq: u64,
  registry: WindowRegistry,
}

impl std::fmt::Debug for WindowResources {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WindowResources")
      .field("id", &self.id)
      .field("seq", &self.seq)
      .finish_non_exhaustive()
  }
}

impl WindowResources {
  pub(super) const fn new(id: AppId, seq: u64, registry: WindowRegistry) -> Self {
    Self { id, seq, registry }
  }

  /// Window this handle tracks.
  pub const fn id(&self) -> &AppId {
    &self.id
  }

  fn acquire<R>(&self, f: impl FnOnce(&mut RegistryEntry) -> R) -> ShellResult<R> {
    self
      .registry
      .with_entry(&self.id, self.seq, f)
      .ok_or_else(|| ShellError::WindowNotFound(self.id.clone()))
  }

  fn release(&self, f: impl FnOnce(&mut ResourceSet) -> bool) {
    self
      .registry
      .with_entry(&self.id, self.seq, |entry| f(&mut entry.resources));
  }

  /// True once the entry behind this handle has been torn down.
  pub fn is_cleaned(&self) -> bool {
    self.registry.with_entry(&self.id, self.seq, |_| ()).is_none()
  }

  /// Surface registered with the window.
  pub fn surface(&self) -> Option<SurfaceId> {
    self
      .registry
      .with_entry(&self.id, self.seq, |entry| entry.surface)
      .flatten()
  }

  /// Record activity on this window.
  pub fn touch(&self) {
    let now = self.registry.inner.host.now();
    self
      .registry
      .with_entry(&self.id, self.seq, |entry| entry.last_active = now);
  }

  /// Live resources held by the window.
  pub fn resource_count(&self) -> ResourceCounts {
    self
      .registry
      .with_entry(&self.id, self.seq, |entry| entry.resources.counts())
      .unwrap_or_default()
  }

  /// Element listener bound to this window. Delivery counts as activity.
  pub fn add_listener(
    &self,
    element: ElementRef,
    event_type: &str,
    callback: impl Fn(&UiEvent) + Send + Sync + 'static,
    options: ListenerOptions,
  ) -> ShellResult<ListenerHandle> {
    let host = Arc::clone(&self.registry.inner.host);
    let this = self.clone();
    self.acquire(|entry| {
      let slot: Arc<OnceLock<ListenerHandle>> = Arc::new(OnceLock::new());
      let fired = Arc::clone(&slot);
      let handle = host.add_listener(
        element,
        event_type,
        Arc::new(move |event: &UiEvent| {
          this.touch();
          if options.once {
            if let Some(handle) = fired.get().copied() {
              this.release(|set| set.remove_listener(handle));
            }
          }
          callback(event);
        }),
        options,
      );
      drop(slot.set(handle));
      entry.resources.add_listener(ListenerRecord {
        handle,
        element,
        event_type: event_type.to_string(),
      });
      handle
    })
  }

  /// Detach a listener and forget it.
  pub fn remove_listener(&self, handle: ListenerHandle) {
    self.release(|set| set.remove_listener(handle));
    self.registry.inner.host.remove_listener(handle);
  }

  /// One-shot timer; drops out of the entry once it fires.
  pub fn set_timeout(
    &self,
    delay: Duration,
    callback: impl Fn() + Send + Sync + 'static,
  ) -> ShellResult<TimerHandle> {
    let host = Arc::clone(&self.registry.inner.host);
    let this = self.clone();
    self.acquire(|entry| {
      let slot: Arc<OnceLock<TimerHandle>> = Arc::new(OnceLock::new());
      let fired = Arc::clone(&slot);
      let handle = host.set_timeout(
        delay,
        Arc::new(move || {
          if let Some(handle) = fired.get().copied() {
            this.release(|set| set.remove_timer(handle));
          }
          callback();
        }),
      );
      drop(slot.set(handle));
      entry.resources.add_timeout(handle);
      handle
    })
  }

  /// Repeating timer owned by the window.
  pub fn set_interval(
    &self,
    period: Duration,
    callback: impl Fn() + Send + Sync + 'static,
  ) -> ShellResult<TimerHandle> {
    let host = Arc::clone(&self.registry.inner.host);
    self.acquire(|entry| {
      let handle = host.set_interval(period, Arc::new(callback));
      entry.resources.add_interval(handle);
      handle
    })
  }

  /// Cancel a timeout or interval.
  pub fn clear_timer(&self, handle: TimerHandle) {
    self.release(|set| set.remove_timer(handle));
    self.registry.inner.host.clear_timer(handle);
  }

  /// Bus subscription owned by the window.
  pub fn subscribe(
    &self,
    topic: &str,
    handler: impl Fn(&Value) + Send + Sync + 'static,
  ) -> ShellResult<SubscriptionId> {
    let bus = self.registry.inner.bus.clone();
    self.acquire(|entry| {
      let sub = bus.on(topic, handler);
      entry.resources.add_subscription(topic, sub);
      sub
    })
  }

  /// Drop a subscription made through `subscribe`.
  pub fn unsubscribe(&self, topic: &str, subscription: SubscriptionId) {
    self.release(|set| set.remove_subscription(subscription));
    self.registry.inner.bus.off(topic, subscription);
  }

  /// Bind an external channel to this window. It is closed on cleanup.
  pub fn add_connection(&self, connection: Arc<dyn Connection>) -> ShellResult<ConnectionId> {
    let id = ConnectionId(self.registry.next_connection_id());
    self.acquire(|entry| entry.resources.add_connection(id, connection))?;
    Ok(id)
  }

  /// Stop tracking a connection without closing it; ownership returns to the caller.
  pub fn remove_connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
    self
      .registry
      .with_entry(&self.id, self.seq, |entry| entry.resources.remove_connection(id))
      .flatten()
  }

  /// Run `cleanup` first when the window is torn down.
  pub fn on_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) -> ShellResult<()> {
    self.acquire(|entry| entry.resources.add_cleanup(Box::new(cleanup)))
  }

  /// Install the async step awaited by a graceful `cleanup`. Replaces any
  /// previous hook.
  pub fn set_shutdown_hook<F, Fut>(&self, hook: F) -> ShellResult<()>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
  {
    let hook: ShutdownHook = Box::new(move || Box::pin(hook()));
    self.acquire(|entry| entry.shutdown = Some(hook))
  }

  /// Tear the window down now. Returns None if it was already cleaned.
  pub fn force_cleanup(&self) -> Option<ReleaseReport> {
    self.registry.release_entry(&self.id, Some(self.seq))
  }
}
