/*!
Owner -> resource set bookkeeping shared by the process ledger and the window
registry.

Both track the same kinds of handles and tear them down the same way; they only
differ in teardown order and in who owns the set. A `ResourceSet` is plain
data: owners keep it behind their own lock and move it out before releasing,
so no lock is held while cleanup code runs.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use ts_rs::TS;

use crate::bus::EventBus;
use crate::host::Host;
use crate::isolate::guarded;
use crate::types::{
  AppId, ConnectionId, ElementRef, ListenerHandle, SubscriptionId, TickHandle, TimerHandle,
};

/// Cleanup hook registered by app code.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// External channel bound to a window (socket, stream, ...).
pub trait Connection: Send + Sync {
  /// Close the channel. Called at most once by the registry.
  fn close(&self);

  /// Short label for logs.
  fn describe(&self) -> String {
    "connection".to_string()
  }
}

/// Live resource counts for one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResourceCounts {
  /// Interval plus one-shot timers.
  pub timers: usize,
  /// Element listeners plus bus subscriptions.
  pub events: usize,
  /// Tick callbacks.
  pub animations: usize,
  pub connections: usize,
  pub total: usize,
}

/// What a teardown released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReleaseReport {
  pub released: ResourceCounts,
  pub cleanups_run: usize,
  pub cleanup_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
  Cleanup,
  Interval,
  Timeout,
  Tick,
  Listener,
  BusSubscription,
  Connection,
}

/// Process teardown: cleanup hooks first so they still see live resources.
pub(crate) const PROCESS_TEARDOWN: [ResourceKind; 7] = [
  ResourceKind::Cleanup,
  ResourceKind::Interval,
  ResourceKind::Timeout,
  ResourceKind::Tick,
  ResourceKind::Listener,
  ResourceKind::BusSubscription,
  ResourceKind::Connection,
];

/// Window teardown: listeners, timers, subscriptions, connections.
pub(crate) const WINDOW_TEARDOWN: [ResourceKind; 7] = [
  ResourceKind::Cleanup,
  ResourceKind::Listener,
  ResourceKind::Interval,
  ResourceKind::Timeout,
  ResourceKind::Tick,
  ResourceKind::BusSubscription,
  ResourceKind::Connection,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListenerRecord {
  pub(crate) handle: ListenerHandle,
  pub(crate) element: ElementRef,
  pub(crate) event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BusSubscription {
  pub(crate) topic: String,
  pub(crate) id: SubscriptionId,
}

#[derive(Default)]
pub(crate) struct ResourceSet {
  intervals: BTreeSet<TimerHandle>,
  timeouts: BTreeSet<TimerHandle>,
  ticks: BTreeSet<TickHandle>,
  listeners: Vec<ListenerRecord>,
  subscriptions: Vec<BusSubscription>,
  connections: Vec<(ConnectionId, Arc<dyn Connection>)>,
  cleanups: Vec<CleanupFn>,
}

impl std::fmt::Debug for ResourceSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResourceSet")
      .field("counts", &self.counts())
      .field("cleanups", &self.cleanups.len())
      .finish()
  }
}

impl ResourceSet {
  pub(crate) fn add_interval(&mut self, handle: TimerHandle) {
    self.intervals.insert(handle);
  }

  pub(crate) fn add_timeout(&mut self, handle: TimerHandle) {
    self.timeouts.insert(handle);
  }

  /// Forget a timer of either kind. Returns false if it was not tracked.
  pub(crate) fn remove_timer(&mut self, handle: TimerHandle) -> bool {
    self.intervals.remove(&handle) | self.timeouts.remove(&handle)
  }

  pub(crate) fn add_tick(&mut self, handle: TickHandle) {
    self.ticks.insert(handle);
  }

  pub(crate) fn remove_tick(&mut self, handle: TickHandle) -> bool {
    self.ticks.remove(&handle)
  }

  pub(crate) fn add_listener(&mut self, record: ListenerRecord) {
    self.listeners.push(record);
  }

  pub(crate) fn remove_listener(&mut self, handle: ListenerHandle) -> bool {
    let before = self.listeners.len();
    self.listeners.retain(|l| l.handle != handle);
    self.listeners.len() != before
  }

  pub(crate) fn add_subscription(&mut self, topic: &str, id: SubscriptionId) {
    self.subscriptions.push(BusSubscription {
      topic: topic.to_string(),
      id,
    });
  }

  pub(crate) fn remove_subscription(&mut self, id: SubscriptionId) -> bool {
    let before = self.subscriptions.len();
    self.subscriptions.retain(|s| s.id != id);
    self.subscriptions.len() != before
  }

  pub(crate) fn add_connection(&mut self, id: ConnectionId, connection: Arc<dyn Connection>) {
    self.connections.push((id, connection));
  }

  pub(crate) fn remove_connection(&mut self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
    let index = self.connections.iter().position(|(cid, _)| *cid == id)?;
    Some(self.connections.remove(index).1)
  }

  pub(crate) fn add_cleanup(&mut self, cleanup: CleanupFn) {
    self.cleanups.push(cleanup);
  }

  pub(crate) fn counts(&self) -> ResourceCounts {
    let timers = self.intervals.len() + self.timeouts.len();
    let events = self.listeners.len() + self.subscriptions.len();
    let animations = self.ticks.len();
    let connections = self.connections.len();
    ResourceCounts {
      timers,
      events,
      animations,
      connections,
      total: timers + events + animations + connections,
    }
  }

  /// Release everything in `order`. Best-effort: a failing cleanup hook or
  /// connection is logged and the remaining steps still run.
  pub(crate) fn release(
    self,
    order: &[ResourceKind],
    host: &dyn Host,
    bus: &EventBus,
    owner: &AppId,
  ) -> ReleaseReport {
    let released = self.counts();
    let mut report = ReleaseReport {
      released,
      ..ReleaseReport::default()
    };

    let Self {
      intervals,
      timeouts,
      ticks,
      listeners,
      subscriptions,
      connections,
      cleanups,
    } = self;
    let mut cleanups = Some(cleanups);
    let mut intervals = Some(intervals);
    let mut timeouts = Some(timeouts);
    let mut ticks = Some(ticks);
    let mut listeners = Some(listeners);
    let mut subscriptions = Some(subscriptions);
    let mut connections = Some(connections);

    for kind in order {
      match kind {
        ResourceKind::Cleanup => {
          for cleanup in cleanups.take().unwrap_or_default() {
            report.cleanups_run += 1;
            if guarded(&format!("cleanup hook for {owner}"), cleanup).is_none() {
              report.cleanup_failures += 1;
            }
          }
        }
        ResourceKind::Interval => {
          for handle in intervals.take().unwrap_or_default() {
            host.clear_timer(handle);
          }
        }
        ResourceKind::Timeout => {
          for handle in timeouts.take().unwrap_or_default() {
            host.clear_timer(handle);
          }
        }
        ResourceKind::Tick => {
          for handle in ticks.take().unwrap_or_default() {
            host.cancel_tick(handle);
          }
        }
        ResourceKind::Listener => {
          for record in listeners.take().unwrap_or_default() {
            host.remove_listener(record.handle);
          }
        }
        ResourceKind::BusSubscription => {
          for sub in subscriptions.take().unwrap_or_default() {
            bus.off(&sub.topic, sub.id);
          }
        }
        ResourceKind::Connection => {
          for (id, connection) in connections.take().unwrap_or_default() {
            let label = format!("{} {id} of {owner}", connection.describe());
            if guarded(&format!("closing {label}"), || connection.close()).is_none() {
              log::warn!("Failed to close {label}; dropping it");
            }
          }
        }
      }
    }

    // An order that skips a kind must still leave nothing behind.
    debug_assert!(
      cleanups.is_none()
        && intervals.is_none()
        && timeouts.is_none()
        && ticks.is_none()
        && listeners.is_none()
        && subscriptions.is_none()
        && connections.is_none(),
      "teardown order must cover every resource kind"
    );

    log::debug!(
      "Released {} resources for {owner} ({} cleanup hooks, {} failed)",
      released.total,
      report.cleanups_run,
      report.cleanup_failures
    );
    report
  }
}
