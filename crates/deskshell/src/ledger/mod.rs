/*!
Process/resource ledger.

Every app gets a sandboxed [`ProcessContext`] whose timer, tick, listener and
bus primitives record the handles they hand out. [`ProcessLedger::kill`]
releases all of them in a fixed order, so an app can never leak a callback past
its own lifetime.

## State model

Each process id maps to a slot holding `ProcessState::Active(resources)` or
`ProcessState::Terminated`, plus its perf stats. Stats outlive `kill` for
inspection. Calling `get_context` again starts a fresh generation: stats are
zeroed and a terminated slot becomes active with an empty resource set.

Acquisitions against a terminated process are refused by default
(`RevivalPolicy::Reject`). `RevivalPolicy::Revive` recreates an empty set
instead, which hides a caller that forgot to request a new context.

## Module Structure

- `mod.rs` - ledger, slots, acquisition and teardown
- `context.rs` - `ProcessContext` capability handed to app code
- `stats.rs` - busy-time probe and long-task log
*/

mod context;
mod stats;

pub use context::ProcessContext;
pub use stats::{LongTask, ProcessStats, TaskSource};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use ts_rs::TS;

use crate::bus::EventBus;
use crate::config::{LedgerConfig, RevivalPolicy};
use crate::host::{Host, ListenerOptions, UiEvent};
use crate::resources::{ListenerRecord, ReleaseReport, ResourceCounts, ResourceSet, PROCESS_TEARDOWN};
use crate::types::{
  AppId, ElementRef, ListenerHandle, ShellError, ShellResult, SubscriptionId, TickHandle,
  TimerHandle,
};
use stats::TimingProbe;

/// Externally visible process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ProcessStatus {
  Active,
  Terminated,
}

/// Result of `ProcessLedger::kill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KillReport {
  pub id: AppId,
  /// False when the process was already terminated or never started.
  pub was_running: bool,
  pub release: ReleaseReport,
}

enum ProcessState {
  Active(ResourceSet),
  Terminated,
}

struct ProcessSlot {
  state: ProcessState,
  stats: Arc<Mutex<ProcessStats>>,
  generation: u64,
}

struct LedgerInner {
  host: Arc<dyn Host>,
  bus: EventBus,
  config: LedgerConfig,
  processes: Mutex<HashMap<AppId, ProcessSlot>>,
}

/// Per-app resource ledger. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct ProcessLedger {
  inner: Arc<LedgerInner>,
}

impl std::fmt::Debug for ProcessLedger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProcessLedger")
      .field("processes", &self.inner.processes.lock().len())
      .finish_non_exhaustive()
  }
}

impl ProcessLedger {
  /// Create an empty ledger on `host`, announcing lifecycle events on `bus`.
  pub fn new(host: Arc<dyn Host>, bus: EventBus, config: LedgerConfig) -> Self {
    Self {
      inner: Arc::new(LedgerInner {
        host,
        bus,
        config,
        processes: Mutex::new(HashMap::new()),
      }),
    }
  }

  /// Get the capability object for `id`, starting a new process generation.
  ///
  /// Stats are reset on every call. A terminated process becomes active with an
  /// empty resource set; an active one keeps its live resources.
  pub fn get_context(&self, id: impl Into<AppId>) -> ProcessContext {
    let id = id.into();
    let now = self.inner.host.now();
    let mut processes = self.inner.processes.lock();

    match processes.get_mut(&id) {
      Some(slot) => {
        slot.generation += 1;
        *slot.stats.lock() = ProcessStats::started_at(now);
        if matches!(slot.state, ProcessState::Terminated) {
          slot.state = ProcessState::Active(ResourceSet::default());
        }
        log::debug!("Process {id} restarted (generation {})", slot.generation);
      }
      None => {
        processes.insert(
          id.clone(),
          ProcessSlot {
            state: ProcessState::Active(ResourceSet::default()),
            stats: Arc::new(Mutex::new(ProcessStats::started_at(now))),
            generation: 1,
          },
        );
        log::debug!("Process {id} started");
      }
    }
    drop(processes);

    ProcessContext::new(id, self.clone())
  }

  /// Release every resource held by `id`. Safe to call repeatedly; calls after
  /// the first are no-ops.
  ///
  /// Order: cleanup hooks, intervals, one-shot timers, tick callbacks, element
  /// listeners, bus subscriptions. A failing cleanup hook is logged and skipped.
  pub fn kill(&self, id: &AppId) -> KillReport {
    let resources = {
      let mut processes = self.inner.processes.lock();
      match processes.get_mut(id) {
        Some(slot) => match std::mem::replace(&mut slot.state, ProcessState::Terminated) {
          ProcessState::Active(set) => Some(set),
          ProcessState::Terminated => None,
        },
        None => None,
      }
    };

    let Some(resources) = resources else {
      log::debug!("kill({id}): not running");
      return KillReport {
        id: id.clone(),
        was_running: false,
        release: ReleaseReport::default(),
      };
    };

    let release = resources.release(&PROCESS_TEARDOWN, self.inner.host.as_ref(), &self.inner.bus, id);
    log::debug!("Process {id} killed ({} resources released)", release.released.total);
    KillReport {
      id: id.clone(),
      was_running: true,
      release,
    }
  }

  /// Kill every active process.
  pub fn kill_all(&self) -> Vec<KillReport> {
    let ids: Vec<AppId> = {
      let processes = self.inner.processes.lock();
      let mut ids: Vec<AppId> = processes
        .iter()
        .filter(|(_, slot)| matches!(slot.state, ProcessState::Active(_)))
        .map(|(id, _)| id.clone())
        .collect();
      ids.sort();
      ids
    };
    ids.iter().map(|id| self.kill(id)).collect()
  }

  /// Live resource counts. All zero for unknown or terminated processes.
  pub fn resource_count(&self, id: &AppId) -> ResourceCounts {
    match self.inner.processes.lock().get(id) {
      Some(ProcessSlot {
        state: ProcessState::Active(set),
        ..
      }) => set.counts(),
      _ => ResourceCounts::default(),
    }
  }

  /// Stats of the current (or last) generation.
  pub fn stats(&self, id: &AppId) -> Option<ProcessStats> {
    let stats = self.inner.processes.lock().get(id).map(|slot| Arc::clone(&slot.stats))?;
    let snapshot = stats.lock().clone();
    Some(snapshot)
  }

  /// Whether `id` is active or terminated. None if never started.
  pub fn status(&self, id: &AppId) -> Option<ProcessStatus> {
    self.inner.processes.lock().get(id).map(|slot| match slot.state {
      ProcessState::Active(_) => ProcessStatus::Active,
      ProcessState::Terminated => ProcessStatus::Terminated,
    })
  }

  /// All known processes, sorted by id.
  pub fn processes(&self) -> Vec<(AppId, ProcessStatus)> {
    let mut all: Vec<(AppId, ProcessStatus)> = self
      .inner
      .processes
      .lock()
      .iter()
      .map(|(id, slot)| {
        let status = match slot.state {
          ProcessState::Active(_) => ProcessStatus::Active,
          ProcessState::Terminated => ProcessStatus::Terminated,
        };
        (id.clone(), status)
      })
      .collect();
    all.sort_by(|a, b| a.0.cmp(&b.0));
    all
  }
}

// =============================================================================
// Acquisition - used by ProcessContext
// =============================================================================

impl ProcessLedger {
  /// Run `f` against the active resource set of `id` while holding the ledger
  /// lock, so the handle it records is tracked before the caller sees it.
  fn with_active<R>(
    &self,
    id: &AppId,
    f: impl FnOnce(&mut ResourceSet, TimingProbe) -> R,
  ) -> ShellResult<R> {
    let now = self.inner.host.now();
    let mut processes = self.inner.processes.lock();
    let revive = self.inner.config.revival == RevivalPolicy::Revive;

    if !processes.contains_key(id) {
      if !revive {
        return Err(ShellError::ProcessTerminated(id.clone()));
      }
      log::warn!("Resource requested for unknown process {id}; creating it");
      processes.insert(
        id.clone(),
        ProcessSlot {
          state: ProcessState::Terminated,
          stats: Arc::new(Mutex::new(ProcessStats::started_at(now))),
          generation: 1,
        },
      );
    }
    let Some(slot) = processes.get_mut(id) else {
      return Err(ShellError::Internal(format!("process {id} vanished")));
    };

    if matches!(slot.state, ProcessState::Terminated) {
      if !revive {
        log::warn!("Resource requested for terminated process {id}; refusing");
        return Err(ShellError::ProcessTerminated(id.clone()));
      }
      log::warn!("Resource requested for terminated process {id}; reviving with an empty queue");
      slot.state = ProcessState::Active(ResourceSet::default());
    }

    let probe = TimingProbe::new(
      Arc::clone(&self.inner.host),
      Arc::clone(&slot.stats),
      self.inner.config.long_task_threshold,
      self.inner.config.stats_log_capacity,
    );
    match &mut slot.state {
      ProcessState::Active(set) => Ok(f(set, probe)),
      ProcessState::Terminated => Err(ShellError::Internal(format!(
        "process {id} not active after revival"
      ))),
    }
  }

  /// Remove a fired one-shot handle, if the process still tracks it.
  fn forget(inner: &Weak<LedgerInner>, id: &AppId, f: impl FnOnce(&mut ResourceSet) -> bool) {
    let Some(inner) = inner.upgrade() else {
      return;
    };
    let mut processes = inner.processes.lock();
    if let Some(ProcessSlot {
      state: ProcessState::Active(set),
      ..
    }) = processes.get_mut(id)
    {
      f(set);
    }
  }

  pub(crate) fn set_interval(
    &self,
    id: &AppId,
    period: Duration,
    callback: Arc<dyn Fn() + Send + Sync>,
  ) -> ShellResult<TimerHandle> {
    let host = Arc::clone(&self.inner.host);
    self.with_active(id, |set, probe| {
      let handle = host.set_interval(
        period,
        Arc::new(move || probe.measure(TaskSource::Interval, || callback())),
      );
      set.add_interval(handle);
      handle
    })
  }

  pub(crate) fn set_timeout(
    &self,
    id: &AppId,
    delay: Duration,
    callback: Arc<dyn Fn() + Send + Sync>,
  ) -> ShellResult<TimerHandle> {
    let host = Arc::clone(&self.inner.host);
    let weak = Arc::downgrade(&self.inner);
    let owner = id.clone();
    self.with_active(id, |set, probe| {
      let slot: Arc<OnceLock<TimerHandle>> = Arc::new(OnceLock::new());
      let fired = Arc::clone(&slot);
      let handle = host.set_timeout(
        delay,
        Arc::new(move || {
          if let Some(handle) = fired.get().copied() {
            Self::forget(&weak, &owner, |set| set.remove_timer(handle));
          }
          probe.measure(TaskSource::Timeout, || callback());
        }),
      );
      drop(slot.set(handle));
      set.add_timeout(handle);
      handle
    })
  }

  pub(crate) fn clear_timer(&self, id: &AppId, handle: TimerHandle) {
    Self::forget(&Arc::downgrade(&self.inner), id, |set| set.remove_timer(handle));
    self.inner.host.clear_timer(handle);
  }

  pub(crate) fn request_tick(
    &self,
    id: &AppId,
    callback: Arc<dyn Fn(Duration) + Send + Sync>,
  ) -> ShellResult<TickHandle> {
    let host = Arc::clone(&self.inner.host);
    let weak = Arc::downgrade(&self.inner);
    let owner = id.clone();
    self.with_active(id, |set, probe| {
      let slot: Arc<OnceLock<TickHandle>> = Arc::new(OnceLock::new());
      let fired = Arc::clone(&slot);
      let handle = host.request_tick(Arc::new(move |frame| {
        if let Some(handle) = fired.get().copied() {
          Self::forget(&weak, &owner, |set| set.remove_tick(handle));
        }
        probe.measure(TaskSource::Tick, || callback(frame));
      }));
      drop(slot.set(handle));
      set.add_tick(handle);
      handle
    })
  }

  pub(crate) fn cancel_tick(&self, id: &AppId, handle: TickHandle) {
    Self::forget(&Arc::downgrade(&self.inner), id, |set| set.remove_tick(handle));
    self.inner.host.cancel_tick(handle);
  }

  pub(crate) fn add_listener(
    &self,
    id: &AppId,
    element: ElementRef,
    event_type: &str,
    callback: Arc<dyn Fn(&UiEvent) + Send + Sync>,
    options: ListenerOptions,
  ) -> ShellResult<ListenerHandle> {
    let host = Arc::clone(&self.inner.host);
    let weak = Arc::downgrade(&self.inner);
    let owner = id.clone();
    self.with_active(id, |set, probe| {
      let slot: Arc<OnceLock<ListenerHandle>> = Arc::new(OnceLock::new());
      let fired = Arc::clone(&slot);
      let handle = host.add_listener(
        element,
        event_type,
        Arc::new(move |event: &UiEvent| {
          if options.once {
            if let Some(handle) = fired.get().copied() {
              Self::forget(&weak, &owner, |set| set.remove_listener(handle));
            }
          }
          probe.measure(TaskSource::Listener, || callback(event));
        }),
        options,
      );
      drop(slot.set(handle));
      set.add_listener(ListenerRecord {
        handle,
        element,
        event_type: event_type.to_string(),
      });
      handle
    })
  }

  pub(crate) fn remove_listener(&self, id: &AppId, handle: ListenerHandle) {
    Self::forget(&Arc::downgrade(&self.inner), id, |set| set.remove_listener(handle));
    self.inner.host.remove_listener(handle);
  }

  pub(crate) fn subscribe(
    &self,
    id: &AppId,
    topic: &str,
    handler: Arc<dyn Fn(&Value) + Send + Sync>,
  ) -> ShellResult<SubscriptionId> {
    let bus = self.inner.bus.clone();
    self.with_active(id, |set, probe| {
      let sub = bus.on(topic, move |data| probe.measure(TaskSource::Bus, || handler(data)));
      set.add_subscription(topic, sub);
      sub
    })
  }

  pub(crate) fn unsubscribe(&self, id: &AppId, topic: &str, sub: SubscriptionId) {
    Self::forget(&Arc::downgrade(&self.inner), id, |set| set.remove_subscription(sub));
    self.inner.bus.off(topic, sub);
  }

  pub(crate) fn on_cleanup(
    &self,
    id: &AppId,
    cleanup: Box<dyn FnOnce() + Send>,
  ) -> ShellResult<()> {
    self.with_active(id, |set, _| set.add_cleanup(cleanup))
  }

  pub(crate) fn host(&self) -> &Arc<dyn Host> {
    &self.inner.host
  }
}
