/*!
Memory pressure monitor.

Samples host memory on a fixed interval while started. Under pressure it picks
the least-recently-used window from the registry, asks for it to be closed and
then cleans up its registry entry. One window per tick.

A host without memory introspection turns the monitor into a permanent no-op
the first time a sample comes back empty.

Consumers own the polling loop through `MonitorHandle`, which stops it on drop.
*/

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use ts_rs::TS;

use crate::bus::EventBus;
use crate::config::MonitorConfig;
use crate::host::{MemoryProbe, MemoryUsage};
use crate::isolate::guarded;
use crate::registry::WindowRegistry;
use crate::types::{topics, AppId, AppRef, ShellError, ShellResult};

/// Asks the window manager to close a window.
pub type CloseRequest = Arc<dyn Fn(&AppId) + Send + Sync>;

/// Shortest sampling period the loop accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one `check_memory` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PressureCheck {
  /// The host cannot report memory usage.
  Unsupported,
  Healthy(MemoryUsage),
  /// Under pressure; this window was evicted.
  Evicted(AppId),
  /// Under pressure but no window is registered.
  NothingToEvict(MemoryUsage),
}

/// Read-only monitor snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MonitorStatus {
  pub running: bool,
  pub supported: bool,
  pub last_usage: Option<MemoryUsage>,
  pub evictions: u64,
  pub interval_ms: u64,
}

#[derive(Default)]
struct MonitorState {
  /// Id of the loop currently allowed to run.
  active_run: Option<u64>,
  next_run: u64,
  unsupported: bool,
  last_usage: Option<MemoryUsage>,
  evictions: u64,
}

struct MonitorInner {
  registry: WindowRegistry,
  bus: EventBus,
  probe: Arc<dyn MemoryProbe>,
  close: Option<CloseRequest>,
  config: MonitorConfig,
  state: Mutex<MonitorState>,
}

/// Memory pressure evictor. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct MemoryMonitor {
  inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for MemoryMonitor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryMonitor")
      .field("status", &self.get_status())
      .finish_non_exhaustive()
  }
}

impl MemoryMonitor {
  /// `close` is invoked for each evicted window. Without it the monitor emits
  /// `system:close_window` on the bus instead.
  pub fn new(
    registry: WindowRegistry,
    bus: EventBus,
    probe: Arc<dyn MemoryProbe>,
    close: Option<CloseRequest>,
    config: MonitorConfig,
  ) -> Self {
    Self {
      inner: Arc::new(MonitorInner {
        registry,
        bus,
        probe,
        close,
        config,
        state: Mutex::new(MonitorState::default()),
      }),
    }
  }

  /// Run one sampling pass.
  pub async fn check_memory(&self) -> PressureCheck {
    if self.inner.state.lock().unsupported {
      return PressureCheck::Unsupported;
    }

    let Some(usage) = self.inner.probe.sample() else {
      self.inner.state.lock().unsupported = true;
      log::info!("Host memory usage is unavailable; memory monitor disabled");
      return PressureCheck::Unsupported;
    };
    self.inner.state.lock().last_usage = Some(usage);

    if !self.under_pressure(usage) {
      return PressureCheck::Healthy(usage);
    }

    log::warn!(
      "Memory pressure: {} of {} bytes ({:.0}%)",
      usage.used_bytes,
      usage.limit_bytes,
      usage.ratio() * 100.0
    );
    let Some(id) = self.inner.registry.get_least_recently_used(1).into_iter().next() else {
      log::debug!("Memory pressure but no window to evict");
      return PressureCheck::NothingToEvict(usage);
    };
    self.evict(&id).await;
    PressureCheck::Evicted(id)
  }

  fn under_pressure(&self, usage: MemoryUsage) -> bool {
    let config = &self.inner.config;
    usage.ratio() > config.ratio_threshold
      || config
        .absolute_threshold_bytes
        .is_some_and(|limit| usage.used_bytes > limit)
  }

  /// Evict the `count` least-recently-used windows regardless of pressure.
  /// Returns the evicted ids, oldest first.
  pub async fn force_release(&self, count: usize) -> Vec<AppId> {
    let victims = self.inner.registry.get_least_recently_used(count);
    for id in &victims {
      self.evict(id).await;
    }
    log::debug!("force_release({count}) evicted {} windows", victims.len());
    victims
  }

  async fn evict(&self, id: &AppId) {
    log::info!("Evicting window {id}");
    match &self.inner.close {
      Some(close) => {
        guarded(&format!("close request for {id}"), || close(id));
      }
      None => {
        self
          .inner
          .bus
          .emit_payload(topics::SYSTEM_CLOSE_WINDOW, &AppRef { id: id.clone() });
      }
    }
    self.inner.registry.cleanup(id).await;
    self.inner.state.lock().evictions += 1;
  }

  /// Start the sampling loop on the current tokio runtime.
  ///
  /// Starting again supersedes the previous loop. Dropping the returned handle
  /// stops the loop it controls.
  pub fn start(&self) -> ShellResult<MonitorHandle> {
    let runtime =
      tokio::runtime::Handle::try_current().map_err(|e| ShellError::NoRuntime(e.to_string()))?;

    let run = {
      let mut state = self.inner.state.lock();
      let run = state.next_run;
      state.next_run += 1;
      state.active_run = Some(run);
      run
    };

    let period = self.inner.config.interval.max(MIN_INTERVAL);
    let monitor = self.clone();
    let task = runtime.spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        if monitor.inner.state.lock().active_run != Some(run) {
          break;
        }
        monitor.check_memory().await;
      }
    });

    log::debug!("Memory monitor started (every {period:?})");
    Ok(MonitorHandle {
      monitor: self.clone(),
      run,
      task,
    })
  }

  /// True while a loop started by `start` is alive.
  pub fn is_running(&self) -> bool {
    self.inner.state.lock().active_run.is_some()
  }

  /// Running state, last sample and eviction count.
  pub fn get_status(&self) -> MonitorStatus {
    let state = self.inner.state.lock();
    MonitorStatus {
      running: state.active_run.is_some(),
      supported: !state.unsupported,
      last_usage: state.last_usage,
      evictions: state.evictions,
      interval_ms: u64::try_from(self.inner.config.interval.as_millis()).unwrap_or(u64::MAX),
    }
  }
}

/// Handle to a running monitor loop. Stops on drop.
pub struct MonitorHandle {
  monitor: MemoryMonitor,
  run: u64,
  task: JoinHandle<()>,
}

impl std::fmt::Debug for MonitorHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MonitorHandle")
      .field("run", &self.run)
      .finish_non_exhaustive()
  }
}

impl MonitorHandle {
  /// Stop the loop. Same as dropping the handle.
  pub fn stop(self) {
    drop(self);
  }
}

impl Drop for MonitorHandle {
  fn drop(&mut self) {
    self.task.abort();
    let mut state = self.monitor.inner.state.lock();
    if state.active_run == Some(self.run) {
      state.active_run = None;
      log::debug!("Memory monitor stopped");
    }
  }
}
