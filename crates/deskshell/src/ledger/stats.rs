/*! Per-process performance accounting. */

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use ts_rs::TS;

use crate::host::Host;

/// Which wrapped primitive ran the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TaskSource {
  Interval,
  Timeout,
  Tick,
  Listener,
  Bus,
}

/// One callback that ran past the long-task threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LongTask {
  pub source: TaskSource,
  /// Host time at which the callback started, in milliseconds.
  pub started_ms: f64,
  pub duration_ms: f64,
}

/// Cumulative stats for one process. Survives `kill` for inspection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProcessStats {
  pub started_ms: f64,
  pub last_active_ms: f64,
  pub busy_ms: f64,
  pub invocations: u64,
  pub long_task_count: u64,
  pub long_task_ms: f64,
  /// Most recent long tasks, oldest first.
  pub log: Vec<LongTask>,
}

impl ProcessStats {
  pub(crate) fn started_at(now: Duration) -> Self {
    Self {
      started_ms: millis(now),
      last_active_ms: millis(now),
      ..Self::default()
    }
  }
}

fn millis(d: Duration) -> f64 {
  d.as_secs_f64() * 1000.0
}

/// Wraps callbacks with a busy-time measurement against the host clock.
#[derive(Clone)]
pub(crate) struct TimingProbe {
  host: Arc<dyn Host>,
  stats: Arc<Mutex<ProcessStats>>,
  threshold: Duration,
  capacity: usize,
}

impl TimingProbe {
  pub(crate) fn new(
    host: Arc<dyn Host>,
    stats: Arc<Mutex<ProcessStats>>,
    threshold: Duration,
    capacity: usize,
  ) -> Self {
    Self {
      host,
      stats,
      threshold,
      capacity,
    }
  }

  /// Run `f` and account its duration.
  pub(crate) fn measure<R>(&self, source: TaskSource, f: impl FnOnce() -> R) -> R {
    let start = self.host.now();
    let result = f();
    let end = self.host.now();
    self.record(source, start, end.saturating_sub(start));
    result
  }

  fn record(&self, source: TaskSource, start: Duration, elapsed: Duration) {
    let mut stats = self.stats.lock();
    stats.invocations += 1;
    stats.busy_ms += millis(elapsed);
    stats.last_active_ms = millis(start + elapsed);

    if elapsed > self.threshold {
      stats.long_task_count += 1;
      stats.long_task_ms += millis(elapsed);
      stats.log.push(LongTask {
        source,
        started_ms: millis(start),
        duration_ms: millis(elapsed),
      });
      if stats.log.len() > self.capacity {
        let overflow = stats.log.len() - self.capacity;
        stats.log.drain(..overflow);
      }
      log::debug!(
        "Long task ({source:?}) took {:.1}ms",
        millis(elapsed)
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::LoopHost;

  fn probe(host: &Arc<LoopHost>, capacity: usize) -> (TimingProbe, Arc<Mutex<ProcessStats>>) {
    let stats = Arc::new(Mutex::new(ProcessStats::started_at(host.now())));
    let probe = TimingProbe::new(
      Arc::clone(host) as Arc<dyn Host>,
      Arc::clone(&stats),
      Duration::from_millis(50),
      capacity,
    );
    (probe, stats)
  }

  #[test]
  fn short_callbacks_accumulate_busy_time_only() {
    let host = Arc::new(LoopHost::new());
    let (probe, stats) = probe(&host, 50);

    probe.measure(TaskSource::Timeout, || host.block_for(Duration::from_millis(10)));
    probe.measure(TaskSource::Timeout, || host.block_for(Duration::from_millis(5)));

    let stats = stats.lock();
    assert_eq!(stats.invocations, 2);
    assert!((stats.busy_ms - 15.0).abs() < 1e-9);
    assert_eq!(stats.long_task_count, 0);
    assert!(stats.log.is_empty());
    assert!((stats.last_active_ms - 15.0).abs() < 1e-9);
  }

  #[test]
  fn long_callbacks_are_logged() {
    let host = Arc::new(LoopHost::new());
    let (probe, stats) = probe(&host, 50);

    probe.measure(TaskSource::Tick, || host.block_for(Duration::from_millis(60)));

    let stats = stats.lock();
    assert_eq!(stats.long_task_count, 1);
    assert!((stats.long_task_ms - 60.0).abs() < 1e-9);
    assert_eq!(stats.log[0].source, TaskSource::Tick);
  }

  #[test]
  fn threshold_itself_is_not_a_long_task() {
    let host = Arc::new(LoopHost::new());
    let (probe, stats) = probe(&host, 50);

    probe.measure(TaskSource::Timeout, || host.block_for(Duration::from_millis(50)));
    assert_eq!(stats.lock().long_task_count, 0);

    probe.measure(TaskSource::Timeout, || host.block_for(Duration::from_millis(51)));
    let stats = stats.lock();
    assert_eq!(stats.long_task_count, 1);
    assert!((stats.long_task_ms - 51.0).abs() < 1e-9);
  }

  #[test]
  fn log_keeps_only_most_recent_entries() {
    let host = Arc::new(LoopHost::new());
    let (probe, stats) = probe(&host, 3);

    for ms in [51, 52, 53, 54, 55] {
      probe.measure(TaskSource::Interval, || host.block_for(Duration::from_millis(ms)));
    }

    let stats = stats.lock();
    assert_eq!(stats.long_task_count, 5);
    let durations: Vec<f64> = stats.log.iter().map(|t| t.duration_ms.round()).collect();
    assert_eq!(durations, vec![53.0, 54.0, 55.0]);
  }
}
