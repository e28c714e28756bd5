/*!
Shell configuration.

Every struct has a `Default` matching the shell's documented defaults and can be
deserialized from JSON, so embedders can ship partial overrides.
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_LONG_TASK_MS: u64 = 50;
const DEFAULT_STATS_LOG_CAPACITY: usize = 50;
const DEFAULT_CLEANUP_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MONITOR_INTERVAL_MS: u64 = 30_000;
const DEFAULT_PRESSURE_RATIO: f64 = 0.8;
const DEFAULT_ABSOLUTE_THRESHOLD_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_RESTART_DELAY_MS: u64 = 1_000;
const DEFAULT_DRAG_THRESHOLD: f64 = 5.0;

/// What happens when a resource acquisition targets a terminated process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevivalPolicy {
  /// Refuse with `ShellError::ProcessTerminated`.
  #[default]
  Reject,
  /// Recreate an empty resource queue and carry on (logged).
  Revive,
}

/// Process ledger settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
  /// Callbacks running longer than this count as long tasks.
  #[serde(with = "millis")]
  pub long_task_threshold: Duration,
  /// Long tasks kept per process (most recent first out).
  pub stats_log_capacity: usize,
  pub revival: RevivalPolicy,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      long_task_threshold: Duration::from_millis(DEFAULT_LONG_TASK_MS),
      stats_log_capacity: DEFAULT_STATS_LOG_CAPACITY,
      revival: RevivalPolicy::default(),
    }
  }
}

/// Action taken when graceful window cleanup does not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutFallback {
  /// Tear the window down synchronously.
  #[default]
  ForceCleanup,
  /// Leave the entry registered so a later eviction can retry.
  LogOnly,
}

/// Graceful-versus-timeout policy for window cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
  #[serde(with = "millis")]
  pub duration: Duration,
  pub fallback: TimeoutFallback,
}

impl Default for TimeoutPolicy {
  fn default() -> Self {
    Self {
      duration: Duration::from_millis(DEFAULT_CLEANUP_TIMEOUT_MS),
      fallback: TimeoutFallback::default(),
    }
  }
}

/// Window registry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  pub cleanup: TimeoutPolicy,
}

/// Memory pressure monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
  /// Sampling period. Anything below 1ms runs at 1ms.
  #[serde(with = "millis")]
  pub interval: Duration,
  /// Used/limit ratio above which the monitor evicts.
  pub ratio_threshold: f64,
  /// Absolute usage above which the monitor evicts. None disables the check.
  pub absolute_threshold_bytes: Option<u64>,
}

impl Default for MonitorConfig {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
      ratio_threshold: DEFAULT_PRESSURE_RATIO,
      absolute_threshold_bytes: Some(DEFAULT_ABSOLUTE_THRESHOLD_BYTES),
    }
  }
}

/// Compositor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
  /// Delay before a closed system window is reopened.
  #[serde(with = "millis")]
  pub restart_delay: Duration,
  /// Pointer travel (either axis) before a press becomes a drag.
  pub drag_threshold: f64,
}

impl Default for CompositorConfig {
  fn default() -> Self {
    Self {
      restart_delay: Duration::from_millis(DEFAULT_RESTART_DELAY_MS),
      drag_threshold: DEFAULT_DRAG_THRESHOLD,
    }
  }
}

/// Top-level configuration for a `Shell`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
  pub ledger: LedgerConfig,
  pub registry: RegistryConfig,
  pub monitor: MonitorConfig,
  pub compositor: CompositorConfig,
}

/// Durations as integer milliseconds on the wire.
mod millis {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
  }

  pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
  }
}
