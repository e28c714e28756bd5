/*!
Window teardown.

`force_cleanup` is synchronous and idempotent. `cleanup` first awaits the
window's shutdown hook (if any) and then forces the teardown; the whole
graceful path races the configured `TimeoutPolicy`, and whichever side finishes
first decides the outcome. A hook that loses the race is dropped unfinished.
*/

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::WindowRegistry;
use crate::config::{TimeoutFallback, TimeoutPolicy};
use crate::resources::{ReleaseReport, WINDOW_TEARDOWN};
use crate::types::AppId;

/// How a `cleanup` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CleanupOutcome {
  /// The shutdown hook finished in time and the entry was released.
  Graceful,
  /// The timeout won; the policy fallback was applied.
  TimedOut,
  /// Nothing was registered under the id.
  Missing,
}

impl WindowRegistry {
  /// Tear down `id` now: listeners, timers, subscriptions and connections,
  /// then detach the root surface if the host still has it attached.
  ///
  /// Returns None when the window is not registered (already cleaned).
  pub fn force_cleanup(&self, id: &AppId) -> Option<ReleaseReport> {
    self.release_entry(id, None)
  }

  /// Graceful cleanup with the configured timeout policy.
  pub async fn cleanup(&self, id: &AppId) -> CleanupOutcome {
    self.cleanup_with(id, self.inner.config.cleanup).await
  }

  /// Graceful cleanup raced against `policy.duration`.
  pub async fn cleanup_with(&self, id: &AppId, policy: TimeoutPolicy) -> CleanupOutcome {
    let claimed = {
      let mut entries = self.inner.entries.lock();
      entries
        .get_mut(id)
        .map(|entry| (entry.seq, entry.shutdown.take()))
    };
    let Some((seq, hook)) = claimed else {
      log::debug!("cleanup({id}): not registered");
      return CleanupOutcome::Missing;
    };

    let graceful = async {
      if let Some(hook) = hook {
        hook().await;
      }
      self.release_entry(id, Some(seq));
    };

    if tokio::time::timeout(policy.duration, graceful).await.is_ok() {
      log::debug!("Window {id} cleaned up gracefully");
      return CleanupOutcome::Graceful;
    }

    match policy.fallback {
      TimeoutFallback::ForceCleanup => {
        log::warn!(
          "Cleanup of window {id} timed out after {:?}; forcing teardown",
          policy.duration
        );
        self.release_entry(id, Some(seq));
      }
      TimeoutFallback::LogOnly => {
        log::warn!(
          "Cleanup of window {id} timed out after {:?}; leaving it registered",
          policy.duration
        );
      }
    }
    CleanupOutcome::TimedOut
  }

  /// Remove the entry (optionally only generation `seq`) and release it
  /// outside the lock.
  pub(super) fn release_entry(&self, id: &AppId, seq: Option<u64>) -> Option<ReleaseReport> {
    let entry = {
      let mut entries = self.inner.entries.lock();
      match entries.get(id) {
        Some(entry) if seq.is_none_or(|seq| entry.seq == seq) => entries.remove(id),
        _ => None,
      }
    }?;

    let host = self.inner.host.as_ref();
    let report = entry
      .resources
      .release(&WINDOW_TEARDOWN, host, &self.inner.bus, id);
    if let Some(surface) = entry.surface {
      if host.is_attached(surface) {
        host.detach_surface(surface);
      }
    }
    log::debug!("Window {id} cleaned ({} resources)", report.released.total);
    Some(report)
  }
}
