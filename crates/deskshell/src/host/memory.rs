/*! Reference memory probes. */

use parking_lot::Mutex;

use super::traits::{MemoryProbe, MemoryUsage};

/// Probe for hosts without memory introspection. Always reports `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedMemoryProbe;

impl MemoryProbe for UnsupportedMemoryProbe {
  fn sample(&self) -> Option<MemoryUsage> {
    None
  }
}

/// Probe that reports whatever was last stored with `set`.
#[derive(Debug, Default)]
pub struct StaticMemoryProbe {
  usage: Mutex<Option<MemoryUsage>>,
}

impl StaticMemoryProbe {
  /// A probe that reports fixed figures.
  pub fn new(used_bytes: u64, limit_bytes: u64) -> Self {
    Self {
      usage: Mutex::new(Some(MemoryUsage {
        used_bytes,
        limit_bytes,
      })),
    }
  }

  /// Change the reported figures.
  pub fn set(&self, used_bytes: u64, limit_bytes: u64) {
    *self.usage.lock() = Some(MemoryUsage {
      used_bytes,
      limit_bytes,
    });
  }
}

impl MemoryProbe for StaticMemoryProbe {
  fn sample(&self) -> Option<MemoryUsage> {
    *self.usage.lock()
  }
}
