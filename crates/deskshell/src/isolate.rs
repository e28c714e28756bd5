/*!
Failure isolation for user-supplied callbacks.

Bus handlers, cleanup hooks and timer callbacks are third-party code. A panic in
one of them must not unwind through the shell and skip the remaining work.
*/

use std::panic::{self, AssertUnwindSafe};

/// Run `f`, converting a panic into `None` and logging it under `label`.
pub(crate) fn guarded<R>(label: &str, f: impl FnOnce() -> R) -> Option<R> {
  match panic::catch_unwind(AssertUnwindSafe(f)) {
    Ok(value) => Some(value),
    Err(payload) => {
      log::error!("{label} panicked: {}", panic_message(payload.as_ref()));
      None
    }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    s
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.as_str()
  } else {
    "<non-string panic payload>"
  }
}
