/*!
Event bus - synchronous, in-process publish/subscribe keyed by topic name.

The bus is the coordination backbone: the compositor announces lifecycle
changes on it, the ledger and registry route app subscriptions through it, and
the memory monitor falls back to it for close requests.

## Guarantees

- Handlers for one emit run in registration order.
- A panicking handler is logged and skipped; later handlers still run.
- Handlers are snapshotted before invocation. A handler may emit, subscribe or
  unsubscribe without deadlocking; changes apply from the next emit.
- No ordering across topics, no cross-thread delivery semantics beyond the
  async stream returned by [`EventBus::subscribe`].
*/

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::isolate::guarded;
use crate::types::{BusEvent, SubscriptionId};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Topic handler. Compared by pointer for [`EventBus::off_handler`].
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Registration {
  id: SubscriptionId,
  handler: Handler,
  once: bool,
}

struct BusInner {
  handlers: Mutex<HashMap<String, Vec<Registration>>>,
  next_id: AtomicU64,
  events_tx: Sender<BusEvent>,
  events_keepalive: InactiveReceiver<BusEvent>,
}

/// Shared event bus. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct EventBus {
  inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventBus")
      .field("topics", &self.topics())
      .finish_non_exhaustive()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}

impl EventBus {
  /// Create a bus with no subscribers.
  pub fn new() -> Self {
    let (mut tx, rx) = async_broadcast::broadcast(EVENT_CHANNEL_CAPACITY);
    tx.set_overflow(true); // Drop oldest messages when full

    Self {
      inner: Arc::new(BusInner {
        handlers: Mutex::new(HashMap::new()),
        next_id: AtomicU64::new(1),
        events_tx: tx,
        events_keepalive: rx.deactivate(),
      }),
    }
  }

  /// Append a handler for `topic`.
  pub fn on(&self, topic: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> SubscriptionId {
    self.register(topic, Arc::new(handler), false)
  }

  /// Append an already-shared handler for `topic`.
  pub fn on_handler(&self, topic: &str, handler: Handler) -> SubscriptionId {
    self.register(topic, handler, false)
  }

  /// Append a handler that unsubscribes itself after its first invocation.
  pub fn once(
    &self,
    topic: &str,
    handler: impl Fn(&Value) + Send + Sync + 'static,
  ) -> SubscriptionId {
    self.register(topic, Arc::new(handler), true)
  }

  fn register(&self, topic: &str, handler: Handler, once: bool) -> SubscriptionId {
    let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .inner
      .handlers
      .lock()
      .entry(topic.to_string())
      .or_default()
      .push(Registration { id, handler, once });
    id
  }

  /// Remove a subscription. Returns false if it was not registered.
  pub fn off(&self, topic: &str, id: SubscriptionId) -> bool {
    self.remove_where(topic, |r| r.id == id)
  }

  /// Remove every registration of `handler` (pointer equality).
  pub fn off_handler(&self, topic: &str, handler: &Handler) -> bool {
    self.remove_where(topic, |r| Arc::ptr_eq(&r.handler, handler))
  }

  fn remove_where(&self, topic: &str, pred: impl Fn(&Registration) -> bool) -> bool {
    let mut handlers = self.inner.handlers.lock();
    let Some(list) = handlers.get_mut(topic) else {
      return false;
    };
    let before = list.len();
    list.retain(|r| !pred(r));
    let removed = list.len() != before;
    if list.is_empty() {
      handlers.remove(topic);
    }
    removed
  }

  /// Invoke every current handler for `topic` in registration order.
  ///
  /// Returns the number of handlers that completed without panicking.
  pub fn emit(&self, topic: &str, data: Value) -> usize {
    let snapshot: Vec<Handler> = {
      let mut handlers = self.inner.handlers.lock();
      let mut snapshot = Vec::new();
      let mut now_empty = false;
      if let Some(list) = handlers.get_mut(topic) {
        snapshot = list.iter().map(|r| Arc::clone(&r.handler)).collect();
        // One-shot handlers leave before running so re-entrant emits skip them.
        list.retain(|r| !r.once);
        now_empty = list.is_empty();
      }
      if now_empty {
        handlers.remove(topic);
      }
      snapshot
    };

    let mut completed = 0;
    for handler in snapshot {
      if guarded(&format!("bus handler for '{topic}'"), || handler(&data)).is_some() {
        completed += 1;
      }
    }

    self.forward(topic, data);
    completed
  }

  /// Serialize `payload` and emit it.
  pub fn emit_payload<T: Serialize>(&self, topic: &str, payload: &T) -> usize {
    match serde_json::to_value(payload) {
      Ok(data) => self.emit(topic, data),
      Err(e) => {
        log::error!("Failed to serialize payload for '{topic}': {e}");
        self.emit(topic, Value::Null)
      }
    }
  }

  fn forward(&self, topic: &str, data: Value) {
    let event = BusEvent {
      topic: topic.to_string(),
      data,
    };
    if let Err(e) = self.inner.events_tx.try_broadcast(event) {
      if e.is_full() {
        log::error!(
          "Bus stream overflow - events are being dropped. \
           Consider increasing EVENT_CHANNEL_CAPACITY or draining the stream faster."
        );
      }
    }
  }

  /// Async stream of every event emitted from now on.
  pub fn subscribe(&self) -> Receiver<BusEvent> {
    self.inner.events_keepalive.activate_cloned()
  }

  /// Number of handlers registered for `topic`.
  pub fn listener_count(&self, topic: &str) -> usize {
    self.inner.handlers.lock().get(topic).map_or(0, Vec::len)
  }

  /// Topics with at least one handler.
  pub fn topics(&self) -> Vec<String> {
    let mut topics: Vec<String> = self.inner.handlers.lock().keys().cloned().collect();
    topics.sort();
    topics
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::AtomicUsize;

  fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    let make = move |name: &'static str| -> Handler {
      let log = Arc::clone(&log_clone);
      Arc::new(move |_: &Value| log.lock().push(name.to_string()))
    };
    (log, make)
  }

  #[test]
  fn handlers_run_in_registration_order() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    bus.on_handler("t", make("a"));
    bus.on_handler("t", make("b"));
    bus.on_handler("t", make("c"));

    assert_eq!(bus.emit("t", Value::Null), 3);
    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
  }

  #[test]
  fn off_removes_by_id() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    let a = bus.on_handler("t", make("a"));
    bus.on_handler("t", make("b"));

    assert!(bus.off("t", a));
    assert!(!bus.off("t", a), "second off is a no-op");
    bus.emit("t", Value::Null);
    assert_eq!(*log.lock(), vec!["b"]);
  }

  #[test]
  fn off_handler_uses_pointer_equality() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    let shared = make("a");
    bus.on_handler("t", Arc::clone(&shared));
    bus.on_handler("t", make("a"));

    assert!(bus.off_handler("t", &shared));
    bus.emit("t", Value::Null);
    assert_eq!(log.lock().len(), 1, "the other closure stays registered");
  }

  #[test]
  fn once_fires_a_single_time() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    bus.once("t", move |_| {
      c.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit("t", Value::Null);
    bus.emit("t", Value::Null);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count("t"), 0);
  }

  #[test]
  fn panicking_handler_does_not_block_later_handlers() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    bus.on_handler("t", make("before"));
    bus.on("t", |_| panic!("handler failure"));
    bus.on_handler("t", make("after"));

    let completed = bus.emit("t", Value::Null);
    assert_eq!(completed, 2);
    assert_eq!(*log.lock(), vec!["before", "after"]);
  }

  #[test]
  fn handlers_can_reenter_the_bus() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    let inner_handler = make("inner");
    let bus_clone = bus.clone();
    bus.on("outer", move |_| {
      bus_clone.on_handler("inner", Arc::clone(&inner_handler));
      bus_clone.emit("inner", Value::Null);
    });

    bus.emit("outer", Value::Null);
    assert_eq!(*log.lock(), vec!["inner"]);
  }

  #[test]
  fn payload_is_passed_through() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Value::Null));
    let s = Arc::clone(&seen);
    bus.on("t", move |data| *s.lock() = data.clone());

    bus.emit("t", json!({ "id": "notes" }));
    assert_eq!(seen.lock()["id"], "notes");
  }

  #[test]
  fn emit_without_handlers_returns_zero() {
    let bus = EventBus::new();
    assert_eq!(bus.emit("nobody", Value::Null), 0);
  }

  #[test]
  fn stream_receives_emitted_events() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    bus.emit("app:opened", json!({ "id": "x" }));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.topic, "app:opened");
    assert_eq!(event.data["id"], "x");
  }
}
