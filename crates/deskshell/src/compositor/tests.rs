use super::*;
use crate::config::{LedgerConfig, RegistryConfig};
use crate::host::LoopHost;
use crate::loader::{AppModule, ModuleCatalog, ModuleSource};
use crate::store::MemoryStore;
use crate::types::{topics, AppKind, AppMetadata, AppPatch, AppRecord, Point, ShellError};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store wrapper that counts position writes.
#[derive(Default)]
struct CountingStore {
  inner: MemoryStore,
  position_writes: AtomicUsize,
}

impl AppStore for CountingStore {
  fn get_app(&self, id: &AppId) -> Option<AppRecord> {
    self.inner.get_app(id)
  }

  fn update_app(&self, id: &AppId, patch: AppPatch) {
    if patch.position.is_some() || patch.icon_position.is_some() {
      self.position_writes.fetch_add(1, Ordering::SeqCst);
    }
    self.inner.update_app(id, patch);
  }

  fn set_app_metadata(&self, id: &AppId, metadata: AppMetadata) {
    self.inner.set_app_metadata(id, metadata);
  }

  fn get_lazy_app_path(&self, id: &AppId) -> Option<String> {
    self.inner.get_lazy_app_path(id)
  }
}

struct Desk {
  host: Arc<LoopHost>,
  bus: EventBus,
  store: Arc<CountingStore>,
  catalog: Arc<ModuleCatalog>,
  compositor: Compositor,
  events: Arc<parking_lot::Mutex<Vec<(String, Value)>>>,
}

impl Desk {
  fn new() -> Self {
    let _ = env_logger::builder().is_test(true).try_init();
    let host = Arc::new(LoopHost::new());
    let bus = EventBus::new();
    let store = Arc::new(CountingStore::default());
    let catalog = Arc::new(ModuleCatalog::new());
    let dyn_host: Arc<dyn Host> = Arc::clone(&host) as Arc<dyn Host>;
    let ledger = ProcessLedger::new(Arc::clone(&dyn_host), bus.clone(), LedgerConfig::default());
    let registry = WindowRegistry::new(Arc::clone(&dyn_host), bus.clone(), RegistryConfig::default());
    let loader = Loader::new(
      Arc::clone(&store) as Arc<dyn AppStore>,
      Arc::clone(&catalog) as Arc<dyn ModuleSource>,
    );
    let compositor = Compositor::new(
      dyn_host,
      bus.clone(),
      Arc::clone(&store) as Arc<dyn AppStore>,
      ledger,
      registry,
      loader,
      CompositorConfig::default(),
    );

    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for topic in [
      topics::APP_OPENED,
      topics::APP_CLOSED,
      topics::APP_DESTROYED,
      topics::APP_MINIMIZED,
      topics::APP_RENAMED,
      topics::WINDOW_FOCUS,
      topics::WINDOW_BLUR,
      topics::SYSTEM_SPEAK,
    ] {
      let sink = Arc::clone(&events);
      bus.on(topic, move |data| sink.lock().push((topic.to_string(), data.clone())));
    }

    Self {
      host,
      bus,
      store,
      catalog,
      compositor,
      events,
    }
  }

  fn with_apps(apps: &[AppMetadata]) -> Self {
    let desk = Self::new();
    for app in apps {
      desk.store.inner.register_app(app.clone());
    }
    desk
  }

  fn topics(&self) -> Vec<String> {
    self.events.lock().iter().map(|(t, _)| t.clone()).collect()
  }

  fn count(&self, topic: &str) -> usize {
    self.events.lock().iter().filter(|(t, _)| t == topic).count()
  }

  fn z(&self, id: &str) -> u32 {
    self.compositor.window(&id.into()).map_or(0, |w| w.z_index)
  }
}

fn id(s: &str) -> AppId {
  AppId::from(s)
}

fn app(name: &str) -> AppMetadata {
  AppMetadata::new(name, name.to_uppercase())
}

mod focus {
  use super::*;

  #[tokio::test]
  async fn z_index_strictly_increases_and_last_call_is_active() {
    let desk = Desk::with_apps(&[app("a"), app("b"), app("c")]);
    for name in ["a", "b", "c"] {
      desk.compositor.open(name, false).await.unwrap();
    }

    let mut last = 0;
    for name in ["a", "b", "a", "c"] {
      let z = desk.compositor.bring_to_front(&id(name)).unwrap();
      assert!(z > last, "{name} got {z} after {last}");
      assert_eq!(desk.z(name), z);
      assert_eq!(desk.compositor.active_window(), Some(id(name)));
      last = z;
    }

    let surface = desk.compositor.window(&id("c")).unwrap().surface.unwrap();
    assert_eq!(desk.host.surface(surface).unwrap().z_index, last);
    assert_eq!(desk.store.get_app(&id("c")).unwrap().z_index, Some(last));
  }

  #[tokio::test]
  async fn focus_change_blurs_previous() {
    let desk = Desk::with_apps(&[app("a"), app("b")]);
    desk.compositor.open("a", false).await.unwrap();
    desk.events.lock().clear();

    desk.compositor.open("b", false).await.unwrap();

    let events = desk.events.lock().clone();
    assert!(events.contains(&(topics::WINDOW_BLUR.to_string(), serde_json::json!({ "id": "a" }))));
    assert!(events.contains(&(
      topics::WINDOW_FOCUS.to_string(),
      serde_json::json!({ "id": "b", "z_index": 2 })
    )));
  }

  #[tokio::test]
  async fn unknown_or_service_cannot_be_focused() {
    let desk = Desk::with_apps(&[app("svc").with_kind(AppKind::Service)]);
    desk.compositor.open("svc", false).await.unwrap();

    assert!(matches!(
      desk.compositor.bring_to_front(&id("ghost")),
      Err(ShellError::WindowNotFound(_))
    ));
    assert!(matches!(
      desk.compositor.bring_to_front(&id("svc")),
      Err(ShellError::NotOpen(_))
    ));
  }
}

mod lifecycle {
  use super::*;

  #[tokio::test]
  async fn open_creates_surface_registers_and_persists() {
    let desk = Desk::with_apps(&[app("notes").with_position(Position::absolute(40.0, 50.0))]);

    let opened = desk.compositor.open("notes", false).await.unwrap();

    assert_eq!(opened, id("notes"));
    let window = desk.compositor.window(&id("notes")).unwrap();
    assert!(window.is_visible());
    let surface = desk.host.surface(window.surface.unwrap()).unwrap();
    assert!(surface.attached);
    assert_eq!(surface.position, Some(Position::absolute(40.0, 50.0)));
    assert!(desk.compositor.registry().contains(&id("notes")));
    assert!(desk.store.get_app(&id("notes")).unwrap().open);
    assert_eq!(desk.compositor.active_window(), Some(id("notes")));
    assert_eq!(desk.topics(), vec![topics::WINDOW_FOCUS, topics::APP_OPENED]);
  }

  #[tokio::test]
  async fn ready_topic_fires_per_app() {
    let desk = Desk::with_apps(&[app("notes")]);
    let ready = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ready);
    desk.bus.on(&topics::app_ready(&id("notes")), move |_| {
      r.fetch_add(1, Ordering::SeqCst);
    });

    desk.compositor.open("notes", false).await.unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn opening_twice_only_refocuses() {
    let desk = Desk::with_apps(&[app("a"), app("b")]);
    desk.compositor.open("a", false).await.unwrap();
    desk.compositor.open("b", false).await.unwrap();

    desk.compositor.open("a", false).await.unwrap();

    assert_eq!(desk.count(topics::APP_OPENED), 2);
    assert_eq!(desk.host.attached_surfaces().len(), 2);
    assert_eq!(desk.compositor.active_window(), Some(id("a")));
  }

  #[tokio::test]
  async fn announce_speaks_title() {
    let desk = Desk::with_apps(&[AppMetadata::new("notes", "Notes")]);
    desk.compositor.open("notes", true).await.unwrap();

    let events = desk.events.lock().clone();
    assert_eq!(
      events.first(),
      Some(&(
        topics::SYSTEM_SPEAK.to_string(),
        serde_json::json!({ "text": "Opening Notes" })
      ))
    );
  }

  #[tokio::test]
  async fn close_tears_everything_down() {
    let desk = Desk::with_apps(&[app("notes")]);
    desk.compositor.open("notes", false).await.unwrap();
    let surface = desk.compositor.window(&id("notes")).unwrap().surface.unwrap();

    let ctx = desk.compositor.ledger().get_context("notes");
    ctx.set_interval(Duration::from_millis(100), || {}).unwrap();
    let window = desk.compositor.registry().resources(&id("notes")).unwrap();
    window.set_timeout(Duration::from_secs(1), || {}).unwrap();
    assert_eq!(desk.host.pending_timers(), 2);

    desk.events.lock().clear();
    desk.compositor.close(&id("notes")).await.unwrap();

    assert!(!desk.host.surface(surface).is_some_and(|s| s.attached));
    assert_eq!(desk.host.pending_timers(), 0);
    assert!(desk.compositor.window(&id("notes")).is_none());
    assert!(!desk.compositor.registry().contains(&id("notes")));
    assert_eq!(desk.compositor.ledger().resource_count(&id("notes")).total, 0);
    assert!(!desk.store.get_app(&id("notes")).unwrap().open);
    assert_eq!(desk.compositor.active_window(), None);
    assert_eq!(desk.topics(), vec![topics::APP_CLOSED, topics::APP_DESTROYED]);
  }

  #[tokio::test]
  async fn close_of_unopened_window_is_an_error() {
    let desk = Desk::with_apps(&[app("notes")]);
    assert!(matches!(
      desk.compositor.close(&id("notes")).await,
      Err(ShellError::NotOpen(_))
    ));
  }

  #[tokio::test]
  async fn minimize_and_restore_keep_resources() {
    let desk = Desk::with_apps(&[app("notes")]);
    desk.compositor.open("notes", false).await.unwrap();
    let ctx = desk.compositor.ledger().get_context("notes");
    ctx.set_interval(Duration::from_millis(100), || {}).unwrap();
    let surface = desk.compositor.window(&id("notes")).unwrap().surface.unwrap();

    desk.compositor.minimize(&id("notes")).unwrap();

    assert!(!desk.host.surface(surface).unwrap().visible);
    assert_eq!(desk.compositor.active_window(), None);
    assert_eq!(desk.count(topics::WINDOW_BLUR), 1);
    assert_eq!(desk.count(topics::APP_MINIMIZED), 1);
    assert!(desk.store.get_app(&id("notes")).unwrap().minimized);
    assert_eq!(desk.host.pending_timers(), 1);

    desk.compositor.restore(&id("notes")).unwrap();
    assert!(desk.host.surface(surface).unwrap().visible);
    assert_eq!(desk.compositor.active_window(), None, "restore does not focus");
  }

  #[tokio::test]
  async fn rename_updates_record_metadata_and_bus() {
    let desk = Desk::with_apps(&[app("notes")]);
    desk.compositor.open("notes", false).await.unwrap();

    desk.compositor.rename(&id("notes"), "Shopping").unwrap();

    assert_eq!(desk.compositor.window(&id("notes")).unwrap().title, "Shopping");
    assert_eq!(
      desk.store.get_app(&id("notes")).unwrap().metadata.unwrap().title,
      "Shopping"
    );
    assert_eq!(desk.count(topics::APP_RENAMED), 1);
  }

  #[tokio::test]
  async fn service_apps_only_flip_open_flag() {
    let desk = Desk::with_apps(&[app("status").with_kind(AppKind::Service)]);

    desk.compositor.open("status", false).await.unwrap();

    let window = desk.compositor.window(&id("status")).unwrap();
    assert!(window.open);
    assert_eq!(window.surface, None);
    assert!(desk.host.attached_surfaces().is_empty());
    assert!(!desk.compositor.registry().contains(&id("status")));
    assert_eq!(desk.compositor.active_window(), None);
    let events = desk.events.lock().clone();
    assert_eq!(
      events,
      vec![(
        topics::APP_OPENED.to_string(),
        serde_json::json!({ "id": "status", "title": "STATUS", "windowed": false })
      )]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn system_windows_restart_after_delay() {
    let desk = Desk::with_apps(&[app("dock").with_kind(AppKind::System)]);
    desk.compositor.open("dock", false).await.unwrap();

    desk.compositor.close(&id("dock")).await.unwrap();
    assert!(!desk.compositor.is_open(&id("dock")));

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert!(!desk.compositor.is_open(&id("dock")));

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(desk.compositor.is_open(&id("dock")));
    assert_eq!(desk.count(topics::APP_OPENED), 2);
    assert_eq!(desk.host.attached_surfaces().len(), 1);
  }

  #[tokio::test]
  async fn fixed_anchored_window_ignores_persisted_position() {
    let desk = Desk::with_apps(&[app("tray")
      .with_position(Position::anchored(16.0, 16.0))
      .fixed()]);
    desk
      .store
      .update_app(&id("tray"), AppPatch::position(Position::absolute(900.0, 10.0)));

    desk.compositor.open("tray", false).await.unwrap();

    assert_eq!(
      desk.compositor.window(&id("tray")).unwrap().position,
      Position::anchored(16.0, 16.0)
    );
  }

  #[tokio::test]
  async fn persisted_position_is_reused() {
    let desk = Desk::with_apps(&[app("notes")]);
    desk
      .store
      .update_app(&id("notes"), AppPatch::position(Position::absolute(300.0, 120.0)));

    desk.compositor.open("notes", false).await.unwrap();

    assert_eq!(
      desk.compositor.window(&id("notes")).unwrap().position,
      Position::absolute(300.0, 120.0)
    );
  }
}

mod toggle {
  use super::*;

  #[tokio::test]
  async fn precedence() {
    let desk = Desk::with_apps(&[app("x"), app("y")]);
    let x = id("x");

    assert_eq!(desk.compositor.toggle(&x).await.unwrap(), Toggled::Opened);
    assert!(desk.compositor.is_open(&x));
    assert_eq!(desk.compositor.active_window(), Some(x.clone()));

    assert_eq!(desk.compositor.toggle(&x).await.unwrap(), Toggled::Minimized);
    assert!(desk.compositor.window(&x).unwrap().minimized);

    assert_eq!(desk.compositor.toggle(&x).await.unwrap(), Toggled::Restored);
    assert!(desk.compositor.window(&x).unwrap().is_visible());
    assert_eq!(desk.compositor.active_window(), Some(x.clone()));
  }

  #[tokio::test]
  async fn open_but_unfocused_gets_focus() {
    let desk = Desk::with_apps(&[app("x"), app("y")]);
    desk.compositor.open("x", false).await.unwrap();
    desk.compositor.open("y", false).await.unwrap();

    assert_eq!(desk.compositor.toggle(&id("x")).await.unwrap(), Toggled::Focused);
    assert_eq!(desk.compositor.active_window(), Some(id("x")));
    assert!(desk.z("x") > desk.z("y"));
  }

  #[tokio::test]
  async fn open_service_toggles_closed() {
    let desk = Desk::with_apps(&[app("svc").with_kind(AppKind::Service)]);
    assert_eq!(desk.compositor.toggle(&id("svc")).await.unwrap(), Toggled::Opened);
    assert_eq!(desk.compositor.toggle(&id("svc")).await.unwrap(), Toggled::Closed);
    assert!(!desk.compositor.is_open(&id("svc")));
  }
}

mod lazy {
  use super::*;

  #[tokio::test]
  async fn loads_registers_and_opens() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("billing", "apps/billing");
    desk
      .catalog
      .register_module("apps/billing", AppModule::new(AppMetadata::new("billing", "Billing")));
    assert!(desk.compositor.window(&id("billing")).is_none());

    desk.compositor.open("billing", false).await.unwrap();
    desk.compositor.close(&id("billing")).await.unwrap();
    desk.compositor.open("billing", false).await.unwrap();

    assert!(desk.compositor.is_open(&id("billing")));
    assert_eq!(desk.catalog.import_count("apps/billing"), 1, "imported on first use only");
  }

  #[tokio::test]
  async fn init_runs_in_the_process_context() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("clock", "apps/clock");
    desk.catalog.register_module(
      "apps/clock",
      AppModule::new(AppMetadata::new("clock", "Clock")).with_init(|ctx| {
        ctx
          .set_interval(Duration::from_secs(1), || {})
          .map(|_| ())
          .map_err(|e| e.to_string())
      }),
    );

    desk.compositor.open("clock", false).await.unwrap();
    assert_eq!(desk.compositor.ledger().resource_count(&id("clock")).timers, 1);

    desk.compositor.close(&id("clock")).await.unwrap();
    assert_eq!(desk.host.pending_timers(), 0);
  }

  #[tokio::test]
  async fn failing_init_still_opens() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("map", "apps/map");
    desk.catalog.register_module(
      "apps/map",
      AppModule::new(AppMetadata::new("map", "Map")).with_init(|_| Err("no gpu".to_string())),
    );

    desk.compositor.open("map", false).await.unwrap();
    assert!(desk.compositor.is_open(&id("map")));
  }

  #[tokio::test]
  async fn redirect_opens_declared_id() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("traffic", "apps/traffic");
    desk.catalog.register_module(
      "apps/traffic",
      AppModule::new(AppMetadata::new("traffic-widget", "Traffic")),
    );

    let opened = desk.compositor.open("traffic", false).await.unwrap();

    assert_eq!(opened, id("traffic-widget"));
    assert!(desk.compositor.is_open(&id("traffic-widget")));
    assert!(desk.compositor.window(&id("traffic")).is_none());
  }

  #[tokio::test]
  async fn redirected_id_reaches_the_loaded_window_without_reloading() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("traffic", "apps/traffic");
    desk.catalog.register_module(
      "apps/traffic",
      AppModule::new(AppMetadata::new("traffic-widget", "Traffic")).with_init(|ctx| {
        ctx
          .set_interval(Duration::from_secs(1), || {})
          .map(|_| ())
          .map_err(|e| e.to_string())
      }),
    );

    desk.compositor.open("traffic", false).await.unwrap();
    desk.host.advance(Duration::from_secs(3));
    let opened = desk.compositor.open("traffic", false).await.unwrap();
    let toggled = desk.compositor.toggle(&id("traffic")).await.unwrap();

    assert_eq!(opened, id("traffic-widget"));
    assert_eq!(toggled, Toggled::Minimized);
    assert_eq!(desk.catalog.import_count("apps/traffic"), 1);
    let ledger = desk.compositor.ledger();
    assert_eq!(ledger.resource_count(&id("traffic-widget")).timers, 1);
    assert_eq!(ledger.stats(&id("traffic-widget")).unwrap().invocations, 3);

    desk.compositor.close(&id("traffic")).await.unwrap();
    assert!(desk.compositor.windows().is_empty());
    assert_eq!(desk.host.pending_timers(), 0);
  }

  #[tokio::test]
  async fn failure_is_announced_and_leaves_nothing_open() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("broken", "apps/broken");
    desk.catalog.register("apps/broken", || Err("unexpected token".to_string()));

    let result = desk.compositor.open("broken", false).await;

    assert!(matches!(result, Err(ShellError::Load(_))));
    assert!(desk.compositor.windows().is_empty());
    assert!(desk.host.attached_surfaces().is_empty());
    assert_eq!(desk.topics(), vec![topics::SYSTEM_SPEAK]);
  }

  #[tokio::test]
  async fn missing_metadata_is_a_load_error() {
    let desk = Desk::new();
    desk.store.inner.register_lazy("empty", "apps/empty");
    desk.catalog.register_module("apps/empty", AppModule::default());

    assert!(matches!(
      desk.compositor.open("empty", false).await,
      Err(ShellError::Load(crate::types::LoadError::MissingMetadata { .. }))
    ));
    assert_eq!(desk.count(topics::SYSTEM_SPEAK), 1);
  }
}

mod drag {
  use super::*;

  async fn desk_with_window() -> Desk {
    let desk = Desk::with_apps(&[app("w").with_position(Position::absolute(100.0, 100.0))]);
    desk.compositor.open("w", false).await.unwrap();
    desk
  }

  #[tokio::test]
  async fn below_threshold_is_a_click_and_persists_nothing() {
    let desk = desk_with_window().await;

    assert!(desk
      .compositor
      .pointer_down(DragTarget::window("w"), Point::new(10.0, 10.0), false));
    assert_eq!(desk.compositor.pointer_move(Point::new(12.0, 11.0)), None);
    assert!(!desk.host.drag_overlay_visible());

    assert_eq!(
      desk.compositor.pointer_up(),
      DragOutcome::Click(DragTarget::window("w"))
    );
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 0);
    assert_eq!(
      desk.compositor.window(&id("w")).unwrap().position,
      Position::absolute(100.0, 100.0)
    );
  }

  #[tokio::test]
  async fn closing_the_dragged_window_abandons_the_drag() {
    let desk = Desk::with_apps(&[
      app("w").with_position(Position::absolute(100.0, 100.0)),
      app("other"),
    ]);
    desk.compositor.open("w", false).await.unwrap();
    desk.compositor.open("other", false).await.unwrap();

    desk
      .compositor
      .pointer_down(DragTarget::window("w"), Point::new(10.0, 10.0), false);
    desk.compositor.pointer_move(Point::new(50.0, 50.0));
    assert!(desk.host.drag_overlay_visible());

    desk.compositor.close(&id("other")).await.unwrap();
    assert!(desk.compositor.is_dragging(), "other windows leave the drag alone");

    desk.compositor.close(&id("w")).await.unwrap();

    assert!(!desk.compositor.is_dragging());
    assert!(!desk.host.drag_overlay_visible());
    assert_eq!(desk.compositor.pointer_up(), DragOutcome::None);
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn past_threshold_persists_exactly_once() {
    let desk = desk_with_window().await;
    desk
      .compositor
      .pointer_down(DragTarget::window("w"), Point::new(10.0, 10.0), false);
    desk.compositor.pointer_move(Point::new(12.0, 11.0));
    desk.compositor.pointer_up();

    desk
      .compositor
      .pointer_down(DragTarget::window("w"), Point::new(10.0, 10.0), false);
    assert_eq!(
      desk.compositor.pointer_move(Point::new(50.0, 50.0)),
      Some(Position::absolute(140.0, 140.0))
    );
    assert!(desk.host.drag_overlay_visible());
    assert!(desk.compositor.is_dragging());
    desk.compositor.pointer_move(Point::new(60.0, 55.0));
    let surface = desk.compositor.window(&id("w")).unwrap().surface.unwrap();
    assert_eq!(
      desk.host.surface(surface).unwrap().position,
      Some(Position::absolute(150.0, 145.0)),
      "live position follows the pointer"
    );
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 0);

    let outcome = desk.compositor.pointer_up();

    assert!(matches!(outcome, DragOutcome::Dropped(_, ref done) if done.position == Position::absolute(150.0, 145.0)));
    assert!(!desk.host.drag_overlay_visible());
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 1);
    assert_eq!(
      desk.store.get_app(&id("w")).unwrap().position,
      Some(Position::absolute(150.0, 145.0))
    );
    assert_eq!(desk.compositor.pointer_up(), DragOutcome::None);
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn controls_and_fixed_windows_never_drag() {
    let desk = Desk::with_apps(&[app("w"), app("tray").fixed()]);
    desk.compositor.open("w", false).await.unwrap();
    desk.compositor.open("tray", false).await.unwrap();

    assert!(!desk
      .compositor
      .pointer_down(DragTarget::window("w"), Point::new(0.0, 0.0), true));
    assert_eq!(desk.compositor.pointer_move(Point::new(80.0, 80.0)), None);
    assert_eq!(desk.compositor.pointer_up(), DragOutcome::None);

    assert!(!desk
      .compositor
      .pointer_down(DragTarget::window("tray"), Point::new(0.0, 0.0), false));
    assert_eq!(desk.compositor.pointer_move(Point::new(80.0, 80.0)), None);
    assert_eq!(desk.compositor.active_window(), Some(id("tray")), "press still focuses");
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn icons_share_the_machine() {
    let desk = Desk::with_apps(&[app("notes")]);
    desk
      .store
      .update_app(&id("notes"), AppPatch::icon_position(Position::absolute(20.0, 20.0)));
    let writes_before = desk.store.position_writes.load(Ordering::SeqCst);

    assert!(desk
      .compositor
      .pointer_down(DragTarget::icon("notes"), Point::new(25.0, 25.0), false));
    desk.compositor.pointer_move(Point::new(45.0, 35.0));
    assert_eq!(
      desk.compositor.icon_position(&id("notes")),
      Some(Position::absolute(40.0, 30.0))
    );
    desk.compositor.pointer_up();

    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), writes_before + 1);
    assert_eq!(
      desk.store.get_app(&id("notes")).unwrap().icon_position,
      Some(Position::absolute(40.0, 30.0))
    );
    assert!(desk.compositor.window(&id("notes")).is_none(), "icons do not open windows");
  }

  #[tokio::test]
  async fn cancel_hides_overlay_without_persisting() {
    let desk = desk_with_window().await;
    desk
      .compositor
      .pointer_down(DragTarget::window("w"), Point::new(0.0, 0.0), false);
    desk.compositor.pointer_move(Point::new(30.0, 0.0));

    desk.compositor.cancel_drag();

    assert!(!desk.host.drag_overlay_visible());
    assert_eq!(desk.compositor.pointer_up(), DragOutcome::None);
    assert_eq!(desk.store.position_writes.load(Ordering::SeqCst), 0);
  }
}

#[tokio::test]
async fn snapshot_lists_windows_back_to_front() {
  let desk = Desk::with_apps(&[app("a"), app("b")]);
  desk.compositor.open("a", false).await.unwrap();
  desk.compositor.open("b", false).await.unwrap();
  desk.compositor.bring_to_front(&id("a")).unwrap();

  let snapshot = desk.compositor.snapshot();

  let order: Vec<AppId> = snapshot.windows.iter().map(|w| w.id.clone()).collect();
  assert_eq!(order, vec![id("b"), id("a")]);
  assert_eq!(snapshot.active, Some(id("a")));
  assert_eq!(snapshot.z_counter, 3);
}
