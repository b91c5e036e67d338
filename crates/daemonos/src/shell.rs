/*!
Desktop shell facade - owns every subsystem and the event channel.

# Module structure

`Desktop` wires the tracker, perf monitor, lifecycle registry, window manager,
system monitor, audio router and app registry together, starts the frame
driver, and exposes the operations a host UI calls. Clone is cheap (Arc
bumps) - share freely across threads. The driver stops when the last clone is
dropped.

# Example

```ignore
let desktop = Desktop::builder()
  .registry(AppRegistry::from_json(manifest)?)
  .opener(|manifest| Some(AppLaunch::default()))
  .build();

desktop.open_app(&AppId::from("chess"))?;
let mut events = desktop.subscribe();
while let Ok(event) = events.recv().await {
  // handle event
}
```
*/

use crate::audio::AudioRouter;
use crate::config::Settings;
use crate::driver::{self, DriverConfig, DriverHandle};
use crate::lifecycle::{AppHooks, AppInfo, AppLifecycle};
use crate::monitor::SystemMonitor;
use crate::perf::{MemoryProbe, NoMemoryProbe, PerfMonitor};
use crate::registry::{AppManifest, AppRegistry};
use crate::resources::ResourceTracker;
use crate::storage::{self, keys, MemoryStorage, Storage};
use crate::types::{
  AppId, DesktopResult, Event, Rect, Size, Snapshot, WindowId, WindowMeta, WindowRecord,
  WindowSpec,
};
use crate::wm::{GenieTween, WindowManager};
use async_broadcast::{InactiveReceiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use ts_rs::TS;

const EVENT_CHANNEL_CAPACITY: usize = 5000;

const DEFAULT_VIEWPORT: Size = Size::new(1280.0, 800.0);

/// What the host's app factory produced for a launched app.
#[derive(Default)]
pub struct AppLaunch {
  /// Window title override; the manifest title is used when absent.
  pub title: Option<String>,
  /// Initial window size override.
  pub size: Option<Size>,
  pub hooks: Option<AppHooks>,
  /// Headless app: register it in the lifecycle but create no window.
  pub skip_window: bool,
}

impl std::fmt::Debug for AppLaunch {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppLaunch")
      .field("title", &self.title)
      .field("size", &self.size)
      .field("skip_window", &self.skip_window)
      .finish_non_exhaustive()
  }
}

/// Host callback that actually instantiates an app's code. Returning `None`
/// means the app declined to start (nothing is registered).
pub type AppOpener = dyn Fn(&AppManifest) -> Option<AppLaunch> + Send + Sync;

/// One menu in the menu bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Menu {
  pub title: String,
  pub items: Vec<MenuItem>,
}

/// A clickable menu entry; `action` is an opaque id the host dispatches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct MenuItem {
  pub action: String,
  pub label: String,
}

struct ShellState {
  settings: Settings,
  app_menus: HashMap<AppId, Vec<Menu>>,
}

/// The desktop shell instance.
pub struct Desktop {
  tracker: Arc<ResourceTracker>,
  perf: Arc<PerfMonitor>,
  lifecycle: Arc<AppLifecycle>,
  wm: Arc<WindowManager>,
  monitor: Arc<SystemMonitor>,
  audio: AudioRouter,
  registry: Arc<AppRegistry>,
  storage: Arc<dyn Storage>,
  opener: Option<Arc<AppOpener>>,
  state: Arc<Mutex<ShellState>>,
  events_tx: Sender<Event>,
  events_keepalive: InactiveReceiver<Event>,
  driver: Arc<Mutex<Option<DriverHandle>>>,
}

impl Clone for Desktop {
  fn clone(&self) -> Self {
    Self {
      tracker: Arc::clone(&self.tracker),
      perf: Arc::clone(&self.perf),
      lifecycle: Arc::clone(&self.lifecycle),
      wm: Arc::clone(&self.wm),
      monitor: Arc::clone(&self.monitor),
      audio: self.audio.clone(),
      registry: Arc::clone(&self.registry),
      storage: Arc::clone(&self.storage),
      opener: self.opener.clone(),
      state: Arc::clone(&self.state),
      events_tx: self.events_tx.clone(),
      events_keepalive: self.events_keepalive.clone(),
      driver: Arc::clone(&self.driver),
    }
  }
}

impl std::fmt::Debug for Desktop {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Desktop").finish_non_exhaustive()
  }
}

/// Builder for configuring a Desktop instance.
#[must_use = "Builder does nothing until .build() is called"]
pub struct DesktopBuilder {
  storage: Arc<dyn Storage>,
  probe: Arc<dyn MemoryProbe>,
  registry: AppRegistry,
  opener: Option<Arc<AppOpener>>,
  viewport: Size,
  frame_interval_ms: u64,
  run_driver: bool,
}

impl std::fmt::Debug for DesktopBuilder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DesktopBuilder")
      .field("viewport", &self.viewport)
      .field("run_driver", &self.run_driver)
      .finish_non_exhaustive()
  }
}

impl Default for DesktopBuilder {
  fn default() -> Self {
    Self {
      storage: Arc::new(MemoryStorage::new()),
      probe: Arc::new(NoMemoryProbe),
      registry: AppRegistry::empty(),
      opener: None,
      viewport: DEFAULT_VIEWPORT,
      frame_interval_ms: DriverConfig::default().frame_interval_ms,
      run_driver: true,
    }
  }
}

impl DesktopBuilder {
  /// Persistence backend for settings, geometry and sessions.
  /// Default: in-memory.
  pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
    self.storage = storage;
    self
  }

  /// Memory introspection for the perf monitor. Default: none.
  pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
    self.probe = probe;
    self
  }

  /// App manifest. Default: empty.
  pub fn registry(mut self, registry: AppRegistry) -> Self {
    self.registry = registry;
    self
  }

  /// Host factory invoked by `open_app` to instantiate an app's code.
  pub fn opener(mut self, opener: impl Fn(&AppManifest) -> Option<AppLaunch> + Send + Sync + 'static) -> Self {
    self.opener = Some(Arc::new(opener));
    self
  }

  /// Initial viewport size. Default: 1280x800.
  pub const fn viewport(mut self, viewport: Size) -> Self {
    self.viewport = viewport;
    self
  }

  /// Frame driver interval in milliseconds. Default: 8ms.
  pub const fn frame_interval_ms(mut self, ms: u64) -> Self {
    self.frame_interval_ms = ms;
    self
  }

  /// Run the background frame driver. Default: true. Hosts that drive frames
  /// themselves (or tests that need deterministic time) turn this off and
  /// call `frame_iteration` directly.
  pub const fn run_driver(mut self, run: bool) -> Self {
    self.run_driver = run;
    self
  }

  /// Build the desktop, restoring persisted settings and starting the driver.
  #[must_use = "Desktop instance must be stored to keep the driver alive"]
  pub fn build(self) -> Desktop {
    let (mut tx, rx) = async_broadcast::broadcast(EVENT_CHANNEL_CAPACITY);
    tx.set_overflow(true); // Drop oldest messages when full

    let tracker = Arc::new(ResourceTracker::new());
    let perf = Arc::new(PerfMonitor::new(self.probe));
    perf.attach_tracker(&tracker);
    let lifecycle = Arc::new(AppLifecycle::new(Arc::clone(&tracker), tx.clone()));
    let wm = Arc::new(WindowManager::new(
      Arc::clone(&lifecycle),
      Arc::clone(&self.storage),
      tx.clone(),
      self.viewport,
    ));
    let monitor =
      Arc::new(SystemMonitor::new(Arc::clone(&tracker), Arc::clone(&perf), Arc::clone(&lifecycle)));

    let settings: Settings = storage::load_json(&*self.storage, keys::SETTINGS);
    let audio = AudioRouter::new(settings.volume);

    // Resource changes fan out on the shared event channel.
    let resources_tx = tx.clone();
    tracker.subscribe(move |totals| {
      if let Err(e) = resources_tx.try_broadcast(Event::ResourcesChanged { totals: totals.clone() })
      {
        if e.is_full() {
          log::error!("Event channel overflow - events are being dropped.");
        }
      }
    });

    let desktop = Desktop {
      tracker,
      perf: Arc::clone(&perf),
      lifecycle: Arc::clone(&lifecycle),
      wm,
      monitor: Arc::clone(&monitor),
      audio,
      registry: Arc::new(self.registry),
      storage: self.storage,
      opener: self.opener,
      state: Arc::new(Mutex::new(ShellState { settings, app_menus: HashMap::new() })),
      events_tx: tx,
      events_keepalive: rx.deactivate(),
      driver: Arc::new(Mutex::new(None)),
    };

    perf.start();
    if self.run_driver {
      let handle = driver::start_driver(
        perf,
        lifecycle,
        monitor,
        DriverConfig { frame_interval_ms: self.frame_interval_ms },
      );
      *desktop.driver.lock() = Some(handle);
    }
    desktop
  }
}

impl Desktop {
  /// Create a desktop with default options (in-memory storage, empty
  /// registry, driver running).
  #[must_use = "Desktop instance must be stored to keep the driver alive"]
  pub fn new() -> Self {
    Self::builder().build()
  }

  pub fn builder() -> DesktopBuilder {
    DesktopBuilder::default()
  }

  /// Subscribe to events from this instance.
  pub fn subscribe(&self) -> async_broadcast::Receiver<Event> {
    self.events_keepalive.activate_cloned()
  }

  fn emit(&self, event: Event) {
    if let Err(e) = self.events_tx.try_broadcast(event) {
      if e.is_full() {
        log::error!("Event channel overflow - events are being dropped.");
      }
    }
  }

  /// Full state for a newly connected client.
  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      windows: self.wm.windows(),
      apps: self.lifecycle.app_list(),
      focused_app: self.lifecycle.focused_app(),
      totals: self.tracker.totals(),
      stats: self.perf.stats(),
      settings: self.settings(),
    }
  }

  // -- apps ---------------------------------------------------------------

  /// Launch a registered app: look it up in the manifest, run the host
  /// factory, then create its window (unless it's headless) and register it
  /// with the lifecycle. Reopening a running app focuses its window instead.
  pub fn open_app(&self, id: &AppId) -> DesktopResult<Option<WindowRecord>> {
    let manifest = self.registry.require(id)?.clone();

    let Some(launch) = self.opener.as_ref().map_or_else(
      || Some(AppLaunch::default()),
      |opener| opener(&manifest),
    ) else {
      log::debug!("App {id} declined to launch");
      return Ok(None);
    };

    let title = launch.title.unwrap_or_else(|| manifest.title.clone());
    if launch.skip_window {
      self
        .lifecycle
        .register_app(id.clone(), AppInfo { title: Some(title), hooks: launch.hooks, window: None });
      return Ok(None);
    }

    let mut spec = WindowSpec::new(
      WindowId::for_app(id),
      title.clone(),
      WindowMeta::App { app_id: id.clone() },
    );
    if let Some(size) = launch.size {
      spec = spec.with_size(size.w, size.h);
    }
    let record = self.wm.create_window(spec);
    self.lifecycle.register_app(
      id.clone(),
      AppInfo { title: Some(title), hooks: launch.hooks, window: Some(record.id.clone()) },
    );
    Ok(Some(record))
  }

  /// Focus an app and raise its window, if it has one.
  pub fn set_active_app(&self, id: Option<AppId>) {
    if let Some(id) = &id {
      if let Some(window) = self.lifecycle.window_of(id) {
        // focus_window forwards focus to the lifecycle.
        if self.wm.focus_window(&window).is_ok() {
          return;
        }
      }
    }
    self.lifecycle.set_focused_app(id);
  }

  // -- built-in windows ---------------------------------------------------

  /// Open (or focus) a built-in shell window.
  pub fn open_shell_window(&self, meta: WindowMeta) -> WindowRecord {
    let (id, title) = match &meta {
      WindowMeta::Category { category } => {
        (WindowId::from(format!("category-{category}")), title_case(category))
      }
      WindowMeta::FileBrowser => (WindowId::from("file-browser"), "Files".to_owned()),
      WindowMeta::Trash => (WindowId::from("trash"), "Trash".to_owned()),
      WindowMeta::Settings => (WindowId::from("settings"), "Settings".to_owned()),
      WindowMeta::About => (WindowId::from("about"), "About".to_owned()),
      WindowMeta::Info => (WindowId::from("info"), "Info".to_owned()),
      WindowMeta::App { app_id } => {
        (WindowId::for_app(app_id), app_id.to_string())
      }
    };
    self.wm.create_window(WindowSpec::new(id, title, meta))
  }

  pub fn open_settings_window(&self) -> WindowRecord {
    self.open_shell_window(WindowMeta::Settings)
  }

  // -- settings / audio ---------------------------------------------------

  pub fn settings(&self) -> Settings {
    self.state.lock().settings.clone()
  }

  /// Replace settings wholesale, persisting and fanning out side effects
  /// (master volume) before emitting.
  pub fn update_settings(&self, settings: Settings) {
    {
      let mut state = self.state.lock();
      state.settings = settings.clone();
    }
    storage::save_json(&*self.storage, keys::SETTINGS, &settings);
    self.audio.set_master_volume(settings.volume);
    self.emit(Event::SettingsChanged { settings });
  }

  /// Convenience for the volume slider.
  pub fn set_master_volume(&self, volume: f64) {
    let mut settings = self.settings();
    settings.volume = volume.clamp(0.0, 1.0);
    self.update_settings(settings);
  }

  // -- menus --------------------------------------------------------------

  /// Menus every window gets regardless of the focused app.
  pub fn default_menus() -> Vec<Menu> {
    vec![Menu {
      title: "Window".to_owned(),
      items: vec![
        MenuItem { action: "window:minimize-all".to_owned(), label: "Minimize All".to_owned() },
        MenuItem { action: "window:restore-all".to_owned(), label: "Restore All".to_owned() },
        MenuItem { action: "window:tile".to_owned(), label: "Tile Windows".to_owned() },
        MenuItem { action: "window:cascade".to_owned(), label: "Cascade Windows".to_owned() },
      ],
    }]
  }

  /// Replace the focused-app menus contributed by one app.
  pub fn register_app_menu(&self, app_id: impl Into<AppId>, menus: Vec<Menu>) {
    self.state.lock().app_menus.insert(app_id.into(), menus);
  }

  /// Menu bar contents for an app: its own menus first, then the defaults.
  pub fn menus_for(&self, app_id: Option<&AppId>) -> Vec<Menu> {
    let mut menus = app_id
      .and_then(|id| self.state.lock().app_menus.get(id).cloned())
      .unwrap_or_default();
    menus.extend(Self::default_menus());
    menus
  }

  // -- session ------------------------------------------------------------

  /// Replay the persisted session: reopen app windows through the host
  /// factory and shell windows directly, re-minimizing what was minimized.
  /// Apps missing from the current manifest are skipped.
  pub fn restore_session(&self) {
    let session: crate::types::Session = storage::load_json(&*self.storage, keys::SESSION);
    log::info!("Restoring session: {} windows", session.windows.len());

    for entry in session.windows {
      let record = match &entry.meta {
        WindowMeta::App { app_id } => match self.open_app(app_id) {
          Ok(record) => record,
          Err(e) => {
            log::warn!("Session window {} skipped: {e}", entry.id);
            continue;
          }
        },
        meta => Some(self.open_shell_window(meta.clone())),
      };
      if entry.minimized {
        if let Some(record) = record {
          let _ = self.wm.minimize(&record.id, None);
        }
      }
    }
    self.wm.set_task_switcher_open(session.task_switcher_open);
  }

  // -- forwarding accessors ------------------------------------------------

  pub fn tracker(&self) -> &ResourceTracker {
    &self.tracker
  }

  pub fn perf(&self) -> &PerfMonitor {
    &self.perf
  }

  pub fn lifecycle(&self) -> &AppLifecycle {
    &self.lifecycle
  }

  pub fn wm(&self) -> &WindowManager {
    &self.wm
  }

  pub fn monitor(&self) -> &SystemMonitor {
    &self.monitor
  }

  pub fn audio(&self) -> &AudioRouter {
    &self.audio
  }

  pub fn registry(&self) -> &AppRegistry {
    &self.registry
  }

  /// Minimize a window toward the tray. Forwarded so hosts don't need the
  /// window manager directly. When a tween comes back the window is still
  /// visible; drive the animation and then call `finish_minimize`.
  pub fn minimize_window(
    &self,
    id: &WindowId,
    tray: Option<Rect>,
  ) -> DesktopResult<Option<GenieTween>> {
    self.wm.minimize(id, tray)
  }

  pub fn close_window(&self, id: &WindowId) -> DesktopResult<()> {
    self.wm.close_window(id)
  }
}

impl Default for Desktop {
  fn default() -> Self {
    Self::new()
  }
}

fn title_case(word: &str) -> String {
  let mut chars = word.chars();
  chars.next().map_or_else(String::new, |first| {
    first.to_uppercase().collect::<String>() + chars.as_str()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Event;

  const MANIFEST: &str = r#"{
    "version": "1",
    "apps": [
      { "id": "chess", "title": "Chess", "category": "games", "module": "./apps/chess.js" },
      { "id": "mixer", "title": "Mixer", "category": "utilities", "module": "./apps/mixer.js" }
    ]
  }"#;

  fn desktop() -> Desktop {
    Desktop::builder()
      .registry(AppRegistry::from_json(MANIFEST).unwrap())
      .run_driver(false)
      .build()
  }

  mod open_app_tests {
    use super::*;

    #[test]
    fn open_app_creates_window_and_registers() {
      let desktop = desktop();
      let record = desktop.open_app(&AppId::from("chess")).unwrap().expect("windowed app");
      assert_eq!(record.id.as_str(), "app-chess");
      assert_eq!(record.title, "Chess");
      assert_eq!(desktop.lifecycle().app_stats().total, 1);
      assert_eq!(desktop.lifecycle().focused_app(), Some(AppId::from("chess")));
    }

    #[test]
    fn unknown_app_errors() {
      let desktop = desktop();
      assert!(desktop.open_app(&AppId::from("ghost")).is_err());
    }

    #[test]
    fn opener_overrides_title_and_size() {
      let desktop = Desktop::builder()
        .registry(AppRegistry::from_json(MANIFEST).unwrap())
        .opener(|manifest| {
          Some(AppLaunch {
            title: Some(format!("{} Deluxe", manifest.title)),
            size: Some(Size::new(640.0, 480.0)),
            ..AppLaunch::default()
          })
        })
        .run_driver(false)
        .build();

      let record = desktop.open_app(&AppId::from("chess")).unwrap().unwrap();
      assert_eq!(record.title, "Chess Deluxe");
      assert_eq!(record.rect.width, 640.0);
    }

    #[test]
    fn headless_app_registers_without_a_window() {
      let desktop = Desktop::builder()
        .registry(AppRegistry::from_json(MANIFEST).unwrap())
        .opener(|manifest| {
          Some(AppLaunch { skip_window: manifest.id.as_str() == "mixer", ..AppLaunch::default() })
        })
        .run_driver(false)
        .build();

      assert!(desktop.open_app(&AppId::from("mixer")).unwrap().is_none());
      assert!(desktop.wm().windows().is_empty());
      assert_eq!(desktop.lifecycle().app_stats().total, 1);
    }

    #[test]
    fn declined_launch_registers_nothing() {
      let desktop = Desktop::builder()
        .registry(AppRegistry::from_json(MANIFEST).unwrap())
        .opener(|_| None)
        .run_driver(false)
        .build();

      assert!(desktop.open_app(&AppId::from("chess")).unwrap().is_none());
      assert_eq!(desktop.lifecycle().app_stats().total, 0);
    }

    #[test]
    fn reopening_focuses_the_existing_window() {
      let desktop = desktop();
      desktop.open_app(&AppId::from("chess")).unwrap();
      desktop.open_app(&AppId::from("mixer")).unwrap();
      desktop.open_app(&AppId::from("chess")).unwrap();
      assert_eq!(desktop.wm().windows().len(), 2);
      assert_eq!(desktop.lifecycle().focused_app(), Some(AppId::from("chess")));
    }
  }

  mod settings_tests {
    use super::*;

    #[test]
    fn update_settings_persists_and_drives_the_mixer() {
      let storage = Arc::new(MemoryStorage::new());
      let desktop = Desktop::builder()
        .storage(Arc::clone(&storage) as Arc<dyn Storage>)
        .run_driver(false)
        .build();
      let handle = desktop.audio().acquire("chess");

      desktop.set_master_volume(0.25);
      assert!((handle.effective_volume() - 0.25).abs() < 1e-12);

      let persisted: Settings = storage::load_json(&*storage, keys::SETTINGS);
      assert_eq!(persisted.volume, 0.25);
    }

    #[test]
    fn persisted_settings_seed_the_audio_router() {
      let storage = Arc::new(MemoryStorage::new());
      let seeded = Settings { volume: 0.5, ..Settings::default() };
      storage::save_json(&*storage, keys::SETTINGS, &seeded);

      let desktop = Desktop::builder()
        .storage(Arc::clone(&storage) as Arc<dyn Storage>)
        .run_driver(false)
        .build();
      assert_eq!(desktop.audio().master_volume(), 0.5);
      assert_eq!(desktop.settings().volume, 0.5);
    }
  }

  mod event_tests {
    use super::*;

    #[test]
    fn resource_claims_fan_out_as_events() {
      let desktop = desktop();
      let mut events = desktop.subscribe();
      desktop.tracker().claim("chess", "engine", 1024, "probe");

      let event = events.try_recv().expect("resources event queued");
      match event {
        Event::ResourcesChanged { totals } => assert_eq!(totals.total_bytes, 1024),
        other => panic!("unexpected event: {other:?}"),
      }
    }

    #[test]
    fn snapshot_reflects_open_windows() {
      let desktop = desktop();
      desktop.open_app(&AppId::from("chess")).unwrap();
      let snapshot = desktop.snapshot();
      assert_eq!(snapshot.windows.len(), 1);
      assert_eq!(snapshot.apps.len(), 1);
      assert_eq!(snapshot.focused_app, Some(AppId::from("chess")));
    }
  }

  mod menu_tests {
    use super::*;

    #[test]
    fn app_menus_come_before_the_defaults() {
      let desktop = desktop();
      desktop.register_app_menu(
        "chess",
        vec![Menu {
          title: "Game".to_owned(),
          items: vec![MenuItem { action: "chess:new".to_owned(), label: "New Game".to_owned() }],
        }],
      );

      let menus = desktop.menus_for(Some(&AppId::from("chess")));
      assert_eq!(menus[0].title, "Game");
      assert_eq!(menus.last().unwrap().title, "Window");

      let bare = desktop.menus_for(None);
      assert_eq!(bare, Desktop::default_menus());
    }

    #[test]
    fn window_menu_covers_bulk_layout_commands() {
      let labels: Vec<String> = Desktop::default_menus()
        .into_iter()
        .flat_map(|menu| menu.items)
        .map(|item| item.label)
        .collect();
      assert_eq!(labels, ["Minimize All", "Restore All", "Tile Windows", "Cascade Windows"]);
    }
  }

  mod minimize_tests {
    use super::*;

    #[test]
    fn facade_minimize_hands_back_the_tween() {
      let desktop = desktop();
      let record = desktop.open_app(&AppId::from("chess")).unwrap().unwrap();
      let tray = Rect::new(600.0, 760.0, 48.0, 32.0);

      let tween = desktop
        .minimize_window(&record.id, Some(tray))
        .unwrap()
        .expect("tray rect yields a tween");
      assert!(tween.scale > 0.0);
      assert!(
        !desktop.wm().window(&record.id).unwrap().minimized,
        "flip deferred until finish_minimize"
      );

      desktop.wm().finish_minimize(&record.id);
      assert!(desktop.wm().window(&record.id).unwrap().minimized);
    }
  }

  mod session_tests {
    use super::*;

    #[test]
    fn session_replays_windows_through_the_factory() {
      let storage = Arc::new(MemoryStorage::new());
      {
        let desktop = Desktop::builder()
          .registry(AppRegistry::from_json(MANIFEST).unwrap())
          .storage(Arc::clone(&storage) as Arc<dyn Storage>)
          .run_driver(false)
          .build();
        desktop.open_app(&AppId::from("chess")).unwrap();
        let settings = desktop.open_settings_window();
        let _ = desktop.wm().minimize(&settings.id, None);
      }

      // Fresh shell, same storage: the session comes back.
      let desktop = Desktop::builder()
        .registry(AppRegistry::from_json(MANIFEST).unwrap())
        .storage(Arc::clone(&storage) as Arc<dyn Storage>)
        .run_driver(false)
        .build();
      desktop.restore_session();

      let windows = desktop.wm().windows();
      assert_eq!(windows.len(), 2);
      let settings = windows.iter().find(|w| w.id.as_str() == "settings").unwrap();
      assert!(settings.minimized, "minimized state survives the replay");
      assert_eq!(desktop.lifecycle().app_stats().total, 1, "chess re-registered");
    }

    #[test]
    fn session_skips_apps_missing_from_the_manifest() {
      let storage = Arc::new(MemoryStorage::new());
      {
        let desktop = Desktop::builder()
          .registry(AppRegistry::from_json(MANIFEST).unwrap())
          .storage(Arc::clone(&storage) as Arc<dyn Storage>)
          .run_driver(false)
          .build();
        desktop.open_app(&AppId::from("chess")).unwrap();
      }

      let desktop = Desktop::builder()
        .storage(Arc::clone(&storage) as Arc<dyn Storage>) // empty registry
        .run_driver(false)
        .build();
      desktop.restore_session();
      assert!(desktop.wm().windows().is_empty());
    }
  }
}
