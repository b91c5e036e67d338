/*!
App lifecycle registry.

Single source of truth for which apps exist, which one holds focus, and which
loops belong to whom. Mutations go through methods that maintain invariants
and emit events. This guarantees:
- Focus throttling is re-applied after every registration/focus change
- Suspend/resume hooks observe a consistent status
- Unregistering an app cascades to its loops and its tracked resources

## Lock discipline

All state lives behind one mutex. Callbacks (app hooks, loop callbacks) are
never invoked while it is held; methods collect what they need under the lock,
drop it, then call out. Hooks may therefore re-enter the lifecycle freely.
*/

pub mod loops;

pub use loops::{LoopConfig, LoopController};

use crate::config::{BACKGROUND_FPS, MAX_STEP_HZ};
use crate::resources::ResourceTracker;
use crate::types::{AppId, Event, WindowId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Optional per-app callbacks, all invoked outside the registry lock.
#[derive(Clone, Default)]
pub struct AppHooks {
  pub on_suspend: Option<Arc<dyn Fn() + Send + Sync>>,
  pub on_resume: Option<Arc<dyn Fn() + Send + Sync>>,
  /// Asked to drop rebuildable memory (caches, pools) under pressure.
  pub free_optional_caches: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for AppHooks {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppHooks")
      .field("on_suspend", &self.on_suspend.is_some())
      .field("on_resume", &self.on_resume.is_some())
      .field("free_optional_caches", &self.free_optional_caches.is_some())
      .finish()
  }
}

/// Registration info for an app. Absent fields leave any existing
/// registration's value untouched.
#[derive(Debug, Default)]
pub struct AppInfo {
  pub title: Option<String>,
  pub window: Option<WindowId>,
  pub hooks: Option<AppHooks>,
}

/// Whether an app is currently scheduled or parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ts_rs::TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AppStatus {
  Running,
  Suspended,
}

/// Public view of one registered app.
#[derive(Debug, Clone, Serialize, ts_rs::TS)]
#[ts(export)]
pub struct AppSummary {
  pub app_id: AppId,
  pub title: String,
  pub status: AppStatus,
  pub window: Option<WindowId>,
}

/// Running/suspended/total counts for the system monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ts_rs::TS)]
#[ts(export)]
pub struct AppStats {
  pub running: usize,
  pub suspended: usize,
  pub total: usize,
}

struct AppEntry {
  title: String,
  status: AppStatus,
  loops: Vec<LoopController>,
  hooks: AppHooks,
  window: Option<WindowId>,
}

struct LifecycleState {
  apps: HashMap<AppId, AppEntry>,
  focused: Option<AppId>,
}

/// The lifecycle registry. Cheap to clone via the shell; internally shared.
pub struct AppLifecycle {
  tracker: Arc<ResourceTracker>,
  state: Mutex<LifecycleState>,
  events_tx: async_broadcast::Sender<Event>,
}

impl std::fmt::Debug for AppLifecycle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("AppLifecycle")
      .field("apps", &state.apps.len())
      .field("focused", &state.focused)
      .finish_non_exhaustive()
  }
}

impl AppLifecycle {
  pub fn new(tracker: Arc<ResourceTracker>, events_tx: async_broadcast::Sender<Event>) -> Self {
    Self {
      tracker,
      state: Mutex::new(LifecycleState { apps: HashMap::new(), focused: None }),
      events_tx,
    }
  }

  fn emit(&self, event: Event) {
    if let Err(e) = self.events_tx.try_broadcast(event) {
      if e.is_full() {
        log::error!("Event channel overflow - events are being dropped.");
      }
    }
  }

  /// Register an app, or update an existing registration in place. Loops
  /// created before registration are preserved. Throttling is re-applied so a
  /// late registration immediately lands in the right fps tier.
  pub fn register_app(&self, app_id: impl Into<AppId>, info: AppInfo) {
    let app_id = app_id.into();
    {
      let mut state = self.state.lock();
      let entry = ensure_app(&mut state.apps, &app_id);
      if let Some(title) = info.title {
        entry.title = title;
      }
      if let Some(window) = info.window {
        entry.window = Some(window);
      }
      if let Some(hooks) = info.hooks {
        entry.hooks = hooks;
      }
    }
    self.apply_focus_throttling();
  }

  /// Remove an app entirely: stop its loops, forget its entry and release
  /// every resource claim it held.
  pub fn unregister_app(&self, app_id: &AppId) {
    let Some(entry) = self.state.lock().apps.remove(app_id) else {
      return;
    };
    for controller in &entry.loops {
      controller.stop();
    }
    self.tracker.clear_app(app_id);
    self.emit(Event::AppClosed { app_id: app_id.clone() });
    log::debug!("Unregistered app {app_id}");
  }

  /// Create a loop owned by `app_id`, auto-registering the app if needed.
  /// The loop starts immediately; `start` on the returned handle is only
  /// needed after an explicit `stop`. The handle shares the loop with the
  /// registry.
  pub fn create_loop(&self, app_id: impl Into<AppId>, config: LoopConfig) -> LoopController {
    let app_id = app_id.into();
    let controller = LoopController::new(config);
    controller.start();
    {
      let mut state = self.state.lock();
      let entry = ensure_app(&mut state.apps, &app_id);
      entry.loops.push(controller.clone());
    }
    self.apply_focus_throttling();
    controller
  }

  /// Park an app: mark it suspended, pause its loops, then fire its
  /// `on_suspend` hook. No-op when unknown or already suspended.
  pub fn suspend_app(&self, app_id: &AppId) {
    let (loops, hook) = {
      let mut state = self.state.lock();
      let Some(entry) = state.apps.get_mut(app_id) else {
        return;
      };
      if entry.status == AppStatus::Suspended {
        return;
      }
      entry.status = AppStatus::Suspended;
      (entry.loops.clone(), entry.hooks.on_suspend.clone())
    };
    for controller in &loops {
      controller.suspend();
    }
    if let Some(hook) = hook {
      hook();
    }
    self.emit(Event::AppSuspended { app_id: app_id.clone() });
  }

  /// Wake a suspended app and re-apply its fps tier.
  pub fn resume_app(&self, app_id: &AppId) {
    let (loops, hook) = {
      let mut state = self.state.lock();
      let Some(entry) = state.apps.get_mut(app_id) else {
        return;
      };
      if entry.status == AppStatus::Running {
        return;
      }
      entry.status = AppStatus::Running;
      (entry.loops.clone(), entry.hooks.on_resume.clone())
    };
    for controller in &loops {
      controller.resume();
    }
    if let Some(hook) = hook {
      hook();
    }
    self.apply_focus_throttling();
    self.emit(Event::AppResumed { app_id: app_id.clone() });
  }

  /// Change (or clear) the focused app and re-tier every loop.
  pub fn set_focused_app(&self, app_id: Option<AppId>) {
    self.state.lock().focused = app_id.clone();
    self.apply_focus_throttling();
    self.emit(Event::FocusApp { app_id });
  }

  pub fn focused_app(&self) -> Option<AppId> {
    self.state.lock().focused.clone()
  }

  /// Suspend every app except the focused one. When nothing is focused,
  /// everything is suspended.
  pub fn suspend_background_apps(&self) {
    let targets: Vec<AppId> = {
      let state = self.state.lock();
      state
        .apps
        .iter()
        .filter(|(id, entry)| {
          entry.status == AppStatus::Running && state.focused.as_ref() != Some(id)
        })
        .map(|(id, _)| id.clone())
        .collect()
    };
    for app_id in &targets {
      self.suspend_app(app_id);
    }
  }

  /// Ask every app to shed rebuildable memory.
  pub fn free_optional_caches(&self) {
    let hooks: Vec<Arc<dyn Fn() + Send + Sync>> = {
      let state = self.state.lock();
      state
        .apps
        .values()
        .filter_map(|entry| entry.hooks.free_optional_caches.clone())
        .collect()
    };
    log::debug!("Requesting cache relief from {} apps", hooks.len());
    for hook in hooks {
      hook();
    }
  }

  /// Re-tier every non-suspended loop: focused app at the maximum step rate,
  /// everything else at the background rate. Suspended apps keep their tier
  /// for when they resume.
  pub fn apply_focus_throttling(&self) {
    let assignments: Vec<(LoopController, f64)> = {
      let state = self.state.lock();
      state
        .apps
        .iter()
        .filter(|(_, entry)| entry.status == AppStatus::Running)
        .flat_map(|(id, entry)| {
          let fps = if state.focused.as_ref() == Some(id) { MAX_STEP_HZ } else { BACKGROUND_FPS };
          entry.loops.iter().map(move |c| (c.clone(), fps))
        })
        .collect()
    };
    for (controller, fps) in assignments {
      controller.set_target_fps(fps);
    }
  }

  /// Advance every registered loop to `now_ms`. Called by the frame driver.
  pub fn tick_all(&self, now_ms: f64) {
    let controllers: Vec<LoopController> = {
      let state = self.state.lock();
      state.apps.values().flat_map(|entry| entry.loops.iter().cloned()).collect()
    };
    for controller in controllers {
      controller.tick(now_ms);
    }
  }

  /// Drop loop handles that were stopped and whose app no longer references
  /// them externally. Keeps long sessions from accumulating dead controllers.
  pub fn prune_stopped_loops(&self) {
    let mut state = self.state.lock();
    for entry in state.apps.values_mut() {
      entry.loops.retain(LoopController::is_running);
    }
  }

  pub fn app_list(&self) -> Vec<AppSummary> {
    let state = self.state.lock();
    let mut apps: Vec<AppSummary> = state
      .apps
      .iter()
      .map(|(id, entry)| AppSummary {
        app_id: id.clone(),
        title: entry.title.clone(),
        status: entry.status,
        window: entry.window.clone(),
      })
      .collect();
    apps.sort_by(|a, b| a.app_id.as_str().cmp(b.app_id.as_str()));
    apps
  }

  pub fn app_stats(&self) -> AppStats {
    let state = self.state.lock();
    let suspended = state.apps.values().filter(|e| e.status == AppStatus::Suspended).count();
    AppStats {
      running: state.apps.len() - suspended,
      suspended,
      total: state.apps.len(),
    }
  }

  /// Window owned by an app, if any. Used by the window manager when focusing.
  pub fn window_of(&self, app_id: &AppId) -> Option<WindowId> {
    self.state.lock().apps.get(app_id).and_then(|entry| entry.window.clone())
  }
}

fn ensure_app<'a>(apps: &'a mut HashMap<AppId, AppEntry>, app_id: &AppId) -> &'a mut AppEntry {
  apps.entry(app_id.clone()).or_insert_with(|| AppEntry {
    title: app_id.to_string(),
    status: AppStatus::Running,
    loops: Vec::new(),
    hooks: AppHooks::default(),
    window: None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn lifecycle() -> AppLifecycle {
    let (mut tx, rx) = async_broadcast::broadcast(64);
    tx.set_overflow(true);
    std::mem::forget(rx.deactivate());
    AppLifecycle::new(Arc::new(ResourceTracker::new()), tx)
  }

  fn noop_loop(lc: &AppLifecycle, app: &str) -> LoopController {
    lc.create_loop(
      app,
      LoopConfig { step: Some(Box::new(|_| {})), render: None },
    )
  }

  mod throttling_tests {
    use super::*;

    #[test]
    fn focused_app_runs_at_max_rate_others_in_background() {
      let lc = lifecycle();
      let chess = noop_loop(&lc, "chess");
      let snake = noop_loop(&lc, "snake");

      lc.set_focused_app(Some(AppId::from("chess")));
      assert_eq!(chess.target_fps(), MAX_STEP_HZ);
      assert_eq!(snake.target_fps(), BACKGROUND_FPS);

      // Focus swap re-tiers both immediately.
      lc.set_focused_app(Some(AppId::from("snake")));
      assert_eq!(chess.target_fps(), BACKGROUND_FPS);
      assert_eq!(snake.target_fps(), MAX_STEP_HZ);
    }

    #[test]
    fn no_focus_means_everything_runs_in_background() {
      let lc = lifecycle();
      let chess = noop_loop(&lc, "chess");
      lc.set_focused_app(Some(AppId::from("chess")));
      lc.set_focused_app(None);
      assert_eq!(chess.target_fps(), BACKGROUND_FPS);
    }

    #[test]
    fn suspended_apps_are_skipped_by_retiering() {
      let lc = lifecycle();
      let chess = noop_loop(&lc, "chess");
      lc.set_focused_app(Some(AppId::from("chess")));
      lc.suspend_app(&AppId::from("chess"));

      lc.set_focused_app(None);
      assert_eq!(
        chess.target_fps(),
        MAX_STEP_HZ,
        "suspended loops keep their tier until resumed"
      );

      lc.set_focused_app(Some(AppId::from("chess")));
      lc.resume_app(&AppId::from("chess"));
      assert_eq!(chess.target_fps(), MAX_STEP_HZ);
    }

    #[test]
    fn loop_created_after_focus_lands_in_the_right_tier() {
      let lc = lifecycle();
      lc.set_focused_app(Some(AppId::from("chess")));
      let late = noop_loop(&lc, "chess");
      assert_eq!(late.target_fps(), MAX_STEP_HZ);
      let other = noop_loop(&lc, "snake");
      assert_eq!(other.target_fps(), BACKGROUND_FPS);
    }
  }

  mod suspend_resume_tests {
    use super::*;

    #[test]
    fn suspend_fires_hook_and_pauses_loops() {
      let lc = lifecycle();
      let suspends = Arc::new(AtomicU32::new(0));
      let resumes = Arc::new(AtomicU32::new(0));
      let s = Arc::clone(&suspends);
      let r = Arc::clone(&resumes);
      lc.register_app(
        "chess",
        AppInfo {
          title: Some("Chess".to_owned()),
          hooks: Some(AppHooks {
            on_suspend: Some(Arc::new(move || {
              s.fetch_add(1, Ordering::SeqCst);
            })),
            on_resume: Some(Arc::new(move || {
              r.fetch_add(1, Ordering::SeqCst);
            })),
            free_optional_caches: None,
          }),
          ..AppInfo::default()
        },
      );
      let game = noop_loop(&lc, "chess");

      let chess = AppId::from("chess");
      lc.suspend_app(&chess);
      assert!(game.is_suspended());
      assert_eq!(suspends.load(Ordering::SeqCst), 1);

      // Double suspend is a no-op; the hook does not fire twice.
      lc.suspend_app(&chess);
      assert_eq!(suspends.load(Ordering::SeqCst), 1);

      lc.resume_app(&chess);
      assert!(!game.is_suspended());
      assert!(game.is_running());
      assert_eq!(resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn suspend_background_spares_only_the_focused_app() {
      let lc = lifecycle();
      noop_loop(&lc, "chess");
      noop_loop(&lc, "snake");
      noop_loop(&lc, "paint");
      lc.set_focused_app(Some(AppId::from("snake")));

      lc.suspend_background_apps();
      let stats = lc.app_stats();
      assert_eq!(stats.running, 1);
      assert_eq!(stats.suspended, 2);

      let snake: Vec<_> =
        lc.app_list().into_iter().filter(|a| a.status == AppStatus::Running).collect();
      assert_eq!(snake.len(), 1);
      assert_eq!(snake[0].app_id.as_str(), "snake");
    }

    #[test]
    fn suspend_background_with_no_focus_parks_everything() {
      let lc = lifecycle();
      noop_loop(&lc, "chess");
      noop_loop(&lc, "snake");
      lc.suspend_background_apps();
      assert_eq!(lc.app_stats().suspended, 2);
    }

    #[test]
    fn hooks_may_reenter_the_lifecycle() {
      let lc = Arc::new(lifecycle());
      let lc_clone = Arc::clone(&lc);
      lc.register_app(
        "chess",
        AppInfo {
          hooks: Some(AppHooks {
            on_suspend: Some(Arc::new(move || {
              // A hook asking for stats must not deadlock.
              let _ = lc_clone.app_stats();
            })),
            ..AppHooks::default()
          }),
          ..AppInfo::default()
        },
      );
      lc.suspend_app(&AppId::from("chess"));
      assert_eq!(lc.app_stats().suspended, 1);
    }
  }

  mod teardown_tests {
    use super::*;

    #[test]
    fn unregister_stops_loops_and_clears_resources() {
      let tracker = Arc::new(ResourceTracker::new());
      let (mut tx, rx) = async_broadcast::broadcast(64);
      tx.set_overflow(true);
      std::mem::forget(rx.deactivate());
      let lc = AppLifecycle::new(Arc::clone(&tracker), tx);

      let game = noop_loop(&lc, "chess");
      tracker.claim("chess", "engine-cache", 50 * 1024 * 1024, "transposition tables");
      assert!(tracker.totals().total_bytes > 0);

      lc.unregister_app(&AppId::from("chess"));
      assert!(!game.is_running(), "loops stop when their app is unregistered");
      assert_eq!(tracker.totals().total_bytes, 0, "claims released on teardown");
      assert_eq!(lc.app_stats().total, 0);
    }

    #[test]
    fn unregister_unknown_app_is_a_no_op() {
      let lc = lifecycle();
      lc.unregister_app(&AppId::from("ghost"));
      assert_eq!(lc.app_stats().total, 0);
    }

    #[test]
    fn prune_drops_stopped_controllers() {
      let lc = lifecycle();
      let a = noop_loop(&lc, "chess");
      let _b = noop_loop(&lc, "chess");
      a.stop();
      lc.prune_stopped_loops();
      // tick_all only reaches the surviving loop; no panic, no stale handles.
      lc.tick_all(0.0);
      let state_apps = lc.app_list();
      assert_eq!(state_apps.len(), 1);
    }
  }

  mod registry_tests {
    use super::*;

    #[test]
    fn register_updates_in_place_and_preserves_loops() {
      let lc = lifecycle();
      let game = noop_loop(&lc, "chess");
      lc.register_app(
        "chess",
        AppInfo { title: Some("Chess".to_owned()), ..AppInfo::default() },
      );

      let apps = lc.app_list();
      assert_eq!(apps.len(), 1);
      assert_eq!(apps[0].title, "Chess");
      assert!(game.is_running(), "re-registration must not disturb existing loops");
    }

    #[test]
    fn app_list_is_sorted_and_carries_windows() {
      let lc = lifecycle();
      lc.register_app(
        "snake",
        AppInfo { window: Some(WindowId::from("app-snake")), ..AppInfo::default() },
      );
      lc.register_app("chess", AppInfo::default());
      let apps = lc.app_list();
      assert_eq!(apps[0].app_id.as_str(), "chess");
      assert_eq!(apps[1].app_id.as_str(), "snake");
      assert_eq!(apps[1].window, Some(WindowId::from("app-snake")));
      assert_eq!(lc.window_of(&AppId::from("snake")), Some(WindowId::from("app-snake")));
    }

    #[test]
    fn free_optional_caches_reaches_every_app() {
      let lc = lifecycle();
      let freed = Arc::new(AtomicU32::new(0));
      for app in ["chess", "snake"] {
        let f = Arc::clone(&freed);
        lc.register_app(
          app,
          AppInfo {
            hooks: Some(AppHooks {
              free_optional_caches: Some(Arc::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
              })),
              ..AppHooks::default()
            }),
            ..AppInfo::default()
          },
        );
      }
      lc.free_optional_caches();
      assert_eq!(freed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tick_all_drives_every_loop() {
      let lc = lifecycle();
      let count = Arc::new(AtomicU32::new(0));
      let c = Arc::clone(&count);
      lc.create_loop(
        "chess",
        LoopConfig {
          step: Some(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
          })),
          render: None,
        },
      );
      lc.set_focused_app(Some(AppId::from("chess")));
      lc.tick_all(0.0);
      lc.tick_all(17.0);
      assert_eq!(count.load(Ordering::SeqCst), 1);
    }
  }
}
