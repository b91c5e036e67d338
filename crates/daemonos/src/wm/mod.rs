/*!
Window manager.

Single source of truth for window geometry, stacking and the minimize state
machine. All fields are private; mutations go through methods that maintain
invariants and emit events. This guarantees:
- One window per stable id (reopening focuses the existing one)
- Geometry is always clamped to the current viewport
- Persisted state (`windowState`, `session`) is updated on every commit point

Interactive gestures (drag, resize) are split into begin/move/end so the
original pointer-down rect anchors the math; only `end` persists.

The genie minimize animation is host-rendered. `minimize` returns the tween
and defers the actual state flip to `finish_minimize`, so the window stays
visible while it shrinks toward the tray. Restore flips state first and lets
the reverse tween play over an already-live window.
*/

pub mod tween;

pub use tween::GenieTween;

use crate::config::{
  MENU_BAR_HEIGHT, MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH, VIEWPORT_PADDING,
};
use crate::lifecycle::AppLifecycle;
use crate::storage::{self, keys, Storage};
use crate::types::{
  clamp_to_viewport, resize_rect, DesktopError, DesktopResult, Event, Rect, ResizeDir, Session,
  SessionWindow, Size, WindowId, WindowRecord, WindowSpec, WindowStateMap,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use ts_rs::TS;

const MIN_SIZE: Size = Size::new(MIN_WINDOW_WIDTH, MIN_WINDOW_HEIGHT);

/// Cascade origin and per-window stagger for freshly placed windows.
const CASCADE_LEFT: f64 = 80.0;
const CASCADE_TOP: f64 = 60.0;
const CASCADE_DX: f64 = 24.0;
const CASCADE_DY: f64 = 18.0;

/// The explicit Cascade command restacks tighter than creation placement.
const RESTACK_LEFT: f64 = 60.0;
const RESTACK_TOP: f64 = 50.0;
const RESTACK_DX: f64 = 24.0;
const RESTACK_DY: f64 = 20.0;

/// Entry in the trash list, recorded when a window is closed.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TrashItem {
  pub id: WindowId,
  pub title: String,
  /// Wall-clock close time, ms since the Unix epoch.
  pub closed_at: u64,
}

struct WindowEntry {
  title: String,
  meta: crate::types::WindowMeta,
  rect: Rect,
  minimized: bool,
  maximized: bool,
  z: u64,
  /// Geometry to restore when un-maximizing.
  prev_rect: Option<Rect>,
  /// Genie animation in flight; the minimized flag flips in `finish_minimize`.
  pending_minimize: bool,
}

enum Gesture {
  Drag { id: WindowId, start: Rect },
  Resize { id: WindowId, start: Rect, dir: ResizeDir },
}

struct WmState {
  windows: HashMap<WindowId, WindowEntry>,
  z_counter: u64,
  viewport: Size,
  gesture: Option<Gesture>,
  task_switcher_open: bool,
  trash: Vec<TrashItem>,
}

/// The window manager. Shares the lifecycle registry so focus and app
/// teardown stay consistent with window operations.
pub struct WindowManager {
  lifecycle: Arc<AppLifecycle>,
  storage: Arc<dyn Storage>,
  state: Mutex<WmState>,
  events_tx: async_broadcast::Sender<Event>,
}

impl std::fmt::Debug for WindowManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("WindowManager")
      .field("windows", &state.windows.len())
      .field("viewport", &state.viewport)
      .finish_non_exhaustive()
  }
}

impl WindowManager {
  pub fn new(
    lifecycle: Arc<AppLifecycle>,
    storage: Arc<dyn Storage>,
    events_tx: async_broadcast::Sender<Event>,
    viewport: Size,
  ) -> Self {
    Self {
      lifecycle,
      storage,
      state: Mutex::new(WmState {
        windows: HashMap::new(),
        z_counter: 0,
        viewport,
        gesture: None,
        task_switcher_open: false,
        trash: Vec::new(),
      }),
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

  /// Create a window, or focus/restore the existing one with the same id.
  /// Placement: persisted geometry if any, otherwise a cascade slot, always
  /// clamped to the current viewport.
  pub fn create_window(&self, spec: WindowSpec) -> WindowRecord {
    let (record, created, was_minimized) = {
      let mut state = self.state.lock();

      state.z_counter += 1;
      let z = state.z_counter;

      if let Some(entry) = state.windows.get_mut(&spec.id) {
        let was_minimized = entry.minimized;
        entry.minimized = false;
        entry.pending_minimize = false;
        entry.z = z;
        (make_record(&spec.id, entry), false, was_minimized)
      } else {
        let saved: WindowStateMap = storage::load_json(&*self.storage, keys::WINDOW_STATE);
        let rect = saved.get(&spec.id).map_or_else(
          || {
            let n = state.windows.len() as f64;
            Rect::new(
              CASCADE_LEFT + n * CASCADE_DX,
              CASCADE_TOP + n * CASCADE_DY,
              spec.width,
              spec.height,
            )
          },
          |geometry| Rect::from(*geometry),
        );
        let rect = clamp_to_viewport(rect, state.viewport, MENU_BAR_HEIGHT, VIEWPORT_PADDING);

        let entry = WindowEntry {
          title: spec.title.clone(),
          meta: spec.meta.clone(),
          rect,
          minimized: spec.minimized,
          maximized: false,
          z,
          prev_rect: None,
          pending_minimize: false,
        };
        let record = make_record(&spec.id, &entry);
        state.windows.insert(spec.id.clone(), entry);
        self.save_session_locked(&state);
        (record, true, false)
      }
    };

    if created {
      log::debug!("Created window {} ({})", record.id, record.title);
      self.emit(Event::WindowAdded { window: record.clone() });
    } else {
      if was_minimized {
        self.emit(Event::WindowRestored { window_id: record.id.clone() });
      }
      self.emit(Event::WindowChanged { window: record.clone() });
    }
    if !record.minimized {
      self.focus_record(&record);
    }
    record
  }

  /// Raise a window and move app focus to its owner (or clear focus for
  /// non-app windows).
  pub fn focus_window(&self, id: &WindowId) -> DesktopResult<WindowRecord> {
    let record = {
      let mut state = self.state.lock();
      state.z_counter += 1;
      let z = state.z_counter;
      let entry = state
        .windows
        .get_mut(id)
        .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
      entry.z = z;
      make_record(id, entry)
    };
    self.emit(Event::WindowChanged { window: record.clone() });
    self.focus_record(&record);
    Ok(record)
  }

  fn focus_record(&self, record: &WindowRecord) {
    self.lifecycle.set_focused_app(record.meta.app_id().cloned());
  }

  // -- drag ---------------------------------------------------------------

  /// Anchor a drag gesture at the window's current rect. Maximized windows
  /// don't drag.
  pub fn begin_drag(&self, id: &WindowId) -> DesktopResult<()> {
    let mut state = self.state.lock();
    let entry = state
      .windows
      .get(id)
      .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
    if entry.maximized {
      return Ok(());
    }
    let start = entry.rect;
    state.gesture = Some(Gesture::Drag { id: id.clone(), start });
    Ok(())
  }

  /// Move the dragged window by the pointer delta from the gesture anchor.
  /// The title bar is kept below the menu bar so the window stays grabbable.
  pub fn drag_to(&self, dx: f64, dy: f64) -> Option<WindowRecord> {
    let record = {
      let mut state = self.state.lock();
      let (id, start) = match &state.gesture {
        Some(Gesture::Drag { id, start }) => (id.clone(), *start),
        _ => return None,
      };
      let entry = state.windows.get_mut(&id)?;
      entry.rect.left = start.left + dx;
      entry.rect.top = (start.top + dy).max(MENU_BAR_HEIGHT);
      make_record(&id, entry)
    };
    self.emit(Event::WindowChanged { window: record.clone() });
    Some(record)
  }

  /// Commit the drag: persist the final geometry.
  pub fn end_drag(&self) {
    let mut state = self.state.lock();
    if let Some(Gesture::Drag { id, .. }) = state.gesture.take() {
      if let Some(entry) = state.windows.get(&id) {
        self.persist_geometry(&id, entry.rect);
      }
    }
  }

  // -- resize -------------------------------------------------------------

  pub fn begin_resize(&self, id: &WindowId, dir: ResizeDir) -> DesktopResult<()> {
    let mut state = self.state.lock();
    let entry = state
      .windows
      .get(id)
      .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
    if entry.maximized {
      return Ok(());
    }
    let start = entry.rect;
    state.gesture = Some(Gesture::Resize { id: id.clone(), start, dir });
    Ok(())
  }

  pub fn resize_to(&self, dx: f64, dy: f64) -> Option<WindowRecord> {
    let record = {
      let mut state = self.state.lock();
      let (id, start, dir) = match &state.gesture {
        Some(Gesture::Resize { id, start, dir }) => (id.clone(), *start, *dir),
        _ => return None,
      };
      let entry = state.windows.get_mut(&id)?;
      entry.rect = resize_rect(start, dir, dx, dy, MIN_SIZE);
      make_record(&id, entry)
    };
    self.emit(Event::WindowChanged { window: record.clone() });
    Some(record)
  }

  pub fn end_resize(&self) {
    let mut state = self.state.lock();
    if let Some(Gesture::Resize { id, .. }) = state.gesture.take() {
      if let Some(entry) = state.windows.get(&id) {
        self.persist_geometry(&id, entry.rect);
      }
    }
  }

  // -- maximize / minimize ------------------------------------------------

  /// Toggle between the full usable viewport and the remembered rect.
  pub fn toggle_maximize(&self, id: &WindowId) -> DesktopResult<WindowRecord> {
    let record = {
      let mut state = self.state.lock();
      state.z_counter += 1;
      let z = state.z_counter;
      let viewport = state.viewport;
      let entry = state
        .windows
        .get_mut(id)
        .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
      if entry.maximized {
        if let Some(prev) = entry.prev_rect.take() {
          entry.rect = clamp_to_viewport(prev, viewport, MENU_BAR_HEIGHT, VIEWPORT_PADDING);
        }
        entry.maximized = false;
      } else {
        entry.prev_rect = Some(entry.rect);
        entry.rect = Rect::new(
          VIEWPORT_PADDING,
          MENU_BAR_HEIGHT + VIEWPORT_PADDING,
          viewport.w - VIEWPORT_PADDING * 2.0,
          viewport.h - MENU_BAR_HEIGHT - VIEWPORT_PADDING * 2.0,
        );
        entry.maximized = true;
      }
      entry.z = z;
      if !entry.maximized {
        self.persist_geometry(id, entry.rect);
      }
      make_record(id, entry)
    };
    self.emit(Event::WindowChanged { window: record.clone() });
    Ok(record)
  }

  /// Start minimizing a window toward a tray slot. With a usable tray rect
  /// this returns the genie tween and leaves the window un-minimized until
  /// `finish_minimize`; without one (tray hidden, zero-sized slot) the state
  /// flips immediately.
  pub fn minimize(&self, id: &WindowId, tray: Option<Rect>) -> DesktopResult<Option<GenieTween>> {
    let tween = {
      let mut state = self.state.lock();
      let entry = state
        .windows
        .get_mut(id)
        .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
      if entry.minimized || entry.pending_minimize {
        return Ok(None);
      }
      match tray.filter(|t| t.width > 0.0 && t.height > 0.0) {
        Some(tray) => {
          entry.pending_minimize = true;
          Some(GenieTween::minimize(entry.rect, tray))
        }
        None => {
          entry.minimized = true;
          self.save_session_locked(&state);
          None
        }
      }
    };
    if tween.is_none() {
      self.emit(Event::WindowMinimized { window_id: id.clone() });
      self.after_minimize(id);
    }
    Ok(tween)
  }

  /// Complete an animated minimize. No-op when the window was closed or
  /// restored while the tween played.
  pub fn finish_minimize(&self, id: &WindowId) {
    let flipped = {
      let mut state = self.state.lock();
      let Some(entry) = state.windows.get_mut(id) else {
        return;
      };
      if !entry.pending_minimize {
        return;
      }
      entry.pending_minimize = false;
      entry.minimized = true;
      self.save_session_locked(&state);
      true
    };
    if flipped {
      self.emit(Event::WindowMinimized { window_id: id.clone() });
      self.after_minimize(id);
    }
  }

  /// Drop focus from the app whose window just minimized.
  fn after_minimize(&self, id: &WindowId) {
    let owner = {
      let state = self.state.lock();
      state.windows.get(id).and_then(|e| e.meta.app_id().cloned())
    };
    if let Some(app_id) = owner {
      if self.lifecycle.focused_app() == Some(app_id) {
        self.lifecycle.set_focused_app(None);
      }
    }
  }

  /// Restore a minimized window. State flips immediately; the returned tween
  /// (when a tray rect is supplied) plays over the already-live window.
  pub fn restore(&self, id: &WindowId, tray: Option<Rect>) -> DesktopResult<Option<GenieTween>> {
    let (record, tween) = {
      let mut state = self.state.lock();
      state.z_counter += 1;
      let z = state.z_counter;
      let entry = state
        .windows
        .get_mut(id)
        .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
      entry.minimized = false;
      entry.pending_minimize = false;
      entry.z = z;
      let tween = tray
        .filter(|t| t.width > 0.0 && t.height > 0.0)
        .map(|tray| GenieTween::minimize(entry.rect, tray).reversed());
      let record = make_record(id, entry);
      self.save_session_locked(&state);
      (record, tween)
    };
    self.emit(Event::WindowRestored { window_id: id.clone() });
    self.focus_record(&record);
    Ok(tween)
  }

  // -- close / bulk -------------------------------------------------------

  /// Close a window, recording it in the trash list. App windows cascade:
  /// the owning app is unregistered (stopping loops, releasing resource
  /// claims) and focus is cleared.
  pub fn close_window(&self, id: &WindowId) -> DesktopResult<()> {
    let entry = {
      let mut state = self.state.lock();
      let entry = state
        .windows
        .remove(id)
        .ok_or_else(|| DesktopError::WindowNotFound(id.clone()))?;
      state.trash.push(TrashItem {
        id: id.clone(),
        title: entry.title.clone(),
        closed_at: unix_time_ms(),
      });
      if matches!(&state.gesture, Some(Gesture::Drag { id: gid, .. } | Gesture::Resize { id: gid, .. }) if gid == id)
      {
        state.gesture = None;
      }
      self.save_session_locked(&state);
      entry
    };
    self.emit(Event::WindowRemoved { window_id: id.clone() });

    if let Some(app_id) = entry.meta.app_id() {
      if self.lifecycle.focused_app().as_ref() == Some(app_id) {
        self.lifecycle.set_focused_app(None);
      }
      self.lifecycle.unregister_app(app_id);
    }
    log::debug!("Closed window {id}");
    Ok(())
  }

  /// Items accumulated by closing windows, oldest first.
  pub fn trash(&self) -> Vec<TrashItem> {
    self.state.lock().trash.clone()
  }

  pub fn empty_trash(&self) {
    self.state.lock().trash.clear();
  }

  /// Minimize every visible window (no animation).
  pub fn minimize_all(&self) {
    for id in self.window_ids() {
      let _ = self.minimize(&id, None);
    }
  }

  /// Restore every minimized window (no animation).
  pub fn restore_all(&self) {
    let minimized: Vec<WindowId> = self
      .windows()
      .into_iter()
      .filter(|w| w.minimized)
      .map(|w| w.id)
      .collect();
    for id in minimized {
      let _ = self.restore(&id, None);
    }
  }

  /// Lay out all visible windows in a near-square grid across the usable
  /// viewport.
  pub fn tile(&self) {
    let records = {
      let mut state = self.state.lock();
      let viewport = state.viewport;
      let mut visible: Vec<WindowId> = state
        .windows
        .iter()
        .filter(|(_, e)| !e.minimized)
        .map(|(id, _)| id.clone())
        .collect();
      visible.sort_by(|a, b| a.as_str().cmp(b.as_str()));
      if visible.is_empty() {
        return;
      }

      let cols = (visible.len() as f64).sqrt().ceil().max(1.0);
      let rows = (visible.len() as f64 / cols).ceil().max(1.0);
      let usable_w = viewport.w - VIEWPORT_PADDING * 2.0;
      let usable_h = viewport.h - MENU_BAR_HEIGHT - VIEWPORT_PADDING * 2.0;
      let cell_w = usable_w / cols;
      let cell_h = usable_h / rows;

      let mut records = Vec::with_capacity(visible.len());
      for (i, id) in visible.iter().enumerate() {
        let col = i as f64 % cols;
        let row = (i as f64 / cols).floor();
        let Some(entry) = state.windows.get_mut(id) else {
          continue;
        };
        entry.maximized = false;
        entry.prev_rect = None;
        entry.rect = Rect::new(
          VIEWPORT_PADDING + col * cell_w,
          MENU_BAR_HEIGHT + VIEWPORT_PADDING + row * cell_h,
          cell_w.max(MIN_SIZE.w.min(usable_w)),
          cell_h.max(MIN_SIZE.h.min(usable_h)),
        );
        self.persist_geometry(id, entry.rect);
        records.push(make_record(id, entry));
      }
      records
    };
    for record in records {
      self.emit(Event::WindowChanged { window: record });
    }
  }

  /// Re-stack all visible windows into fresh cascade slots.
  pub fn cascade(&self) {
    let records = {
      let mut state = self.state.lock();
      let viewport = state.viewport;
      let mut visible: Vec<WindowId> = state
        .windows
        .iter()
        .filter(|(_, e)| !e.minimized)
        .map(|(id, _)| id.clone())
        .collect();
      visible.sort_by(|a, b| a.as_str().cmp(b.as_str()));

      let mut records = Vec::with_capacity(visible.len());
      for (i, id) in visible.iter().enumerate() {
        let n = i as f64;
        let Some(entry) = state.windows.get_mut(id) else {
          continue;
        };
        entry.maximized = false;
        entry.prev_rect = None;
        entry.rect = clamp_to_viewport(
          Rect::new(
            RESTACK_LEFT + n * RESTACK_DX,
            RESTACK_TOP + n * RESTACK_DY,
            entry.rect.width,
            entry.rect.height,
          ),
          viewport,
          MENU_BAR_HEIGHT,
          VIEWPORT_PADDING,
        );
        self.persist_geometry(id, entry.rect);
        records.push(make_record(id, entry));
      }
      records
    };
    for record in records {
      self.emit(Event::WindowChanged { window: record });
    }
  }

  // -- viewport / queries -------------------------------------------------

  /// Adopt a new viewport size, pulling any stranded windows back on-screen.
  pub fn set_viewport(&self, viewport: Size) {
    let changed = {
      let mut state = self.state.lock();
      state.viewport = viewport;
      let ids: Vec<WindowId> = state.windows.keys().cloned().collect();
      let mut changed = Vec::new();
      for id in ids {
        let Some(entry) = state.windows.get_mut(&id) else {
          continue;
        };
        if entry.maximized {
          entry.rect = Rect::new(
            VIEWPORT_PADDING,
            MENU_BAR_HEIGHT + VIEWPORT_PADDING,
            viewport.w - VIEWPORT_PADDING * 2.0,
            viewport.h - MENU_BAR_HEIGHT - VIEWPORT_PADDING * 2.0,
          );
          changed.push(make_record(&id, entry));
          continue;
        }
        let clamped = clamp_to_viewport(entry.rect, viewport, MENU_BAR_HEIGHT, VIEWPORT_PADDING);
        if clamped != entry.rect {
          entry.rect = clamped;
          changed.push(make_record(&id, entry));
        }
      }
      changed
    };
    for record in changed {
      self.emit(Event::WindowChanged { window: record });
    }
  }

  pub fn viewport(&self) -> Size {
    self.state.lock().viewport
  }

  pub fn window(&self, id: &WindowId) -> Option<WindowRecord> {
    let state = self.state.lock();
    state.windows.get(id).map(|entry| make_record(id, entry))
  }

  /// All windows, back to front.
  pub fn windows(&self) -> Vec<WindowRecord> {
    let state = self.state.lock();
    let mut records: Vec<WindowRecord> =
      state.windows.iter().map(|(id, entry)| make_record(id, entry)).collect();
    records.sort_by_key(|r| r.z);
    records
  }

  fn window_ids(&self) -> Vec<WindowId> {
    self.state.lock().windows.keys().cloned().collect()
  }

  pub fn set_task_switcher_open(&self, open: bool) {
    let mut state = self.state.lock();
    state.task_switcher_open = open;
    self.save_session_locked(&state);
  }

  /// Current session shape, as persisted under `daemonos.session`.
  pub fn session(&self) -> Session {
    self.state.lock().to_session()
  }

  // -- persistence --------------------------------------------------------

  fn persist_geometry(&self, id: &WindowId, rect: Rect) {
    let mut saved: WindowStateMap = storage::load_json(&*self.storage, keys::WINDOW_STATE);
    saved.insert(id.clone(), rect.into());
    storage::save_json(&*self.storage, keys::WINDOW_STATE, &saved);
  }

  fn save_session_locked(&self, state: &WmState) {
    storage::save_json(&*self.storage, keys::SESSION, &state.to_session());
  }
}

impl WmState {
  fn to_session(&self) -> Session {
    let mut entries: Vec<(&WindowId, &WindowEntry)> = self.windows.iter().collect();
    entries.sort_by_key(|(_, e)| e.z);
    Session {
      windows: entries
        .into_iter()
        .map(|(id, entry)| SessionWindow {
          id: id.clone(),
          title: entry.title.clone(),
          meta: entry.meta.clone(),
          minimized: entry.minimized || entry.pending_minimize,
        })
        .collect(),
      task_switcher_open: self.task_switcher_open,
    }
  }
}

fn unix_time_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn make_record(id: &WindowId, entry: &WindowEntry) -> WindowRecord {
  WindowRecord {
    id: id.clone(),
    title: entry.title.clone(),
    meta: entry.meta.clone(),
    rect: entry.rect,
    minimized: entry.minimized,
    maximized: entry.maximized,
    z: entry.z,
  }
}
