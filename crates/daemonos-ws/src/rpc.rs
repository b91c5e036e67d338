/*!
RPC request/response types and dispatch.
*/

#![allow(missing_docs)]

use daemonos::{
  AppId, Desktop, GenieTween, Menu, PerfStats, Rect, ResizeDir, ResourceTotals, Settings, Size,
  Snapshot, SystemReport, TrashItem, WindowId, WindowRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use ts_rs::TS;

/// RPC request.
#[derive(Debug, Deserialize, TS)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
#[ts(export)]
pub enum RpcRequest {
  /// Get a snapshot of current state.
  Snapshot,

  // Apps
  /// Launch an app from the registry.
  OpenApp { app_id: AppId },
  /// Focus an app (and raise its window), or clear focus.
  SetActiveApp {
    #[serde(default)]
    app_id: Option<AppId>,
  },
  SuspendApp { app_id: AppId },
  ResumeApp { app_id: AppId },
  /// Suspend every app except the focused one.
  SuspendBackground,
  /// Ask all apps to shed rebuildable memory.
  FreeCaches,

  // Windows
  CloseWindow { window_id: WindowId },
  FocusWindow { window_id: WindowId },
  ToggleMaximize { window_id: WindowId },
  /// Minimize toward a tray slot; returns the genie tween when animated.
  MinimizeWindow {
    window_id: WindowId,
    #[serde(default)]
    tray: Option<Rect>,
  },
  /// Complete an animated minimize once the tween finished.
  FinishMinimize { window_id: WindowId },
  RestoreWindow {
    window_id: WindowId,
    #[serde(default)]
    tray: Option<Rect>,
  },

  // Pointer gestures
  BeginDrag { window_id: WindowId },
  DragTo { dx: f64, dy: f64 },
  EndDrag,
  BeginResize { window_id: WindowId, dir: ResizeDir },
  ResizeTo { dx: f64, dy: f64 },
  EndResize,

  // Trash
  /// Windows closed so far, oldest first.
  Trash,
  EmptyTrash,

  // Bulk layout
  TileWindows,
  CascadeWindows,
  MinimizeAll,
  RestoreAll,
  /// Host viewport resized.
  SetViewport { width: f64, height: f64 },

  // Telemetry
  /// System monitor report.
  Report,
  /// Perf stats only.
  Stats,
  /// Resource totals only.
  Totals,
  /// Host observed a long task (ms).
  RecordLongTask { duration_ms: f64 },

  // Settings / audio
  UpdateSettings { settings: Settings },
  SetMasterVolume { volume: f64 },

  // Shell
  /// Menu bar contents for an app (defaults only when absent).
  Menus {
    #[serde(default)]
    app_id: Option<AppId>,
  },
  /// Replay the persisted session.
  RestoreSession,
}

/// RPC response.
#[derive(Debug, Serialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum RpcResponse {
  /// Full state snapshot.
  Snapshot(Box<Snapshot>),
  /// Single window.
  Window(Box<WindowRecord>),
  /// Window that may not exist (headless app launch).
  OptionalWindow(Option<Box<WindowRecord>>),
  /// Minimize/restore animation, when one should play.
  Tween(Option<GenieTween>),
  /// System monitor report.
  Report(Box<SystemReport>),
  Stats(PerfStats),
  Totals(ResourceTotals),
  Menus(Vec<Menu>),
  Trash(Vec<TrashItem>),
  /// No data.
  Null,
}

pub fn dispatch_json(desktop: &Desktop, method: &str, args: &JsonValue) -> JsonValue {
  let request_value = json!({ "method": method, "args": args });

  match serde_json::from_value::<RpcRequest>(request_value) {
    Ok(request) => match dispatch(desktop, request) {
      Ok(response) => json!({ "result": response }),
      Err(e) => {
        log::warn!("[rpc] {method} failed: {e}");
        json!({ "error": e })
      }
    },
    Err(e) => {
      log::warn!("[rpc] Invalid request for {method}: {e}");
      json!({ "error": format!("Invalid request: {}", e) })
    }
  }
}

pub fn dispatch(desktop: &Desktop, request: RpcRequest) -> Result<RpcResponse, String> {
  match request {
    RpcRequest::Snapshot => Ok(RpcResponse::Snapshot(Box::new(desktop.snapshot()))),

    RpcRequest::OpenApp { app_id } => {
      let window = desktop.open_app(&app_id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::OptionalWindow(window.map(Box::new)))
    }

    RpcRequest::SetActiveApp { app_id } => {
      desktop.set_active_app(app_id);
      Ok(RpcResponse::Null)
    }

    RpcRequest::SuspendApp { app_id } => {
      desktop.lifecycle().suspend_app(&app_id);
      Ok(RpcResponse::Null)
    }

    RpcRequest::ResumeApp { app_id } => {
      desktop.lifecycle().resume_app(&app_id);
      Ok(RpcResponse::Null)
    }

    RpcRequest::SuspendBackground => {
      desktop.lifecycle().suspend_background_apps();
      Ok(RpcResponse::Null)
    }

    RpcRequest::FreeCaches => {
      desktop.lifecycle().free_optional_caches();
      Ok(RpcResponse::Null)
    }

    RpcRequest::CloseWindow { window_id } => {
      desktop.close_window(&window_id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Null)
    }

    RpcRequest::FocusWindow { window_id } => {
      let window = desktop.wm().focus_window(&window_id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Window(Box::new(window)))
    }

    RpcRequest::ToggleMaximize { window_id } => {
      let window = desktop.wm().toggle_maximize(&window_id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Window(Box::new(window)))
    }

    RpcRequest::MinimizeWindow { window_id, tray } => {
      let tween = desktop.minimize_window(&window_id, tray).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Tween(tween))
    }

    RpcRequest::FinishMinimize { window_id } => {
      desktop.wm().finish_minimize(&window_id);
      Ok(RpcResponse::Null)
    }

    RpcRequest::RestoreWindow { window_id, tray } => {
      let tween = desktop.wm().restore(&window_id, tray).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Tween(tween))
    }

    RpcRequest::BeginDrag { window_id } => {
      desktop.wm().begin_drag(&window_id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Null)
    }

    RpcRequest::DragTo { dx, dy } => match desktop.wm().drag_to(dx, dy) {
      Some(window) => Ok(RpcResponse::Window(Box::new(window))),
      None => Ok(RpcResponse::Null),
    },

    RpcRequest::EndDrag => {
      desktop.wm().end_drag();
      Ok(RpcResponse::Null)
    }

    RpcRequest::BeginResize { window_id, dir } => {
      desktop.wm().begin_resize(&window_id, dir).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Null)
    }

    RpcRequest::ResizeTo { dx, dy } => match desktop.wm().resize_to(dx, dy) {
      Some(window) => Ok(RpcResponse::Window(Box::new(window))),
      None => Ok(RpcResponse::Null),
    },

    RpcRequest::EndResize => {
      desktop.wm().end_resize();
      Ok(RpcResponse::Null)
    }

    RpcRequest::Trash => Ok(RpcResponse::Trash(desktop.wm().trash())),

    RpcRequest::EmptyTrash => {
      desktop.wm().empty_trash();
      Ok(RpcResponse::Null)
    }

    RpcRequest::TileWindows => {
      desktop.wm().tile();
      Ok(RpcResponse::Null)
    }

    RpcRequest::CascadeWindows => {
      desktop.wm().cascade();
      Ok(RpcResponse::Null)
    }

    RpcRequest::MinimizeAll => {
      desktop.wm().minimize_all();
      Ok(RpcResponse::Null)
    }

    RpcRequest::RestoreAll => {
      desktop.wm().restore_all();
      Ok(RpcResponse::Null)
    }

    RpcRequest::SetViewport { width, height } => {
      desktop.wm().set_viewport(Size::new(width, height));
      Ok(RpcResponse::Null)
    }

    RpcRequest::Report => Ok(RpcResponse::Report(Box::new(desktop.monitor().report()))),

    RpcRequest::Stats => Ok(RpcResponse::Stats(desktop.perf().stats())),

    RpcRequest::Totals => Ok(RpcResponse::Totals(desktop.tracker().totals())),

    RpcRequest::RecordLongTask { duration_ms } => {
      desktop.perf().record_long_task(duration_ms);
      Ok(RpcResponse::Null)
    }

    RpcRequest::UpdateSettings { settings } => {
      desktop.update_settings(settings);
      Ok(RpcResponse::Null)
    }

    RpcRequest::SetMasterVolume { volume } => {
      desktop.set_master_volume(volume);
      Ok(RpcResponse::Null)
    }

    RpcRequest::Menus { app_id } => Ok(RpcResponse::Menus(desktop.menus_for(app_id.as_ref()))),

    RpcRequest::RestoreSession => {
      desktop.restore_session();
      Ok(RpcResponse::Null)
    }
  }
}
