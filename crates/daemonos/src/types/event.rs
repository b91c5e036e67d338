/*! Event types for desktop state changes and synchronization. */

use super::{AppId, WindowId, WindowRecord};
use crate::config::Settings;
use crate::lifecycle::AppSummary;
use crate::perf::PerfStats;
use crate::resources::ResourceTotals;
use serde::Serialize;
use ts_rs::TS;

/// Initial state sent on connection.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct Snapshot {
  pub windows: Vec<WindowRecord>,
  pub apps: Vec<AppSummary>,
  pub focused_app: Option<AppId>,
  pub totals: ResourceTotals,
  pub stats: PerfStats,
  pub settings: Settings,
}

/// Events emitted when desktop state changes.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "event", content = "data")]
#[ts(export)]
pub enum Event {
  // Initial sync (on connection)
  #[serde(rename = "sync:init")]
  SyncInit(Box<Snapshot>),

  // Window lifecycle
  #[serde(rename = "window:added")]
  WindowAdded { window: WindowRecord },
  #[serde(rename = "window:changed")]
  WindowChanged { window: WindowRecord },
  #[serde(rename = "window:removed")]
  WindowRemoved { window_id: WindowId },
  #[serde(rename = "window:minimized")]
  WindowMinimized { window_id: WindowId },
  #[serde(rename = "window:restored")]
  WindowRestored { window_id: WindowId },

  // App focus (single-focus desktop model)
  #[serde(rename = "focus:app")]
  FocusApp { app_id: Option<AppId> },

  // App lifecycle
  #[serde(rename = "app:suspended")]
  AppSuspended { app_id: AppId },
  #[serde(rename = "app:resumed")]
  AppResumed { app_id: AppId },
  #[serde(rename = "app:closed")]
  AppClosed { app_id: AppId },

  // Telemetry
  #[serde(rename = "resources:changed")]
  ResourcesChanged { totals: ResourceTotals },

  // Settings
  #[serde(rename = "settings:changed")]
  SettingsChanged { settings: Settings },
}
