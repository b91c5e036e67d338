/*! Window-facing types: metadata variants, creation specs, records and the
persisted geometry/session shapes. */

use super::{AppId, Rect, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

/// What kind of content a window hosts. Replayed verbatim on session restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[ts(export)]
pub enum WindowMeta {
  /// A registered application.
  App { app_id: AppId },
  /// A registry-category browser ("games", "utilities", ...).
  Category { category: String },
  FileBrowser,
  Trash,
  Settings,
  About,
  /// Free-form informational window; never persisted with content.
  Info,
}

impl WindowMeta {
  /// The app id for app-typed windows.
  pub const fn app_id(&self) -> Option<&AppId> {
    match self {
      Self::App { app_id } => Some(app_id),
      Self::Category { .. }
      | Self::FileBrowser
      | Self::Trash
      | Self::Settings
      | Self::About
      | Self::Info => None,
    }
  }
}

/// Request to create a window.
#[derive(Debug, Clone)]
pub struct WindowSpec {
  pub id: WindowId,
  pub title: String,
  pub width: f64,
  pub height: f64,
  pub meta: WindowMeta,
  /// Create directly in the minimized state (session restore).
  pub minimized: bool,
}

impl WindowSpec {
  /// Spec with the default toy-app window size.
  pub fn new(id: impl Into<WindowId>, title: impl Into<String>, meta: WindowMeta) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      width: 520.0,
      height: 360.0,
      meta,
      minimized: false,
    }
  }

  #[must_use]
  pub const fn with_size(mut self, width: f64, height: f64) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  #[must_use]
  pub const fn minimized(mut self, minimized: bool) -> Self {
    self.minimized = minimized;
    self
  }
}

/// Public projection of a live window.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct WindowRecord {
  pub id: WindowId,
  pub title: String,
  pub meta: WindowMeta,
  pub rect: Rect,
  pub minimized: bool,
  pub maximized: bool,
  /// Stacking order: higher = frontmost.
  pub z: u64,
}

/// Persisted per-window geometry, keyed by stable window id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WindowGeometry {
  pub left: f64,
  pub top: f64,
  pub width: f64,
  pub height: f64,
}

impl From<Rect> for WindowGeometry {
  fn from(rect: Rect) -> Self {
    Self {
      left: rect.left,
      top: rect.top,
      width: rect.width,
      height: rect.height,
    }
  }
}

impl From<WindowGeometry> for Rect {
  fn from(geometry: WindowGeometry) -> Self {
    Self::new(geometry.left, geometry.top, geometry.width, geometry.height)
  }
}

/// Persisted map of window geometries (`daemonos.windowState`).
pub type WindowStateMap = HashMap<WindowId, WindowGeometry>;

/// One window in a persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionWindow {
  pub id: WindowId,
  pub title: String,
  pub meta: WindowMeta,
  pub minimized: bool,
}

/// Persisted session (`daemonos.session`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct Session {
  pub windows: Vec<SessionWindow>,
  pub task_switcher_open: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn meta_round_trips_through_session_json() {
    let meta = WindowMeta::App {
      app_id: AppId::from("pong"),
    };
    let json = serde_json::to_string(&meta).unwrap();
    assert!(json.contains("\"type\":\"app\""), "tagged form: {json}");
    let back: WindowMeta = serde_json::from_str(&json).unwrap();
    assert_eq!(back, meta);
  }

  #[test]
  fn session_tolerates_missing_fields() {
    let session: Session = serde_json::from_str("{}").unwrap();
    assert!(session.windows.is_empty());
    assert!(!session.task_switcher_open);
  }
}
