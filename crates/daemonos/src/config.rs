/*!
Tuning constants and user settings.

The pressure-score weights, decay factor and fps tiers are policy constants
carried over from the original shell. They are tunable, not invariants.
*/

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Fallback memory budget when the host exposes no device-memory hint.
pub const DEFAULT_BUDGET_MB: u64 = 768;

/// Fraction of reported device memory granted to the tracked-resource budget.
pub const DEVICE_MEMORY_FRACTION: f64 = 0.3;

/// System-monitor refresh rate (reports per second).
pub const UPDATE_HZ: f64 = 3.0;

/// Pressure score (0-100) above which the monitor reports "Med".
pub const PRESSURE_LOW: u32 = 35;

/// Pressure score (0-100) above which the monitor reports "High" and may
/// trigger cache relief.
pub const PRESSURE_HIGH: u32 = 70;

/// Target frame rate applied to every loop of a non-focused app.
pub const BACKGROUND_FPS: f64 = 12.0;

/// Maximum simulation step rate; also the focused-app target.
pub const MAX_STEP_HZ: f64 = 60.0;

/// Hard floor for loop target rates; avoids runaway accumulation.
pub const MIN_TARGET_FPS: f64 = 5.0;

/// Upper bound on catch-up steps executed in a single tick.
pub const MAX_STEPS_PER_TICK: u32 = 5;

/// Per-tick decay applied to long-task and allocation-spike signals.
pub const SIGNAL_DECAY: f64 = 0.6;

/// Pressure-score blend weights. Responsiveness (fps) dominates by design.
pub const PRESSURE_WEIGHT_FPS: f64 = 0.35;
pub const PRESSURE_WEIGHT_LONG_TASK: f64 = 0.25;
pub const PRESSURE_WEIGHT_ALLOCATION: f64 = 0.2;
pub const PRESSURE_WEIGHT_HEAP: f64 = 0.2;

/// Minimum interval between automatic `free_optional_caches` sweeps.
pub const PRESSURE_RELIEF_COOLDOWN_MS: f64 = 6000.0;

/// Genie minimize/restore tween duration.
pub const GENIE_DURATION_MS: f64 = 320.0;

/// Menu-bar height reserved at the top of the viewport.
pub const MENU_BAR_HEIGHT: f64 = 28.0;

/// Padding kept between windows and the viewport edges when clamping.
pub const VIEWPORT_PADDING: f64 = 12.0;

/// Minimum window size enforced by interactive resize.
pub const MIN_WINDOW_WIDTH: f64 = 320.0;
/// Minimum window size enforced by interactive resize.
pub const MIN_WINDOW_HEIGHT: f64 = 220.0;

/// User-facing settings, persisted under `daemonos.settings`.
///
/// Field names match the original shell's persisted JSON so existing state
/// deserializes unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct Settings {
  pub wallpaper: String,
  pub dock_size: f64,
  pub dock_zoom: f64,
  pub icon_size: f64,
  /// Master volume applied by the audio router, 0.0 - 1.0.
  pub volume: f64,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      wallpaper: "aurora".to_owned(),
      dock_size: 72.0,
      dock_zoom: 1.35,
      icon_size: 60.0,
      volume: 1.0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settings_merge_partial_persisted_json() {
    // Older persisted settings carry only some keys; missing ones default.
    let settings: Settings = serde_json::from_str(r#"{"wallpaper":"ember","dockSize":64}"#).unwrap();
    assert_eq!(settings.wallpaper, "ember");
    assert_eq!(settings.dock_size, 64.0);
    assert_eq!(settings.dock_zoom, 1.35, "unspecified keys keep defaults");
    assert_eq!(settings.volume, 1.0);
  }
}
