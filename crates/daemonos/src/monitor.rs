/*!
System monitor.

Read-only reporting over the tracker/perf/lifecycle trio, plus the automatic
pressure-relief policy: when the blended pressure score crosses the high
threshold, apps are asked to shed optional caches, rate-limited by a cooldown
so one bad stretch doesn't hammer every app each frame.
*/

use crate::config::{PRESSURE_HIGH, PRESSURE_LOW, PRESSURE_RELIEF_COOLDOWN_MS};
use crate::lifecycle::{AppLifecycle, AppStats, AppStatus};
use crate::perf::{PerfMonitor, PerfStats};
use crate::resources::ResourceTracker;
use crate::types::AppId;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use ts_rs::TS;

/// Severity bucket shown next to gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub enum Level {
  Low,
  Med,
  High,
}

/// One per-app row in the monitor panel, heaviest first.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct AppRow {
  pub app_id: AppId,
  pub title: String,
  pub status: AppStatus,
  pub bytes: u64,
  pub bytes_label: String,
}

/// Snapshot of everything the monitor panel renders.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct SystemReport {
  /// Tracked memory as a percentage of the budget, clamped to 0..=100.
  pub memory_percent: u32,
  pub memory_level: Level,
  pub used_label: String,
  pub budget_label: String,
  pub pressure_level: Level,
  pub warning: Option<String>,
  pub apps: Vec<AppRow>,
  pub app_stats: AppStats,
  pub perf: PerfStats,
}

struct MonitorInner {
  last_relief_ms: Option<f64>,
}

/// Aggregates tracker, perf and lifecycle into user-facing reports and runs
/// the cache-relief policy.
pub struct SystemMonitor {
  tracker: Arc<ResourceTracker>,
  perf: Arc<PerfMonitor>,
  lifecycle: Arc<AppLifecycle>,
  inner: Mutex<MonitorInner>,
}

impl std::fmt::Debug for SystemMonitor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SystemMonitor").finish_non_exhaustive()
  }
}

impl SystemMonitor {
  pub fn new(
    tracker: Arc<ResourceTracker>,
    perf: Arc<PerfMonitor>,
    lifecycle: Arc<AppLifecycle>,
  ) -> Self {
    Self {
      tracker,
      perf,
      lifecycle,
      inner: Mutex::new(MonitorInner { last_relief_ms: None }),
    }
  }

  /// Build the current report.
  pub fn report(&self) -> SystemReport {
    let totals = self.tracker.totals();
    let perf = self.perf.stats();
    let budget = self.perf.budget_bytes();

    let memory_percent = if budget == 0 {
      0
    } else {
      ((totals.total_bytes as f64 / budget as f64) * 100.0).clamp(0.0, 100.0).round() as u32
    };
    let memory_level = if memory_percent >= 75 {
      Level::High
    } else if memory_percent >= 50 {
      Level::Med
    } else {
      Level::Low
    };
    let pressure_level = if perf.pressure_score >= PRESSURE_HIGH {
      Level::High
    } else if perf.pressure_score >= PRESSURE_LOW {
      Level::Med
    } else {
      Level::Low
    };

    let warning = match (memory_level, pressure_level) {
      (Level::High, _) => {
        Some("Memory budget nearly exhausted. Close or suspend apps to free resources.".to_owned())
      }
      (_, Level::High) => {
        Some("System under pressure. Background apps may be throttled.".to_owned())
      }
      _ => None,
    };

    let mut apps: Vec<AppRow> = self
      .lifecycle
      .app_list()
      .into_iter()
      .map(|app| {
        let bytes = totals.by_app.get(&app.app_id).map_or(0, |t| t.total_bytes);
        AppRow {
          app_id: app.app_id,
          title: app.title,
          status: app.status,
          bytes,
          bytes_label: format_bytes(bytes),
        }
      })
      .collect();
    apps.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.app_id.as_str().cmp(b.app_id.as_str())));

    SystemReport {
      memory_percent,
      memory_level,
      used_label: format_bytes(totals.total_bytes),
      budget_label: format_bytes(budget),
      pressure_level,
      warning,
      apps,
      app_stats: self.lifecycle.app_stats(),
      perf,
    }
  }

  /// Park everything except the focused app.
  pub fn suspend_background_apps(&self) {
    self.lifecycle.suspend_background_apps();
  }

  /// Ask every app to shed rebuildable memory, resetting the relief cooldown.
  pub fn free_caches(&self, now_ms: f64) {
    self.inner.lock().last_relief_ms = Some(now_ms);
    self.lifecycle.free_optional_caches();
  }

  /// Relief policy, called once per monitor refresh. Fires `free_caches` when
  /// pressure is high and the cooldown has elapsed. Returns whether it fired.
  pub fn maybe_relieve_pressure(&self, now_ms: f64) -> bool {
    if self.perf.stats().pressure_score < PRESSURE_HIGH {
      return false;
    }
    {
      let inner = self.inner.lock();
      if let Some(last) = inner.last_relief_ms {
        if now_ms - last < PRESSURE_RELIEF_COOLDOWN_MS {
          return false;
        }
      }
    }
    log::info!("High pressure sustained, requesting cache relief");
    self.free_caches(now_ms);
    true
  }
}

/// Human-readable byte count: "512 B", "7.5 MB", "120 MB", "1.2 GB".
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
  let mut value = bytes as f64;
  let mut idx = 0;
  while value >= 1024.0 && idx < UNITS.len() - 1 {
    value /= 1024.0;
    idx += 1;
  }
  if idx > 0 && value < 10.0 {
    format!("{value:.1} {}", UNITS[idx])
  } else {
    format!("{} {}", value.round() as u64, UNITS[idx])
  }
}
