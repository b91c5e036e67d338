/*!
Performance monitor.

Samples frame rate, long-task duration, heap usage and allocation spikes, and
blends them into a composite 0-100 pressure score. One monitor drives the whole
process from the single frame driver; it never schedules anything per app.

Every signal is best-effort: a host without heap introspection or a
device-memory hint contributes a neutral zero to the score rather than an
error.
*/

use crate::config::{
  DEFAULT_BUDGET_MB, DEVICE_MEMORY_FRACTION, PRESSURE_WEIGHT_ALLOCATION, PRESSURE_WEIGHT_FPS,
  PRESSURE_WEIGHT_HEAP, PRESSURE_WEIGHT_LONG_TASK, SIGNAL_DECAY,
};
use crate::resources::ResourceTracker;
use crate::types::SubscriptionId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use ts_rs::TS;

/// Sliding-window length for instantaneous fps samples.
const FPS_WINDOW: usize = 30;

/// Interval between heap samples and signal decay ticks.
const SAMPLE_INTERVAL_MS: f64 = 1000.0;

/// Long-task duration at which the long-task score saturates.
const LONG_TASK_SATURATION_MS: f64 = 120.0;

/// Heap usage ratio below which the heap score stays zero.
const HEAP_SCORE_FLOOR: f64 = 0.4;

/// One heap measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HeapSample {
  pub used_bytes: u64,
  pub limit_bytes: u64,
}

/// Host memory-introspection capability. All methods are best-effort.
pub trait MemoryProbe: Send + Sync {
  /// Current heap usage, if the host exposes it.
  fn heap(&self) -> Option<HeapSample> {
    None
  }

  /// Installed device memory in GB, if the host exposes it.
  fn device_memory_gb(&self) -> Option<f64> {
    None
  }
}

/// Probe for hosts with no memory introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {}

/// Point-in-time monitor output, including the composite pressure score.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PerfStats {
  pub fps: u32,
  pub fps_raw: f64,
  pub long_task_ms: u32,
  pub heap_used: Option<u64>,
  pub heap_limit: Option<u64>,
  pub heap_ratio: Option<f64>,
  pub allocation_score: f64,
  /// 0-100 blend of fps deficit, long tasks, allocation spikes and heap ratio.
  pub pressure_score: u32,
}

struct PerfInner {
  running: bool,
  last_frame_ms: Option<f64>,
  last_sample_ms: f64,
  fps: f64,
  fps_samples: VecDeque<f64>,
  long_task_ms: f64,
  heap: Option<HeapSample>,
  allocation_spike: f64,
  last_allocation: u64,
  budget_bytes: u64,
}

/// Frame/heap/pressure sampler. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct PerfMonitor {
  inner: Arc<Mutex<PerfInner>>,
  probe: Arc<dyn MemoryProbe>,
}

impl std::fmt::Debug for PerfMonitor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PerfMonitor").finish_non_exhaustive()
  }
}

fn clamp01(value: f64) -> f64 {
  value.clamp(0.0, 1.0)
}

impl PerfMonitor {
  /// Create a monitor using the given memory probe for budget and heap data.
  pub fn new(probe: Arc<dyn MemoryProbe>) -> Self {
    let budget_bytes = budget_bytes(probe.as_ref());
    Self {
      inner: Arc::new(Mutex::new(PerfInner {
        running: false,
        last_frame_ms: None,
        last_sample_ms: 0.0,
        fps: 60.0,
        fps_samples: VecDeque::with_capacity(FPS_WINDOW),
        long_task_ms: 0.0,
        heap: None,
        allocation_spike: 0.0,
        last_allocation: 0,
        budget_bytes,
      })),
      probe,
    }
  }

  /// Subscribe to a tracker so positive allocation deltas feed the spike score.
  pub fn attach_tracker(&self, tracker: &ResourceTracker) -> SubscriptionId {
    let inner = Arc::clone(&self.inner);
    tracker.subscribe(move |totals| {
      let mut state = inner.lock();
      let delta = totals.total_bytes.saturating_sub(state.last_allocation);
      if totals.total_bytes > state.last_allocation {
        #[allow(clippy::cast_precision_loss)]
        let spike = clamp01(delta as f64 / state.budget_bytes.max(1) as f64) * 100.0;
        state.allocation_spike = state.allocation_spike.max(spike);
      }
      state.last_allocation = totals.total_bytes;
    })
  }

  /// Begin sampling. Idempotent while running.
  pub fn start(&self) {
    let mut state = self.inner.lock();
    if state.running {
      return;
    }
    state.running = true;
    state.last_frame_ms = None;
    state.heap = self.probe.heap();
  }

  /// Stop sampling. Frames observed while stopped are ignored.
  pub fn stop(&self) {
    self.inner.lock().running = false;
  }

  /// Record one frame boundary. Called by the frame driver with a
  /// monotonically increasing timestamp.
  pub fn on_frame(&self, now_ms: f64) {
    let mut state = self.inner.lock();
    if !state.running {
      return;
    }
    let Some(last) = state.last_frame_ms else {
      state.last_frame_ms = Some(now_ms);
      state.last_sample_ms = now_ms;
      return;
    };
    let delta = now_ms - last;
    state.last_frame_ms = Some(now_ms);

    let fps = if delta > 0.0 { 1000.0 / delta } else { 60.0 };
    if state.fps_samples.len() >= FPS_WINDOW {
      state.fps_samples.pop_front();
    }
    state.fps_samples.push_back(fps);
    state.fps = state.fps_samples.iter().sum::<f64>() / state.fps_samples.len() as f64;

    if now_ms - state.last_sample_ms > SAMPLE_INTERVAL_MS {
      state.heap = self.probe.heap();
      state.allocation_spike *= SIGNAL_DECAY;
      state.long_task_ms *= SIGNAL_DECAY;
      state.last_sample_ms = now_ms;
    }
  }

  /// Report a long task observed by the host. Held as a max until the next
  /// decay tick so a single stall doesn't vanish immediately.
  pub fn record_long_task(&self, duration_ms: f64) {
    let mut state = self.inner.lock();
    state.long_task_ms = state.long_task_ms.max(duration_ms.max(0.0));
  }

  /// Memory budget used to scale allocation spikes and monitor percentages.
  pub fn budget_bytes(&self) -> u64 {
    self.inner.lock().budget_bytes
  }

  /// Device-memory hint, if the host exposes one.
  pub fn device_memory_gb(&self) -> Option<f64> {
    self.probe.device_memory_gb()
  }

  /// Compute current stats and the composite pressure score.
  pub fn stats(&self) -> PerfStats {
    let state = self.inner.lock();

    let fps_score = clamp01((60.0 - state.fps) / 60.0) * 100.0;
    let long_task_score = clamp01(state.long_task_ms / LONG_TASK_SATURATION_MS) * 100.0;
    let heap_ratio = state.heap.and_then(|h| {
      if h.limit_bytes == 0 {
        None
      } else {
        #[allow(clippy::cast_precision_loss)]
        Some(h.used_bytes as f64 / h.limit_bytes as f64)
      }
    });
    let heap_score = heap_ratio
      .map(|ratio| clamp01((ratio - HEAP_SCORE_FLOOR) / (1.0 - HEAP_SCORE_FLOOR)) * 100.0)
      .unwrap_or(0.0);
    let allocation_score = state.allocation_spike.clamp(0.0, 100.0);

    let pressure = fps_score * PRESSURE_WEIGHT_FPS
      + long_task_score * PRESSURE_WEIGHT_LONG_TASK
      + allocation_score * PRESSURE_WEIGHT_ALLOCATION
      + heap_score * PRESSURE_WEIGHT_HEAP;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    PerfStats {
      fps: state.fps.round() as u32,
      fps_raw: state.fps,
      long_task_ms: state.long_task_ms.round() as u32,
      heap_used: state.heap.map(|h| h.used_bytes),
      heap_limit: state.heap.map(|h| h.limit_bytes),
      heap_ratio,
      allocation_score,
      pressure_score: pressure.round() as u32,
    }
  }
}

fn budget_bytes(probe: &dyn MemoryProbe) -> u64 {
  #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
  match probe.device_memory_gb() {
    Some(gb) if gb > 0.0 => {
      (gb * DEVICE_MEMORY_FRACTION * 1024.0 * 1024.0 * 1024.0).round() as u64
    }
    _ => DEFAULT_BUDGET_MB * 1024 * 1024,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Probe with fixed values for deterministic tests.
  #[derive(Debug, Clone, Copy)]
  struct FixedProbe {
    heap: Option<HeapSample>,
    device_gb: Option<f64>,
  }

  impl MemoryProbe for FixedProbe {
    fn heap(&self) -> Option<HeapSample> {
      self.heap
    }

    fn device_memory_gb(&self) -> Option<f64> {
      self.device_gb
    }
  }

  fn monitor_with(heap: Option<HeapSample>, device_gb: Option<f64>) -> PerfMonitor {
    PerfMonitor::new(Arc::new(FixedProbe { heap, device_gb }))
  }

  fn drive_frames(monitor: &PerfMonitor, start_ms: f64, count: usize, interval_ms: f64) -> f64 {
    let mut now = start_ms;
    for _ in 0..count {
      monitor.on_frame(now);
      now += interval_ms;
    }
    now
  }

  mod fps_tests {
    use super::*;

    #[test]
    fn steady_60hz_frames_score_zero_pressure() {
      let monitor = monitor_with(None, None);
      monitor.start();
      drive_frames(&monitor, 0.0, 31, 1000.0 / 60.0);

      let stats = monitor.stats();
      assert_eq!(stats.fps, 60);
      assert_eq!(stats.pressure_score, 0);
    }

    #[test]
    fn slow_frames_raise_the_fps_deficit() {
      let monitor = monitor_with(None, None);
      monitor.start();
      // 100ms frames = 10 fps across the whole window.
      drive_frames(&monitor, 0.0, 40, 100.0);

      let stats = monitor.stats();
      assert_eq!(stats.fps, 10);
      // fps score = (60-10)/60*100 ≈ 83.3, weighted 0.35 → ≈29.
      assert_eq!(stats.pressure_score, 29);
    }

    #[test]
    fn window_only_keeps_recent_samples() {
      let monitor = monitor_with(None, None);
      monitor.start();
      // A long stretch of terrible frames, then a full window of good ones.
      let now = drive_frames(&monitor, 0.0, 40, 200.0);
      drive_frames(&monitor, now, 31, 1000.0 / 60.0);

      assert_eq!(monitor.stats().fps, 60, "old samples should have aged out");
    }

    #[test]
    fn frames_are_ignored_while_stopped() {
      let monitor = monitor_with(None, None);
      monitor.start();
      monitor.stop();
      drive_frames(&monitor, 0.0, 10, 100.0);
      assert_eq!(monitor.stats().fps, 60, "default fps should be untouched");
    }
  }

  mod long_task_tests {
    use super::*;

    #[test]
    fn long_tasks_hold_the_max_until_decay() {
      let monitor = monitor_with(None, None);
      monitor.start();
      monitor.record_long_task(100.0);
      monitor.record_long_task(40.0);
      assert_eq!(monitor.stats().long_task_ms, 100);
    }

    #[test]
    fn decay_halves_ish_each_sample_tick() {
      let monitor = monitor_with(None, None);
      monitor.start();
      monitor.on_frame(0.0);
      monitor.record_long_task(100.0);

      // Cross one >1s sampling boundary.
      monitor.on_frame(500.0);
      monitor.on_frame(1100.0);
      assert_eq!(monitor.stats().long_task_ms, 60, "100 * 0.6");

      // And another.
      monitor.on_frame(2200.0);
      assert_eq!(monitor.stats().long_task_ms, 36, "60 * 0.6");
    }
  }

  mod heap_tests {
    use super::*;

    #[test]
    fn heap_absent_contributes_nothing() {
      let monitor = monitor_with(None, None);
      monitor.start();
      let stats = monitor.stats();
      assert_eq!(stats.heap_used, None);
      assert_eq!(stats.heap_ratio, None);
      assert_eq!(stats.pressure_score, 0);
    }

    #[test]
    fn heap_score_only_kicks_in_above_forty_percent() {
      let low = monitor_with(
        Some(HeapSample {
          used_bytes: 30,
          limit_bytes: 100,
        }),
        None,
      );
      low.start();
      assert_eq!(low.stats().pressure_score, 0, "30% heap is below the floor");

      let high = monitor_with(
        Some(HeapSample {
          used_bytes: 100,
          limit_bytes: 100,
        }),
        None,
      );
      high.start();
      // heap score saturates at 100, weighted 0.2 → 20.
      assert_eq!(high.stats().pressure_score, 20);
    }
  }

  mod allocation_tests {
    use super::*;

    #[test]
    fn claims_feed_the_allocation_spike() {
      let tracker = ResourceTracker::new();
      let monitor = monitor_with(None, Some(1.0)); // budget = 0.3 GiB
      monitor.attach_tracker(&tracker);
      monitor.start();

      // Claim ~30% of budget in one go.
      let budget = monitor.budget_bytes();
      tracker.claim("chess", "engine", budget * 3 / 10, "");

      let stats = monitor.stats();
      assert!(
        (stats.allocation_score - 30.0).abs() < 1.0,
        "expected ≈30, got {}",
        stats.allocation_score
      );
    }

    #[test]
    fn releases_do_not_spike() {
      let tracker = ResourceTracker::new();
      let monitor = monitor_with(None, None);
      monitor.attach_tracker(&tracker);
      monitor.start();

      let token = tracker.claim("chess", "engine", 1_000_000, "");
      let after_claim = monitor.stats().allocation_score;
      tracker.release(token);
      let after_release = monitor.stats().allocation_score;
      assert_eq!(
        after_claim, after_release,
        "negative deltas must not add to the spike"
      );
    }

    #[test]
    fn spike_decays_on_sample_ticks() {
      let tracker = ResourceTracker::new();
      let monitor = monitor_with(None, None);
      monitor.attach_tracker(&tracker);
      monitor.start();
      monitor.on_frame(0.0);

      tracker.claim("chess", "engine", monitor.budget_bytes(), "");
      let initial = monitor.stats().allocation_score;
      assert!(initial > 99.0);

      monitor.on_frame(1100.0);
      let decayed = monitor.stats().allocation_score;
      assert!(
        (decayed - initial * SIGNAL_DECAY).abs() < 1e-6,
        "spike should decay by the signal factor"
      );
    }
  }

  mod budget_tests {
    use super::*;

    #[test]
    fn default_budget_without_device_hint() {
      let monitor = monitor_with(None, None);
      assert_eq!(monitor.budget_bytes(), DEFAULT_BUDGET_MB * 1024 * 1024);
    }

    #[test]
    fn device_memory_scales_the_budget() {
      let monitor = monitor_with(None, Some(8.0));
      let expected = (8.0 * DEVICE_MEMORY_FRACTION * 1024.0 * 1024.0 * 1024.0).round() as u64;
      assert_eq!(monitor.budget_bytes(), expected);
    }
  }
}
