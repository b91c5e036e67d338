/*!
Frame driver.

One background thread stands in for the host's frame callback: each iteration
advances the perf monitor and every app loop with a shared timestamp, and at
the monitor cadence runs the pressure-relief policy. Apps never own threads;
all scheduling funnels through here.

Consumers don't interact with this directly - the driver is owned by `Desktop`.
*/

use crate::config::UPDATE_HZ;
use crate::lifecycle::AppLifecycle;
use crate::monitor::SystemMonitor;
use crate::perf::PerfMonitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_FRAME_INTERVAL_MS: u64 = 8;

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
  pub frame_interval_ms: u64,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self { frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS }
  }
}

/// Handle to control the driver's lifetime. Stops on drop.
pub struct DriverHandle {
  stop_signal: Arc<AtomicBool>,
  thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DriverHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DriverHandle").finish_non_exhaustive()
  }
}

impl DriverHandle {
  fn stop(&self) {
    self.stop_signal.store(true, Ordering::SeqCst);
  }
}

impl Drop for DriverHandle {
  fn drop(&mut self) {
    self.stop();
    if let Some(t) = self.thread.take() {
      drop(t.join());
    }
  }
}

/// Everything one frame advances. Extracted so hosts that drive frames
/// themselves (or tests) can call it with explicit timestamps.
pub fn frame_iteration(
  perf: &PerfMonitor,
  lifecycle: &AppLifecycle,
  monitor: &SystemMonitor,
  now_ms: f64,
  last_policy_ms: &mut f64,
) {
  perf.on_frame(now_ms);
  lifecycle.tick_all(now_ms);

  let policy_interval_ms = 1000.0 / UPDATE_HZ;
  if now_ms - *last_policy_ms >= policy_interval_ms {
    *last_policy_ms = now_ms;
    monitor.maybe_relieve_pressure(now_ms);
  }
}

pub(crate) fn start_driver(
  perf: Arc<PerfMonitor>,
  lifecycle: Arc<AppLifecycle>,
  monitor: Arc<SystemMonitor>,
  config: DriverConfig,
) -> DriverHandle {
  let stop_signal = Arc::new(AtomicBool::new(false));
  let stop_signal_clone = Arc::clone(&stop_signal);

  let thread = thread::spawn(move || {
    let epoch = Instant::now();
    let mut last_policy_ms = 0.0;
    while !stop_signal_clone.load(Ordering::SeqCst) {
      let loop_start = Instant::now();

      let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
      frame_iteration(&perf, &lifecycle, &monitor, now_ms, &mut last_policy_ms);

      let elapsed = loop_start.elapsed();
      let target = Duration::from_millis(config.frame_interval_ms);
      if elapsed < target {
        thread::sleep(target - elapsed);
      }
    }
  });

  DriverHandle { stop_signal, thread: Some(thread) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lifecycle::LoopConfig;
  use crate::perf::NoMemoryProbe;
  use crate::resources::ResourceTracker;
  use std::sync::atomic::AtomicU32;

  fn rig() -> (Arc<PerfMonitor>, Arc<AppLifecycle>, Arc<SystemMonitor>) {
    let (mut tx, rx) = async_broadcast::broadcast(64);
    tx.set_overflow(true);
    std::mem::forget(rx.deactivate());
    let tracker = Arc::new(ResourceTracker::new());
    let perf = Arc::new(PerfMonitor::new(Arc::new(NoMemoryProbe)));
    let lifecycle = Arc::new(AppLifecycle::new(Arc::clone(&tracker), tx));
    let monitor = Arc::new(SystemMonitor::new(tracker, Arc::clone(&perf), Arc::clone(&lifecycle)));
    (perf, lifecycle, monitor)
  }

  #[test]
  fn frame_iteration_advances_perf_and_loops() {
    let (perf, lifecycle, monitor) = rig();
    perf.start();
    let steps = Arc::new(AtomicU32::new(0));
    let s = Arc::clone(&steps);
    lifecycle.create_loop(
      "chess",
      LoopConfig {
        step: Some(Box::new(move |_| {
          s.fetch_add(1, Ordering::SeqCst);
        })),
        render: None,
      },
    );

    let mut last_policy = 0.0;
    let mut now = 0.0;
    for _ in 0..20 {
      frame_iteration(&perf, &lifecycle, &monitor, now, &mut last_policy);
      now += 100.0;
    }
    assert!(steps.load(Ordering::SeqCst) > 0, "loops are ticked by the driver");
    assert!(perf.stats().fps_raw > 0.0, "frames were recorded");
  }

  #[test]
  fn thread_driver_runs_and_stops_on_drop() {
    let (perf, lifecycle, monitor) = rig();
    perf.start();
    let steps = Arc::new(AtomicU32::new(0));
    let s = Arc::clone(&steps);
    lifecycle.create_loop(
      "chess",
      LoopConfig {
        step: Some(Box::new(move |_| {
          s.fetch_add(1, Ordering::SeqCst);
        })),
        render: None,
      },
    );

    let handle = start_driver(
      Arc::clone(&perf),
      Arc::clone(&lifecycle),
      monitor,
      DriverConfig::default(),
    );
    thread::sleep(Duration::from_millis(150));
    drop(handle);

    let after_stop = steps.load(Ordering::SeqCst);
    assert!(after_stop > 0, "driver thread stepped the loop");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(steps.load(Ordering::SeqCst), after_stop, "no ticks after drop");
  }
}
