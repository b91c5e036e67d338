/*!
Per-frame loop controllers.

A `LoopController` runs an app's `step`/`render` pair at a throttleable target
rate using fixed-step accumulation. Every loop is ticked from the single frame
driver; `running`/`suspended` are independent flags: a stopped loop is out of
the schedule entirely, a suspended loop keeps its place in the schedule but
skips step/render work so resuming is immediate.

Catch-up after a stall is bounded to `MAX_STEPS_PER_TICK` simulation steps per
tick; when the bound is hit the excess accumulated time is dropped so one long
pause can never snowball into a frozen frame.
*/

use crate::config::{MAX_STEPS_PER_TICK, MAX_STEP_HZ, MIN_TARGET_FPS};
use parking_lot::Mutex;
use std::sync::Arc;

/// Simulation/render callbacks for a loop. Either may be omitted: render-only
/// loops treat the step interval purely as a render-rate gate.
#[derive(Default)]
pub struct LoopConfig {
  /// Fixed-step simulation callback; receives the step interval in seconds.
  pub step: Option<Box<dyn FnMut(f64) + Send>>,
  /// Paint callback; invoked once per tick when at least one step elapsed.
  pub render: Option<Box<dyn FnMut() + Send>>,
}

impl std::fmt::Debug for LoopConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoopConfig")
      .field("step", &self.step.is_some())
      .field("render", &self.render.is_some())
      .finish()
  }
}

struct LoopState {
  running: bool,
  suspended: bool,
  target_fps: f64,
  last_time_ms: Option<f64>,
  /// Residual step time in seconds.
  accumulator: f64,
  /// Taken out of the lock while callbacks run.
  callbacks: Option<LoopConfig>,
}

/// Handle to a per-frame loop. Clone is cheap (Arc bump); the app and the
/// lifecycle registry share the same underlying loop.
#[derive(Clone)]
pub struct LoopController {
  state: Arc<Mutex<LoopState>>,
}

impl std::fmt::Debug for LoopController {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("LoopController")
      .field("running", &state.running)
      .field("suspended", &state.suspended)
      .field("target_fps", &state.target_fps)
      .finish_non_exhaustive()
  }
}

impl LoopController {
  pub(crate) fn new(config: LoopConfig) -> Self {
    Self {
      state: Arc::new(Mutex::new(LoopState {
        running: false,
        suspended: false,
        target_fps: MAX_STEP_HZ,
        last_time_ms: None,
        accumulator: 0.0,
        callbacks: Some(config),
      })),
    }
  }

  /// Begin ticking. Idempotent while running; restarting after `stop` resets
  /// the time baseline and accumulator.
  pub fn start(&self) {
    let mut state = self.state.lock();
    if state.running {
      return;
    }
    state.running = true;
    state.suspended = false;
    state.last_time_ms = None;
    state.accumulator = 0.0;
  }

  /// Permanently cancel the loop's place in the schedule. No-op when already
  /// stopped; `start` may be called again afterwards.
  pub fn stop(&self) {
    self.state.lock().running = false;
  }

  /// Pause step/render work without leaving the schedule.
  pub fn suspend(&self) {
    self.state.lock().suspended = true;
  }

  /// Clear the suspended flag and reset the time baseline so the next tick
  /// doesn't observe the whole suspension as one giant delta.
  pub fn resume(&self) {
    let mut state = self.state.lock();
    state.suspended = false;
    state.last_time_ms = None;
  }

  /// Set the target step/render rate. Floored at 5 fps; non-finite or
  /// non-positive input falls back to the maximum step rate.
  pub fn set_target_fps(&self, fps: f64) {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { MAX_STEP_HZ };
    self.state.lock().target_fps = fps.max(MIN_TARGET_FPS);
  }

  pub fn target_fps(&self) -> f64 {
    self.state.lock().target_fps
  }

  pub fn is_running(&self) -> bool {
    self.state.lock().running
  }

  pub fn is_suspended(&self) -> bool {
    self.state.lock().suspended
  }

  /// Advance the loop to `now_ms`. Called by the frame driver.
  pub fn tick(&self, now_ms: f64) {
    // Phase 1: timing math under the lock.
    let (steps, step_interval, should_render, mut callbacks) = {
      let mut state = self.state.lock();
      if !state.running {
        return;
      }

      let delta_s = match state.last_time_ms {
        Some(last) => (now_ms - last).max(0.0) / 1000.0,
        None => 0.0,
      };
      state.last_time_ms = Some(now_ms);

      if state.suspended {
        return;
      }

      let step_interval = 1.0 / state.target_fps;
      state.accumulator += delta_s;

      let has_step = state
        .callbacks
        .as_ref()
        .is_some_and(|c| c.step.is_some());

      let mut steps = 0u32;
      let mut should_render = false;
      if has_step {
        while state.accumulator >= step_interval && steps < MAX_STEPS_PER_TICK {
          state.accumulator -= step_interval;
          steps += 1;
          should_render = true;
        }
        // Catch-up bound hit: drop the excess rather than carrying it into a
        // spiral of full-length ticks.
        if steps == MAX_STEPS_PER_TICK && state.accumulator >= step_interval {
          state.accumulator = 0.0;
        }
      } else if state.accumulator >= step_interval {
        state.accumulator = 0.0;
        should_render = true;
      }

      if steps == 0 && !should_render {
        return;
      }
      (steps, step_interval, should_render, state.callbacks.take())
    };

    // Phase 2: callbacks with no lock held, so they may adjust this loop or
    // call into the tracker/lifecycle freely.
    if let Some(config) = callbacks.as_mut() {
      if let Some(step) = config.step.as_mut() {
        for _ in 0..steps {
          step(step_interval);
        }
      }
      if should_render {
        if let Some(render) = config.render.as_mut() {
          render();
        }
      }
    }

    // Phase 3: put the callbacks back if nobody replaced the loop meanwhile.
    let mut state = self.state.lock();
    if state.callbacks.is_none() {
      state.callbacks = callbacks;
    }
  }
}
