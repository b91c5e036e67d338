/*!
Audio routing.

Apps never touch the output volume directly. Each app acquires an
`AudioHandle` and sets its own gain; the router owns the master volume from
settings, and the effective playback volume is always `master * gain`. Handles
deregister themselves on drop, so a closed app cannot keep a stale claim on
the mixer.
*/

use crate::types::AppId;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

fn clamp_volume(value: f64) -> f64 {
  if value.is_finite() { value.clamp(0.0, 1.0) } else { 1.0 }
}

struct HandleInner {
  app_id: AppId,
  gain: Mutex<f64>,
  master: Arc<Mutex<f64>>,
}

/// An app's claim on audio output. Dropping it deregisters the app.
pub struct AudioHandle {
  inner: Arc<HandleInner>,
  router: Weak<RouterInner>,
}

impl std::fmt::Debug for AudioHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AudioHandle")
      .field("app_id", &self.inner.app_id)
      .field("gain", &*self.inner.gain.lock())
      .finish()
  }
}

impl AudioHandle {
  pub fn app_id(&self) -> &AppId {
    &self.inner.app_id
  }

  /// This app's own volume, 0.0 - 1.0.
  pub fn set_gain(&self, gain: f64) {
    *self.inner.gain.lock() = clamp_volume(gain);
  }

  pub fn gain(&self) -> f64 {
    *self.inner.gain.lock()
  }

  /// The volume playback should actually use right now.
  pub fn effective_volume(&self) -> f64 {
    *self.inner.master.lock() * *self.inner.gain.lock()
  }
}

impl Drop for AudioHandle {
  fn drop(&mut self) {
    if let Some(router) = self.router.upgrade() {
      let mut handles = router.handles.lock();
      handles.retain(|weak| {
        weak.upgrade().is_some_and(|h| !Arc::ptr_eq(&h, &self.inner))
      });
    }
  }
}

struct RouterInner {
  master: Arc<Mutex<f64>>,
  handles: Mutex<Vec<Weak<HandleInner>>>,
}

/// The mixer. Clone is cheap (Arc bump).
#[derive(Clone)]
pub struct AudioRouter {
  inner: Arc<RouterInner>,
}

impl std::fmt::Debug for AudioRouter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AudioRouter")
      .field("master", &self.master_volume())
      .field("handles", &self.inner.handles.lock().len())
      .finish()
  }
}

impl AudioRouter {
  pub fn new(master_volume: f64) -> Self {
    Self {
      inner: Arc::new(RouterInner {
        master: Arc::new(Mutex::new(clamp_volume(master_volume))),
        handles: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Register an app with the mixer. Gain starts at full.
  pub fn acquire(&self, app_id: impl Into<AppId>) -> AudioHandle {
    let inner = Arc::new(HandleInner {
      app_id: app_id.into(),
      gain: Mutex::new(1.0),
      master: Arc::clone(&self.inner.master),
    });
    self.inner.handles.lock().push(Arc::downgrade(&inner));
    AudioHandle { inner, router: Arc::downgrade(&self.inner) }
  }

  /// Master volume from settings. Applies to every handle immediately since
  /// effective volume is computed at read time.
  pub fn set_master_volume(&self, volume: f64) {
    *self.inner.master.lock() = clamp_volume(volume);
  }

  pub fn master_volume(&self) -> f64 {
    *self.inner.master.lock()
  }

  /// Apps currently holding a live handle.
  pub fn active_apps(&self) -> Vec<AppId> {
    let mut handles = self.inner.handles.lock();
    handles.retain(|weak| weak.strong_count() > 0);
    handles
      .iter()
      .filter_map(|weak| weak.upgrade().map(|h| h.app_id.clone()))
      .collect()
  }
}

impl Default for AudioRouter {
  fn default() -> Self {
    Self::new(1.0)
  }
}
