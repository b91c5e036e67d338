/*!
Genie minimize/restore tween.

The tween itself is pure data: the renderer (DOM, canvas, whatever hosts the
desktop) owns playback. `GenieTween::at` evaluates the eased progress so
non-CSS hosts can sample it frame by frame.
*/

use crate::config::GENIE_DURATION_MS;
use crate::types::Rect;
use serde::Serialize;
use ts_rs::TS;

/// Easing control points, matching CSS `cubic-bezier(0.25, 0.8, 0.2, 1)`.
/// Fast start, soft landing.
pub const GENIE_EASING: (f64, f64, f64, f64) = (0.25, 0.8, 0.2, 1.0);

/// Describes one minimize (window to tray) or restore (tray to window)
/// animation. Translation is center-to-center; scale collapses the window to
/// the tray slot's width, floored so the element never degenerates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct GenieTween {
  /// Horizontal center-to-center travel, px.
  pub dx: f64,
  /// Vertical center-to-center travel, px.
  pub dy: f64,
  /// Final scale factor relative to the window's size.
  pub scale: f64,
  pub duration_ms: f64,
}

impl GenieTween {
  /// Tween carrying a window down into a tray slot.
  pub fn minimize(window: Rect, tray: Rect) -> Self {
    let from = window.center();
    let to = tray.center();
    Self {
      dx: to.x - from.x,
      dy: to.y - from.y,
      scale: (tray.width / window.width.max(1.0)).max(0.1),
      duration_ms: GENIE_DURATION_MS,
    }
  }

  /// The reverse tween, playing a tray slot back up into a window.
  #[must_use]
  pub fn reversed(self) -> Self {
    Self { dx: -self.dx, dy: -self.dy, ..self }
  }

  /// Eased progress at `elapsed_ms`, in `[0, 1]`.
  pub fn at(&self, elapsed_ms: f64) -> f64 {
    if self.duration_ms <= 0.0 {
      return 1.0;
    }
    let x = (elapsed_ms / self.duration_ms).clamp(0.0, 1.0);
    cubic_bezier(GENIE_EASING, x)
  }
}

/// Evaluate a CSS-style cubic bezier easing at horizontal position `x`.
/// Endpoints are fixed at (0,0) and (1,1); the curve is solved for the
/// parameter by bisection (x is monotonic for valid easing control points).
fn cubic_bezier((x1, y1, x2, y2): (f64, f64, f64, f64), x: f64) -> f64 {
  let sample = |c1: f64, c2: f64, u: f64| {
    let v = 1.0 - u;
    3.0 * v * v * u * c1 + 3.0 * v * u * u * c2 + u * u * u
  };

  let (mut lo, mut hi) = (0.0f64, 1.0f64);
  let mut u = x;
  for _ in 0..24 {
    let sx = sample(x1, x2, u);
    if (sx - x).abs() < 1e-6 {
      break;
    }
    if sx < x {
      lo = u;
    } else {
      hi = u;
    }
    u = (lo + hi) / 2.0;
  }
  sample(y1, y2, u)
}
