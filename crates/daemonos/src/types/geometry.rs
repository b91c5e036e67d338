/*! Geometry types for desktop coordinates, plus the pure layout math
(placement clamping, resize) used by the window manager. */

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A 2D point in desktop coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub const fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

/// Width/height pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Size {
  pub w: f64,
  pub h: f64,
}

impl Size {
  pub const fn new(w: f64, h: f64) -> Self {
    Self { w, h }
  }
}

/// Rectangle in desktop coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Rect {
  pub left: f64,
  pub top: f64,
  pub width: f64,
  pub height: f64,
}

impl Rect {
  pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }

  /// Center point of the rectangle.
  pub fn center(&self) -> Point {
    Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
  }

  /// Check if a point is contained within this rect.
  pub fn contains(&self, point: Point) -> bool {
    point.x >= self.left
      && point.x <= self.left + self.width
      && point.y >= self.top
      && point.y <= self.top + self.height
  }
}

/// Which edge/corner a resize gesture grabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ResizeDir {
  N,
  S,
  E,
  W,
  Ne,
  Nw,
  Se,
  Sw,
}

impl ResizeDir {
  const fn touches_north(self) -> bool {
    matches!(self, Self::N | Self::Ne | Self::Nw)
  }

  const fn touches_south(self) -> bool {
    matches!(self, Self::S | Self::Se | Self::Sw)
  }

  const fn touches_east(self) -> bool {
    matches!(self, Self::E | Self::Ne | Self::Se)
  }

  const fn touches_west(self) -> bool {
    matches!(self, Self::W | Self::Nw | Self::Sw)
  }
}

/// Apply a resize delta to a starting rect. West/north edges move the origin so
/// the opposite edge stays anchored; dimensions never shrink below `min`.
pub fn resize_rect(start: Rect, dir: ResizeDir, dx: f64, dy: f64, min: Size) -> Rect {
  let mut out = start;

  if dir.touches_east() {
    out.width = (start.width + dx).max(min.w);
  }
  if dir.touches_south() {
    out.height = (start.height + dy).max(min.h);
  }
  if dir.touches_west() {
    out.width = (start.width - dx).max(min.w);
    out.left = start.left + (start.width - out.width);
  }
  if dir.touches_north() {
    out.height = (start.height - dy).max(min.h);
    out.top = start.top + (start.height - out.height);
  }

  out
}

/// Clamp a window rect so it fits inside the viewport, respecting the menu bar
/// at the top and a uniform padding on the other edges. Oversized windows are
/// shrunk first, then repositioned. Guarantees the result is fully on-screen
/// even when the input geometry predates a viewport resize.
pub fn clamp_to_viewport(rect: Rect, viewport: Size, menu_bar_height: f64, padding: f64) -> Rect {
  let max_width = (viewport.w - padding * 2.0).max(1.0);
  let max_height = (viewport.h - menu_bar_height - padding * 2.0).max(1.0);

  let width = rect.width.min(max_width);
  let height = rect.height.min(max_height);

  let left = rect.left.clamp(padding, (viewport.w - width - padding).max(padding));
  let top = rect
    .top
    .clamp(menu_bar_height + padding, (viewport.h - height - padding).max(menu_bar_height + padding));

  Rect::new(left, top, width, height)
}

#[cfg(test)]
mod tests {
  use super::*;

  const MIN: Size = Size::new(320.0, 220.0);

  mod resize_rect_tests {
    use super::*;

    #[test]
    fn east_grows_width_only() {
      let start = Rect::new(100.0, 100.0, 400.0, 300.0);
      let out = resize_rect(start, ResizeDir::E, 50.0, 999.0, MIN);
      assert_eq!(out, Rect::new(100.0, 100.0, 450.0, 300.0));
    }

    #[test]
    fn west_moves_origin_and_anchors_right_edge() {
      let start = Rect::new(100.0, 100.0, 400.0, 300.0);
      let out = resize_rect(start, ResizeDir::W, -40.0, 0.0, MIN);
      assert_eq!(out.width, 440.0);
      assert_eq!(out.left, 60.0);
      assert_eq!(
        out.left + out.width,
        start.left + start.width,
        "right edge should stay anchored"
      );
    }

    #[test]
    fn north_moves_origin_and_anchors_bottom_edge() {
      let start = Rect::new(100.0, 100.0, 400.0, 300.0);
      let out = resize_rect(start, ResizeDir::N, 0.0, 20.0, MIN);
      assert_eq!(out.height, 280.0);
      assert_eq!(out.top, 120.0);
      assert_eq!(out.top + out.height, start.top + start.height);
    }

    #[test]
    fn corner_affects_both_axes() {
      let start = Rect::new(100.0, 100.0, 400.0, 300.0);
      let out = resize_rect(start, ResizeDir::Se, 30.0, 40.0, MIN);
      assert_eq!(out, Rect::new(100.0, 100.0, 430.0, 340.0));
    }

    #[test]
    fn shrink_stops_at_minimum() {
      let start = Rect::new(100.0, 100.0, 400.0, 300.0);
      let out = resize_rect(start, ResizeDir::Se, -1000.0, -1000.0, MIN);
      assert_eq!(out.width, MIN.w);
      assert_eq!(out.height, MIN.h);
    }

    #[test]
    fn west_shrink_clamps_origin_shift() {
      let start = Rect::new(100.0, 100.0, 400.0, 300.0);
      let out = resize_rect(start, ResizeDir::W, 1000.0, 0.0, MIN);
      assert_eq!(out.width, MIN.w);
      // Origin moved exactly by the width actually removed.
      assert_eq!(out.left, 100.0 + (400.0 - MIN.w));
    }
  }

  mod clamp_to_viewport_tests {
    use super::*;

    const VIEWPORT: Size = Size::new(1280.0, 800.0);
    const MENU: f64 = 28.0;
    const PAD: f64 = 12.0;

    #[test]
    fn in_bounds_rect_is_unchanged() {
      let rect = Rect::new(200.0, 150.0, 520.0, 360.0);
      assert_eq!(clamp_to_viewport(rect, VIEWPORT, MENU, PAD), rect);
    }

    #[test]
    fn offscreen_left_is_pulled_in() {
      let rect = Rect::new(-500.0, 150.0, 520.0, 360.0);
      let out = clamp_to_viewport(rect, VIEWPORT, MENU, PAD);
      assert_eq!(out.left, PAD);
    }

    #[test]
    fn offscreen_right_is_pulled_in() {
      let rect = Rect::new(2000.0, 150.0, 520.0, 360.0);
      let out = clamp_to_viewport(rect, VIEWPORT, MENU, PAD);
      assert_eq!(out.left + out.width, VIEWPORT.w - PAD);
    }

    #[test]
    fn window_never_sits_under_menu_bar() {
      let rect = Rect::new(200.0, 0.0, 520.0, 360.0);
      let out = clamp_to_viewport(rect, VIEWPORT, MENU, PAD);
      assert_eq!(out.top, MENU + PAD);
    }

    #[test]
    fn oversized_window_is_shrunk_to_fit() {
      let rect = Rect::new(0.0, 0.0, 5000.0, 5000.0);
      let out = clamp_to_viewport(rect, VIEWPORT, MENU, PAD);
      assert_eq!(out.width, VIEWPORT.w - PAD * 2.0);
      assert_eq!(out.height, VIEWPORT.h - MENU - PAD * 2.0);
    }

    #[test]
    fn saved_geometry_from_larger_viewport_fits_smaller_one() {
      // Geometry persisted on a 1920x1080 screen, restored on 1024x640.
      let saved = Rect::new(1400.0, 900.0, 520.0, 360.0);
      let small = Size::new(1024.0, 640.0);
      let out = clamp_to_viewport(saved, small, MENU, PAD);
      assert!(out.left + out.width <= small.w - PAD + 1e-9);
      assert!(out.top + out.height <= small.h - PAD + 1e-9);
    }
  }
}
