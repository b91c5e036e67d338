/*! Core types for the DaemonOS desktop core. */

#![allow(missing_docs)]

mod error;
mod event;
mod geometry;
mod ids;
mod window;

pub use error::{DesktopError, DesktopResult};
pub use event::{Event, Snapshot};
pub use geometry::{clamp_to_viewport, resize_rect, Point, Rect, ResizeDir, Size};
pub use ids::{AppId, ClaimToken, SubscriptionId, WindowId};
pub use window::{
  Session, SessionWindow, WindowGeometry, WindowMeta, WindowRecord, WindowSpec, WindowStateMap,
};
