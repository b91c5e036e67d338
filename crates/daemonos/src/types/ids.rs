/*! Branded ID types for type-safe entity references. */

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use ts_rs::TS;

/// Application identifier. Stable string id from the app registry ("chess", "notepad").
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct AppId(pub String);

impl AppId {
  /// Borrow the underlying id string.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for AppId {
  fn from(s: &str) -> Self {
    Self(s.to_owned())
  }
}

/// Window identifier. Stable string id ("app-chess", "file-browser") so that
/// persisted geometry survives close/reopen of the same logical window.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct WindowId(pub String);

impl WindowId {
  /// Window id for an app-typed window.
  pub fn for_app(app_id: &AppId) -> Self {
    Self(format!("app-{app_id}"))
  }

  /// Borrow the underlying id string.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for WindowId {
  fn from(s: &str) -> Self {
    Self(s.to_owned())
  }
}

/// Token identifying a live resource claim. Opaque to callers.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct ClaimToken(pub u64);

/// Global counter for `ClaimToken` generation. Starts at 1 (0 could be confused with "null").
static CLAIM_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ClaimToken {
  /// Generate a new unique `ClaimToken`.
  pub fn new() -> Self {
    Self(CLAIM_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for ClaimToken {
  fn default() -> Self {
    Self::new()
  }
}

/// Identifies a resource-tracker subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, Into)]
pub struct SubscriptionId(pub u64);
