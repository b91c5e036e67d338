/*!
Resource tracker - process-wide ledger of claimed resource bytes per app and
category.

Pure bookkeeping, no timers. Apps call in voluntarily ("my engine tables are
now 50 MB"); the tracker aggregates into per-app, per-category and global
totals consumed by the perf monitor and system monitor. This is advisory
telemetry, not a limiter: invalid tokens and double releases are silent
no-ops, and totals are floored at zero rather than erroring.

Listener notification is synchronous and strictly ordered with respect to the
mutation that triggered it - a listener always observes the fully-applied
snapshot of that single mutation. Listeners are invoked with no tracker lock
held, so they may call back into `totals()` freely.
*/

use crate::types::{AppId, ClaimToken, SubscriptionId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ts_rs::TS;

/// Per-app slice of the totals snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AppResourceTotals {
  pub total_bytes: u64,
  pub categories: HashMap<String, u64>,
}

/// Snapshot of all live claims. Pure projection, safe to hold across ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResourceTotals {
  pub total_bytes: u64,
  pub by_app: HashMap<AppId, AppResourceTotals>,
  pub by_category: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
struct Claim {
  app_id: AppId,
  category: String,
  bytes: u64,
  #[allow(dead_code)]
  label: String,
}

#[derive(Default)]
struct TrackerState {
  tokens: HashMap<ClaimToken, Claim>,
  /// `(app, category)` -> token index backing the `set_app_total` upsert.
  app_category_tokens: HashMap<(AppId, String), ClaimToken>,
  app_totals: HashMap<AppId, AppResourceTotals>,
  category_totals: HashMap<String, u64>,
  total_bytes: u64,
}

impl TrackerState {
  fn add(&mut self, app_id: &AppId, category: &str, bytes: u64) {
    let entry = self.app_totals.entry(app_id.clone()).or_default();
    entry.total_bytes += bytes;
    *entry.categories.entry(category.to_owned()).or_insert(0) += bytes;

    *self.category_totals.entry(category.to_owned()).or_insert(0) += bytes;
    self.total_bytes += bytes;
  }

  fn subtract(&mut self, app_id: &AppId, category: &str, bytes: u64) {
    if let Some(entry) = self.app_totals.get_mut(app_id) {
      entry.total_bytes = entry.total_bytes.saturating_sub(bytes);
      let remove_category = match entry.categories.get_mut(category) {
        Some(total) => {
          *total = total.saturating_sub(bytes);
          *total == 0
        }
        None => false,
      };
      if remove_category {
        entry.categories.remove(category);
      }
      if entry.total_bytes == 0 {
        self.app_totals.remove(app_id);
      }
    }

    let remove_category = match self.category_totals.get_mut(category) {
      Some(total) => {
        *total = total.saturating_sub(bytes);
        *total == 0
      }
      None => false,
    };
    if remove_category {
      self.category_totals.remove(category);
    }

    self.total_bytes = self.total_bytes.saturating_sub(bytes);
  }

  fn snapshot(&self) -> ResourceTotals {
    ResourceTotals {
      total_bytes: self.total_bytes,
      by_app: self.app_totals.clone(),
      by_category: self.category_totals.clone(),
    }
  }
}

type Listener = Arc<dyn Fn(&ResourceTotals) + Send + Sync>;

/// Process-wide resource ledger. Clone is cheap (Arc bump) when wrapped in an
/// `Arc` by the shell; the tracker itself is `Sync` and shared by reference.
pub struct ResourceTracker {
  state: Mutex<TrackerState>,
  listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
  next_subscription: AtomicU64,
}

impl std::fmt::Debug for ResourceTracker {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResourceTracker").finish_non_exhaustive()
  }
}

impl Default for ResourceTracker {
  fn default() -> Self {
    Self::new()
  }
}

impl ResourceTracker {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(TrackerState::default()),
      listeners: Mutex::new(Vec::new()),
      next_subscription: AtomicU64::new(1),
    }
  }

  /// Record a new claim and return its token. Never fails.
  pub fn claim(
    &self,
    app_id: impl Into<AppId>,
    category: impl Into<String>,
    bytes: u64,
    label: impl Into<String>,
  ) -> ClaimToken {
    let app_id = app_id.into();
    let category = category.into();
    let token = ClaimToken::new();

    let snapshot = {
      let mut state = self.state.lock();
      state.add(&app_id, &category, bytes);
      state.tokens.insert(
        token,
        Claim {
          app_id,
          category,
          bytes,
          label: label.into(),
        },
      );
      state.snapshot()
    };
    self.notify(&snapshot);
    token
  }

  /// Release a claim. Unknown tokens are a silent no-op; totals floor at zero.
  pub fn release(&self, token: ClaimToken) {
    let snapshot = {
      let mut state = self.state.lock();
      let Some(claim) = state.tokens.remove(&token) else {
        return;
      };
      state.subtract(&claim.app_id, &claim.category, claim.bytes);
      state.snapshot()
    };
    self.notify(&snapshot);
  }

  /// Upsert the single claim for an `(app, category)` pair: "this app's usage
  /// for X is now N bytes". Replaces rather than accumulates, so repeated
  /// calls with the same value are idempotent.
  pub fn set_app_total(
    &self,
    app_id: impl Into<AppId>,
    category: impl Into<String>,
    bytes: u64,
    label: impl Into<String>,
  ) {
    let app_id = app_id.into();
    let category = category.into();
    let label = label.into();
    let key = (app_id.clone(), category.clone());

    let snapshot = {
      let mut state = self.state.lock();
      match state.app_category_tokens.get(&key).copied() {
        Some(token) if state.tokens.contains_key(&token) => {
          let old = state.tokens.get(&token).map(|c| c.bytes).unwrap_or(0);
          state.subtract(&app_id, &category, old);
          state.add(&app_id, &category, bytes);
          if let Some(claim) = state.tokens.get_mut(&token) {
            claim.bytes = bytes;
            claim.label = label;
          }
        }
        _ => {
          let token = ClaimToken::new();
          state.add(&app_id, &category, bytes);
          state.tokens.insert(
            token,
            Claim {
              app_id: app_id.clone(),
              category: category.clone(),
              bytes,
              label,
            },
          );
          state.app_category_tokens.insert(key, token);
        }
      }
      state.snapshot()
    };
    self.notify(&snapshot);
  }

  /// Release every live claim owned by an app and purge its upsert index.
  /// Used on app teardown.
  pub fn clear_app(&self, app_id: &AppId) {
    let snapshot = {
      let mut state = self.state.lock();
      let to_remove: Vec<ClaimToken> = state
        .tokens
        .iter()
        .filter(|(_, claim)| &claim.app_id == app_id)
        .map(|(token, _)| *token)
        .collect();
      if to_remove.is_empty() && !state.app_category_tokens.keys().any(|(app, _)| app == app_id) {
        return;
      }
      for token in to_remove {
        if let Some(claim) = state.tokens.remove(&token) {
          state.subtract(&claim.app_id, &claim.category, claim.bytes);
        }
      }
      state.app_category_tokens.retain(|(app, _), _| app != app_id);
      state.snapshot()
    };
    self.notify(&snapshot);
  }

  /// Snapshot of current totals.
  pub fn totals(&self) -> ResourceTotals {
    self.state.lock().snapshot()
  }

  /// Subscribe to mutation notifications. The callback runs synchronously
  /// after every mutating call, in subscription order.
  pub fn subscribe(&self, listener: impl Fn(&ResourceTotals) + Send + Sync + 'static) -> SubscriptionId {
    let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
    self.listeners.lock().push((id, Arc::new(listener)));
    id
  }

  /// Remove a subscription. Unknown ids are a no-op.
  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.listeners.lock().retain(|(sub, _)| *sub != id);
  }

  fn notify(&self, snapshot: &ResourceTotals) {
    // Clone the listener list out of the lock so callbacks can re-enter.
    let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
    for listener in listeners {
      listener(snapshot);
    }
  }
}
