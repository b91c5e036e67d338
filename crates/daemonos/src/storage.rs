/*!
Persisted local state.

`Storage` is the seam between the core and wherever state actually lives
(browser `localStorage`, a state directory on disk, memory in tests). Values
are opaque JSON strings; the typed load/save helpers do the serde work and
degrade to defaults on parse failure, logging a warning rather than surfacing
an error (persisted state is best-effort, never load-bearing).
*/

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Storage keys used by the core.
pub mod keys {
  pub const SETTINGS: &str = "daemonos.settings";
  pub const WINDOW_STATE: &str = "daemonos.windowState";
  pub const SESSION: &str = "daemonos.session";
}

/// Key/value persistence backend.
pub trait Storage: Send + Sync {
  /// Load the raw value for a key, if present.
  fn load(&self, key: &str) -> Option<String>;

  /// Persist a value for a key. Failures are logged, not returned.
  fn save(&self, key: &str, value: &str);
}

/// Load and deserialize a value, falling back to default on absence or parse failure.
pub(crate) fn load_json<T: DeserializeOwned + Default>(storage: &dyn Storage, key: &str) -> T {
  let Some(raw) = storage.load(key) else {
    return T::default();
  };
  match serde_json::from_str(&raw) {
    Ok(value) => value,
    Err(e) => {
      log::warn!("Failed to load {key}: {e}");
      T::default()
    }
  }
}

/// Serialize and persist a value.
pub(crate) fn save_json<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) {
  match serde_json::to_string(value) {
    Ok(raw) => storage.save(key, &raw),
    Err(e) => log::warn!("Failed to serialize {key}: {e}"),
  }
}

/// In-memory storage. Default backend; every test gets a fresh one.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Storage for MemoryStorage {
  fn load(&self, key: &str) -> Option<String> {
    self.values.lock().get(key).cloned()
  }

  fn save(&self, key: &str, value: &str) {
    self.values.lock().insert(key.to_owned(), value.to_owned());
  }
}

/// One-file-per-key storage under a directory.
#[derive(Debug)]
pub struct DirStorage {
  root: PathBuf,
}

impl DirStorage {
  /// Create a directory-backed store. The directory is created on first save.
  pub const fn new(root: PathBuf) -> Self {
    Self { root }
  }

  fn path_for(&self, key: &str) -> PathBuf {
    // Keys are dotted identifiers; keep them filesystem-safe.
    let name: String = key
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
      .collect();
    self.root.join(format!("{name}.json"))
  }
}

impl Storage for DirStorage {
  fn load(&self, key: &str) -> Option<String> {
    std::fs::read_to_string(self.path_for(key)).ok()
  }

  fn save(&self, key: &str, value: &str) {
    if let Err(e) = std::fs::create_dir_all(&self.root) {
      log::warn!("Failed to create state dir {}: {e}", self.root.display());
      return;
    }
    if let Err(e) = std::fs::write(self.path_for(key), value) {
      log::warn!("Failed to persist {key}: {e}");
    }
  }
}
