/*!
App registry.

The manifest is a JSON document shipped alongside the shell listing every
installable app: id, title, category and the module path that hosts its code.
The registry is immutable after load; installing apps means shipping a new
manifest.
*/

use crate::types::{AppId, DesktopError, DesktopResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppManifest {
  pub id: AppId,
  pub title: String,
  pub category: String,
  /// Module path serving the app's code, relative to the shell root.
  pub module: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
  /// Release identifier used for cache busting. Older manifests call it `build`.
  #[serde(default, alias = "build")]
  version: Option<String>,
  apps: Vec<AppManifest>,
}

/// Immutable, loaded app manifest.
#[derive(Debug, Clone)]
pub struct AppRegistry {
  version: Option<String>,
  apps: Vec<AppManifest>,
}

impl AppRegistry {
  /// Parse a manifest document. Duplicate ids are rejected.
  pub fn from_json(json: &str) -> DesktopResult<Self> {
    let file: ManifestFile =
      serde_json::from_str(json).map_err(|e| DesktopError::RegistryLoad(e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    for app in &file.apps {
      if !seen.insert(app.id.clone()) {
        return Err(DesktopError::RegistryLoad(format!("duplicate app id: {}", app.id)));
      }
    }
    log::info!("Loaded app registry: {} apps", file.apps.len());
    Ok(Self { version: file.version, apps: file.apps })
  }

  /// Empty registry, for shells that register apps programmatically.
  pub fn empty() -> Self {
    Self { version: None, apps: Vec::new() }
  }

  pub fn version(&self) -> Option<&str> {
    self.version.as_deref()
  }

  pub fn apps(&self) -> &[AppManifest] {
    &self.apps
  }

  pub fn app(&self, id: &AppId) -> Option<&AppManifest> {
    self.apps.iter().find(|app| &app.id == id)
  }

  /// Look up an app, erroring when absent.
  pub fn require(&self, id: &AppId) -> DesktopResult<&AppManifest> {
    self.app(id).ok_or_else(|| DesktopError::AppNotFound(id.clone()))
  }

  /// Apps grouped by category, categories and members both sorted.
  pub fn by_category(&self) -> BTreeMap<String, Vec<&AppManifest>> {
    let mut grouped: BTreeMap<String, Vec<&AppManifest>> = BTreeMap::new();
    for app in &self.apps {
      grouped.entry(app.category.clone()).or_default().push(app);
    }
    for members in grouped.values_mut() {
      members.sort_by(|a, b| a.title.cmp(&b.title));
    }
    grouped
  }

  /// Module path for an app with the manifest version appended as a cache
  /// buster, normalized to be root-relative.
  pub fn module_url(&self, id: &AppId) -> DesktopResult<String> {
    let app = self.require(id)?;
    let path = normalize_module_path(&app.module);
    Ok(match &self.version {
      Some(version) => with_cache_bust(&path, version),
      None => path,
    })
  }
}

/// Normalize a manifest module path to a root-relative form: strips a leading
/// `./`, ensures a leading `/`.
pub fn normalize_module_path(module: &str) -> String {
  let trimmed = module.strip_prefix("./").unwrap_or(module);
  if trimmed.starts_with('/') {
    trimmed.to_owned()
  } else {
    format!("/{trimmed}")
  }
}

/// Append a `v=` cache-bust query parameter, percent-encoding the version.
pub fn with_cache_bust(path: &str, version: &str) -> String {
  let separator = if path.contains('?') { '&' } else { '?' };
  format!("{path}{separator}v={}", percent_encode(version))
}

// Query-component encoding; covers everything manifest versions realistically
// contain without pulling in a URL crate.
fn percent_encode(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for byte in value.bytes() {
    match byte {
      b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
        out.push(byte as char);
      }
      _ => out.push_str(&format!("%{byte:02X}")),
    }
  }
  out
}
