/*! Error types for desktop-core operations. */

use super::{AppId, WindowId};

/// Errors that can occur during desktop-core operations.
#[derive(Debug, thiserror::Error)]
pub enum DesktopError {
  #[error("Window not found: {0}")]
  WindowNotFound(WindowId),

  #[error("App not found: {0}")]
  AppNotFound(AppId),

  #[error("App not registered in the runtime: {0}")]
  AppNotRegistered(AppId),

  #[error("App registry failed to load: {0}")]
  RegistryLoad(String),

  #[error("Invalid session data: {0}")]
  InvalidSession(String),

  #[error("Internal error: {0}")]
  Internal(String),
}

/// Result type for desktop-core operations.
pub type DesktopResult<T> = Result<T, DesktopError>;
