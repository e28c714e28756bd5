/*! Error types for shell operations. */

use super::AppId;

/// Errors that can occur during shell operations.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
  #[error("Window not found: {0}")]
  WindowNotFound(AppId),

  #[error("Window is not open: {0}")]
  NotOpen(AppId),

  #[error("Process {0} was terminated; request a new context before acquiring resources")]
  ProcessTerminated(AppId),

  #[error("Failed to load app: {0}")]
  Load(#[from] LoadError),

  #[error("No async runtime available: {0}")]
  NoRuntime(String),

  #[error("Internal error: {0}")]
  Internal(String),
}

/// Errors raised while lazily resolving an app module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
  #[error("No lazy module path registered for {0}")]
  NoModulePath(AppId),

  #[error("Import of '{path}' failed: {reason}")]
  Import { path: String, reason: String },

  #[error("Module '{path}' does not export app metadata")]
  MissingMetadata { path: String },
}

/// Result type for shell operations.
pub type ShellResult<T> = Result<T, ShellError>;
