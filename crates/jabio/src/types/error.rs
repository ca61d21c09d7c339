/*! Error types for jabio operations. */

/// Errors that can occur during jabio operations.
#[derive(Debug, thiserror::Error)]
pub enum JabioError {
  #[error("Access bridge is not initialized")]
  BridgeNotInitialized,

  #[error("Access bridge is already initialized in this process")]
  AlreadyInitialized,

  #[error("No Java window matches: {0}")]
  WindowNotFound(String),

  /// Use of a handle whose remote reference was already released.
  #[error("Invalid or released context handle")]
  InvalidHandle,

  #[error("Bridge call '{operation}' failed (native code {native_code})")]
  BridgeCallFailed {
    operation: &'static str,
    native_code: i32,
  },

  #[error("Action '{action}' failed: {reason}")]
  ActionFailed { action: String, reason: String },

  #[error("Access bridge library not found: {0}")]
  LibraryNotFound(String),

  #[error("Failed to load access bridge library: {0}")]
  LibraryLoad(String),

  #[error("Operation not supported: {0}")]
  NotSupported(String),

  #[error("Internal error: {0}")]
  Internal(String),
}

impl JabioError {
  /// Failure reported by the bridge without a more specific code.
  pub const fn call_failed(operation: &'static str) -> Self {
    Self::BridgeCallFailed {
      operation,
      native_code: 0,
    }
  }
}

/// Result type for jabio operations.
pub type JabioResult<T> = Result<T, JabioError>;
