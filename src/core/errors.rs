/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for every registry operation
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Closed set of failure kinds callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    KeyInUse,
    /// Capacity exhausted or backing memory unavailable
    Full,
    Timeout,
    AlreadyInitialized,
    NotInitialized,
    Failure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::KeyInUse => "key_in_use",
            ErrorKind::Full => "full",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// Unified registry error type with miette diagnostics
///
/// Every variant carries a human-readable message. Branch on [`RegistryError::kind`],
/// never on the message text.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(registry::invalid_argument),
        help("Check the arguments passed to the call. Key 0 is reserved and buffers must be large enough.")
    )]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    #[diagnostic(
        code(registry::not_found),
        help("The key was never added or has been deleted.")
    )]
    NotFound(String),

    #[error("Key in use: {0}")]
    #[diagnostic(
        code(registry::key_in_use),
        help("Delete the existing record first or use a generated key.")
    )]
    KeyInUse(String),

    #[error("Full: {0}")]
    #[diagnostic(
        code(registry::full),
        help("Maps never resize. Create a new map over a larger region.")
    )]
    Full(String),

    #[error("Timeout: {0}")]
    #[diagnostic(
        code(registry::timeout),
        help("The deadline passed before the lock was acquired. The map was not modified.")
    )]
    Timeout(String),

    #[error("Already initialized: {0}")]
    #[diagnostic(
        code(registry::already_initialized),
        help("Host identity can only be injected before the first identity is generated.")
    )]
    AlreadyInitialized(String),

    #[error("Not initialized: {0}")]
    #[diagnostic(
        code(registry::not_initialized),
        help("The map was never created in this region or has been destroyed.")
    )]
    NotInitialized(String),

    #[error("Failure: {0}")]
    #[diagnostic(
        code(registry::failure),
        help("An internal fault occurred. View logs for details.")
    )]
    Failure(String),
}

impl RegistryError {
    /// Kind of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::KeyInUse(_) => ErrorKind::KeyInUse,
            RegistryError::Full(_) => ErrorKind::Full,
            RegistryError::Timeout(_) => ErrorKind::Timeout,
            RegistryError::AlreadyInitialized(_) => ErrorKind::AlreadyInitialized,
            RegistryError::NotInitialized(_) => ErrorKind::NotInitialized,
            RegistryError::Failure(_) => ErrorKind::Failure,
        }
    }

    /// Diagnostic message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            RegistryError::InvalidArgument(m)
            | RegistryError::NotFound(m)
            | RegistryError::KeyInUse(m)
            | RegistryError::Full(m)
            | RegistryError::Timeout(m)
            | RegistryError::AlreadyInitialized(m)
            | RegistryError::NotInitialized(m)
            | RegistryError::Failure(m) => m,
        }
    }

    /// Prepend context to the message, keeping the kind
    pub fn context(self, context: impl fmt::Display) -> Self {
        let wrap = |m: String| format!("{}: {}", context, m);
        match self {
            RegistryError::InvalidArgument(m) => RegistryError::InvalidArgument(wrap(m)),
            RegistryError::NotFound(m) => RegistryError::NotFound(wrap(m)),
            RegistryError::KeyInUse(m) => RegistryError::KeyInUse(wrap(m)),
            RegistryError::Full(m) => RegistryError::Full(wrap(m)),
            RegistryError::Timeout(m) => RegistryError::Timeout(wrap(m)),
            RegistryError::AlreadyInitialized(m) => RegistryError::AlreadyInitialized(wrap(m)),
            RegistryError::NotInitialized(m) => RegistryError::NotInitialized(wrap(m)),
            RegistryError::Failure(m) => RegistryError::Failure(wrap(m)),
        }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

// Implement conversion from std::io::Error
impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Failure(err.to_string())
    }
}

impl From<nix::errno::Errno> for RegistryError {
    fn from(err: nix::errno::Errno) -> Self {
        RegistryError::Failure(err.desc().to_string())
    }
}
