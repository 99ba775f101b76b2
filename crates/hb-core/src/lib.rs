//! Shared primitives used across Harbor crates.

use core::fmt;

/// Result alias used across the workspace.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Error carried through every worker subsystem.
///
/// `code` is a stable dotted identifier (`net.fetch.failed`,
/// `storage.generation_write_failed`, ...) that callers match on; `message`
/// is free-form context for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerError {
    pub code: &'static str,
    pub message: String,
}

impl WorkerError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True for failures raised at the network boundary.
    pub fn is_network(&self) -> bool {
        self.code.starts_with("net.")
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for WorkerError {}

#[cfg(test)]
mod tests {
    use super::WorkerError;

    #[test]
    fn display_includes_code_and_message() {
        let error = WorkerError::new("net.fetch.failed", "connection refused");
        assert_eq!(error.to_string(), "net.fetch.failed: connection refused");
        assert!(error.is_network());
    }

    #[test]
    fn storage_errors_are_not_network_errors() {
        let error = WorkerError::new("storage.generation_read_failed", "denied");
        assert!(!error.is_network());
    }
}
