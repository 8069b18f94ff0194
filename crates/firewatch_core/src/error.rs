use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape shared by the coordinator, the store and the CLI.
///
/// `code` is a stable SCREAMING_SNAKE identifier (e.g. `DB_QUERY_FAILED`,
/// `DISPATCH_CONFLICT`) that callers match on; `message` is for humans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    /// Wrap a lower-level error, keeping its rendering as `details`.
    pub fn wrap(
        code: impl Into<String>,
        message: impl Into<String>,
        source: impl fmt::Display,
    ) -> Self {
        Self::new(code, message).with_details(source.to_string())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_source_as_details() {
        let err = AppError::wrap("DB_QUERY_FAILED", "query failed", "no such table: drones")
            .with_retryable(true);
        assert_eq!(err.code, "DB_QUERY_FAILED");
        assert_eq!(err.details.as_deref(), Some("no such table: drones"));
        assert!(err.retryable);
        assert!(err.is("DB_QUERY_FAILED"));
        assert_eq!(
            err.to_string(),
            "[DB_QUERY_FAILED] query failed (no such table: drones)"
        );
    }
}
