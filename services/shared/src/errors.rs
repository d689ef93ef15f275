/// Shared error types for the transaction pipeline services
///
/// Design Philosophy:
/// - Standardized error codes for consistent error reporting across services
/// - Categorized by error domain (Network, Internal)
/// - Error codes follow pattern: <CATEGORY>_<SPECIFIC>_<DETAIL>
///
/// Usage:
/// - Processing failures carry an `ErrorCode` into structured log events
/// - HTTP surfaces wrap failures in `ServiceError`
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error categories that map to HTTP status codes and logging severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Network errors (503 Service Unavailable)
    /// Database or queue unavailable or timing out
    Network,

    /// Internal service errors (500 Internal Server Error)
    Internal,
}

impl ErrorCategory {
    /// Map error category to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Network => 503,
            ErrorCategory::Internal => 500,
        }
    }

    /// Map error category to log level
    pub fn log_level(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "error",
            ErrorCategory::Internal => "error",
        }
    }
}

/// Standard error codes used across all services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    // Validation errors
    pub const VALIDATION_MALFORMED_PAYLOAD: ErrorCode = ErrorCode("VALIDATION_MALFORMED_PAYLOAD");

    // Processing errors
    pub const PROCESSING_SIMULATED_FAILURE: ErrorCode = ErrorCode("PROCESSING_SIMULATED_FAILURE");
    pub const PROCESSING_DEADLINE_EXCEEDED: ErrorCode = ErrorCode("PROCESSING_DEADLINE_EXCEEDED");
    pub const PROCESSING_CANCELLED: ErrorCode = ErrorCode("PROCESSING_CANCELLED");
    pub const PROCESSING_ABANDONED: ErrorCode = ErrorCode("PROCESSING_ABANDONED");

    // Network errors
    pub const NETWORK_DATABASE_CONNECTION: ErrorCode = ErrorCode("NETWORK_DATABASE_CONNECTION");
    pub const NETWORK_DATABASE_TIMEOUT: ErrorCode = ErrorCode("NETWORK_DATABASE_TIMEOUT");
    pub const NETWORK_REDIS_CONNECTION: ErrorCode = ErrorCode("NETWORK_REDIS_CONNECTION");

    // Internal errors
    pub const INTERNAL_UNEXPECTED: ErrorCode = ErrorCode("INTERNAL_UNEXPECTED");
    pub const INTERNAL_DUPLICATE_TRANSACTION: ErrorCode = ErrorCode("INTERNAL_DUPLICATE_TRANSACTION");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standardized error structure returned by HTTP surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error category (determines status code and log level)
    pub category: ErrorCategory,

    /// Structured error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ServiceError {
    pub fn new(category: ErrorCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.as_str().to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn database_error(error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Network,
            ErrorCode::NETWORK_DATABASE_CONNECTION,
            "Database error",
        )
        .with_context(error.to_string())
    }

    pub fn database_timeout(after: Duration) -> Self {
        Self::new(
            ErrorCategory::Network,
            ErrorCode::NETWORK_DATABASE_TIMEOUT,
            "Database operation timed out",
        )
        .with_context(format!("after {}ms", after.as_millis()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorCode::INTERNAL_UNEXPECTED, message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "[{}] {}: {}", self.code, self.message, context)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServiceError {}
