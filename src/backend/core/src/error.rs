//! Error handling for the resumable iteration engine.
//!
//! This module provides:
//! - A single crate error type with context and chaining
//! - Stable error codes grouped by category
//! - User-facing vs internal messages
//! - Severity-driven logging through `tracing`
//!
//! # Usage
//!
//! ```rust,ignore
//! use resumable_core::error::{ResumableError, Result, ErrorContext};
//!
//! fn load_params(raw: &str) -> Result<serde_json::Value> {
//!     serde_json::from_str(raw).context("Failed to parse job params")
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::jobs::JobError;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, ResumableError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be persisted by host queues alongside failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Contract Errors (1000-1099)
    MissingOperation,
    MalformedOperation,
    JobNotRegistered,
    DuplicateJobType,

    // Cursor Errors (1100-1199)
    InvalidCursor,
    UnserializableCursor,
    InvalidArgument,

    // Iteration Errors (1200-1299)
    IterationFailed,
    SourceFetchFailed,
    SliceAborted,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,
    InvalidJson,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::MissingOperation => 1000,
            Self::MalformedOperation => 1001,
            Self::JobNotRegistered => 1002,
            Self::DuplicateJobType => 1003,

            Self::InvalidCursor => 1100,
            Self::UnserializableCursor => 1101,
            Self::InvalidArgument => 1102,

            Self::IterationFailed => 1200,
            Self::SourceFetchFailed => 1201,
            Self::SliceAborted => 1202,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::InvalidJson => 2202,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
        }
    }

    /// Check if this error is retryable by the host queue.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceFetchFailed | Self::SliceAborted)
    }

    /// Whether this code represents a caller-supplied argument that can never succeed as-is.
    pub const fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::MissingOperation
                | Self::MalformedOperation
                | Self::InvalidCursor
                | Self::InvalidArgument
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "contract",
            1100..=1199 => "cursor",
            1200..=1299 => "iteration",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad cursor, bad contract)
    Low,
    /// Operational issues (callback failures, transient source errors)
    Medium,
    /// System errors (serialization, configuration)
    High,
    /// Critical errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MissingOperation
            | ErrorCode::MalformedOperation
            | ErrorCode::JobNotRegistered
            | ErrorCode::DuplicateJobType
            | ErrorCode::InvalidCursor
            | ErrorCode::InvalidArgument => Self::Low,

            ErrorCode::UnserializableCursor
            | ErrorCode::IterationFailed
            | ErrorCode::SourceFetchFailed
            | ErrorCode::SliceAborted => Self::Medium,

            ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::InvalidJson
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (job type, operation, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the engine.
///
/// This error type supports:
/// - Structured error codes
/// - Error chaining with context
/// - User-friendly vs internal messages
#[derive(Error, Debug)]
pub struct ResumableError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// Overrides the code's default retryability (set from job callback errors)
    retryable: Option<bool>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,

    /// Backtrace for debugging (captured in debug builds)
    #[cfg(debug_assertions)]
    #[allow(dead_code)]
    backtrace: Option<std::backtrace::Backtrace>,
}

impl fmt::Display for ResumableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ResumableError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            retryable: None,
            source: None,
            #[cfg(debug_assertions)]
            backtrace: Some(std::backtrace::Backtrace::capture()),
        }
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a generic argument error.
    pub fn argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    /// Override whether the host queue may retry this error.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.retryable.unwrap_or_else(|| self.code.is_retryable())
    }

    /// Check if this error is an argument error (contract or cursor shape).
    pub fn is_argument_error(&self) -> bool {
        self.code.is_argument_error()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ResumableError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| ResumableError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ResumableError::new(ErrorCode::InvalidArgument, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| ResumableError::new(code, "Value not present"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for ResumableError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() {
            ErrorCode::DeserializationError
        } else if error.is_eof() {
            ErrorCode::InvalidJson
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<base64::DecodeError> for ResumableError {
    fn from(error: base64::DecodeError) -> Self {
        Self::with_internal(
            ErrorCode::InvalidCursor,
            "Invalid cursor token format",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<tokio::task::JoinError> for ResumableError {
    fn from(error: tokio::task::JoinError) -> Self {
        let code = if error.is_cancelled() {
            ErrorCode::SliceAborted
        } else {
            ErrorCode::InternalError
        };
        Self::with_internal(code, "Iteration slice did not run to an outcome", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for ResumableError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::MissingConfiguration, "File or resource not found"),
            ErrorKind::InvalidData => (ErrorCode::DeserializationError, "Invalid data encountered"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for ResumableError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ResumableError>() {
            Ok(resumable_error) => resumable_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for ResumableError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl ResumableError {
    // ─────────────────────────────────────────────────────────────────────────
    // Contract Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// A job type does not declare a required operation.
    pub fn missing_operation(job_type: &str, operation: &str) -> Self {
        Self::new(
            ErrorCode::MissingOperation,
            format!("Iteration job ({}) must define #{}", job_type, operation),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("job_type", job_type)
                .with_context("operation", operation),
        )
    }

    /// A job type declares a required operation with an unusable signature.
    pub fn malformed_operation(job_type: &str, operation: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ErrorCode::MalformedOperation,
            format!("Iteration job ({}) #{} {}", job_type, operation, reason),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("job_type", job_type)
                .with_context("operation", operation)
                .with_context("reason", reason),
        )
    }

    /// A job type is not present in the registry.
    pub fn job_not_registered(job_type: &str) -> Self {
        Self::new(
            ErrorCode::JobNotRegistered,
            format!("Job type not registered: {}", job_type),
        )
        .with_details(ErrorDetails::new().with_entity("job_type", job_type))
    }

    /// A job type was registered twice.
    pub fn duplicate_job_type(job_type: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateJobType,
            format!("Job type already registered: {}", job_type),
        )
        .with_details(ErrorDetails::new().with_entity("job_type", job_type))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cursor Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// The starting cursor is incompatible with the declared source.
    pub fn invalid_cursor(source: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorCode::InvalidCursor,
            format!(
                "Cursor for {} must be {}, got {}",
                source, expected, actual
            ),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("source", source)
                .with_context("expected", expected)
                .with_context("actual", actual),
        )
    }

    /// A non-primitive cursor was produced while enforcement is strict.
    pub fn unserializable_cursor(job_type: &str, classification: &str) -> Self {
        Self::new(
            ErrorCode::UnserializableCursor,
            format!(
                "{}#build_enumerator yielded a cursor that cannot be serialized ({})",
                job_type, classification
            ),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("job_type", job_type)
                .with_context("classification", classification)
                .with_suggestion(
                    "Yield cursors built only from null, booleans, numbers, strings, lists and string-keyed maps",
                ),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Iteration Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// `each_iteration` returned an error.
    pub fn iteration_failed(job_type: &str, error: JobError) -> Self {
        Self::callback_failed(job_type, "each_iteration", error)
    }

    /// A job callback (`each_iteration` or a lifecycle hook) returned an error.
    pub fn callback_failed(job_type: &str, operation: &str, error: JobError) -> Self {
        let retryable = error.retryable;
        let mut details = ErrorDetails::new()
            .with_entity("job_type", job_type)
            .with_context("operation", operation);
        if let Some(code) = &error.code {
            details = details.with_context("job_error_code", code);
        }
        if let Some(context) = &error.context {
            details = details.with_context("job_error_context", context);
        }
        Self::new(
            ErrorCode::IterationFailed,
            format!("{}#{} failed: {}", job_type, operation, error.message),
        )
        .with_details(details)
        .with_retryable(retryable)
        .with_source(error)
    }

    /// A paged source failed to fetch the next page.
    pub fn source_fetch(source: &str, message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::SourceFetchFailed,
            format!("Failed to fetch next page from {}", source),
            message,
        )
        .with_details(ErrorDetails::new().with_entity("source", source))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_categories() {
        assert_eq!(ErrorCode::MissingOperation.category(), "contract");
        assert_eq!(ErrorCode::InvalidCursor.category(), "cursor");
        assert_eq!(ErrorCode::IterationFailed.category(), "iteration");
        assert_eq!(ErrorCode::InvalidConfiguration.category(), "configuration");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
        assert_eq!(ErrorCode::SerializationError.category(), "serialization");
    }

    #[test]
    fn test_argument_errors() {
        assert!(ResumableError::missing_operation("Job", "each_iteration").is_argument_error());
        assert!(ResumableError::invalid_cursor("times", "an integer", "string").is_argument_error());
        assert!(!ResumableError::source_fetch("rows", "timeout").is_argument_error());
    }

    #[test]
    fn test_iteration_failed_carries_retryability() {
        let fatal = ResumableError::iteration_failed("Job", JobError::fatal("boom"));
        assert_eq!(fatal.code(), ErrorCode::IterationFailed);
        assert!(!fatal.is_retryable());
        assert!(fatal.user_message().contains("boom"));

        let transient = ResumableError::iteration_failed(
            "Job",
            JobError::retryable("timeout").with_code("TIMEOUT"),
        );
        assert!(transient.is_retryable());
        assert_eq!(
            transient.details().context.get("job_error_code"),
            Some(&serde_json::json!("TIMEOUT"))
        );
    }

    #[test]
    fn test_display_includes_internal_message() {
        let err = ResumableError::source_fetch("rows", "connection reset");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[SourceFetchFailed]"));
        assert!(rendered.contains("connection reset"));
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u8> = None;
        let err = missing.context("no value").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
