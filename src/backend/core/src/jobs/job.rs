//! Iteration job definitions.
//!
//! This module provides the abstractions a resumable job implements:
//!
//! - **IterationJob trait**: builds an enumerator and processes one item at a time
//! - **JobStatus**: lifecycle of a job across slices
//! - **JobError**: callback failures, retryable or fatal

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::contract::JobContract;
use crate::cursor::CursorValue;
use crate::enumerator::Enumerator;
use crate::error::{ResumableError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue (first run or resumption)
    Pending,
    /// A slice is executing
    Running,
    /// The last slice stopped early and handed back a cursor
    Interrupted,
    /// The enumerator was exhausted
    Completed,
    /// A slice failed; the host decides whether to retry
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for job callback failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Error message
    pub message: String,
    /// Whether this error is retryable
    pub retryable: bool,
    /// Optional error code
    pub code: Option<String>,
    /// Additional context
    pub context: Option<serde_json::Value>,
}

impl JobError {
    /// Create a new retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            code: None,
            context: None,
        }
    }

    /// Create a new non-retryable (fatal) error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            code: None,
            context: None,
        }
    }

    /// Add an error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add context.
    pub fn with_context(mut self, context: impl Serialize) -> Self {
        self.context = serde_json::to_value(context).ok();
        self
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for JobError {}

impl From<ResumableError> for JobError {
    fn from(error: ResumableError) -> Self {
        Self {
            message: error.user_message().to_string(),
            retryable: error.is_retryable(),
            code: Some(error.code().to_string()),
            context: None,
        }
    }
}

/// Result type for job callbacks.
pub type JobResult = std::result::Result<(), JobError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Iteration Job Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A job that processes its work as a resumable sequence of items.
///
/// # Example
///
/// ```rust,ignore
/// struct ReindexProducts {
///     products: InMemoryRelation<Product>,
/// }
///
/// impl IterationJob for ReindexProducts {
///     type Params = ReindexParams;
///     type Item = (i64, Product);
///
///     fn job_type(&self) -> &str { "ReindexProducts" }
///
///     fn build_enumerator<'a>(
///         &'a self,
///         _params: &'a ReindexParams,
///         cursor: Option<CursorValue>,
///     ) -> Result<Enumerator<'a, Self::Item>> {
///         EnumeratorBuilder::new().over_paged_source(self.products.clone(), cursor)
///     }
///
///     fn each_iteration(&self, (id, product): Self::Item, params: &ReindexParams) -> JobResult {
///         index(id, &product, params)
///     }
/// }
/// ```
pub trait IterationJob: Send + Sync + 'static {
    /// Arguments supplied by the host queue. Persisted with every re-enqueue.
    type Params: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// One unit of work yielded by the enumerator.
    type Item;

    /// Returns the unique type identifier for this job.
    fn job_type(&self) -> &str;

    /// Build the enumerator for this slice, resuming after `cursor` when present.
    ///
    /// Return an `InvalidCursor` error when the cursor's shape does not fit the source.
    fn build_enumerator<'a>(
        &'a self,
        params: &'a Self::Params,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, Self::Item>>;

    /// Process one item.
    ///
    /// Return a `JobError` if processing fails. The recorded cursor is not
    /// advanced, so the item is offered again on the next attempt.
    fn each_iteration(&self, item: Self::Item, params: &Self::Params) -> JobResult;

    /// Declared operation signatures, checked once at registration.
    fn contract(&self) -> JobContract {
        JobContract::standard(self.job_type())
    }

    /// Called before the first slice.
    fn on_start(&self, _params: &Self::Params) -> JobResult {
        Ok(())
    }

    /// Called before every slice that resumes from a cursor.
    fn on_resume(&self, _params: &Self::Params, _cursor: &CursorValue) -> JobResult {
        Ok(())
    }

    /// Called when a slice stops early.
    fn on_shutdown(&self, _params: &Self::Params, _cursor: &CursorValue) {
        // Default: do nothing
    }

    /// Called once the enumerator is exhausted.
    fn on_complete(&self, _params: &Self::Params) {
        // Default: do nothing
    }
}
