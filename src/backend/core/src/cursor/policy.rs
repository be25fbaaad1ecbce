//! Graduated enforcement of cursor serializability.
//!
//! Before the enforcement horizon a non-primitive cursor produces a single
//! [`DeprecationNotice`] per iteration step and execution continues. In strict
//! mode the same cursor fails the step with
//! [`ErrorCode::UnserializableCursor`](crate::error::ErrorCode::UnserializableCursor).
//! A cursor with no JSON form at all (a non-finite float) fails the step in
//! either mode.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use super::codec::ensure_encodable;
use super::value::{Classification, CursorValue};
use crate::error::{ResumableError, Result};

/// Operation whose cursor input is affected by a non-primitive cursor.
pub const CURSOR_OPERATION: &str = "build_enumerator";

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcement Mode
// ═══════════════════════════════════════════════════════════════════════════════

/// How non-primitive cursors are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Emit a deprecation notice and continue.
    #[default]
    Warn,
    /// Fail the iteration step.
    Strict,
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Deprecation Notice
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a non-primitive cursor was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub job_type: String,
    pub operation: &'static str,
    /// The code that started the slice: the caller of
    /// [`IterationRunner::run`](crate::jobs::IterationRunner::run) or
    /// [`run_slice`](crate::jobs::IterationRunner::run_slice). Slices started
    /// through a registry or worker report the registry's call.
    pub location: &'static Location<'static>,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({}:{})",
            self.job_type,
            self.operation,
            self.location.file(),
            self.location.line()
        )
    }
}

/// Structured notice routed to a [`DeprecationHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecationNotice {
    pub message: String,
    pub call_site: CallSite,
    pub horizon: String,
    pub source: String,
    pub classification: Classification,
}

/// Receives deprecation notices.
pub trait DeprecationHandler: Send + Sync {
    fn notify(&self, notice: &DeprecationNotice);
}

impl<F> DeprecationHandler for F
where
    F: Fn(&DeprecationNotice) + Send + Sync,
{
    fn notify(&self, notice: &DeprecationNotice) {
        self(notice)
    }
}

/// Default handler: logs each notice as a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHandler;

impl DeprecationHandler for TracingHandler {
    fn notify(&self, notice: &DeprecationNotice) {
        tracing::warn!(
            job_type = %notice.call_site.job_type,
            operation = notice.call_site.operation,
            call_site = %notice.call_site,
            classification = %notice.classification,
            horizon = %notice.horizon,
            source = %notice.source,
            "{}",
            notice.message
        );
    }
}

/// Handler that keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    notices: Mutex<Vec<DeprecationNotice>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<DeprecationNotice> {
        self.notices.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }

    pub fn clear(&self) {
        self.notices.lock().clear();
    }
}

impl DeprecationHandler for RecordingHandler {
    fn notify(&self, notice: &DeprecationNotice) {
        self.notices.lock().push(notice.clone());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Serializability Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Enforcement state injected into the runner.
#[derive(Clone)]
pub struct SerializabilityPolicy {
    mode: EnforcementMode,
    horizon: String,
    source: String,
    handler: Arc<dyn DeprecationHandler>,
}

impl fmt::Debug for SerializabilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializabilityPolicy")
            .field("mode", &self.mode)
            .field("horizon", &self.horizon)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Default for SerializabilityPolicy {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::Warn,
            horizon: "next major release".to_string(),
            source: "resumable".to_string(),
            handler: Arc::new(TracingHandler),
        }
    }
}

impl SerializabilityPolicy {
    pub fn new(mode: EnforcementMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Policy that fails on every non-primitive cursor.
    pub fn strict() -> Self {
        Self::new(EnforcementMode::Strict)
    }

    pub fn with_horizon(mut self, horizon: impl Into<String>) -> Self {
        self.horizon = horizon.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn DeprecationHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn mode(&self) -> EnforcementMode {
        self.mode
    }

    pub fn horizon(&self) -> &str {
        &self.horizon
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check one cursor produced by `job_type`.
    ///
    /// Emits at most one notice, however deeply the offending value is nested.
    /// The notice's location is this method's caller, or further up when the
    /// caller is itself `#[track_caller]`.
    #[track_caller]
    pub fn enforce(&self, cursor: &CursorValue, job_type: &str) -> Result<Classification> {
        if let Err(error) = ensure_encodable(cursor) {
            return Err(ResumableError::unserializable_cursor(
                job_type,
                error.user_message(),
            ));
        }

        let classification = cursor.classify();
        if classification.is_primitive() {
            return Ok(classification);
        }

        if self.mode == EnforcementMode::Strict {
            return Err(ResumableError::unserializable_cursor(
                job_type,
                &classification.to_string(),
            ));
        }

        let notice = DeprecationNotice {
            message: format!(
                "{}#{} yielded a {} cursor. Cursors built from anything other than null, \
                 booleans, numbers, strings, lists and string-keyed maps will be rejected \
                 from {}.",
                job_type, CURSOR_OPERATION, classification, self.horizon
            ),
            call_site: CallSite {
                job_type: job_type.to_string(),
                operation: CURSOR_OPERATION,
                location: Location::caller(),
            },
            horizon: self.horizon.clone(),
            source: self.source.clone(),
            classification: classification.clone(),
        };
        self.handler.notify(&notice);

        Ok(classification)
    }
}
