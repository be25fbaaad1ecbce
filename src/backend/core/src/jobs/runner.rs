//! The slice execution loop.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace, warn};

use super::job::{IterationJob, JobStatus};
use super::stop::ShouldStop;
use crate::cursor::{CursorValue, SerializabilityPolicy};
use crate::error::ResumableError;

// ═══════════════════════════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// How one slice ended.
#[derive(Debug)]
pub enum IterationOutcome {
    /// The enumerator was exhausted.
    Completed,
    /// The stop condition fired; resume from `cursor`.
    Interrupted { cursor: CursorValue },
    /// The slice failed. `cursor` is the last recorded position, or the
    /// starting cursor when nothing was recorded.
    Failed {
        error: ResumableError,
        cursor: Option<CursorValue>,
    },
}

impl IterationOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed => JobStatus::Completed,
            Self::Interrupted { .. } => JobStatus::Interrupted,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Cursor the host should persist alongside this outcome.
    pub fn cursor(&self) -> Option<&CursorValue> {
        match self {
            Self::Completed => None,
            Self::Interrupted { cursor } => Some(cursor),
            Self::Failed { cursor, .. } => cursor.as_ref(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    pub fn error(&self) -> Option<&ResumableError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Outcome plus slice measurements.
#[derive(Debug)]
pub struct SliceReport {
    pub outcome: IterationOutcome,
    /// Number of `each_iteration` calls that returned successfully.
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Serializable summary of a slice, for hosts and CLIs.
#[derive(Debug, Clone, Serialize)]
pub struct SliceSummary {
    pub job_type: String,
    pub status: JobStatus,
    pub cursor: Option<CursorValue>,
    pub iterations: u64,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SliceReport {
    pub fn summary(&self, job_type: &str) -> SliceSummary {
        SliceSummary {
            job_type: job_type.to_string(),
            status: self.outcome.status(),
            cursor: self.outcome.cursor().cloned(),
            iterations: self.iterations,
            elapsed_ms: self.elapsed.as_millis() as u64,
            error: self.outcome.error().map(|e| e.user_message().to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives one execution slice of an [`IterationJob`].
///
/// Holds no per-slice state, so one runner may serve any number of slices.
#[derive(Debug, Clone, Default)]
pub struct IterationRunner {
    policy: SerializabilityPolicy,
}

impl IterationRunner {
    pub fn new(policy: SerializabilityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SerializabilityPolicy {
        &self.policy
    }

    /// Run one slice and return its outcome.
    #[track_caller]
    pub fn run<J, S>(
        &self,
        job: &J,
        params: &J::Params,
        cursor: Option<CursorValue>,
        stop: &mut S,
    ) -> IterationOutcome
    where
        J: IterationJob,
        S: ShouldStop + ?Sized,
    {
        self.run_slice(job, params, cursor, stop).outcome
    }

    /// Run one slice and return its outcome with measurements.
    ///
    /// Deprecation notices raised during the slice carry the caller's location.
    #[track_caller]
    pub fn run_slice<J, S>(
        &self,
        job: &J,
        params: &J::Params,
        cursor: Option<CursorValue>,
        stop: &mut S,
    ) -> SliceReport
    where
        J: IterationJob,
        S: ShouldStop + ?Sized,
    {
        let started = Instant::now();
        let job_type = job.job_type();
        let cursor = cursor.filter(|c| !c.is_null());

        let span = info_span!("iteration_slice", job_type = %job_type, resumed = cursor.is_some());
        let _enter = span.enter();

        let mut iterations = 0u64;
        let outcome = self.drive(job, params, cursor, stop, &mut iterations);

        let elapsed = started.elapsed();
        match &outcome {
            IterationOutcome::Completed => {
                info!(iterations, elapsed_ms = elapsed.as_millis() as u64, "Iteration completed");
            }
            IterationOutcome::Interrupted { cursor } => {
                info!(
                    iterations,
                    elapsed_ms = elapsed.as_millis() as u64,
                    cursor = %cursor,
                    "Iteration interrupted"
                );
            }
            IterationOutcome::Failed { error, cursor } => {
                error.log();
                warn!(
                    iterations,
                    error_code = %error.code(),
                    cursor = ?cursor,
                    "Iteration failed"
                );
            }
        }

        SliceReport {
            outcome,
            iterations,
            elapsed,
        }
    }

    #[track_caller]
    fn drive<J, S>(
        &self,
        job: &J,
        params: &J::Params,
        cursor: Option<CursorValue>,
        stop: &mut S,
        iterations: &mut u64,
    ) -> IterationOutcome
    where
        J: IterationJob,
        S: ShouldStop + ?Sized,
    {
        let job_type = job.job_type();

        let hook = match &cursor {
            None => job.on_start(params).map_err(|e| ("on_start", e)),
            Some(c) => job.on_resume(params, c).map_err(|e| ("on_resume", e)),
        };
        if let Err((operation, e)) = hook {
            return IterationOutcome::Failed {
                error: ResumableError::callback_failed(job_type, operation, e),
                cursor,
            };
        }

        let mut enumerator = match job.build_enumerator(params, cursor.clone()) {
            Ok(enumerator) => enumerator,
            Err(error) => return IterationOutcome::Failed { error, cursor },
        };
        debug!("Enumerator built");

        let mut recorded = cursor;
        loop {
            let (item, next_cursor) = match enumerator.next() {
                None => {
                    drop(enumerator);
                    job.on_complete(params);
                    return IterationOutcome::Completed;
                }
                Some(Err(error)) => {
                    return IterationOutcome::Failed {
                        error,
                        cursor: recorded,
                    }
                }
                Some(Ok(step)) => step,
            };

            if let Err(e) = job.each_iteration(item, params) {
                return IterationOutcome::Failed {
                    error: ResumableError::iteration_failed(job_type, e),
                    cursor: recorded,
                };
            }
            *iterations += 1;

            if let Err(error) = self.policy.enforce(&next_cursor, job_type) {
                return IterationOutcome::Failed {
                    error,
                    cursor: recorded,
                };
            }
            trace!(cursor = %next_cursor, "Cursor recorded");
            recorded = Some(next_cursor);

            if stop.should_stop() {
                drop(enumerator);
                let cursor = recorded.unwrap_or_default();
                job.on_shutdown(params, &cursor);
                return IterationOutcome::Interrupted { cursor };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{EnforcementMode, RecordingHandler};
    use crate::enumerator::{Enumerator, EnumeratorBuilder};
    use crate::error::{ErrorCode, Result};
    use crate::jobs::job::{JobError, JobResult};
    use crate::jobs::stop::{MaxIterations, Never};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        items: Mutex<Vec<i64>>,
        hooks: Mutex<Vec<&'static str>>,
        fail_on: Option<i64>,
    }

    impl IterationJob for Recorder {
        type Params = ();
        type Item = i64;

        fn job_type(&self) -> &str {
            "Recorder"
        }

        fn build_enumerator<'a>(
            &'a self,
            _params: &'a (),
            cursor: Option<CursorValue>,
        ) -> Result<Enumerator<'a, i64>> {
            EnumeratorBuilder::new().over_collection(vec![10, 20, 30], cursor)
        }

        fn each_iteration(&self, item: i64, _params: &()) -> JobResult {
            if self.fail_on == Some(item) {
                return Err(JobError::fatal(format!("cannot process {}", item)));
            }
            self.items.lock().push(item);
            Ok(())
        }

        fn on_start(&self, _params: &()) -> JobResult {
            self.hooks.lock().push("start");
            Ok(())
        }

        fn on_resume(&self, _params: &(), _cursor: &CursorValue) -> JobResult {
            self.hooks.lock().push("resume");
            Ok(())
        }

        fn on_shutdown(&self, _params: &(), _cursor: &CursorValue) {
            self.hooks.lock().push("shutdown");
        }

        fn on_complete(&self, _params: &()) {
            self.hooks.lock().push("complete");
        }
    }

    #[test]
    fn test_runs_to_completion() {
        let job = Recorder::default();
        let report = IterationRunner::default().run_slice(&job, &(), None, &mut Never);

        assert!(report.outcome.is_completed());
        assert_eq!(report.iterations, 3);
        assert_eq!(*job.items.lock(), vec![10, 20, 30]);
        assert_eq!(*job.hooks.lock(), vec!["start", "complete"]);
    }

    #[test]
    fn test_interrupt_and_resume() {
        let job = Recorder::default();
        let runner = IterationRunner::default();

        let outcome = runner.run(&job, &(), None, &mut MaxIterations::new(2));
        let cursor = match outcome {
            IterationOutcome::Interrupted { cursor } => cursor,
            other => panic!("expected interruption, got {:?}", other),
        };
        assert_eq!(cursor, CursorValue::Integer(1));

        let outcome = runner.run(&job, &(), Some(cursor), &mut Never);
        assert!(outcome.is_completed());
        assert_eq!(*job.items.lock(), vec![10, 20, 30]);
        assert_eq!(*job.hooks.lock(), vec!["start", "shutdown", "resume", "complete"]);
    }

    #[test]
    fn test_failure_keeps_previous_cursor() {
        let job = Recorder {
            fail_on: Some(20),
            ..Recorder::default()
        };
        let outcome = IterationRunner::default().run(&job, &(), None, &mut Never);

        match outcome {
            IterationOutcome::Failed { error, cursor } => {
                assert_eq!(error.code(), ErrorCode::IterationFailed);
                assert!(!error.is_retryable());
                assert_eq!(cursor, Some(CursorValue::Integer(0)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_starting_cursor_fails_unchanged() {
        let job = Recorder::default();
        let start = CursorValue::from("oops");
        let outcome = IterationRunner::default().run(&job, &(), Some(start.clone()), &mut Never);

        match outcome {
            IterationOutcome::Failed { error, cursor } => {
                assert_eq!(error.code(), ErrorCode::InvalidCursor);
                assert_eq!(cursor, Some(start));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(job.items.lock().is_empty());
    }

    #[test]
    fn test_stop_is_polled_after_each_item() {
        let job = Recorder::default();
        let mut polls = 0;
        let outcome = IterationRunner::default().run(&job, &(), None, &mut || {
            polls += 1;
            true
        });

        assert!(outcome.is_interrupted());
        assert_eq!(polls, 1);
        assert_eq!(*job.items.lock(), vec![10]);
    }

    struct SymbolCursors;

    impl IterationJob for SymbolCursors {
        type Params = ();
        type Item = &'static str;

        fn job_type(&self) -> &str {
            "SymbolCursors"
        }

        fn build_enumerator<'a>(
            &'a self,
            _params: &'a (),
            _cursor: Option<CursorValue>,
        ) -> Result<Enumerator<'a, &'static str>> {
            Ok(Enumerator::from_pairs(vec![
                ("a", CursorValue::symbol("a")),
                ("b", CursorValue::symbol("b")),
            ]))
        }

        fn each_iteration(&self, _item: &'static str, _params: &()) -> JobResult {
            Ok(())
        }
    }

    #[test]
    fn test_non_primitive_cursor_warns_per_step() {
        let handler = Arc::new(RecordingHandler::new());
        let runner = IterationRunner::new(
            SerializabilityPolicy::new(EnforcementMode::Warn).with_handler(handler.clone()),
        );

        let outcome = runner.run(&SymbolCursors, &(), None, &mut Never);
        assert!(outcome.is_completed());
        assert_eq!(handler.len(), 2);
    }

    #[test]
    fn test_non_primitive_cursor_rejected_when_strict() {
        let runner = IterationRunner::new(SerializabilityPolicy::strict());
        let outcome = runner.run(&SymbolCursors, &(), None, &mut Never);

        match outcome {
            IterationOutcome::Failed { error, cursor } => {
                assert_eq!(error.code(), ErrorCode::UnserializableCursor);
                assert!(error.user_message().contains("SymbolCursors"));
                assert_eq!(cursor, None);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
