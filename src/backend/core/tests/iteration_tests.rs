//! Integration tests for slice execution and resumption.
//!
//! Tests cover:
//! - Complete, interrupted and failed slices over a two-item source
//! - Resuming through the serialized cursor token
//! - Nested sources resuming mid-inner-sequence
//! - Paged sources mutated between slices
//! - Serializability enforcement in warn and strict mode

use parking_lot::Mutex;
use resumable_core::cursor::{self, CursorValue, EnforcementMode, RecordingHandler, SerializabilityPolicy};
use resumable_core::enumerator::{Enumerator, EnumeratorBuilder, InMemoryRelation};
use resumable_core::error::{ErrorCode, Result};
use resumable_core::jobs::{
    IterationJob, IterationOutcome, IterationRunner, JobError, JobResult, MaxIterations, Never,
};
use std::sync::Arc;

// ============================================================================
// Test Jobs
// ============================================================================

#[derive(Default)]
struct TwoItems {
    seen: Mutex<Vec<i64>>,
    fail_on: Option<i64>,
}

impl TwoItems {
    fn failing_on(item: i64) -> Self {
        Self {
            fail_on: Some(item),
            ..Self::default()
        }
    }

    fn seen(&self) -> Vec<i64> {
        self.seen.lock().clone()
    }
}

impl IterationJob for TwoItems {
    type Params = ();
    type Item = i64;

    fn job_type(&self) -> &str {
        "TwoItems"
    }

    fn build_enumerator<'a>(
        &'a self,
        _params: &'a (),
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, i64>> {
        EnumeratorBuilder::new().times(2, cursor)
    }

    fn each_iteration(&self, item: i64, _params: &()) -> JobResult {
        if self.fail_on == Some(item) {
            return Err(JobError::fatal(format!("item {} rejected", item)));
        }
        self.seen.lock().push(item);
        Ok(())
    }
}

struct Catalog {
    seen: Mutex<Vec<i64>>,
}

impl IterationJob for Catalog {
    /// Product ids per category.
    type Params = Vec<Vec<i64>>;
    type Item = i64;

    fn job_type(&self) -> &str {
        "Catalog"
    }

    fn build_enumerator<'a>(
        &'a self,
        params: &'a Vec<Vec<i64>>,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, i64>> {
        let builder = EnumeratorBuilder::new();
        builder.nested(
            move |outer| builder.over_collection(params.iter().cloned(), outer),
            move |products: &Vec<i64>, inner| builder.over_collection(products.clone(), inner),
            cursor,
        )
    }

    fn each_iteration(&self, item: i64, _params: &Vec<Vec<i64>>) -> JobResult {
        self.seen.lock().push(item);
        Ok(())
    }
}

struct Reindex {
    relation: InMemoryRelation<String>,
    seen: Mutex<Vec<i64>>,
}

impl IterationJob for Reindex {
    type Params = ();
    type Item = (i64, String);

    fn job_type(&self) -> &str {
        "Reindex"
    }

    fn build_enumerator<'a>(
        &'a self,
        _params: &'a (),
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, (i64, String)>> {
        EnumeratorBuilder::new()
            .with_batch_size(3)
            .over_paged_source(self.relation.clone(), cursor)
    }

    fn each_iteration(&self, (key, _): (i64, String), _params: &()) -> JobResult {
        self.seen.lock().push(key);
        Ok(())
    }
}

/// Emits a timestamp cursor, which is not primitive-serializable.
struct StampedJob;

impl IterationJob for StampedJob {
    type Params = ();
    type Item = i64;

    fn job_type(&self) -> &str {
        "StampedJob"
    }

    fn build_enumerator<'a>(
        &'a self,
        _params: &'a (),
        _cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, i64>> {
        let stamp = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        Ok(Enumerator::from_pairs(vec![
            (1, CursorValue::Timestamp(stamp)),
            (2, CursorValue::Timestamp(stamp)),
        ]))
    }

    fn each_iteration(&self, _item: i64, _params: &()) -> JobResult {
        Ok(())
    }
}

// ============================================================================
// Two-Item Source
// ============================================================================

#[test]
fn test_two_items_complete_without_stop() {
    let job = TwoItems::default();
    let report = IterationRunner::default().run_slice(&job, &(), None, &mut Never);

    assert!(report.outcome.is_completed());
    assert_eq!(report.iterations, 2);
    assert_eq!(job.seen(), vec![0, 1]);
}

#[test]
fn test_two_items_interrupt_after_first() {
    let job = TwoItems::default();
    let runner = IterationRunner::default();

    let outcome = runner.run(&job, &(), None, &mut MaxIterations::new(1));
    assert!(matches!(
        &outcome,
        IterationOutcome::Interrupted { cursor: CursorValue::Integer(0) }
    ));
    assert_eq!(job.seen(), vec![0]);

    let outcome = runner.run(&job, &(), outcome.cursor().cloned(), &mut Never);
    assert!(outcome.is_completed());
    assert_eq!(job.seen(), vec![0, 1]);
}

#[test]
fn test_two_items_failure_keeps_last_cursor() {
    let job = TwoItems::failing_on(1);
    let runner = IterationRunner::default();

    let outcome = runner.run(&job, &(), None, &mut Never);
    match &outcome {
        IterationOutcome::Failed { error, cursor } => {
            assert_eq!(error.code(), ErrorCode::IterationFailed);
            assert_eq!(cursor, &Some(CursorValue::Integer(0)));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // Resumption reprocesses the failed item.
    let retry = TwoItems::default();
    let outcome = runner.run(&retry, &(), outcome.cursor().cloned(), &mut Never);
    assert!(outcome.is_completed());
    assert_eq!(retry.seen(), vec![1]);
}

#[test]
fn test_resume_through_cursor_token() {
    let job = TwoItems::default();
    let runner = IterationRunner::default();

    let outcome = runner.run(&job, &(), None, &mut MaxIterations::new(1));
    let token = cursor::encode_token(outcome.cursor().unwrap()).unwrap();
    let restored = cursor::decode_token(&token).unwrap();

    assert_eq!(restored, CursorValue::Integer(0));
    assert!(runner.run(&job, &(), Some(restored), &mut Never).is_completed());
    assert_eq!(job.seen(), vec![0, 1]);
}

#[test]
fn test_incompatible_starting_cursor_fails_before_any_item() {
    let job = TwoItems::default();
    let outcome = IterationRunner::default().run(
        &job,
        &(),
        Some(CursorValue::from("zero")),
        &mut Never,
    );

    let error = outcome.error().unwrap();
    assert_eq!(error.code(), ErrorCode::InvalidCursor);
    assert!(error.is_argument_error());
    assert!(job.seen().is_empty());
}

// ============================================================================
// Nested Sources
// ============================================================================

#[test]
fn test_nested_resume_reenters_inner_sequence() {
    let params = vec![vec![1, 2, 3], vec![], vec![4, 5]];
    let job = Catalog {
        seen: Mutex::new(Vec::new()),
    };
    let runner = IterationRunner::default();

    let mut cursor = None;
    let mut slices = 0;
    loop {
        slices += 1;
        match runner.run(&job, &params, cursor.take(), &mut MaxIterations::new(2)) {
            IterationOutcome::Completed => break,
            IterationOutcome::Interrupted { cursor: next } => {
                // Round-trip each cursor through its JSON form.
                let json = cursor::to_json(&next).unwrap();
                cursor = Some(cursor::from_json(&json).unwrap());
            }
            IterationOutcome::Failed { error, .. } => panic!("unexpected failure: {}", error),
        }
    }

    assert_eq!(*job.seen.lock(), vec![1, 2, 3, 4, 5]);
    assert_eq!(slices, 3);
}

// ============================================================================
// Paged Sources
// ============================================================================

#[test]
fn test_paged_source_tolerates_mutation_between_slices() {
    let relation = InMemoryRelation::new("products")
        .with_rows((1..=10).map(|id| (id, format!("product-{}", id))));
    let job = Reindex {
        relation: relation.clone(),
        seen: Mutex::new(Vec::new()),
    };
    let runner = IterationRunner::default();

    let outcome = runner.run(&job, &(), None, &mut MaxIterations::new(4));
    assert_eq!(outcome.cursor(), Some(&CursorValue::Integer(4)));

    relation.remove(2);
    relation.remove(5);
    relation.insert(0, "product-0".to_string());
    relation.insert(11, "product-11".to_string());

    let outcome = runner.run(&job, &(), outcome.cursor().cloned(), &mut Never);
    assert!(outcome.is_completed());
    assert_eq!(*job.seen.lock(), vec![1, 2, 3, 4, 6, 7, 8, 9, 10, 11]);
}

// ============================================================================
// Serializability Enforcement
// ============================================================================

#[test]
fn test_warn_mode_notifies_per_step() {
    let handler = Arc::new(RecordingHandler::new());
    let runner = IterationRunner::new(SerializabilityPolicy::default().with_handler(handler.clone()));

    let outcome = runner.run(&StampedJob, &(), None, &mut Never);

    assert!(outcome.is_completed());
    assert_eq!(handler.len(), 2);
    let notice = &handler.notices()[0];
    assert_eq!(notice.call_site.job_type, "StampedJob");
    assert_eq!(notice.classification.to_string(), "timestamp");
    assert!(notice.call_site.location.file().ends_with("iteration_tests.rs"));
}

#[test]
fn test_strict_mode_fails_on_first_step() {
    let handler = Arc::new(RecordingHandler::new());
    let policy = SerializabilityPolicy::new(EnforcementMode::Strict).with_handler(handler.clone());
    let runner = IterationRunner::new(policy);

    let report = runner.run_slice(&StampedJob, &(), None, &mut Never);

    assert_eq!(report.iterations, 1);
    let error = report.outcome.error().unwrap();
    assert_eq!(error.code(), ErrorCode::UnserializableCursor);
    assert_eq!(report.outcome.cursor(), None);
    assert!(handler.is_empty());
}
