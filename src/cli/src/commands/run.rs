//! Demo run command.
//!
//! Registers a reindex job over an in-memory relation, enqueues it and drains
//! the queue through the worker, one slice per line.

use anyhow::Result;
use clap::Args;
use resumable_core::config::EngineConfig;
use resumable_core::cursor::{CursorValue, EnforcementMode, RecordingHandler};
use resumable_core::enumerator::{Enumerator, EnumeratorBuilder, InMemoryRelation};
use resumable_core::jobs::{
    HostQueue, InMemoryHostQueue, IterationJob, IterationRunner, IterationWorker, JobError,
    JobRegistry, JobResult, ProcessedSlice, ResumeEnvelope,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

const JOB_TYPE: &str = "DemoReindex";

#[derive(Args)]
pub struct RunArgs {
    /// Number of rows in the demo relation
    #[arg(long, default_value_t = 25)]
    rows: i64,

    /// Items per slice before the worker interrupts the job
    #[arg(long, default_value_t = 10)]
    per_slice: u64,

    /// Fail on the row with this key
    #[arg(long)]
    fail_on: Option<i64>,

    /// Wrap cursors in a named subtype, which is not primitive-serializable
    #[arg(long)]
    tagged_cursors: bool,

    /// Reject non-primitive cursors regardless of configuration
    #[arg(long)]
    strict: bool,

    /// Simulated work per row, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DemoParams {
    fail_on: Option<i64>,
    tagged_cursors: bool,
    delay_ms: u64,
}

struct DemoReindex {
    relation: InMemoryRelation<String>,
    builder: EnumeratorBuilder,
}

impl IterationJob for DemoReindex {
    type Params = DemoParams;
    type Item = (i64, String);

    fn job_type(&self) -> &str {
        JOB_TYPE
    }

    fn build_enumerator<'a>(
        &'a self,
        params: &'a DemoParams,
        cursor: Option<CursorValue>,
    ) -> resumable_core::Result<Enumerator<'a, (i64, String)>> {
        let cursor = cursor.map(|c| match c {
            CursorValue::Tagged { value, .. } => *value,
            other => other,
        });
        let rows = self
            .builder
            .over_paged_source(self.relation.clone(), cursor)?;

        if !params.tagged_cursors {
            return Ok(rows);
        }
        Ok(Enumerator::new(rows.map(|step| {
            step.map(|(row, cursor)| (row, CursorValue::tagged("RowKey", cursor)))
        })))
    }

    fn each_iteration(&self, (key, _row): (i64, String), params: &DemoParams) -> JobResult {
        if params.fail_on == Some(key) {
            return Err(JobError::fatal(format!("row {} could not be reindexed", key)));
        }
        if params.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(params.delay_ms));
        }
        Ok(())
    }
}

#[derive(Tabled, Serialize)]
struct SliceRow {
    #[tabled(rename = "Slice")]
    slice: usize,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Iterations")]
    iterations: u64,
    #[tabled(rename = "Cursor")]
    cursor: String,
    #[tabled(rename = "Elapsed (ms)")]
    elapsed_ms: u64,
    #[tabled(rename = "Error")]
    error: String,
}

impl SliceRow {
    fn new(index: usize, slice: &ProcessedSlice) -> Self {
        Self {
            slice: index + 1,
            status: slice.summary.status.to_string(),
            iterations: slice.summary.iterations,
            cursor: slice
                .summary
                .cursor
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            elapsed_ms: slice.summary.elapsed_ms,
            error: slice.summary.error.clone().unwrap_or_default(),
        }
    }
}

pub async fn execute(args: RunArgs, engine: &EngineConfig, format: OutputFormat) -> Result<()> {
    let mut engine = engine.clone();
    if args.strict {
        engine.enforcement.mode = EnforcementMode::Strict;
    }
    engine.runner.max_iterations_per_slice = Some(args.per_slice.max(1));
    engine.validate()?;

    let notices = Arc::new(RecordingHandler::new());
    let runner = IterationRunner::new(engine.policy_with_handler(notices.clone()));

    let relation = InMemoryRelation::new("demo_rows")
        .with_rows((1..=args.rows.max(0)).map(|key| (key, format!("row-{}", key))));
    let registry = JobRegistry::new();
    registry.register(DemoReindex {
        relation,
        builder: engine.enumerator_builder(),
    })?;

    let queue = Arc::new(InMemoryHostQueue::new());
    let params = DemoParams {
        fail_on: args.fail_on,
        tagged_cursors: args.tagged_cursors,
        delay_ms: args.delay_ms,
    };
    queue.enqueue(ResumeEnvelope::new(JOB_TYPE, &params)?).await?;

    let worker = IterationWorker::new(registry, queue.clone(), runner)
        .with_limits(engine.runner.clone())
        .with_config(engine.worker.clone());
    let slices = worker.drain().await?;

    match format {
        OutputFormat::Table => {
            let rows: Vec<SliceRow> = slices
                .iter()
                .enumerate()
                .map(|(index, slice)| SliceRow::new(index, slice))
                .collect();
            output::print_list(&rows, format)?;

            if !notices.is_empty() {
                output::print_warning(&format!(
                    "{} non-primitive cursor(s) accepted in {} mode",
                    notices.len(),
                    engine.enforcement.mode
                ));
            }

            for envelope in queue.finished().await? {
                output::print_detail("Job", &envelope.id.to_string());
                output::print_detail("Status", &envelope.status.to_string());
                output::print_detail("Interruptions", &envelope.times_interrupted.to_string());
                output::print_detail("Total time (ms)", &envelope.total_time_ms.to_string());
                match envelope.failure {
                    Some(failure) => output::print_error(&format!(
                        "{}: {} (retryable: {})",
                        failure.code, failure.message, failure.retryable
                    )),
                    None => output::print_success("Job completed"),
                }
            }
        }
        _ => output::print_item(&slices, format)?,
    }

    Ok(())
}
