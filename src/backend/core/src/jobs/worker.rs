//! Worker that pulls envelopes from a host queue and runs one slice each.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::queue::{HostQueue, ResumeEnvelope};
use super::registry::JobRegistry;
use super::runner::{IterationOutcome, IterationRunner, SliceReport, SliceSummary};
use super::stop::{AnyOf, MaxIterations, ShutdownFlag, TimeBudget};
use super::{JobId, JobStatus};
use crate::config::RunnerConfig;
use crate::error::{ResumableError, Result};

/// Configuration for the iteration worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker name/identifier
    #[serde(default = "default_worker_name")]
    pub name: String,
    /// Poll interval for checking the queue
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_worker_name() -> String {
    "resumable-worker".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Statistics for the iteration worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Slices run
    pub slices: Arc<AtomicU64>,
    /// Items processed across all slices
    pub iterations: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub interrupted: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slices(&self) -> u64 {
        self.slices.load(Ordering::Relaxed)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn interrupted(&self) -> u64 {
        self.interrupted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, report: &SliceReport) {
        self.slices.fetch_add(1, Ordering::Relaxed);
        self.iterations.fetch_add(report.iterations, Ordering::Relaxed);
        let counter = match report.outcome {
            IterationOutcome::Completed => &self.completed,
            IterationOutcome::Interrupted { .. } => &self.interrupted,
            IterationOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A slice the worker ran, tagged with its job.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedSlice {
    pub job_id: JobId,
    pub times_interrupted: u32,
    #[serde(flatten)]
    pub summary: SliceSummary,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: tokio::sync::watch::Sender<bool>,
    flag: ShutdownFlag,
    stats: WorkerStats,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    ///
    /// A slice in flight stops after its current item and is re-enqueued.
    pub fn shutdown(&self) {
        self.flag.trigger();
        let _ = self.shutdown.send(true);
    }

    /// Shut down and wait for the worker loop to exit.
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

/// Runs slices from a [`HostQueue`] through a [`JobRegistry`].
#[derive(Clone)]
pub struct IterationWorker {
    registry: JobRegistry,
    queue: Arc<dyn HostQueue>,
    runner: IterationRunner,
    limits: RunnerConfig,
    config: WorkerConfig,
    stats: WorkerStats,
    shutdown: ShutdownFlag,
}

impl IterationWorker {
    /// Create a new iteration worker.
    pub fn new(registry: JobRegistry, queue: Arc<dyn HostQueue>, runner: IterationRunner) -> Self {
        Self {
            registry,
            queue,
            runner,
            limits: RunnerConfig::default(),
            config: WorkerConfig::default(),
            stats: WorkerStats::new(),
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Set the per-slice time budget and iteration cap.
    pub fn with_limits(mut self, limits: RunnerConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    fn stop_condition(&self) -> AnyOf {
        let mut stop = AnyOf::new()
            .with(TimeBudget::new(self.limits.max_slice_runtime))
            .with(self.shutdown.clone());
        if let Some(max) = self.limits.max_iterations_per_slice {
            stop = stop.with(MaxIterations::new(max));
        }
        stop
    }

    /// Dequeue one envelope and run one slice of it.
    ///
    /// Interrupted slices are re-enqueued with their cursor; completed and
    /// failed slices are finalized. A dequeued envelope always ends up back
    /// in the queue or finalized, whichever step fails. Returns `None` when
    /// the queue is empty.
    pub async fn process_next(&self) -> Result<Option<ProcessedSlice>> {
        let Some(dequeued) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        tracing::debug!(
            worker = %self.config.name,
            job_id = %dequeued.id,
            job_type = %dequeued.job_type,
            times_interrupted = dequeued.times_interrupted,
            "Slice dequeued"
        );

        let report = self.run_blocking(&dequeued).await;
        self.stats.record(&report);
        let mut summary = report.summary(&dequeued.job_type);
        let mut envelope = dequeued.clone();

        match report.outcome {
            IterationOutcome::Interrupted { cursor } => {
                envelope.interrupted(cursor, report.elapsed);
                let error = match self.queue.enqueue(envelope.clone()).await {
                    Ok(()) => {
                        return Ok(Some(ProcessedSlice {
                            job_id: envelope.id,
                            times_interrupted: envelope.times_interrupted,
                            summary,
                        }))
                    }
                    Err(error) => error,
                };

                error.log();
                tracing::warn!(
                    worker = %self.config.name,
                    job_id = %envelope.id,
                    "Re-enqueue failed, finalizing the job as failed"
                );
                summary.status = JobStatus::Failed;
                summary.error = Some(error.user_message().to_string());
                let cursor = envelope.cursor.clone();
                envelope.failed(&error, cursor, Duration::ZERO);
                self.finish(envelope, dequeued, summary).await
            }
            IterationOutcome::Completed => {
                envelope.completed(report.elapsed);
                self.finish(envelope, dequeued, summary).await
            }
            IterationOutcome::Failed { error, cursor } => {
                envelope.failed(&error, cursor, report.elapsed);
                self.finish(envelope, dequeued, summary).await
            }
        }
    }

    /// Finalize `envelope`. If the queue refuses it, `dequeued` goes back on
    /// the queue unchanged and the finalize error is returned.
    async fn finish(
        &self,
        envelope: ResumeEnvelope,
        dequeued: ResumeEnvelope,
        summary: SliceSummary,
    ) -> Result<Option<ProcessedSlice>> {
        let processed = ProcessedSlice {
            job_id: envelope.id,
            times_interrupted: envelope.times_interrupted,
            summary,
        };
        let (job_id, status, total_time_ms) =
            (envelope.id, envelope.status, envelope.total_time_ms);

        if let Err(error) = self.queue.finalize(envelope).await {
            tracing::warn!(
                worker = %self.config.name,
                job_id = %job_id,
                error_code = %error.code(),
                "Finalize failed, returning the job to the queue"
            );
            self.queue.enqueue(dequeued).await?;
            return Err(error);
        }

        tracing::info!(
            worker = %self.config.name,
            job_id = %job_id,
            status = %status,
            total_time_ms,
            "Job finalized"
        );
        Ok(Some(processed))
    }

    /// Run one slice on the blocking pool. A panicking job fails the slice
    /// at the cursor it was dequeued with.
    async fn run_blocking(&self, envelope: &ResumeEnvelope) -> SliceReport {
        let registry = self.registry.clone();
        let runner = self.runner.clone();
        let job_type = envelope.job_type.clone();
        let params = envelope.params.clone();
        let cursor = envelope.cursor.clone();
        let mut stop = self.stop_condition();
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || {
            match registry.run_slice(&runner, &job_type, &params, cursor.clone(), &mut stop) {
                Ok(report) => report,
                Err(error) => SliceReport {
                    outcome: IterationOutcome::Failed { error, cursor },
                    iterations: 0,
                    elapsed: Duration::ZERO,
                },
            }
        });

        match task.await {
            Ok(report) => report,
            Err(join_error) => SliceReport {
                outcome: IterationOutcome::Failed {
                    error: ResumableError::from(join_error),
                    cursor: envelope.cursor.clone(),
                },
                iterations: 0,
                elapsed: started.elapsed(),
            },
        }
    }

    /// Run slices until the queue is empty or shutdown is requested.
    pub async fn drain(&self) -> Result<Vec<ProcessedSlice>> {
        let mut processed = Vec::new();
        while !self.shutdown.is_triggered() {
            match self.process_next().await? {
                Some(slice) => processed.push(slice),
                None => break,
            }
        }
        Ok(processed)
    }

    /// Start the worker, returning a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let stats = self.stats.clone();
        let flag = self.shutdown.clone();

        let task = tokio::spawn(async move {
            let poll_interval = self.config.poll_interval;
            tracing::info!(worker = %self.config.name, "Iteration worker started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!(worker = %self.config.name, "Worker shutting down");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        if let Err(e) = self.drain().await {
                            e.log();
                        }
                    }
                }
            }

            tracing::info!(worker = %self.config.name, "Worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            flag,
            stats,
            task,
        }
    }
}
