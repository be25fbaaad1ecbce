//! Resumable iteration jobs.
//!
//! This module provides:
//!
//! - **Job Definitions**: the `IterationJob` trait and its lifecycle hooks
//! - **Contracts**: declared operation signatures, validated once per job type
//! - **Registry**: typed and closure-based job types, dispatched by name
//! - **Runner**: the slice loop with pluggable stop conditions
//! - **Queue / Worker**: host-queue interface and a worker that re-enqueues interrupted slices
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  HostQueue   │──▶│   Worker     │──▶│  Registry    │──▶│   Runner     │
//! │ (envelopes)  │   │ (slices)     │   │ (contracts)  │   │ (cursor loop)│
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!        ▲                  │                                      │
//!        └── re-enqueue ◀───┘◀──────── Interrupted { cursor } ◀────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = JobRegistry::new();
//! registry.register(ReindexProducts::new(products))?;
//!
//! let queue = Arc::new(InMemoryHostQueue::new());
//! queue.enqueue(ResumeEnvelope::new("ReindexProducts", params)?).await?;
//!
//! let worker = IterationWorker::new(registry, queue, config.runner())
//!     .with_limits(config.runner.clone());
//! let handle = worker.start();
//! ```

pub mod contract;
pub mod job;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod stop;
pub mod worker;

pub use contract::{
    ContractValidator, CursorBinding, JobContract, OperationSignature, Parameter, ParameterKind,
    ValidatedContract,
};
pub use job::{IterationJob, JobError, JobId, JobResult, JobStatus};
pub use queue::{FailureRecord, HostQueue, InMemoryHostQueue, QueueStats, ResumeEnvelope};
pub use registry::{DynamicJobBuilder, JobRegistry};
pub use runner::{IterationOutcome, IterationRunner, SliceReport, SliceSummary};
pub use stop::{AnyOf, MaxIterations, Never, ShouldStop, ShutdownFlag, TimeBudget};
pub use worker::{IterationWorker, ProcessedSlice, WorkerConfig, WorkerHandle, WorkerStats};
