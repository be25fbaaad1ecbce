#![allow(clippy::result_large_err)]
//! # Resumable Core
//!
//! Interruptible, resumable iteration over collections and paged sources.
//!
//! ## Architecture
//!
//! - **Enumerators**: lazy `(item, cursor)` sequences that restart after any cursor
//! - **Runner**: drives a job's enumerator one slice at a time until a stop condition fires
//! - **Cursors**: a tagged JSON codec plus the serializability policy (warn, then strict)
//! - **Contracts**: validates a job type's declared operations before it can run
//! - **Queue / Worker**: re-enqueues interrupted slices with their cursor
//! - **Telemetry**: structured logging through `tracing`

pub mod config;
pub mod cursor;
pub mod enumerator;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, ResumableError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{EngineConfig, EnforcementConfig, RunnerConfig};
    pub use crate::cursor::{
        Classification, CursorValue, DeprecationHandler, DeprecationNotice, EnforcementMode,
        NonPrimitiveKind, RecordingHandler, SerializabilityPolicy,
    };
    pub use crate::enumerator::{
        Enumerator, EnumeratorBuilder, InMemoryRelation, KeysetQuery, PagedSource, SortDirection,
        Step,
    };
    pub use crate::error::{
        ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, ResumableError, Result,
    };
    pub use crate::jobs::{
        ContractValidator, HostQueue, InMemoryHostQueue, IterationJob, IterationOutcome,
        IterationRunner, IterationWorker, JobContract, JobError, JobRegistry, JobResult,
        JobStatus, OperationSignature, Parameter, ResumeEnvelope, ShouldStop, SliceReport,
        ValidatedContract,
    };
}
