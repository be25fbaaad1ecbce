//! Job type registration and dispatch by name.
//!
//! Contracts are validated once, when a job type is registered, and the result
//! is kept for the lifetime of the registry. Hosts dispatch slices by job type
//! with JSON params, which are decoded into the job's typed params per slice.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::contract::{
    ContractValidator, JobContract, OperationSignature, Parameter, ValidatedContract,
    BUILD_ENUMERATOR, EACH_ITERATION,
};
use super::job::{IterationJob, JobResult};
use super::runner::{IterationOutcome, IterationRunner, SliceReport};
use super::stop::ShouldStop;
use crate::cursor::CursorValue;
use crate::enumerator::Enumerator;
use crate::error::{ErrorCode, ResumableError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Type erasure
// ═══════════════════════════════════════════════════════════════════════════════

trait ErasedJob: Send + Sync {
    fn run(
        &self,
        runner: &IterationRunner,
        params: &Value,
        cursor: Option<CursorValue>,
        stop: &mut dyn ShouldStop,
    ) -> SliceReport;
}

struct Typed<J>(J);

impl<J: IterationJob> ErasedJob for Typed<J> {
    fn run(
        &self,
        runner: &IterationRunner,
        params: &Value,
        cursor: Option<CursorValue>,
        stop: &mut dyn ShouldStop,
    ) -> SliceReport {
        match serde_json::from_value::<J::Params>(params.clone()) {
            Ok(params) => runner.run_slice(&self.0, &params, cursor, stop),
            Err(e) => SliceReport {
                outcome: IterationOutcome::Failed {
                    error: ResumableError::with_internal(
                        ErrorCode::DeserializationError,
                        format!("Params for {} could not be decoded", self.0.job_type()),
                        e.to_string(),
                    ),
                    cursor,
                },
                iterations: 0,
                elapsed: std::time::Duration::ZERO,
            },
        }
    }
}

struct Registered {
    job: Arc<dyn ErasedJob>,
    contract: ValidatedContract,
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<String, Registered>,
    order: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Registered job types. Clones share the same registrations.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a job type.
    pub fn register<J: IterationJob>(&self, job: J) -> Result<ValidatedContract> {
        let mut contract = job.contract();
        contract.job_type = job.job_type().to_string();
        self.insert(contract, Arc::new(Typed(job)))
    }

    /// Start a closure-based job definition, checked at [`DynamicJobBuilder::finalize`].
    pub fn define(&self, job_type: impl Into<String>) -> DynamicJobBuilder {
        DynamicJobBuilder {
            registry: self.clone(),
            job_type: job_type.into(),
            build: None,
            each: None,
            extra: Vec::new(),
        }
    }

    fn insert(&self, contract: JobContract, job: Arc<dyn ErasedJob>) -> Result<ValidatedContract> {
        let validated = ContractValidator::validate(&contract)?;
        let job_type = validated.job_type().to_string();

        let mut inner = self.inner.write();
        if inner.jobs.contains_key(&job_type) {
            return Err(ResumableError::duplicate_job_type(&job_type));
        }
        inner.jobs.insert(
            job_type.clone(),
            Registered {
                job,
                contract: validated.clone(),
            },
        );
        inner.order.push(job_type.clone());

        tracing::info!(
            job_type = %job_type,
            cursor_binding = ?validated.cursor_binding,
            "Job type registered"
        );
        Ok(validated)
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.inner.read().jobs.contains_key(job_type)
    }

    /// The cached validation result for `job_type`.
    pub fn contract(&self, job_type: &str) -> Option<ValidatedContract> {
        self.inner
            .read()
            .jobs
            .get(job_type)
            .map(|registered| registered.contract.clone())
    }

    /// Job types in registration order.
    pub fn job_types(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Run one slice of `job_type` with JSON params.
    pub fn run_slice(
        &self,
        runner: &IterationRunner,
        job_type: &str,
        params: &Value,
        cursor: Option<CursorValue>,
        stop: &mut dyn ShouldStop,
    ) -> Result<SliceReport> {
        let job = self
            .inner
            .read()
            .jobs
            .get(job_type)
            .map(|registered| Arc::clone(&registered.job))
            .ok_or_else(|| ResumableError::job_not_registered(job_type))?;

        Ok(job.run(runner, params, cursor, stop))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dynamic jobs
// ═══════════════════════════════════════════════════════════════════════════════

type BuildFn = Arc<dyn Fn(&Value, Option<CursorValue>) -> Result<Enumerator<'static, Value>> + Send + Sync>;
type EachFn = Arc<dyn Fn(Value, &Value) -> JobResult + Send + Sync>;

/// Builder for a job whose operations are closures over JSON values.
///
/// ```rust,ignore
/// registry
///     .define("CountJob")
///     .build_enumerator(
///         vec![Parameter::positional("params"), Parameter::named("cursor")],
///         |params, cursor| {
///             let n = params["count"].as_u64().unwrap_or(0);
///             Ok(EnumeratorBuilder::new().times(n, cursor)?.map_items(Value::from))
///         },
///     )
///     .each_iteration(vec![Parameter::positional("item")], |item, _params| Ok(()))
///     .finalize()?;
/// ```
#[must_use = "a dynamic job is only registered by `finalize`"]
pub struct DynamicJobBuilder {
    registry: JobRegistry,
    job_type: String,
    build: Option<(Vec<Parameter>, BuildFn)>,
    each: Option<(Vec<Parameter>, EachFn)>,
    extra: Vec<OperationSignature>,
}

impl DynamicJobBuilder {
    pub fn build_enumerator<F>(mut self, parameters: Vec<Parameter>, f: F) -> Self
    where
        F: Fn(&Value, Option<CursorValue>) -> Result<Enumerator<'static, Value>> + Send + Sync + 'static,
    {
        self.build = Some((parameters, Arc::new(f)));
        self
    }

    pub fn each_iteration<F>(mut self, parameters: Vec<Parameter>, f: F) -> Self
    where
        F: Fn(Value, &Value) -> JobResult + Send + Sync + 'static,
    {
        self.each = Some((parameters, Arc::new(f)));
        self
    }

    /// Declare an additional operation. Its signature takes part in validation.
    pub fn operation(mut self, signature: OperationSignature) -> Self {
        self.extra.push(signature);
        self
    }

    /// Validate the declared signatures and register the job.
    pub fn finalize(self) -> Result<ValidatedContract> {
        let mut contract = JobContract::new(self.job_type.clone());
        if let Some((parameters, _)) = &self.build {
            contract = contract.operation(OperationSignature::new(BUILD_ENUMERATOR, parameters.clone()));
        }
        if let Some((parameters, _)) = &self.each {
            contract = contract.operation(OperationSignature::new(EACH_ITERATION, parameters.clone()));
        }
        for signature in self.extra {
            contract = contract.operation(signature);
        }

        let validated = ContractValidator::validate(&contract)?;
        let (build, each) = match (self.build, self.each) {
            (Some((_, build)), Some((_, each))) => (build, each),
            _ => return Err(ResumableError::internal("validated dynamic job lacks an operation")),
        };

        let job = DynamicJob {
            job_type: self.job_type,
            contract: validated.contract,
            build,
            each,
        };
        self.registry.register(job)
    }
}

struct DynamicJob {
    job_type: String,
    contract: JobContract,
    build: BuildFn,
    each: EachFn,
}

impl IterationJob for DynamicJob {
    type Params = Value;
    type Item = Value;

    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn build_enumerator<'a>(
        &'a self,
        params: &'a Value,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, Value>> {
        (self.build)(params, cursor)
    }

    fn each_iteration(&self, item: Value, params: &Value) -> JobResult {
        (self.each)(item, params)
    }

    fn contract(&self) -> JobContract {
        self.contract.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::EnumeratorBuilder;
    use crate::jobs::stop::Never;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Noop;

    impl IterationJob for Noop {
        type Params = Vec<String>;
        type Item = String;

        fn job_type(&self) -> &str {
            "Noop"
        }

        fn build_enumerator<'a>(
            &'a self,
            params: &'a Vec<String>,
            cursor: Option<CursorValue>,
        ) -> Result<Enumerator<'a, String>> {
            EnumeratorBuilder::new().over_collection(params.iter().cloned(), cursor)
        }

        fn each_iteration(&self, _item: String, _params: &Vec<String>) -> JobResult {
            Ok(())
        }
    }

    fn counting(registry: &JobRegistry, seen: Arc<Mutex<Vec<Value>>>) -> DynamicJobBuilder {
        registry
            .define("Counting")
            .build_enumerator(
                vec![Parameter::positional("params"), Parameter::named("cursor")],
                |params, cursor| {
                    let n = params["count"].as_u64().unwrap_or(0);
                    Ok(EnumeratorBuilder::new().times(n, cursor)?.map_items(Value::from))
                },
            )
            .each_iteration(vec![Parameter::positional("item")], move |item, _| {
                seen.lock().push(item);
                Ok(())
            })
    }

    #[test]
    fn test_register_and_dispatch() {
        let registry = JobRegistry::new();
        registry.register(Noop).unwrap();

        assert!(registry.is_registered("Noop"));
        assert_eq!(registry.job_types(), vec!["Noop".to_string()]);

        let report = registry
            .run_slice(
                &IterationRunner::default(),
                "Noop",
                &json!(["a", "b"]),
                None,
                &mut Never,
            )
            .unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(report.iterations, 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = JobRegistry::new();
        registry.register(Noop).unwrap();
        let err = registry.register(Noop).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateJobType);
    }

    #[test]
    fn test_unknown_job_type() {
        let err = JobRegistry::new()
            .run_slice(&IterationRunner::default(), "Ghost", &Value::Null, None, &mut Never)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobNotRegistered);
    }

    #[test]
    fn test_bad_params_fail_slice() {
        let registry = JobRegistry::new();
        registry.register(Noop).unwrap();

        let report = registry
            .run_slice(&IterationRunner::default(), "Noop", &json!({"not": "a list"}), None, &mut Never)
            .unwrap();
        assert_eq!(
            report.outcome.error().map(|e| e.code()),
            Some(ErrorCode::DeserializationError)
        );
    }

    #[test]
    fn test_dynamic_job_runs() {
        let registry = JobRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        counting(&registry, seen.clone()).finalize().unwrap();

        let report = registry
            .run_slice(
                &IterationRunner::default(),
                "Counting",
                &json!({"count": 3}),
                Some(CursorValue::Integer(0)),
                &mut Never,
            )
            .unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_dynamic_job_validated_at_finalize() {
        let registry = JobRegistry::new();

        let err = registry
            .define("Positional")
            .build_enumerator(
                vec![Parameter::positional("params"), Parameter::positional("cursor")],
                |_, _| Ok(Enumerator::empty()),
            )
            .each_iteration(vec![Parameter::positional("item")], |_, _| Ok(()))
            .finalize()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedOperation);
        assert!(!registry.is_registered("Positional"));

        let err = registry
            .define("NoEach")
            .build_enumerator(vec![Parameter::named("cursor")], |_, _| Ok(Enumerator::empty()))
            .finalize()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOperation);
    }

    #[test]
    fn test_contract_cached() {
        let registry = JobRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let validated = counting(&registry, seen).finalize().unwrap();

        assert_eq!(registry.contract("Counting"), Some(validated));
        assert_eq!(registry.contract("Missing"), None);
    }
}
