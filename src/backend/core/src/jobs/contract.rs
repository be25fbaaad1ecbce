//! Operation signatures and the one-time contract check.
//!
//! A job type is usable only when it declares `build_enumerator` with a cursor
//! input that can be supplied by name, and `each_iteration` able to receive an
//! item. Parameter type hints are carried for documentation and never affect
//! validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ResumableError, Result};

pub const BUILD_ENUMERATOR: &str = "build_enumerator";
pub const EACH_ITERATION: &str = "each_iteration";
/// Entry point owned by the engine; job types may not redefine it.
pub const RESERVED_PERFORM: &str = "perform";

const CURSOR_PARAMETER: &str = "cursor";

// ═══════════════════════════════════════════════════════════════════════════════
// Parameters
// ═══════════════════════════════════════════════════════════════════════════════

/// How a parameter can be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Required, by position only.
    Positional,
    /// Defaulted, by position only.
    OptionalPositional,
    /// By name; `required` is false when a default exists.
    Named { required: bool },
    /// Catch-all for extra positional arguments.
    Variadic,
    /// Catch-all for extra named arguments.
    NamedVariadic,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

impl Parameter {
    fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            type_hint: None,
        }
    }

    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Positional)
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::OptionalPositional)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Named { required: true })
    }

    pub fn named_optional(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Named { required: false })
    }

    pub fn variadic(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Variadic)
    }

    pub fn named_variadic(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::NamedVariadic)
    }

    /// Attach a documentation-only type hint.
    pub fn typed(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }

    fn takes_position(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::Positional | ParameterKind::OptionalPositional | ParameterKind::Variadic
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Signatures and Contracts
// ═══════════════════════════════════════════════════════════════════════════════

/// Declared signature of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSignature {
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl OperationSignature {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// All operations a job type declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContract {
    pub job_type: String,
    pub operations: Vec<OperationSignature>,
}

impl JobContract {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            operations: Vec::new(),
        }
    }

    /// The shape every statically typed [`IterationJob`](super::IterationJob) has.
    pub fn standard(job_type: impl Into<String>) -> Self {
        Self::new(job_type)
            .operation(OperationSignature::new(
                BUILD_ENUMERATOR,
                vec![Parameter::positional("params"), Parameter::named(CURSOR_PARAMETER)],
            ))
            .operation(OperationSignature::new(
                EACH_ITERATION,
                vec![Parameter::positional("item"), Parameter::positional("params")],
            ))
    }

    pub fn operation(mut self, signature: OperationSignature) -> Self {
        self.operations.push(signature);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OperationSignature> {
        self.operations.iter().find(|op| op.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════════

/// How `build_enumerator` receives its cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorBinding {
    /// A parameter literally named `cursor`.
    Named { required: bool },
    /// Absorbed by a named catch-all.
    NamedVariadic,
    /// The whole signature is a single positional catch-all.
    FullyVariadic,
}

/// A contract that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedContract {
    pub contract: JobContract,
    pub cursor_binding: CursorBinding,
}

impl ValidatedContract {
    pub fn job_type(&self) -> &str {
        &self.contract.job_type
    }
}

/// Checks job contracts. Stateless; callers cache the result per job type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractValidator;

impl ContractValidator {
    pub fn validate(contract: &JobContract) -> Result<ValidatedContract> {
        let job_type = contract.job_type.as_str();

        let mut seen = HashSet::new();
        for op in &contract.operations {
            if op.name == RESERVED_PERFORM {
                return Err(ResumableError::malformed_operation(
                    job_type,
                    RESERVED_PERFORM,
                    "is reserved by the engine and cannot be overridden",
                ));
            }
            if !seen.insert(op.name.as_str()) {
                return Err(ResumableError::malformed_operation(
                    job_type,
                    &op.name,
                    "is declared more than once",
                ));
            }
        }

        let build = contract
            .get(BUILD_ENUMERATOR)
            .ok_or_else(|| ResumableError::missing_operation(job_type, BUILD_ENUMERATOR))?;
        let each = contract
            .get(EACH_ITERATION)
            .ok_or_else(|| ResumableError::missing_operation(job_type, EACH_ITERATION))?;

        let cursor_binding = Self::cursor_binding(job_type, build)?;

        if !each.parameters.iter().any(Parameter::takes_position) {
            return Err(ResumableError::malformed_operation(
                job_type,
                EACH_ITERATION,
                "must accept the item as a positional parameter",
            ));
        }

        Ok(ValidatedContract {
            contract: contract.clone(),
            cursor_binding,
        })
    }

    fn cursor_binding(job_type: &str, build: &OperationSignature) -> Result<CursorBinding> {
        if let Some(cursor) = build.parameter(CURSOR_PARAMETER) {
            match cursor.kind {
                ParameterKind::Named { required } => return Ok(CursorBinding::Named { required }),
                ParameterKind::Positional | ParameterKind::OptionalPositional => {
                    return Err(ResumableError::malformed_operation(
                        job_type,
                        BUILD_ENUMERATOR,
                        "declares `cursor` positionally; it must accept `cursor` by name",
                    ));
                }
                ParameterKind::Variadic | ParameterKind::NamedVariadic => {}
            }
        }

        if build
            .parameters
            .iter()
            .any(|p| p.kind == ParameterKind::NamedVariadic)
        {
            return Ok(CursorBinding::NamedVariadic);
        }

        if let [only] = build.parameters.as_slice() {
            if only.kind == ParameterKind::Variadic {
                return Ok(CursorBinding::FullyVariadic);
            }
        }

        Err(ResumableError::malformed_operation(
            job_type,
            BUILD_ENUMERATOR,
            "must accept a `cursor` parameter by name",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn with_build(params: Vec<Parameter>) -> JobContract {
        JobContract::new("ExampleJob")
            .operation(OperationSignature::new(BUILD_ENUMERATOR, params))
            .operation(OperationSignature::new(
                EACH_ITERATION,
                vec![Parameter::positional("item")],
            ))
    }

    #[test]
    fn test_standard_contract_is_valid() {
        let validated = ContractValidator::validate(&JobContract::standard("ExampleJob")).unwrap();
        assert_eq!(validated.cursor_binding, CursorBinding::Named { required: true });
        assert_eq!(validated.job_type(), "ExampleJob");
    }

    #[test]
    fn test_accepted_cursor_bindings() {
        let cases = [
            (
                vec![Parameter::positional("params"), Parameter::named_optional("cursor")],
                CursorBinding::Named { required: false },
            ),
            (
                vec![Parameter::positional("params"), Parameter::named_variadic("options")],
                CursorBinding::NamedVariadic,
            ),
            (vec![Parameter::variadic("args")], CursorBinding::FullyVariadic),
        ];

        for (params, expected) in cases {
            let validated = ContractValidator::validate(&with_build(params)).unwrap();
            assert_eq!(validated.cursor_binding, expected);
        }
    }

    #[test]
    fn test_positional_cursor_rejected() {
        let err = ContractValidator::validate(&with_build(vec![
            Parameter::positional("params"),
            Parameter::positional("cursor"),
        ]))
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::MalformedOperation);
        assert!(err.is_argument_error());
        assert!(err.user_message().contains("ExampleJob"));
        assert!(err.user_message().contains("build_enumerator"));
    }

    #[test]
    fn test_missing_cursor_rejected() {
        let err = ContractValidator::validate(&with_build(vec![
            Parameter::positional("params"),
            Parameter::variadic("rest"),
        ]))
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedOperation);
    }

    #[test]
    fn test_missing_operations() {
        let err = ContractValidator::validate(&JobContract::new("Empty")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOperation);
        assert!(err.user_message().contains("build_enumerator"));

        let only_build = JobContract::new("Half").operation(OperationSignature::new(
            BUILD_ENUMERATOR,
            vec![Parameter::named("cursor")],
        ));
        let err = ContractValidator::validate(&only_build).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOperation);
        assert!(err.user_message().contains("each_iteration"));
    }

    #[test]
    fn test_each_iteration_needs_item() {
        let contract = JobContract::new("NoItem")
            .operation(OperationSignature::new(
                BUILD_ENUMERATOR,
                vec![Parameter::named("cursor")],
            ))
            .operation(OperationSignature::new(
                EACH_ITERATION,
                vec![Parameter::named("params")],
            ));

        let err = ContractValidator::validate(&contract).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedOperation);
        assert!(err.user_message().contains("each_iteration"));
    }

    #[test]
    fn test_perform_is_reserved() {
        let contract = JobContract::standard("Overrider")
            .operation(OperationSignature::new(RESERVED_PERFORM, vec![]));

        let err = ContractValidator::validate(&contract).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedOperation);
        assert!(err.user_message().contains("perform"));
    }

    #[test]
    fn test_type_hints_do_not_change_outcome() {
        let typed = with_build(vec![
            Parameter::positional("params").typed("Hash"),
            Parameter::named("cursor").typed("Integer"),
        ]);
        let untyped = with_build(vec![Parameter::positional("params"), Parameter::named("cursor")]);

        assert_eq!(
            ContractValidator::validate(&typed).unwrap().cursor_binding,
            ContractValidator::validate(&untyped).unwrap().cursor_binding
        );

        let typed_bad = with_build(vec![Parameter::positional("cursor").typed("Integer")]);
        assert!(ContractValidator::validate(&typed_bad).is_err());
    }
}
