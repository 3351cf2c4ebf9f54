use crate::plan::{Step, ValidationPlan};
use crate::{steps, ConfigError, ValidatorConfig};
use serde_json::Value;
use strata_models::{ResourceInstance, SchemaRegistry};

/// Reusable validator - owns the compiled plan
#[derive(Debug, Clone)]
pub struct Validator {
    plan: ValidationPlan,
}

impl Validator {
    pub fn new(plan: ValidationPlan) -> Self {
        Self { plan }
    }

    pub fn from_config(config: &ValidatorConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.compile()?))
    }

    pub fn validate(&self, resource: &ResourceInstance) -> ValidationOutcome {
        ValidationRun::new(&self.plan, resource).execute()
    }

    pub fn validate_batch(&self, resources: &[ResourceInstance]) -> Vec<ValidationOutcome> {
        resources.iter().map(|r| self.validate(r)).collect()
    }

    pub fn plan(&self) -> &ValidationPlan {
        &self.plan
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationPlan::default())
    }
}

/// Short-lived validation execution
struct ValidationRun<'a> {
    plan: &'a ValidationPlan,
    resource: &'a ResourceInstance,
    issues: Vec<ValidationIssue>,
}

impl<'a> ValidationRun<'a> {
    fn new(plan: &'a ValidationPlan, resource: &'a ResourceInstance) -> Self {
        Self {
            plan,
            resource,
            issues: Vec::new(),
        }
    }

    fn execute(mut self) -> ValidationOutcome {
        for step in &self.plan.steps {
            if self.plan.fail_fast && self.has_errors() {
                break;
            }

            if self.issues.len() >= self.plan.max_issues {
                break;
            }

            let before = self.issues.len();
            self.execute_step(step);
            tracing::trace!(
                step = step.name(),
                issues = self.issues.len() - before,
                "Validation step finished"
            );
        }
        self.issues.truncate(self.plan.max_issues);

        ValidationOutcome {
            resource_type: Some(self.resource.resource_type().to_string()),
            valid: !self.has_errors(),
            issues: self.issues,
        }
    }

    fn execute_step(&mut self, step: &Step) {
        match step {
            Step::Cardinality(plan) => {
                steps::cardinality::validate_cardinality(self.resource, plan, &mut self.issues)
            }
            Step::Primitives(plan) => {
                steps::primitives::validate_primitives(self.resource, plan, &mut self.issues)
            }
            Step::Bindings(plan) => {
                steps::bindings::validate_bindings(self.resource, plan, &mut self.issues)
            }
            Step::References(plan) => {
                steps::references::validate_references(self.resource, plan, &mut self.issues)
            }
        }
    }

    fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }
}

/// Validation result for a single resource
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub resource_type: Option<String>,
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn success(resource_type: Option<String>) -> Self {
        Self {
            resource_type,
            valid: true,
            issues: Vec::new(),
        }
    }

    /// Outcome for input that could not be read at all
    pub fn fatal(resource_type: Option<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type,
            valid: false,
            issues: vec![ValidationIssue::fatal(IssueCode::Structure, diagnostics)],
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.valid
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .count()
    }

    /// Render as an OperationOutcome resource. An outcome without issues
    /// gets a single informational issue, since `issue` is required.
    pub fn to_operation_outcome(&self) -> Value {
        let issues: Vec<Value> = if self.issues.is_empty() {
            vec![ValidationIssue::information(
                IssueCode::Informational,
                "No issues detected during validation",
            )
            .to_json()]
        } else {
            self.issues.iter().map(ValidationIssue::to_json).collect()
        };
        serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": issues
        })
    }

    /// Typed counterpart of [`to_operation_outcome`](Self::to_operation_outcome)
    pub fn to_operation_outcome_instance(
        &self,
        registry: &SchemaRegistry,
    ) -> strata_models::Result<ResourceInstance> {
        ResourceInstance::from_json_value(registry, &self.to_operation_outcome())
    }
}

/// Individual validation issue
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    pub diagnostics: String,
    pub location: Option<String>,
    pub expression: Option<Vec<String>>,
}

impl ValidationIssue {
    pub fn new(severity: IssueSeverity, code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            diagnostics: diagnostics.into(),
            location: None,
            expression: None,
        }
    }

    pub fn fatal(code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Fatal, code, diagnostics)
    }

    pub fn error(code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, diagnostics)
    }

    pub fn warning(code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, code, diagnostics)
    }

    pub fn information(code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Information, code, diagnostics)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_expression(mut self, expression: Vec<String>) -> Self {
        self.expression = Some(expression);
        self
    }

    /// Point the issue at one element path
    pub fn at(self, path: &str) -> Self {
        self.with_expression(vec![path.to_string()])
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, IssueSeverity::Error | IssueSeverity::Fatal)
    }

    pub fn to_json(&self) -> Value {
        let mut issue = serde_json::json!({
            "severity": self.severity.to_string(),
            "code": self.code.to_string(),
            "diagnostics": self.diagnostics,
        });

        if let Some(ref loc) = self.location {
            issue["location"] = serde_json::json!([loc]);
        }

        if let Some(ref expr) = self.expression {
            issue["expression"] = serde_json::json!(expr);
        }

        issue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Information => write!(f, "information"),
        }
    }
}

/// Subset of the FHIR `issue-type` codes the validator reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    Invalid,
    Structure,
    Required,
    Value,
    NotFound,
    CodeInvalid,
    Processing,
    Informational,
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::Structure => "structure",
            Self::Required => "required",
            Self::Value => "value",
            Self::NotFound => "not-found",
            Self::CodeInvalid => "code-invalid",
            Self::Processing => "processing",
            Self::Informational => "informational",
        };
        write!(f, "{}", s)
    }
}
