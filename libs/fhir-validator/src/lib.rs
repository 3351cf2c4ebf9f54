//! Validation of descriptor-driven FHIR resources
//!
//! A [`ValidatorConfig`] (YAML, presets or builder) compiles into a
//! [`ValidationPlan`]; a [`Validator`] runs the plan's steps over a
//! [`ResourceInstance`] and collects every problem into a
//! [`ValidationOutcome`] instead of stopping at the first one.
//!
//! # Steps
//!
//! - `cardinality`: `min` / bounded `max` of every field, recursively
//! - `primitives`: lexical space of each primitive type
//! - `bindings`: codes against `validCodes` of required and extensible bindings
//! - `references`: reference targets against `typeProfiles`, local
//!   references against contained resources
//!
//! # Example
//!
//! ```rust
//! use strata_models::{ParseOptions, ResourceInstance, SchemaRegistry};
//! use strata_validator::{IssueCode, Validator};
//!
//! let registry = SchemaRegistry::r4();
//! let json = serde_json::json!({
//!     "resourceType": "Endpoint",
//!     "connectionType": { "code": "hl7-fhir-rest" },
//!     "payloadType": [{ "text": "any" }],
//!     "address": "https://example.org/fhir"
//! });
//! let endpoint = ResourceInstance::from_json_value_with(registry, &json, &ParseOptions::lenient())?;
//!
//! let outcome = Validator::default().validate(&endpoint);
//! assert!(!outcome.valid);
//! assert_eq!(outcome.issues[0].code, IssueCode::Required);
//! assert_eq!(outcome.issues[0].expression, Some(vec!["Endpoint.status".to_string()]));
//! # Ok::<(), strata_models::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod plan;
pub mod steps;
pub mod validator;

pub use config::{
    BindingsConfig, CardinalityConfig, ExecConfig, ExtensibleHandling, Preset, PrimitivesConfig,
    ReferenceMode, ReferencesConfig, StepMode, ValidatorConfig, ValidatorConfigBuilder,
};
pub use error::ConfigError;
pub use plan::{BindingsPlan, CardinalityPlan, PrimitivesPlan, ReferencesPlan, Step, ValidationPlan};
pub use validator::{IssueCode, IssueSeverity, ValidationIssue, ValidationOutcome, Validator};

use strata_models::{ResourceDescriptor, ResourceInstance};

/// Validate `instance` against `descriptor` with the default configuration.
///
/// Returns every issue found; an empty list means the instance is valid.
/// An instance built from a different descriptor yields a single
/// `structure` error.
pub fn validate(instance: &ResourceInstance, descriptor: &ResourceDescriptor) -> Vec<ValidationIssue> {
    if instance.descriptor().name() != descriptor.name() {
        return vec![ValidationIssue::error(
            IssueCode::Structure,
            format!(
                "Instance of {} cannot be validated as {}",
                instance.resource_type(),
                descriptor.name()
            ),
        )
        .at(instance.resource_type())];
    }
    Validator::default().validate(instance).issues
}
