//! Terminology binding validation against a field's fixed code list
//!
//! Only fields that carry `validCodes` are checked. `required` bindings are
//! errors, `extensible` bindings are reported per [`ExtensibleHandling`],
//! `preferred` and `example` bindings are never enforced.

use crate::config::ExtensibleHandling;
use crate::plan::BindingsPlan;
use crate::validator::{IssueCode, IssueSeverity, ValidationIssue};
use strata_models::{BindingStrength, FieldSpec, ResourceInstance, Value};

use super::string_field;

pub fn validate_bindings(
    resource: &ResourceInstance,
    plan: &BindingsPlan,
    issues: &mut Vec<ValidationIssue>,
) {
    super::walk(resource, resource.resource_type(), &mut |node, path| {
        for (field, value) in node.iter() {
            let Some(severity) = severity_for(field, plan) else {
                continue;
            };
            for (index, item) in value.values().iter().enumerate() {
                let item_path = super::element_path(path, field, index);
                if let Some(diagnostics) = check_value(field, item, &item_path) {
                    issues.push(
                        ValidationIssue::new(severity, IssueCode::CodeInvalid, diagnostics)
                            .with_location(field.path.clone())
                            .at(&item_path),
                    );
                }
            }
        }
    });
}

fn severity_for(field: &FieldSpec, plan: &BindingsPlan) -> Option<IssueSeverity> {
    field.valid_codes.as_ref()?;
    match field.binding.as_ref()?.strength {
        BindingStrength::Required => Some(IssueSeverity::Error),
        BindingStrength::Extensible => match plan.extensible_handling {
            ExtensibleHandling::Ignore => None,
            ExtensibleHandling::Warning => Some(IssueSeverity::Warning),
            ExtensibleHandling::Information => Some(IssueSeverity::Information),
        },
        BindingStrength::Preferred | BindingStrength::Example => None,
    }
}

/// Diagnostics when `value` holds no allowed code
fn check_value(field: &FieldSpec, value: &Value, path: &str) -> Option<String> {
    let rejected: Vec<String> = match value {
        Value::Primitive(element) => {
            let code = element.value.as_ref()?.as_str()?;
            if field.allows_code(None, code) {
                return None;
            }
            vec![format!("'{code}'")]
        }
        Value::Complex(instance) if instance.descriptor().is_a("CodeableConcept") => {
            let codings = instance.get("coding").ok().flatten()?.as_many()?;
            let mut rejected = Vec::new();
            for coding in codings.iter().filter_map(Value::as_complex) {
                match check_coding(field, coding) {
                    Ok(()) => return None,
                    Err(Some(code)) => rejected.push(code),
                    Err(None) => {}
                }
            }
            if rejected.is_empty() {
                return None;
            }
            rejected
        }
        // Coding, Quantity and any other type with `system` + `code`
        Value::Complex(instance) => match check_coding(field, instance) {
            Ok(()) | Err(None) => return None,
            Err(Some(code)) => vec![code],
        },
    };

    let value_set = field
        .binding
        .as_ref()
        .map(|b| format!(" ({})", b.value_set))
        .unwrap_or_default();
    let strength = field
        .binding
        .as_ref()
        .map_or(BindingStrength::Required, |b| b.strength);
    Some(format!(
        "None of the codes provided ({}) at {path} are in the {strength} value set{value_set}",
        rejected.join(", ")
    ))
}

/// `Err(Some(code))` when a coding carries a code that is not allowed,
/// `Err(None)` when it carries no code at all
fn check_coding(field: &FieldSpec, coding: &ResourceInstance) -> Result<(), Option<String>> {
    let code = string_field(coding, "code").ok_or(None)?;
    let system = string_field(coding, "system");
    if field.allows_code(system, code) {
        Ok(())
    } else {
        Err(Some(match system {
            Some(system) => format!("{system}#{code}"),
            None => format!("'{code}'"),
        }))
    }
}
