//! Reference target validation
//!
//! Checks the resource type a `Reference` points to against the field's
//! `typeProfiles`. Local references (`#id`) are resolved against the
//! resource's contained resources when the plan asks for it. Absolute and
//! relative literal references are checked by type only; nothing is fetched.

use std::collections::HashMap;

use crate::plan::ReferencesPlan;
use crate::validator::{IssueCode, ValidationIssue};
use strata_models::{FieldSpec, ResourceInstance, TypeRef, Value};

use super::string_field;

/// Profile entry that admits any resource type
const ANY_RESOURCE: &str = "Resource";

pub fn validate_references(
    resource: &ResourceInstance,
    plan: &ReferencesPlan,
    issues: &mut Vec<ValidationIssue>,
) {
    let contained = contained_types(resource);
    let checker = ReferenceChecker {
        root: resource,
        contained: &contained,
        plan,
    };

    super::walk(resource, resource.resource_type(), &mut |node, path| {
        for (field, value) in node.iter() {
            let Some(profiles) = reference_profiles(field) else {
                continue;
            };
            for (index, item) in value.values().iter().enumerate() {
                let Some(reference) = item.as_complex() else {
                    continue;
                };
                let item_path = super::element_path(path, field, index);
                checker.check(field, profiles, reference, &item_path, issues);
            }
        }
    });
}

fn reference_profiles(field: &FieldSpec) -> Option<&[String]> {
    match field.single_type()? {
        TypeRef::Complex(name) if name == "Reference" => field.type_profiles.as_deref(),
        _ => None,
    }
}

/// `id` to resource type of every contained resource
fn contained_types(resource: &ResourceInstance) -> HashMap<&str, &str> {
    let Some(contained) = resource.get("contained").ok().flatten() else {
        return HashMap::new();
    };
    contained
        .as_many()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_complex)
        .filter_map(|r| r.id().map(|id| (id, r.resource_type())))
        .collect()
}

struct ReferenceChecker<'a> {
    root: &'a ResourceInstance,
    contained: &'a HashMap<&'a str, &'a str>,
    plan: &'a ReferencesPlan,
}

impl ReferenceChecker<'_> {
    fn check(
        &self,
        field: &FieldSpec,
        profiles: &[String],
        reference: &ResourceInstance,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let declared = string_field(reference, "type").map(last_segment);
        if let Some(declared) = declared {
            if !allowed(profiles, declared) {
                issues.push(wrong_target(field, path, declared, profiles));
                return;
            }
        }

        let Some(literal) = string_field(reference, "reference") else {
            return;
        };

        let target = if let Some(local) = literal.strip_prefix('#') {
            if local.is_empty() {
                Some(self.root.resource_type())
            } else if !self.plan.resolve_contained {
                None
            } else if let Some(found) = self.contained.get(local) {
                Some(*found)
            } else {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::NotFound,
                        format!("Contained resource '{local}' referenced at {path} was not found"),
                    )
                    .with_location(field.path.clone())
                    .at(&format!("{path}.reference")),
                );
                return;
            }
        } else {
            literal_type(literal)
        };

        let Some(target) = target else {
            return;
        };
        match declared {
            Some(declared) if declared != target => issues.push(
                ValidationIssue::error(
                    IssueCode::Invalid,
                    format!("Reference at {path} points to {target} but declares type {declared}"),
                )
                .with_location(field.path.clone())
                .at(path),
            ),
            _ if !allowed(profiles, target) => {
                issues.push(wrong_target(field, path, target, profiles))
            }
            _ => {}
        }
    }
}

fn wrong_target(field: &FieldSpec, path: &str, target: &str, profiles: &[String]) -> ValidationIssue {
    ValidationIssue::error(
        IssueCode::Invalid,
        format!(
            "Reference at {path} points to {target}, expected one of: {}",
            profiles.join(", ")
        ),
    )
    .with_location(field.path.clone())
    .at(path)
}

fn allowed(profiles: &[String], target: &str) -> bool {
    profiles.iter().any(|p| p == ANY_RESOURCE || p == target)
}

fn last_segment(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Resource type of a relative (`Type/id`), versioned
/// (`Type/id/_history/v`) or absolute (`base/Type/id`) literal reference
fn literal_type(reference: &str) -> Option<&str> {
    let segments: Vec<&str> = reference.split('/').collect();
    let type_index = match segments.iter().rposition(|s| *s == "_history") {
        Some(history) => history.checked_sub(2)?,
        None => segments.len().checked_sub(2)?,
    };
    let candidate = segments[type_index];
    let mut chars = candidate.chars();
    let looks_like_type = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric());
    looks_like_type.then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_models::{ParseOptions, SchemaRegistry};

    fn parse(json: serde_json::Value) -> ResourceInstance {
        ResourceInstance::from_json_value_with(SchemaRegistry::r4(), &json, &ParseOptions::lenient())
            .unwrap()
    }

    fn run(resource: &ResourceInstance, resolve_contained: bool) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        validate_references(resource, &ReferencesPlan { resolve_contained }, &mut issues);
        issues
    }

    fn organization(endpoints: &[&str]) -> ResourceInstance {
        let refs: Vec<_> = endpoints
            .iter()
            .map(|r| serde_json::json!({ "reference": r }))
            .collect();
        parse(serde_json::json!({
            "resourceType": "Organization",
            "contained": [{
                "resourceType": "Endpoint",
                "id": "ep1",
                "status": "active",
                "connectionType": { "code": "hl7-fhir-rest" },
                "payloadType": [{ "text": "any" }],
                "address": "https://example.org/fhir"
            }],
            "endpoint": refs
        }))
    }

    #[test]
    fn literal_type_extraction() {
        assert_eq!(literal_type("Patient/123"), Some("Patient"));
        assert_eq!(literal_type("Patient/123/_history/2"), Some("Patient"));
        assert_eq!(
            literal_type("https://example.org/fhir/Endpoint/9"),
            Some("Endpoint")
        );
        assert_eq!(literal_type("urn:uuid:a5afddf4-e880-459b-876e-e4591b0acc11"), None);
        assert_eq!(literal_type("patients/1"), None);
    }

    #[test]
    fn contained_reference_resolves() {
        assert!(run(&organization(&["#ep1"]), true).is_empty());
    }

    #[test]
    fn missing_contained_reference() {
        let org = organization(&["#ep1", "#missing"]);
        let issues = run(&org, true);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].code, IssueCode::NotFound);
        assert_eq!(
            issues[0].expression,
            Some(vec!["Organization.endpoint[1].reference".to_string()])
        );

        // Type-only checking leaves local references alone
        assert!(run(&org, false).is_empty());
    }

    #[test]
    fn wrong_target_type() {
        let issues = run(
            &organization(&["Patient/1", "https://example.org/fhir/Endpoint/2"]),
            true,
        );
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].code, IssueCode::Invalid);
        assert_eq!(issues[0].location.as_deref(), Some("Organization.endpoint"));
        assert!(issues[0].diagnostics.contains("points to Patient"));
    }

    #[test]
    fn declared_type_is_checked() {
        let statement = parse(serde_json::json!({
            "resourceType": "DeviceUseStatement",
            "status": "active",
            "subject": { "reference": "Group/1", "type": "Patient" },
            "device": { "type": "Device", "display": "pump" }
        }));
        let issues = run(&statement, true);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(
            issues[0].expression,
            Some(vec!["DeviceUseStatement.subject".to_string()])
        );
        assert!(issues[0].diagnostics.contains("declares type Patient"));
    }

    #[test]
    fn any_resource_profile_accepts_everything() {
        let basic = parse(serde_json::json!({
            "resourceType": "Basic",
            "code": { "text": "thing" },
            "subject": { "reference": "Anything/1" },
            "author": { "reference": "Device/1" }
        }));
        let issues = run(&basic, true);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].expression, Some(vec!["Basic.author".to_string()]));
    }
}
