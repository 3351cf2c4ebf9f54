//! Cardinality validation
//!
//! Checks `min` and bounded `max` of every field on every node. A choice
//! field counts as one field whichever alternative is set.

use crate::plan::CardinalityPlan;
use crate::validator::{IssueCode, ValidationIssue};
use strata_models::{Max, ResourceInstance};

pub fn validate_cardinality(
    resource: &ResourceInstance,
    _plan: &CardinalityPlan,
    issues: &mut Vec<ValidationIssue>,
) {
    super::walk(resource, resource.resource_type(), &mut |node, path| {
        check_node(node, path, issues)
    });
}

fn check_node(node: &ResourceInstance, path: &str, issues: &mut Vec<ValidationIssue>) {
    for field in node.descriptor().fields() {
        let count = node
            .get(&field.name)
            .ok()
            .flatten()
            .map_or(0, |value| match value.as_many() {
                Some(values) => values.len(),
                None => 1,
            });
        let field_path = format!("{path}.{}", field.name);
        let cardinality = field.cardinality;

        if count < cardinality.min as usize {
            let diagnostics = if count == 0 {
                format!("Missing required field: {field_path} (minimum cardinality {})", cardinality.min)
            } else {
                format!(
                    "{field_path}: minimum required = {}, but only found {count}",
                    cardinality.min
                )
            };
            issues.push(
                ValidationIssue::error(IssueCode::Required, diagnostics)
                    .with_location(field.path.clone())
                    .at(&field_path),
            );
        }

        if cardinality.exceeds_max(count) {
            let max = match cardinality.max {
                Max::Bounded(m) => m,
                Max::Unbounded => continue,
            };
            issues.push(
                ValidationIssue::error(
                    IssueCode::Structure,
                    format!("{field_path}: maximum allowed = {max}, but found {count}"),
                )
                .with_location(field.path.clone())
                .at(&field_path),
            );
        }
    }
}
