//! Validation steps
//!
//! Every step walks the instance tree with [`walk`] and inspects the fields
//! of each node against their [`FieldSpec`]s.

pub mod bindings;
pub mod cardinality;
pub mod primitives;
pub mod references;

use strata_models::{FieldSpec, ResourceInstance, Value};

/// Visit `instance` and every complex value below it, including contained
/// resources and extensions on primitives, with its FHIRPath-style location.
pub(crate) fn walk<'a, F>(instance: &'a ResourceInstance, path: &str, visit: &mut F)
where
    F: FnMut(&'a ResourceInstance, &str),
{
    visit(instance, path);
    for (field, value) in instance.iter() {
        for (index, item) in value.values().iter().enumerate() {
            let item_path = element_path(path, field, index);
            match item {
                Value::Complex(child) => walk(child, &item_path, visit),
                Value::Primitive(element) => {
                    for (i, extension) in element.extension.iter().enumerate() {
                        walk(extension, &format!("{item_path}.extension[{i}]"), visit);
                    }
                }
            }
        }
    }
}

/// Location of the `index`th value of `field` below `parent`
pub(crate) fn element_path(parent: &str, field: &FieldSpec, index: usize) -> String {
    if field.is_array() {
        format!("{parent}.{}[{index}]", field.name)
    } else {
        format!("{parent}.{}", field.name)
    }
}

/// String value of a single-valued primitive field
pub(crate) fn string_field<'a>(instance: &'a ResourceInstance, name: &str) -> Option<&'a str> {
    instance
        .get(name)
        .ok()
        .flatten()
        .and_then(|r| r.as_single())
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_models::SchemaRegistry;

    #[test]
    fn walk_reports_nested_paths() {
        let json = serde_json::json!({
            "resourceType": "Organization",
            "contained": [{ "resourceType": "Basic", "code": { "text": "x" } }],
            "name": "ACME",
            "_name": { "extension": [{ "url": "http://example.org/e", "valueString": "y" }] },
            "contact": [{ "name": { "family": "Doe" } }]
        });
        let org = ResourceInstance::from_json_value(SchemaRegistry::r4(), &json).unwrap();

        let mut paths = Vec::new();
        walk(&org, "Organization", &mut |node, path| {
            paths.push(format!("{path}:{}", node.resource_type()))
        });
        assert_eq!(
            paths,
            vec![
                "Organization:Organization",
                "Organization.contained[0]:Basic",
                "Organization.contained[0].code:CodeableConcept",
                "Organization.name.extension[0]:Extension",
                "Organization.contact[0]:Organization.contact",
                "Organization.contact[0].name:HumanName",
            ]
        );
    }
}
