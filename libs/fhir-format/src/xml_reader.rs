//! Schema-aware FHIR XML reader
//!
//! XML alone cannot tell a repeated element from a single one, or a number
//! from a string. The reader resolves every element through the descriptor of
//! its parent, builds the equivalent FHIR JSON object and hands it to
//! `from_serializable`, which performs the remaining structural checks.

use crate::error::{FormatError, Result};
use crate::{FHIR_NS, XHTML_NS};
use roxmltree::{Document, Node};
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use strata_models::{
    ParseError, ParseOptions, Primitive, PrimitiveType, ResourceDescriptor, ResourceInstance,
    SchemaRegistry, TypeRef,
};

/// Decode a FHIR XML resource, strictly
pub fn from_xml(registry: &SchemaRegistry, input: &str) -> Result<ResourceInstance> {
    from_xml_with(registry, input, &ParseOptions::strict())
}

pub fn from_xml_with(
    registry: &SchemaRegistry,
    input: &str,
    options: &ParseOptions,
) -> Result<ResourceInstance> {
    let doc = Document::parse(input)?;
    let root = doc.root_element();
    check_namespace(&root)?;

    let resource_type = root.tag_name().name();
    let descriptor = registry
        .resource(resource_type)
        .ok_or_else(|| ParseError::UnknownResourceType(resource_type.to_string()))?;

    let reader = XmlReader { source: input, registry };
    let data = reader.read_element(&root, descriptor, resource_type)?;
    tracing::debug!(resource_type, "Decoded XML resource");
    Ok(ResourceInstance::from_serializable_with(
        registry, descriptor, &data, options,
    )?)
}

fn check_namespace(node: &Node) -> Result<()> {
    match node.tag_name().namespace() {
        Some(FHIR_NS) => Ok(()),
        other => Err(FormatError::Namespace {
            element: node.tag_name().name().to_string(),
            found: other.unwrap_or("none").to_string(),
        }),
    }
}

/// Values collected for one JSON property before arrays are assembled
struct Slot {
    is_array: bool,
    values: Vec<Json>,
    metas: Vec<Option<Json>>,
}

struct XmlReader<'a> {
    source: &'a str,
    registry: &'a SchemaRegistry,
}

impl XmlReader<'_> {
    fn read_element(
        &self,
        node: &Node,
        descriptor: &Arc<ResourceDescriptor>,
        path: &str,
    ) -> Result<Map<String, Json>> {
        let mut slots: Vec<(String, Slot)> = Vec::new();

        for attr in node.attributes() {
            let value = match descriptor.field(attr.name()).and_then(|f| f.single_type()) {
                Some(TypeRef::Primitive(primitive)) => {
                    lexical(*primitive, attr.value(), &format!("{path}.{}", attr.name()))?
                }
                _ => Json::String(attr.value().to_string()),
            };
            push_slot(&mut slots, attr.name(), false, value, None);
        }

        let mut counts: Vec<(String, usize)> = Vec::new();
        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            let index = bump(&mut counts, name);

            let Some((field, alternative)) = descriptor.resolve(name) else {
                // Left for from_serializable to report as an unknown property
                push_slot(&mut slots, name, false, Json::Null, None);
                continue;
            };
            let Some(ty) = alternative.or_else(|| field.single_type()) else {
                push_slot(&mut slots, name, false, Json::Null, None);
                continue;
            };
            let child_path = if field.is_array() {
                format!("{path}.{name}[{index}]")
            } else {
                format!("{path}.{name}")
            };

            let (value, meta) = self.read_value(&child, ty, &child_path)?;
            push_slot(&mut slots, name, field.is_array(), value, meta);
        }

        let mut map = Map::new();
        if descriptor.is_resource() {
            map.insert(
                "resourceType".to_string(),
                Json::String(descriptor.name().to_string()),
            );
        }
        for (key, slot) in slots {
            finish_slot(&mut map, key, slot, path)?;
        }
        Ok(map)
    }

    fn read_value(&self, node: &Node, ty: &TypeRef, path: &str) -> Result<(Json, Option<Json>)> {
        match ty {
            TypeRef::Primitive(PrimitiveType::Xhtml) => {
                if node.tag_name().namespace() != Some(XHTML_NS) {
                    return Err(FormatError::Namespace {
                        element: node.tag_name().name().to_string(),
                        found: node.tag_name().namespace().unwrap_or("none").to_string(),
                    });
                }
                Ok((Json::String(self.source[node.range()].to_string()), None))
            }
            TypeRef::Primitive(primitive) => {
                check_namespace(node)?;
                self.read_primitive(node, *primitive, path)
            }
            TypeRef::Complex(name) => {
                check_namespace(node)?;
                let descriptor = self.registry.require(name)?;
                Ok((Json::Object(self.read_element(node, descriptor, path)?), None))
            }
            TypeRef::Resource => {
                check_namespace(node)?;
                let mut children = node.children().filter(Node::is_element);
                let (Some(inner), None) = (children.next(), children.next()) else {
                    return Err(FormatError::ContainedShape(path.to_string()));
                };
                check_namespace(&inner)?;
                let resource_type = inner.tag_name().name();
                let descriptor = self
                    .registry
                    .resource(resource_type)
                    .ok_or_else(|| ParseError::UnknownResourceType(resource_type.to_string()))?;
                Ok((Json::Object(self.read_element(&inner, descriptor, path)?), None))
            }
        }
    }

    fn read_primitive(
        &self,
        node: &Node,
        primitive: PrimitiveType,
        path: &str,
    ) -> Result<(Json, Option<Json>)> {
        let mut meta = Map::new();
        let mut value = Json::Null;
        for attr in node.attributes() {
            match attr.name() {
                "value" => value = lexical(primitive, attr.value(), path)?,
                "id" => {
                    meta.insert("id".to_string(), Json::String(attr.value().to_string()));
                }
                other => {
                    return Err(ParseError::UnknownProperty {
                        path: path.to_string(),
                        property: format!("@{other}"),
                    }
                    .into())
                }
            }
        }

        let extension = self.registry.require("Extension")?;
        let mut extensions = Vec::new();
        for (i, child) in node.children().filter(Node::is_element).enumerate() {
            check_namespace(&child)?;
            if child.tag_name().name() != "extension" {
                return Err(ParseError::UnknownProperty {
                    path: path.to_string(),
                    property: child.tag_name().name().to_string(),
                }
                .into());
            }
            let ext_path = format!("{path}.extension[{i}]");
            extensions.push(Json::Object(self.read_element(&child, extension, &ext_path)?));
        }
        if !extensions.is_empty() {
            meta.insert("extension".to_string(), Json::Array(extensions));
        }

        let meta = (!meta.is_empty()).then_some(Json::Object(meta));
        Ok((value, meta))
    }
}

fn lexical(primitive: PrimitiveType, text: &str, path: &str) -> Result<Json> {
    Primitive::parse_lexical(primitive, text)
        .map(|p| p.to_json())
        .ok_or_else(|| {
            ParseError::InvalidPrimitive {
                path: path.to_string(),
                type_code: primitive.code().to_string(),
                value: text.to_string(),
            }
            .into()
        })
}

fn bump(counts: &mut Vec<(String, usize)>, name: &str) -> usize {
    match counts.iter_mut().find(|(n, _)| n == name) {
        Some((_, count)) => {
            *count += 1;
            *count - 1
        }
        None => {
            counts.push((name.to_string(), 1));
            0
        }
    }
}

fn push_slot(
    slots: &mut Vec<(String, Slot)>,
    key: &str,
    is_array: bool,
    value: Json,
    meta: Option<Json>,
) {
    if let Some((_, slot)) = slots.iter_mut().find(|(k, _)| k == key) {
        slot.values.push(value);
        slot.metas.push(meta);
        return;
    }
    slots.push((
        key.to_string(),
        Slot {
            is_array,
            values: vec![value],
            metas: vec![meta],
        },
    ));
}

fn finish_slot(map: &mut Map<String, Json>, key: String, slot: Slot, path: &str) -> Result<()> {
    let has_meta = slot.metas.iter().any(Option::is_some);
    if slot.is_array {
        let has_value = slot.values.iter().any(|v| !v.is_null());
        if has_meta {
            let metas = slot
                .metas
                .into_iter()
                .map(|m| m.unwrap_or(Json::Null))
                .collect();
            map.insert(format!("_{key}"), Json::Array(metas));
        }
        if has_value || !has_meta {
            map.insert(key, Json::Array(slot.values));
        }
        return Ok(());
    }

    if slot.values.len() > 1 {
        return Err(ParseError::UnexpectedShape {
            path: format!("{path}.{key}"),
            expected: "a single element".to_string(),
            found: format!("{} elements", slot.values.len()),
        }
        .into());
    }
    let (Some(value), Some(meta)) = (slot.values.into_iter().next(), slot.metas.into_iter().next())
    else {
        return Ok(());
    };
    if let Some(meta) = meta {
        map.insert(format!("_{key}"), meta);
    }
    if !value.is_null() || !has_meta {
        map.insert(key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_repeated_and_single_elements() {
        let xml = r#"
        <Organization xmlns="http://hl7.org/fhir">
            <id value="o1"/>
            <active value="true"/>
            <name value="ACME"/>
            <alias value="A"/>
            <alias id="a2"/>
        </Organization>"#;
        let org = from_xml(SchemaRegistry::r4(), xml).unwrap();
        let json = org.to_json_value();
        assert_eq!(json["active"], true);
        assert_eq!(json["alias"], serde_json::json!(["A", null]));
        assert_eq!(json["_alias"], serde_json::json!([null, { "id": "a2" }]));
    }

    #[test]
    fn typed_primitives_follow_the_descriptor() {
        let xml = r#"
        <OperationOutcome xmlns="http://hl7.org/fhir">
            <issue>
                <severity value="error"/>
                <code value="invalid"/>
                <diagnostics value="42"/>
            </issue>
        </OperationOutcome>"#;
        let outcome = from_xml(SchemaRegistry::r4(), xml).unwrap();
        // diagnostics is a string even though it looks like a number
        assert_eq!(outcome.to_json_value()["issue"][0]["diagnostics"], "42");
    }

    #[test]
    fn rejects_bad_input() {
        let registry = SchemaRegistry::r4();

        let err = from_xml(registry, r#"<Basic><id value="x"/></Basic>"#).unwrap_err();
        assert!(matches!(err, FormatError::Namespace { .. }));

        let err = from_xml(registry, r#"<Patient xmlns="http://hl7.org/fhir"/>"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown resourceType 'Patient'");

        let err = from_xml(
            registry,
            r#"<Organization xmlns="http://hl7.org/fhir"><active value="yes"/></Organization>"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid boolean value at Organization.active: yes"
        );

        let err = from_xml(
            registry,
            r#"<Organization xmlns="http://hl7.org/fhir"><name value="a"/><name value="b"/></Organization>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected a single element"), "{err}");

        let err = from_xml(
            registry,
            r#"<Organization xmlns="http://hl7.org/fhir"><colour value="red"/></Organization>"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown property 'colour' at Organization");
    }
}
