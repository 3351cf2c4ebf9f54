//! Descriptor file model
//!
//! Raw, unresolved form of the descriptor files under `resources/r4`. The
//! registry turns these into [`ResourceDescriptor`](crate::ResourceDescriptor)s.

use crate::descriptor::{Binding, DescriptorKind, Max, PropertyRepresentation, ValidCodes};
use serde::{Deserialize, Serialize};

/// One descriptor as written in a descriptor file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorDef {
    pub name: String,

    pub kind: DescriptorKind,

    #[serde(rename = "abstract", default, skip_serializing_if = "is_false")]
    pub is_abstract: bool,

    /// Name of the inherited descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub elements: Vec<ElementDef>,
}

/// One field as written in a descriptor file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDef {
    /// Field name; choice fields end in `[x]`
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(rename = "type")]
    pub types: TypeCodes,

    #[serde(default)]
    pub min: u32,

    #[serde(default)]
    pub max: Max,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_codes: Option<ValidCodes>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_profiles: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub representation: Option<PropertyRepresentation>,

    /// Inline backbone structure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ElementDef>,
}

impl ElementDef {
    pub fn is_choice(&self) -> bool {
        self.name.ends_with("[x]")
    }

    pub fn logical_name(&self) -> &str {
        self.name.strip_suffix("[x]").unwrap_or(&self.name)
    }
}

/// A single type code, or the list of alternatives of a choice field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TypeCodes {
    One(String),
    Many(Vec<String>),
}

impl TypeCodes {
    pub fn codes(&self) -> Vec<&str> {
        match self {
            TypeCodes::One(code) => vec![code.as_str()],
            TypeCodes::Many(codes) => codes.iter().map(String::as_str).collect(),
        }
    }
}

/// A descriptor file holds one descriptor or an array of them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DescriptorFile {
    One(Box<DescriptorDef>),
    Many(Vec<DescriptorDef>),
}

impl DescriptorFile {
    pub fn into_defs(self) -> Vec<DescriptorDef> {
        match self {
            DescriptorFile::One(def) => vec![*def],
            DescriptorFile::Many(defs) => defs,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_descriptor() {
        let yaml = r#"
name: Widget
kind: resource
base: DomainResource
elements:
  - name: status
    type: code
    min: 1
    binding:
      strength: required
      valueSet: http://example.org/ValueSet/widget-status
    validCodes:
      http://example.org/widget-status: [active, retired]
  - name: size[x]
    type: [integer, Quantity]
  - name: part
    type: BackboneElement
    max: "*"
    elements:
      - name: label
        type: string
"#;
        let file: DescriptorFile = serde_yaml::from_str(yaml).unwrap();
        let defs = file.into_defs();
        assert_eq!(defs.len(), 1);

        let widget = &defs[0];
        assert_eq!(widget.kind, DescriptorKind::Resource);
        assert!(!widget.is_abstract);
        assert_eq!(widget.elements[0].min, 1);
        assert_eq!(widget.elements[0].max, Max::Bounded(1));
        assert!(widget.elements[1].is_choice());
        assert_eq!(widget.elements[1].logical_name(), "size");
        assert_eq!(widget.elements[1].types.codes(), vec!["integer", "Quantity"]);
        assert_eq!(widget.elements[2].max, Max::Unbounded);
        assert_eq!(widget.elements[2].elements.len(), 1);
    }

    #[test]
    fn rejects_bad_max() {
        let json = r#"{ "name": "X", "kind": "resource",
            "elements": [{ "name": "a", "type": "string", "max": "lots" }] }"#;
        assert!(serde_json::from_str::<DescriptorDef>(json).is_err());
    }
}
