//! Schema registry
//!
//! The registry owns every resolved [`ResourceDescriptor`] a model works
//! against. It is built once from descriptor files and never mutated
//! afterwards; instances share descriptors through `Arc`.

use crate::builtin;
use crate::definition::{DescriptorDef, DescriptorFile, ElementDef};
use crate::descriptor::{
    Cardinality, DescriptorKind, FieldSpec, FieldType, Max, PrimitiveType, PropertyRepresentation,
    ResourceDescriptor, TypeRef,
};
use crate::error::{Error, Result, SchemaError};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

static R4: Lazy<SchemaRegistry> = Lazy::new(|| {
    RegistryBuilder::new()
        .with_r4_core()
        .and_then(RegistryBuilder::build)
        .expect("failed to load embedded R4 descriptors")
});

/// Datatypes that may carry `validCodes`
const CODED_TYPES: &[&str] = &[
    "code",
    "Coding",
    "CodeableConcept",
    "Quantity",
    "string",
    "uri",
];

/// Immutable set of resolved descriptors, keyed by name
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    descriptors: HashMap<String, Arc<ResourceDescriptor>>,
}

impl SchemaRegistry {
    /// Shared registry of the bundled FHIR R4 descriptors
    pub fn r4() -> &'static SchemaRegistry {
        &R4
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Descriptor by name; backbone structures are keyed by path
    /// (`DeviceMetric.calibration`)
    pub fn get(&self, name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.descriptors.get(name)
    }

    /// Like [`get`](Self::get) but fails with [`SchemaError::UnknownType`]
    pub fn require(&self, name: &str) -> Result<&Arc<ResourceDescriptor>> {
        self.get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()).into())
    }

    /// Concrete resource descriptor by resource type name
    pub fn resource(&self, resource_type: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.get(resource_type).filter(|d| d.is_resource())
    }

    /// Concrete resource type names, sorted
    pub fn resource_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .descriptors
            .values()
            .filter(|d| d.is_resource())
            .map(|d| d.name())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Collects descriptor definitions and resolves them into a [`SchemaRegistry`]
#[derive(Debug, Default, Clone)]
pub struct RegistryBuilder {
    defs: Vec<DescriptorDef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the bundled FHIR R4 descriptors
    pub fn with_r4_core(mut self) -> Result<Self> {
        for (file, contents) in builtin::R4_CORE {
            tracing::trace!(file, "Loading bundled descriptors");
            self = self.add_json(contents)?;
        }
        Ok(self)
    }

    pub fn add(mut self, def: DescriptorDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn add_json(mut self, text: &str) -> Result<Self> {
        // Numbers only resolve to `min`/`max` integers once read into a `Value`
        let value: serde_json::Value = serde_json::from_str(text)?;
        let file: DescriptorFile = serde_json::from_value(value)?;
        self.defs.extend(file.into_defs());
        Ok(self)
    }

    pub fn add_yaml(mut self, text: &str) -> Result<Self> {
        let file: DescriptorFile = serde_yaml::from_str(text)?;
        self.defs.extend(file.into_defs());
        Ok(self)
    }

    /// Add a `.json`, `.yaml` or `.yml` descriptor file
    pub fn add_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        match extension(path) {
            Some("json") => self.add_json(&text),
            Some("yaml") | Some("yml") => self.add_yaml(&text),
            _ => Err(Error::descriptor(
                path.display().to_string(),
                "unsupported descriptor file extension",
            )),
        }
    }

    /// Add every descriptor file below `dir`, in file name order
    pub fn add_dir(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let io_err = |source| Error::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            paths.push(entry.map_err(io_err)?.path());
        }
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self = self.add_dir(&path)?;
            } else if matches!(extension(&path), Some("json" | "yaml" | "yml")) {
                tracing::debug!(path = %path.display(), "Loading descriptor file");
                self = self.add_file(&path)?;
            }
        }
        Ok(self)
    }

    /// Resolve inheritance and inline structures, then check consistency
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut defs: HashMap<String, DescriptorDef> = HashMap::new();
        let mut order = Vec::new();
        for def in self.defs {
            for flat in flatten(def)? {
                if defs.contains_key(&flat.name) {
                    return Err(Error::descriptor(&flat.name, "defined more than once"));
                }
                order.push(flat.name.clone());
                defs.insert(flat.name.clone(), flat);
            }
        }

        let mut resolved = HashMap::new();
        for name in &order {
            let mut visiting = Vec::new();
            resolve(name, &defs, &mut resolved, &mut visiting)?;
        }

        let registry = SchemaRegistry {
            descriptors: resolved,
        };
        for descriptor in registry.descriptors.values() {
            check_descriptor(&registry, descriptor)?;
        }

        tracing::debug!(
            descriptors = registry.len(),
            resources = registry.resource_types().len(),
            "Built schema registry"
        );
        Ok(registry)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Lift inline backbone structures out of `def` into descriptors of their own,
/// named by path. The owning element's type is rewritten to that name.
fn flatten(mut def: DescriptorDef) -> Result<Vec<DescriptorDef>> {
    let mut out = Vec::new();
    for element in &mut def.elements {
        if element.elements.is_empty() {
            continue;
        }
        let base = match element.types.codes().as_slice() {
            [base] => base.to_string(),
            _ => {
                return Err(Error::descriptor(
                    &def.name,
                    format!("inline structure {} must declare exactly one type", element.name),
                ))
            }
        };
        let name = element
            .path
            .clone()
            .unwrap_or_else(|| format!("{}.{}", def.name, element.logical_name()));
        let backbone = DescriptorDef {
            name: name.clone(),
            kind: DescriptorKind::BackboneElement,
            is_abstract: false,
            base: Some(base),
            url: None,
            elements: std::mem::take(&mut element.elements),
        };
        element.types = crate::definition::TypeCodes::One(name);
        out.extend(flatten(backbone)?);
    }
    out.insert(0, def);
    Ok(out)
}

fn resolve(
    name: &str,
    defs: &HashMap<String, DescriptorDef>,
    resolved: &mut HashMap<String, Arc<ResourceDescriptor>>,
    visiting: &mut Vec<String>,
) -> Result<Arc<ResourceDescriptor>> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    if visiting.iter().any(|v| v == name) {
        return Err(Error::descriptor(
            name,
            format!("inheritance cycle: {} -> {name}", visiting.join(" -> ")),
        ));
    }
    let def = defs
        .get(name)
        .ok_or_else(|| Error::descriptor(name, "unknown descriptor"))?;

    visiting.push(name.to_string());
    let mut lineage = vec![def.name.clone()];
    let mut fields = Vec::new();
    if let Some(base_name) = &def.base {
        if !defs.contains_key(base_name) {
            return Err(Error::descriptor(
                name,
                format!("unknown base type {base_name}"),
            ));
        }
        let base = resolve(base_name, defs, resolved, visiting)?;
        lineage.extend(base.lineage().iter().cloned());
        for inherited in base.fields() {
            let mut field = inherited.clone();
            if let Some(rest) = field.path.strip_prefix(base.name()) {
                field.path = format!("{name}{rest}");
            }
            fields.push(field);
        }
    }
    visiting.pop();

    for element in &def.elements {
        let field = field_spec(&def.name, element)?;
        if fields.iter().any(|f: &FieldSpec| f.name == field.name) {
            return Err(Error::descriptor(
                name,
                format!("field {} is declared more than once", field.name),
            ));
        }
        fields.push(field);
    }

    let descriptor = Arc::new(ResourceDescriptor::new(
        def.name.clone(),
        def.kind,
        def.is_abstract,
        def.url.clone(),
        lineage,
        fields,
    ));
    resolved.insert(name.to_string(), descriptor.clone());
    Ok(descriptor)
}

fn field_spec(owner: &str, element: &ElementDef) -> Result<FieldSpec> {
    let codes = element.types.codes();
    if codes.is_empty() {
        return Err(Error::descriptor(
            owner,
            format!("field {} declares no type", element.name),
        ));
    }
    let field_type = if element.is_choice() {
        FieldType::Choice(codes.iter().map(|c| TypeRef::parse(c)).collect())
    } else if let [code] = codes.as_slice() {
        FieldType::Single(TypeRef::parse(code))
    } else {
        return Err(Error::descriptor(
            owner,
            format!(
                "field {} lists several types but is not a choice field",
                element.name
            ),
        ));
    };
    if let Max::Bounded(max) = element.max {
        if max < element.min {
            return Err(Error::descriptor(
                owner,
                format!("field {} has max {max} below min {}", element.name, element.min),
            ));
        }
    }

    Ok(FieldSpec {
        name: element.logical_name().to_string(),
        path: element
            .path
            .clone()
            .unwrap_or_else(|| format!("{owner}.{}", element.name)),
        field_type,
        cardinality: Cardinality::new(element.min, element.max),
        valid_codes: element.valid_codes.clone(),
        binding: element.binding.clone(),
        type_profiles: element.type_profiles.clone(),
        representation: element.representation,
    })
}

fn check_descriptor(registry: &SchemaRegistry, descriptor: &ResourceDescriptor) -> Result<()> {
    let name = descriptor.name();
    let fail = |reason: String| Err(Error::descriptor(name, reason));

    for field in descriptor.fields() {
        let alternatives = field.field_type.alternatives();
        let mut seen = HashSet::new();
        for alt in alternatives {
            if !seen.insert(alt.code()) {
                return fail(format!("field {} lists type {alt} twice", field.name));
            }
            if let TypeRef::Complex(target) = alt {
                match registry.get(target) {
                    None => return fail(format!("field {} has unknown type {target}", field.name)),
                    Some(t) if t.is_abstract() => {
                        return fail(format!(
                            "field {} refers to abstract type {target}",
                            field.name
                        ))
                    }
                    Some(t) if t.kind() == DescriptorKind::Resource => {
                        return fail(format!(
                            "field {} refers to resource {target}; use Resource",
                            field.name
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        if field.is_choice() && field.is_array() {
            return fail(format!("choice field {}[x] must have max 1", field.name));
        }

        if field.type_profiles.is_some()
            && !alternatives
                .iter()
                .any(|t| matches!(t, TypeRef::Complex(n) if n == "Reference"))
        {
            return fail(format!(
                "field {} has typeProfiles but is not a Reference",
                field.name
            ));
        }

        if field.valid_codes.is_some() && !alternatives.iter().any(|t| CODED_TYPES.contains(&t.code()))
        {
            return fail(format!(
                "field {} has validCodes but type {} is not coded",
                field.name, field.field_type
            ));
        }

        match field.representation {
            Some(PropertyRepresentation::XmlAttr) => {
                let single_primitive = field.single_type().and_then(TypeRef::as_primitive).is_some();
                if !single_primitive || field.is_array() {
                    return fail(format!(
                        "field {} must be a single primitive to be an XML attribute",
                        field.name
                    ));
                }
            }
            Some(PropertyRepresentation::Xhtml) => {
                if field.single_type() != Some(&TypeRef::Primitive(PrimitiveType::Xhtml)) {
                    return fail(format!("field {} must have type xhtml", field.name));
                }
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGET: &str = r#"
- name: Widget
  kind: resource
  base: DomainResource
  elements:
    - name: status
      type: code
      min: 1
      binding: { strength: required, valueSet: "http://example.org/ValueSet/widget-status" }
      validCodes:
        "http://example.org/widget-status": [active, retired]
    - name: part
      type: BackboneElement
      max: "*"
      elements:
        - name: label
          type: string
        - name: size[x]
          type: [integer, Quantity]
"#;

    fn with_widget() -> SchemaRegistry {
        RegistryBuilder::new()
            .with_r4_core()
            .unwrap()
            .add_yaml(WIDGET)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn bundled_registry_loads() {
        let registry = SchemaRegistry::r4();
        assert_eq!(
            registry.resource_types(),
            vec![
                "Basic",
                "CatalogEntry",
                "DeviceMetric",
                "DeviceUseStatement",
                "Endpoint",
                "GuidanceResponse",
                "OperationOutcome",
                "Organization",
            ]
        );
        assert!(registry.get("DeviceMetric.calibration").is_some());
        assert!(registry.get("Timing.repeat").is_some());
        assert!(registry.resource("DomainResource").is_none());
        assert!(registry.resource("Coding").is_none());
    }

    #[test]
    fn inherited_fields_come_first() {
        let endpoint = SchemaRegistry::r4().get("Endpoint").unwrap();
        let names: Vec<&str> = endpoint.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            &names[..8],
            &[
                "id",
                "meta",
                "implicitRules",
                "language",
                "text",
                "contained",
                "extension",
                "modifierExtension"
            ]
        );
        assert_eq!(endpoint.field("id").unwrap().path, "Endpoint.id");
        assert_eq!(endpoint.field("status").unwrap().path, "Endpoint.status");
        assert!(endpoint.is_a("DomainResource"));
        assert!(endpoint.is_a("Resource"));
        assert_eq!(endpoint.base(), Some("DomainResource"));
    }

    #[test]
    fn backbones_inherit_element_fields() {
        let registry = with_widget();
        let part = registry.get("Widget.part").unwrap();
        assert_eq!(part.kind(), DescriptorKind::BackboneElement);
        assert!(part.is_a("BackboneElement"));
        assert!(part.is_a("Element"));
        let names: Vec<&str> = part.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "extension", "modifierExtension", "label", "size"]);
        assert_eq!(part.field("size").unwrap().path, "Widget.part.size[x]");

        let widget = registry.resource("Widget").unwrap();
        assert_eq!(
            widget.field("part").unwrap().single_type(),
            Some(&TypeRef::Complex("Widget.part".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_type_reference() {
        let err = RegistryBuilder::new()
            .with_r4_core()
            .unwrap()
            .add_json(r#"{ "name": "X", "kind": "resource", "base": "DomainResource",
                "elements": [{ "name": "thing", "type": "Gadget" }] }"#)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown type Gadget"), "{err}");
    }

    #[test]
    fn rejects_unknown_base_and_cycles() {
        let err = RegistryBuilder::new()
            .add_json(r#"{ "name": "X", "kind": "resource", "base": "Nope" }"#)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown base type Nope"), "{err}");

        let err = RegistryBuilder::new()
            .add_json(
                r#"[{ "name": "A", "kind": "complex-type", "base": "B" },
                    { "name": "B", "kind": "complex-type", "base": "A" }]"#,
            )
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("inheritance cycle"), "{err}");
    }

    #[test]
    fn rejects_inconsistent_fields() {
        let cases = [
            (
                r#"{ "name": "value[x]", "type": ["string", "boolean"], "max": "*" }"#,
                "must have max 1",
            ),
            (
                r#"{ "name": "flag", "type": "boolean", "typeProfiles": ["Patient"] }"#,
                "not a Reference",
            ),
            (
                r#"{ "name": "flag", "type": "boolean", "validCodes": { "http://x": ["a"] } }"#,
                "not coded",
            ),
            (
                r#"{ "name": "label", "type": "string", "max": "*", "representation": "xmlAttr" }"#,
                "XML attribute",
            ),
            (r#"{ "name": "label", "type": ["string", "code"] }"#, "not a choice"),
            (r#"{ "name": "owner", "type": "Organization" }"#, "use Resource"),
        ];
        for (element, expected) in cases {
            let text = format!(
                r#"{{ "name": "X", "kind": "resource", "base": "DomainResource", "elements": [{element}] }}"#
            );
            let err = RegistryBuilder::new()
                .with_r4_core()
                .unwrap()
                .add_json(&text)
                .unwrap()
                .build()
                .unwrap_err();
            assert!(err.to_string().contains(expected), "{element}: {err}");
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = RegistryBuilder::new()
            .with_r4_core()
            .unwrap()
            .with_r4_core()
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("defined more than once"), "{err}");
    }

    #[test]
    fn unknown_type_lookup_is_a_schema_error() {
        let err = SchemaRegistry::r4().require("Patient").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Schema);
    }
}
