//! Mapping between instances and the FHIR JSON object model
//!
//! `to_serializable` flattens an instance into an insertion-ordered JSON
//! object; `from_serializable` is its inverse and rebuilds an instance by
//! walking the descriptor, so every key in the input must be accounted for
//! by some field.

use crate::descriptor::{FieldSpec, FieldType, PrimitiveType, ResourceDescriptor, TypeRef};
use crate::error::{ParseError, Result};
use crate::instance::ResourceInstance;
use crate::registry::SchemaRegistry;
use crate::value::{Choice, FieldValue, Primitive, PrimitiveElement, Value};
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use std::sync::Arc;

/// Options for [`ResourceInstance::from_serializable_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail when a required field (or required choice) is absent
    pub check_required: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            check_required: true,
        }
    }

    /// Leave required-field checks to validation
    pub fn lenient() -> Self {
        Self {
            check_required: false,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::strict()
    }
}

impl ResourceInstance {
    /// Flatten into an ordered JSON object: `resourceType` first for
    /// resources, then populated fields in declaration order.
    pub fn to_serializable(&self) -> Map<String, Json> {
        let mut map = Map::new();
        if self.descriptor().is_resource() {
            map.insert(
                "resourceType".to_string(),
                Json::String(self.resource_type().to_string()),
            );
        }
        for (field, value) in self.iter() {
            match value {
                FieldValue::Single(v) => write_single(&mut map, &field.name, v),
                FieldValue::Many(vs) => write_many(&mut map, &field.name, vs),
                FieldValue::Choice(choice) => {
                    let key = field.choice_key(&choice.type_ref());
                    write_single(&mut map, &key, &choice.value);
                }
            }
        }
        map
    }

    pub fn to_json_value(&self) -> Json {
        Json::Object(self.to_serializable())
    }

    /// Rebuild an instance of `descriptor` from a JSON object, strictly
    pub fn from_serializable(
        registry: &SchemaRegistry,
        descriptor: &Arc<ResourceDescriptor>,
        data: &Map<String, Json>,
    ) -> Result<Self> {
        Self::from_serializable_with(registry, descriptor, data, &ParseOptions::strict())
    }

    pub fn from_serializable_with(
        registry: &SchemaRegistry,
        descriptor: &Arc<ResourceDescriptor>,
        data: &Map<String, Json>,
        options: &ParseOptions,
    ) -> Result<Self> {
        let reader = Reader { registry, options };
        let instance = reader.read_instance(descriptor, data, descriptor.name())?;
        tracing::trace!(
            resource_type = descriptor.name(),
            fields = instance.iter().count(),
            "Parsed instance"
        );
        Ok(instance)
    }

    /// Parse a resource, dispatching on its `resourceType`
    pub fn from_json_value(registry: &SchemaRegistry, json: &Json) -> Result<Self> {
        Self::from_json_value_with(registry, json, &ParseOptions::strict())
    }

    pub fn from_json_value_with(
        registry: &SchemaRegistry,
        json: &Json,
        options: &ParseOptions,
    ) -> Result<Self> {
        let Json::Object(data) = json else {
            return Err(ParseError::ExpectedObject("resource".to_string()).into());
        };
        let descriptor = resource_descriptor(registry, data, "$")?;
        Self::from_serializable_with(registry, descriptor, data, options)
    }
}

fn resource_descriptor<'r>(
    registry: &'r SchemaRegistry,
    data: &Map<String, Json>,
    path: &str,
) -> Result<&'r Arc<ResourceDescriptor>> {
    let resource_type = data
        .get("resourceType")
        .and_then(Json::as_str)
        .ok_or_else(|| ParseError::MissingResourceType(path.to_string()))?;
    registry
        .resource(resource_type)
        .ok_or_else(|| ParseError::UnknownResourceType(resource_type.to_string()).into())
}

fn write_single(map: &mut Map<String, Json>, key: &str, value: &Value) {
    match value {
        Value::Primitive(element) => {
            if let Some(v) = &element.value {
                map.insert(key.to_string(), v.to_json());
            }
            if element.has_metadata() {
                map.insert(format!("_{key}"), primitive_metadata(element));
            }
        }
        Value::Complex(instance) => {
            map.insert(key.to_string(), instance.to_json_value());
        }
    }
}

/// Primitive arrays become a value array and a `_key` companion, aligned by
/// index with `null` for missing entries. Either side is omitted when it
/// would hold only nulls.
fn write_many(map: &mut Map<String, Json>, key: &str, values: &[Value]) {
    let mut plain = Vec::with_capacity(values.len());
    let mut meta = Vec::with_capacity(values.len());
    let mut any_value = false;
    let mut any_meta = false;

    for value in values {
        match value {
            Value::Primitive(element) => {
                let v = element.value.as_ref().map_or(Json::Null, Primitive::to_json);
                any_value |= !v.is_null();
                plain.push(v);
                if element.has_metadata() {
                    any_meta = true;
                    meta.push(primitive_metadata(element));
                } else {
                    meta.push(Json::Null);
                }
            }
            Value::Complex(instance) => {
                any_value = true;
                plain.push(instance.to_json_value());
                meta.push(Json::Null);
            }
        }
    }

    if any_value {
        map.insert(key.to_string(), Json::Array(plain));
    }
    if any_meta {
        map.insert(format!("_{key}"), Json::Array(meta));
    }
}

fn primitive_metadata(element: &PrimitiveElement) -> Json {
    let mut meta = Map::new();
    if let Some(id) = &element.id {
        meta.insert("id".to_string(), Json::String(id.clone()));
    }
    if !element.extension.is_empty() {
        meta.insert(
            "extension".to_string(),
            Json::Array(
                element
                    .extension
                    .iter()
                    .map(ResourceInstance::to_json_value)
                    .collect(),
            ),
        );
    }
    Json::Object(meta)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn unexpected(path: &str, expected: impl Into<String>, found: &Json) -> ParseError {
    ParseError::UnexpectedShape {
        path: path.to_string(),
        expected: expected.into(),
        found: json_kind(found).to_string(),
    }
}

struct Reader<'a> {
    registry: &'a SchemaRegistry,
    options: &'a ParseOptions,
}

impl Reader<'_> {
    fn read_instance(
        &self,
        descriptor: &Arc<ResourceDescriptor>,
        data: &Map<String, Json>,
        path: &str,
    ) -> Result<ResourceInstance> {
        let mut consumed: HashSet<&str> = HashSet::new();

        if descriptor.is_resource() {
            match data.get("resourceType") {
                None => return Err(ParseError::MissingResourceType(path.to_string()).into()),
                Some(Json::String(found)) if found == descriptor.name() => {}
                Some(Json::String(found)) => {
                    return Err(ParseError::ResourceTypeMismatch {
                        expected: descriptor.name().to_string(),
                        found: found.clone(),
                    }
                    .into())
                }
                Some(other) => return Err(unexpected(&format!("{path}.resourceType"), "string", other).into()),
            }
            consumed.insert("resourceType");
        }

        let mut instance = ResourceInstance::new(descriptor.clone());
        for field in descriptor.fields() {
            let field_path = format!("{path}.{}", field.name);
            let value = match &field.field_type {
                FieldType::Single(ty) => {
                    self.read_field(field, ty, data, &field.name, &field_path, &mut consumed)?
                }
                FieldType::Choice(types) => {
                    self.read_choice(field, types, data, &field_path, &mut consumed)?
                }
            };
            match value {
                Some(value) => instance.insert_unchecked(field.name.clone(), value),
                None if field.is_required() && self.options.check_required => {
                    return Err(if field.is_choice() {
                        ParseError::MissingChoice(field_path)
                    } else {
                        ParseError::MissingRequired(field_path)
                    }
                    .into());
                }
                None => {}
            }
        }

        if let Some(unknown) = data.keys().find(|k| !consumed.contains(k.as_str())) {
            return Err(ParseError::UnknownProperty {
                path: path.to_string(),
                property: unknown.clone(),
            }
            .into());
        }
        Ok(instance)
    }

    fn read_choice<'d>(
        &self,
        field: &FieldSpec,
        types: &[TypeRef],
        data: &'d Map<String, Json>,
        path: &str,
        consumed: &mut HashSet<&'d str>,
    ) -> Result<Option<FieldValue>> {
        let present: Vec<(&TypeRef, String)> = types
            .iter()
            .map(|t| (t, field.choice_key(t)))
            .filter(|(_, key)| data.contains_key(key) || data.contains_key(&format!("_{key}")))
            .collect();

        match present.as_slice() {
            [] => Ok(None),
            [(ty, key)] => {
                let value = self.read_field(field, ty, data, key, path, consumed)?;
                Ok(value.map(|v| match v {
                    FieldValue::Single(value) => FieldValue::Choice(Choice {
                        type_code: ty.code().to_string(),
                        value,
                    }),
                    other => other,
                }))
            }
            many => Err(ParseError::AmbiguousChoice {
                path: path.to_string(),
                keys: many.iter().map(|(_, key)| key.clone()).collect(),
            }
            .into()),
        }
    }

    /// Read `key` (and `_key` for primitives) as a value of `ty`, shaped by
    /// the field's cardinality.
    fn read_field<'d>(
        &self,
        field: &FieldSpec,
        ty: &TypeRef,
        data: &'d Map<String, Json>,
        key: &str,
        path: &str,
        consumed: &mut HashSet<&'d str>,
    ) -> Result<Option<FieldValue>> {
        let (value_key, value) = match data.get_key_value(key) {
            Some((k, v)) => (Some(k.as_str()), Some(v)),
            None => (None, None),
        };
        let meta_key = format!("_{key}");
        let (meta_key, meta) = match (ty, data.get_key_value(&meta_key)) {
            (TypeRef::Primitive(_), Some((k, v))) => (Some(k.as_str()), Some(v)),
            _ => (None, None),
        };
        consumed.extend(value_key);
        consumed.extend(meta_key);

        let value = value.filter(|v| !v.is_null());
        let meta = meta.filter(|v| !v.is_null());
        if value.is_none() && meta.is_none() {
            return Ok(None);
        }

        if field.is_array() {
            let values = match value {
                None => &[][..],
                Some(Json::Array(items)) => items.as_slice(),
                Some(other) => return Err(unexpected(path, "array", other).into()),
            };
            let metas = match meta {
                None => &[][..],
                Some(Json::Array(items)) => items.as_slice(),
                Some(other) => return Err(unexpected(&format!("_{path}"), "array", other).into()),
            };
            let len = values.len().max(metas.len());
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let item_path = format!("{path}[{i}]");
                let item = self.read_value(
                    ty,
                    values.get(i).filter(|v| !v.is_null()),
                    metas.get(i).filter(|v| !v.is_null()),
                    &item_path,
                )?;
                match item {
                    Some(item) => out.push(item),
                    None => {
                        return Err(unexpected(&item_path, ty.code(), &Json::Null).into());
                    }
                }
            }
            if out.is_empty() {
                return Ok(None);
            }
            Ok(Some(FieldValue::Many(out)))
        } else {
            Ok(self
                .read_value(ty, value, meta, path)?
                .map(FieldValue::Single))
        }
    }

    fn read_value(
        &self,
        ty: &TypeRef,
        value: Option<&Json>,
        meta: Option<&Json>,
        path: &str,
    ) -> Result<Option<Value>> {
        match ty {
            TypeRef::Primitive(primitive) => self.read_primitive(*primitive, value, meta, path),
            TypeRef::Complex(name) => {
                let Some(value) = value else {
                    return Ok(None);
                };
                let Json::Object(object) = value else {
                    return Err(unexpected(path, name.as_str(), value).into());
                };
                let descriptor = self.registry.require(name)?;
                Ok(Some(Value::Complex(self.read_instance(descriptor, object, path)?)))
            }
            TypeRef::Resource => {
                let Some(value) = value else {
                    return Ok(None);
                };
                let Json::Object(object) = value else {
                    return Err(unexpected(path, "resource", value).into());
                };
                let descriptor = resource_descriptor(self.registry, object, path)?;
                Ok(Some(Value::Complex(self.read_instance(descriptor, object, path)?)))
            }
        }
    }

    fn read_primitive(
        &self,
        primitive: PrimitiveType,
        value: Option<&Json>,
        meta: Option<&Json>,
        path: &str,
    ) -> Result<Option<Value>> {
        let mut element = PrimitiveElement::default();
        if let Some(json) = value {
            let parsed = Primitive::from_json(primitive, json)
                .ok_or_else(|| unexpected(path, primitive.code(), json))?;
            element.value = Some(parsed);
        }

        if let Some(meta) = meta {
            let meta_path = format!("{path}._");
            let Json::Object(object) = meta else {
                return Err(unexpected(&meta_path, "object", meta).into());
            };
            for (key, v) in object {
                match (key.as_str(), v) {
                    ("id", Json::String(id)) => element.id = Some(id.clone()),
                    ("id", other) => return Err(unexpected(&meta_path, "string id", other).into()),
                    ("extension", Json::Array(items)) => {
                        let extension = self.registry.require("Extension")?;
                        for (i, item) in items.iter().enumerate() {
                            let item_path = format!("{meta_path}.extension[{i}]");
                            let Json::Object(object) = item else {
                                return Err(unexpected(&item_path, "Extension", item).into());
                            };
                            element
                                .extension
                                .push(self.read_instance(extension, object, &item_path)?);
                        }
                    }
                    ("extension", other) => {
                        return Err(unexpected(&meta_path, "extension array", other).into())
                    }
                    (other, _) => {
                        return Err(ParseError::UnknownProperty {
                            path: meta_path,
                            property: other.to_string(),
                        }
                        .into())
                    }
                }
            }
        }

        Ok((!element.is_empty()).then_some(Value::Primitive(element)))
    }
}
