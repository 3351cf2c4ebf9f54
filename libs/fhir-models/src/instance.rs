//! Generic resource instances
//!
//! Every resource, datatype value and backbone structure is a
//! [`ResourceInstance`]: a map from logical field name to [`FieldValue`],
//! checked against the instance's [`ResourceDescriptor`] on every write.

use crate::descriptor::{FieldSpec, FieldType, ResourceDescriptor, TypeRef};
use crate::error::{Result, SchemaError, TypeMismatchError};
use crate::value::{Choice, FieldValue, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ResourceInstance {
    descriptor: Arc<ResourceDescriptor>,
    fields: BTreeMap<String, FieldValue>,
}

/// Borrowed view of a field, returned by [`ResourceInstance::get`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Single(&'a Value),
    Many(&'a [Value]),
    Choice(&'a Choice),
}

impl<'a> FieldRef<'a> {
    pub fn as_single(&self) -> Option<&'a Value> {
        match self {
            FieldRef::Single(v) => Some(v),
            FieldRef::Choice(c) => Some(&c.value),
            FieldRef::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&'a [Value]> {
        match self {
            FieldRef::Many(vs) => Some(vs),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&'a Choice> {
        match self {
            FieldRef::Choice(c) => Some(c),
            _ => None,
        }
    }
}

impl PartialEq for ResourceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.name() == other.descriptor.name() && self.fields == other.fields
    }
}

impl ResourceInstance {
    /// Empty instance; required fields are left for validation to report
    pub fn new(descriptor: Arc<ResourceDescriptor>) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    /// Build an instance from named values, failing on undeclared names,
    /// on two alternatives of one choice field, and on missing required
    /// fields.
    pub fn construct<I, K, V>(descriptor: Arc<ResourceDescriptor>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let mut instance = Self::new(descriptor);
        for (name, value) in fields {
            instance.set(name.as_ref(), value)?;
        }
        if let Some(missing) = instance.missing_required().first() {
            return Err(SchemaError::MissingRequired {
                path: missing.path.clone(),
            }
            .into());
        }
        Ok(instance)
    }

    pub fn descriptor(&self) -> &Arc<ResourceDescriptor> {
        &self.descriptor
    }

    /// Name of the instance's descriptor (`resourceType` for resources)
    pub fn resource_type(&self) -> &str {
        self.descriptor.name()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Logical id, when the `id` field holds a string
    pub fn id(&self) -> Option<&str> {
        match self.fields.get("id") {
            Some(FieldValue::Single(v)) => v.as_str(),
            _ => None,
        }
    }

    /// Required fields that hold no value
    pub fn missing_required(&self) -> Vec<&FieldSpec> {
        self.descriptor
            .fields()
            .iter()
            .filter(|f| f.is_required() && !self.fields.contains_key(&f.name))
            .collect()
    }

    /// Populated fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&FieldSpec, &FieldValue)> {
        self.descriptor
            .fields()
            .iter()
            .filter_map(|f| self.fields.get(&f.name).map(|v| (f, v)))
    }

    /// Read a field by logical or type-suffixed name.
    ///
    /// A suffixed choice name only yields a value while that alternative is
    /// the active one.
    pub fn get(&self, name: &str) -> Result<Option<FieldRef<'_>>> {
        let (field, alternative) = self.resolve(name)?;
        let Some(stored) = self.fields.get(&field.name) else {
            return Ok(None);
        };
        let found = match (stored, alternative) {
            (FieldValue::Choice(choice), Some(alt)) => {
                (choice.type_code == alt.code()).then_some(FieldRef::Single(&choice.value))
            }
            (FieldValue::Choice(choice), None) => Some(FieldRef::Choice(choice)),
            (FieldValue::Single(v), _) => Some(FieldRef::Single(v)),
            (FieldValue::Many(vs), _) => Some(FieldRef::Many(vs)),
        };
        Ok(found)
    }

    /// Assign a field.
    ///
    /// Sequence fields take [`FieldValue::Many`]; an empty sequence clears the
    /// field. Choice fields take either a value under a suffixed name
    /// (`timingDateTime`) or a [`Choice`] under the logical name, which
    /// replaces whatever alternative was active.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        let (field, alternative) = self.resolve(name)?;
        let field = field.clone();
        let alternative = alternative.cloned();
        let path = self.field_path(&field.name);

        let stored = match (&field.field_type, alternative, value) {
            (FieldType::Choice(_), Some(alt), FieldValue::Single(v)) => {
                if let Some(FieldValue::Choice(active)) = self.fields.get(&field.name) {
                    if active.type_code != alt.code() {
                        return Err(SchemaError::ChoiceConflict {
                            path,
                            active: active.type_code.clone(),
                            attempted: alt.code().to_string(),
                        }
                        .into());
                    }
                }
                let value = check_value(&alt, v, &path)?;
                FieldValue::Choice(Choice {
                    type_code: alt.code().to_string(),
                    value,
                })
            }
            (FieldType::Choice(types), None, FieldValue::Choice(choice)) => {
                let Some(alt) = types.iter().find(|t| t.code() == choice.type_code) else {
                    return Err(TypeMismatchError::new(
                        path,
                        field.field_type.to_string(),
                        choice.type_code,
                    )
                    .into());
                };
                let value = check_value(alt, choice.value, &path)?;
                FieldValue::Choice(Choice {
                    type_code: choice.type_code,
                    value,
                })
            }
            (FieldType::Choice(_), _, other) => {
                return Err(TypeMismatchError::new(
                    path,
                    format!("a single {} value", field.field_type),
                    other.describe(),
                )
                .into());
            }
            (FieldType::Single(ty), _, FieldValue::Many(values)) if field.is_array() => {
                if values.is_empty() {
                    self.fields.remove(&field.name);
                    return Ok(());
                }
                let checked = values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| check_value(ty, v, &format!("{path}[{i}]")))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                FieldValue::Many(checked)
            }
            (FieldType::Single(ty), _, FieldValue::Single(v)) if !field.is_array() => {
                FieldValue::Single(check_value(ty, v, &path)?)
            }
            (FieldType::Single(ty), _, other) => {
                let expected = if field.is_array() {
                    format!("sequence of {ty}")
                } else {
                    format!("single {ty}")
                };
                return Err(TypeMismatchError::new(path, expected, other.describe()).into());
            }
        };

        self.fields.insert(field.name, stored);
        Ok(())
    }

    /// Append one value to a sequence field
    pub fn push(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let (field, _) = self.resolve(name)?;
        let path = self.field_path(&field.name);
        let ty = match field.single_type() {
            Some(ty) if field.is_array() => ty.clone(),
            _ => {
                return Err(TypeMismatchError::new(
                    path,
                    format!("single {}", field.field_type),
                    "sequence element",
                )
                .into())
            }
        };
        let name = field.name.clone();
        let index = self.fields.get(&name).map_or(0, |v| v.values().len());
        let value = check_value(&ty, value.into(), &format!("{path}[{index}]"))?;
        match self.fields.get_mut(&name) {
            Some(FieldValue::Many(values)) => values.push(value),
            _ => {
                self.fields.insert(name, FieldValue::Many(vec![value]));
            }
        }
        Ok(())
    }

    /// Remove a field and return what it held.
    ///
    /// A suffixed choice name only clears the field while that alternative is
    /// active; the logical name clears any alternative.
    pub fn clear(&mut self, name: &str) -> Result<Option<FieldValue>> {
        let (field, alternative) = self.resolve(name)?;
        if let (Some(alt), Some(FieldValue::Choice(active))) =
            (alternative, self.fields.get(&field.name))
        {
            if active.type_code != alt.code() {
                return Ok(None);
            }
        }
        let key = field.name.clone();
        Ok(self.fields.remove(&key))
    }

    /// Store a value that has already been checked against the descriptor
    pub(crate) fn insert_unchecked(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    fn resolve(&self, name: &str) -> Result<(&FieldSpec, Option<&TypeRef>)> {
        self.descriptor.resolve(name).ok_or_else(|| {
            SchemaError::UnknownField {
                type_name: self.descriptor.name().to_string(),
                field: name.to_string(),
            }
            .into()
        })
    }

    fn field_path(&self, name: &str) -> String {
        format!("{}.{}", self.descriptor.name(), name)
    }
}

/// Check one value against a declared type, normalizing primitives
fn check_value(ty: &TypeRef, value: Value, path: &str) -> Result<Value> {
    let mismatch =
        |found: String| -> crate::Error { TypeMismatchError::new(path, ty.code(), found).into() };
    match (ty, value) {
        (TypeRef::Primitive(primitive), Value::Primitive(mut element)) => {
            if let Some(v) = element.value.take() {
                match v.coerce(*primitive) {
                    Ok(v) => element.value = Some(v),
                    Err(v) => return Err(mismatch(v.kind_name().to_string())),
                }
            }
            if let Some(ext) = element.extension.iter().find(|e| !e.descriptor.is_a("Extension")) {
                return Err(TypeMismatchError::new(
                    format!("{path}.extension"),
                    "Extension",
                    ext.resource_type(),
                )
                .into());
            }
            Ok(Value::Primitive(element))
        }
        // Exact match; a subtype instance would not parse back as itself
        (TypeRef::Complex(name), Value::Complex(instance)) => {
            if instance.resource_type() == name {
                Ok(Value::Complex(instance))
            } else {
                Err(mismatch(instance.resource_type().to_string()))
            }
        }
        (TypeRef::Resource, Value::Complex(instance)) => {
            if instance.descriptor.is_resource() {
                Ok(Value::Complex(instance))
            } else {
                Err(mismatch(instance.resource_type().to_string()))
            }
        }
        (_, other) => Err(mismatch(other.describe())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Primitive, PrimitiveElement};
    use crate::{ErrorKind, SchemaRegistry};

    fn descriptor(name: &str) -> Arc<ResourceDescriptor> {
        SchemaRegistry::r4().get(name).unwrap().clone()
    }

    fn coding(system: &str, code: &str) -> ResourceInstance {
        ResourceInstance::construct(
            descriptor("Coding"),
            [("system", system), ("code", code)],
        )
        .unwrap()
    }

    #[test]
    fn construct_rejects_unknown_field() {
        let err = ResourceInstance::construct(
            descriptor("Endpoint"),
            [("status", "active"), ("colour", "red")],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn construct_requires_required_fields() {
        let err = ResourceInstance::construct(
            descriptor("Endpoint"),
            [("status", FieldValue::from("active"))],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required field: Endpoint.connectionType"
        );
    }

    #[test]
    fn get_respects_cardinality_shape() {
        let mut endpoint = ResourceInstance::new(descriptor("Endpoint"));
        endpoint.set("status", "active").unwrap();
        endpoint
            .set(
                "payloadType",
                vec![Value::from(
                    ResourceInstance::construct(descriptor("CodeableConcept"), [("text", "any")])
                        .unwrap(),
                )],
            )
            .unwrap();

        let status = endpoint.get("status").unwrap().unwrap();
        assert_eq!(status.as_single().and_then(Value::as_str), Some("active"));
        let payload = endpoint.get("payloadType").unwrap().unwrap();
        assert_eq!(payload.as_many().map(<[Value]>::len), Some(1));
        assert_eq!(endpoint.get("address").unwrap(), None);
        assert!(endpoint.get("nope").is_err());
    }

    #[test]
    fn set_rejects_shape_and_kind_mismatch() {
        let mut endpoint = ResourceInstance::new(descriptor("Endpoint"));

        let err = endpoint
            .set("status", vec![Value::from("active")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let err = endpoint.set("payloadType", coding("http://x", "y")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let err = endpoint.set("status", true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type mismatch at Endpoint.status: expected code, found boolean"
        );

        let err = endpoint.set("connectionType", "hl7-fhir-rest").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let codeable = ResourceInstance::new(descriptor("CodeableConcept"));
        let err = endpoint.set("connectionType", codeable).unwrap_err();
        assert!(err.to_string().contains("expected Coding, found CodeableConcept"));
    }

    #[test]
    fn decimal_fields_accept_integers() {
        let mut quantity = ResourceInstance::new(descriptor("Quantity"));
        quantity.set("value", 5i64).unwrap();
        let value = quantity.get("value").unwrap().unwrap().as_single().unwrap();
        assert_eq!(
            value.as_primitive().unwrap().value,
            Some(Primitive::Decimal(5.into()))
        );
    }

    #[test]
    fn complex_fields_require_the_declared_type() {
        let mut range = ResourceInstance::new(descriptor("Range"));
        let duration = ResourceInstance::construct(descriptor("Duration"), [("value", 3i64)]).unwrap();
        let err = range.set("low", duration).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("Duration"));
        assert!(range.get("low").unwrap().is_none());
    }

    #[test]
    fn quantity_field_survives_serialization() {
        let registry = SchemaRegistry::r4();
        let mut range = ResourceInstance::new(descriptor("Range"));
        let low = ResourceInstance::construct(
            descriptor("Quantity"),
            [("value", FieldValue::from(3i64)), ("unit", FieldValue::from("mg"))],
        )
        .unwrap();
        range.set("low", low).unwrap();

        let map = range.to_serializable();
        let back = ResourceInstance::from_serializable(registry, range.descriptor(), &map).unwrap();
        assert_eq!(back, range);
    }

    #[test]
    fn choice_alternatives_are_exclusive() {
        let mut statement = ResourceInstance::new(descriptor("DeviceUseStatement"));
        statement.set("timingDateTime", "2020-01-01").unwrap();

        let period = ResourceInstance::construct(descriptor("Period"), [("start", "2020-01-01")])
            .unwrap();
        let err = statement.set("timingPeriod", period.clone()).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Schema(SchemaError::ChoiceConflict { .. })
        ));

        // Still the original alternative
        assert!(statement.get("timingPeriod").unwrap().is_none());
        let active = statement.get("timing").unwrap().unwrap();
        assert_eq!(active.as_choice().unwrap().type_code, "dateTime");

        // Replacing through the logical name switches alternatives
        statement.set("timing", Choice::new("Period", period)).unwrap();
        assert!(statement.get("timingDateTime").unwrap().is_none());
        assert!(statement.get("timingPeriod").unwrap().is_some());

        // Clearing makes room for another alternative
        statement.clear("timing").unwrap();
        statement.set("timingDateTime", "2021-02-03").unwrap();
        assert_eq!(
            statement
                .get("timingDateTime")
                .unwrap()
                .and_then(|f| f.as_single())
                .and_then(Value::as_str),
            Some("2021-02-03")
        );
    }

    #[test]
    fn construct_fails_on_two_choice_alternatives() {
        let period = ResourceInstance::construct(descriptor("Period"), [("start", "2020-01-01")])
            .unwrap();
        let err = ResourceInstance::construct(
            descriptor("DeviceUseStatement"),
            [
                ("status", FieldValue::from("active")),
                ("subject", FieldValue::from(reference("Patient/1"))),
                ("device", FieldValue::from(reference("Device/1"))),
                ("timingDateTime", FieldValue::from("2020-01-01")),
                ("timingPeriod", FieldValue::from(period)),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Schema(SchemaError::ChoiceConflict { .. })
        ));
    }

    #[test]
    fn choice_rejects_undeclared_alternative() {
        let mut statement = ResourceInstance::new(descriptor("DeviceUseStatement"));
        assert!(statement.set("timingString", "soon").is_err());
        let err = statement
            .set("timing", Choice::new("string", "soon"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        let err = statement.set("timing", "2020-01-01").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn contained_accepts_only_concrete_resources() {
        let mut org = ResourceInstance::new(descriptor("Organization"));
        let endpoint = ResourceInstance::new(descriptor("Endpoint"));
        org.push("contained", endpoint).unwrap();
        let err = org
            .push("contained", coding("http://x", "y"))
            .unwrap_err();
        assert!(err.to_string().contains("Organization.contained[1]"));
    }

    #[test]
    fn push_and_clear() {
        let mut org = ResourceInstance::new(descriptor("Organization"));
        org.push("alias", "ACME").unwrap();
        org.push("alias", "Acme Corp").unwrap();
        assert_eq!(
            org.get("alias").unwrap().and_then(|f| f.as_many()).map(<[Value]>::len),
            Some(2)
        );
        assert!(org.push("name", "ACME").is_err());

        let removed = org.clear("alias").unwrap();
        assert!(matches!(removed, Some(FieldValue::Many(v)) if v.len() == 2));
        assert!(org.is_empty());

        org.set("alias", Vec::<Value>::new()).unwrap();
        assert!(org.get("alias").unwrap().is_none());
    }

    #[test]
    fn primitive_metadata_is_kept() {
        let mut org = ResourceInstance::new(descriptor("Organization"));
        let ext = ResourceInstance::construct(
            descriptor("Extension"),
            [
                ("url", FieldValue::from("http://example.org/ext")),
                ("valueBoolean", FieldValue::from(true)),
            ],
        )
        .unwrap();
        org.set(
            "name",
            PrimitiveElement::new("ACME").with_id("n1").with_extension(ext),
        )
        .unwrap();
        let name = org.get("name").unwrap().unwrap().as_single().unwrap();
        let element = name.as_primitive().unwrap();
        assert_eq!(element.id.as_deref(), Some("n1"));
        assert_eq!(element.extension.len(), 1);
    }

    fn reference(target: &str) -> ResourceInstance {
        ResourceInstance::construct(descriptor("Reference"), [("reference", target)]).unwrap()
    }
}
