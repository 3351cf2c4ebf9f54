//! Field values held by a [`ResourceInstance`]

use crate::descriptor::{PrimitiveKind, PrimitiveType, TypeRef};
use crate::instance::ResourceInstance;
use serde_json::{Number, Value as Json};

/// A primitive value, typed by its JSON representation
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Integer(i64),
    /// Decimals keep the JSON number they were read from
    Decimal(Number),
    /// Every string-based primitive (`code`, `uri`, `dateTime`, ...)
    String(String),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Integer(_) => PrimitiveKind::Integer,
            Primitive::Decimal(_) => PrimitiveKind::Decimal,
            Primitive::String(_) => PrimitiveKind::String,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Primitive::Boolean(_) => "boolean",
            Primitive::Integer(_) => "integer",
            Primitive::Decimal(_) => "decimal",
            Primitive::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Primitive::Boolean(b) => Json::Bool(*b),
            Primitive::Integer(i) => Json::Number((*i).into()),
            Primitive::Decimal(n) => Json::Number(n.clone()),
            Primitive::String(s) => Json::String(s.clone()),
        }
    }

    /// Read a JSON value as the given primitive type. `None` when the JSON
    /// kind does not fit.
    pub fn from_json(primitive: PrimitiveType, json: &Json) -> Option<Self> {
        match (primitive.kind(), json) {
            (PrimitiveKind::Boolean, Json::Bool(b)) => Some(Primitive::Boolean(*b)),
            (PrimitiveKind::Integer, Json::Number(n)) => n.as_i64().map(Primitive::Integer),
            (PrimitiveKind::Decimal, Json::Number(n)) => Some(Primitive::Decimal(n.clone())),
            (PrimitiveKind::String, Json::String(s)) => Some(Primitive::String(s.clone())),
            _ => None,
        }
    }

    /// Parse the lexical form used by XML `value` attributes
    pub fn parse_lexical(primitive: PrimitiveType, text: &str) -> Option<Self> {
        match primitive.kind() {
            PrimitiveKind::Boolean => match text {
                "true" => Some(Primitive::Boolean(true)),
                "false" => Some(Primitive::Boolean(false)),
                _ => None,
            },
            PrimitiveKind::Integer => text.trim().parse().ok().map(Primitive::Integer),
            PrimitiveKind::Decimal => serde_json::from_str::<Number>(text.trim())
                .ok()
                .map(Primitive::Decimal),
            PrimitiveKind::String => Some(Primitive::String(text.to_string())),
        }
    }

    pub fn to_lexical(&self) -> String {
        match self {
            Primitive::Boolean(b) => b.to_string(),
            Primitive::Integer(i) => i.to_string(),
            Primitive::Decimal(n) => n.to_string(),
            Primitive::String(s) => s.clone(),
        }
    }

    /// Coerce to the representation of `primitive`, if compatible.
    /// Integers are accepted where a decimal is declared.
    pub(crate) fn coerce(self, primitive: PrimitiveType) -> Result<Self, Self> {
        match (primitive.kind(), self) {
            (PrimitiveKind::Decimal, Primitive::Integer(i)) => Ok(Primitive::Decimal(i.into())),
            (kind, value) if kind == value.kind() => Ok(value),
            (_, value) => Err(value),
        }
    }
}

/// A primitive value with the element metadata FHIR allows on primitives
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveElement {
    pub value: Option<Primitive>,
    pub id: Option<String>,
    pub extension: Vec<ResourceInstance>,
}

impl PrimitiveElement {
    pub fn new(value: impl Into<Primitive>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_extension(mut self, extension: ResourceInstance) -> Self {
        self.extension.push(extension);
        self
    }

    /// Whether the element carries an `id` or extensions
    pub fn has_metadata(&self) -> bool {
        self.id.is_some() || !self.extension.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && !self.has_metadata()
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::String(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::String(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Boolean(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Integer(value)
    }
}

impl From<Number> for Primitive {
    fn from(value: Number) -> Self {
        Primitive::Decimal(value)
    }
}

/// One value of a field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(PrimitiveElement),
    /// A complex datatype, backbone structure or contained resource
    Complex(ResourceInstance),
}

impl Value {
    pub fn as_primitive(&self) -> Option<&PrimitiveElement> {
        match self {
            Value::Primitive(p) => Some(p),
            Value::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ResourceInstance> {
        match self {
            Value::Complex(c) => Some(c),
            Value::Primitive(_) => None,
        }
    }

    /// String content of a string-based primitive
    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive()?.value.as_ref()?.as_str()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_primitive()?.value.as_ref()? {
            Primitive::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.as_primitive()?.value.as_ref()? {
            Primitive::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Short description used in type mismatch errors
    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Primitive(p) => match &p.value {
                Some(v) => v.kind_name().to_string(),
                None => "primitive element".to_string(),
            },
            Value::Complex(c) => c.resource_type().to_string(),
        }
    }
}

impl From<PrimitiveElement> for Value {
    fn from(value: PrimitiveElement) -> Self {
        Value::Primitive(value)
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        Value::Primitive(PrimitiveElement::new(value))
    }
}

impl From<ResourceInstance> for Value {
    fn from(value: ResourceInstance) -> Self {
        Value::Complex(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Primitive::from(value).into()
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Primitive::from(value).into()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Primitive::from(value).into()
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Primitive::from(value).into()
    }
}

/// The active alternative of a choice field
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Type code of the alternative (`dateTime`, `Period`)
    pub type_code: String,
    pub value: Value,
}

impl Choice {
    pub fn new(type_code: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            type_code: type_code.into(),
            value: value.into(),
        }
    }

    pub fn type_ref(&self) -> TypeRef {
        TypeRef::parse(&self.type_code)
    }
}

/// Everything a field can hold
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(Value),
    Many(Vec<Value>),
    Choice(Choice),
}

impl FieldValue {
    /// Values in order; a choice yields its active value
    pub fn values(&self) -> &[Value] {
        match self {
            FieldValue::Single(v) => std::slice::from_ref(v),
            FieldValue::Many(vs) => vs,
            FieldValue::Choice(c) => std::slice::from_ref(&c.value),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            FieldValue::Single(v) => v.describe(),
            FieldValue::Many(vs) => format!("sequence of {}", vs.len()),
            FieldValue::Choice(c) => format!("choice of {}", c.type_code),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Single(value)
    }
}

macro_rules! single_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Single(value.into())
                }
            }
        )*
    };
}

single_from!(
    &str,
    String,
    bool,
    i64,
    Primitive,
    PrimitiveElement,
    ResourceInstance
);

impl From<Vec<Value>> for FieldValue {
    fn from(values: Vec<Value>) -> Self {
        FieldValue::Many(values)
    }
}

impl From<Choice> for FieldValue {
    fn from(choice: Choice) -> Self {
        FieldValue::Choice(choice)
    }
}
