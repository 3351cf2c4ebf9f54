//! Resolved resource descriptors
//!
//! A [`ResourceDescriptor`] is the schema of one resource type, complex
//! datatype or backbone structure: an ordered list of [`FieldSpec`]s with
//! inherited fields already merged in. Descriptors are produced by the
//! [`SchemaRegistry`](crate::SchemaRegistry) from descriptor files and shared
//! through `Arc`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Code-system URI to the ordered list of codes allowed from that system.
pub type ValidCodes = IndexMap<String, Vec<String>>;

/// FHIR R4 primitive datatypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Base64Binary,
    Boolean,
    Canonical,
    Code,
    Date,
    DateTime,
    Decimal,
    Id,
    Instant,
    Integer,
    Markdown,
    Oid,
    PositiveInt,
    String,
    Time,
    UnsignedInt,
    Uri,
    Url,
    Uuid,
    Xhtml,
}

/// JSON-level representation shared by several primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Boolean,
    Integer,
    Decimal,
    String,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 20] = [
        Self::Base64Binary,
        Self::Boolean,
        Self::Canonical,
        Self::Code,
        Self::Date,
        Self::DateTime,
        Self::Decimal,
        Self::Id,
        Self::Instant,
        Self::Integer,
        Self::Markdown,
        Self::Oid,
        Self::PositiveInt,
        Self::String,
        Self::Time,
        Self::UnsignedInt,
        Self::Uri,
        Self::Url,
        Self::Uuid,
        Self::Xhtml,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Base64Binary => "base64Binary",
            Self::Boolean => "boolean",
            Self::Canonical => "canonical",
            Self::Code => "code",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::Decimal => "decimal",
            Self::Id => "id",
            Self::Instant => "instant",
            Self::Integer => "integer",
            Self::Markdown => "markdown",
            Self::Oid => "oid",
            Self::PositiveInt => "positiveInt",
            Self::String => "string",
            Self::Time => "time",
            Self::UnsignedInt => "unsignedInt",
            Self::Uri => "uri",
            Self::Url => "url",
            Self::Uuid => "uuid",
            Self::Xhtml => "xhtml",
        }
    }

    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Boolean => PrimitiveKind::Boolean,
            Self::Integer | Self::PositiveInt | Self::UnsignedInt => PrimitiveKind::Integer,
            Self::Decimal => PrimitiveKind::Decimal,
            _ => PrimitiveKind::String,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Upper bound of a cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMax", into = "String")]
pub enum Max {
    Bounded(u32),
    Unbounded,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMax {
    Number(u32),
    Text(String),
}

impl TryFrom<RawMax> for Max {
    type Error = String;

    fn try_from(raw: RawMax) -> Result<Self, Self::Error> {
        match raw {
            RawMax::Number(n) => Ok(Max::Bounded(n)),
            RawMax::Text(s) => s.parse(),
        }
    }
}

impl FromStr for Max {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Max::Unbounded);
        }
        s.parse::<u32>()
            .map(Max::Bounded)
            .map_err(|_| format!("invalid max cardinality '{s}' (expected a number or '*')"))
    }
}

impl From<Max> for String {
    fn from(max: Max) -> Self {
        max.to_string()
    }
}

impl fmt::Display for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Max::Bounded(n) => write!(f, "{n}"),
            Max::Unbounded => f.write_str("*"),
        }
    }
}

impl Default for Max {
    fn default() -> Self {
        Max::Bounded(1)
    }
}

/// Cardinality of a field (min..max)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub min: u32,
    pub max: Max,
}

impl Cardinality {
    pub fn new(min: u32, max: Max) -> Self {
        Self { min, max }
    }

    /// Whether values of this field are held as an ordered sequence
    pub fn is_array(&self) -> bool {
        match self.max {
            Max::Bounded(m) => m > 1,
            Max::Unbounded => true,
        }
    }

    pub fn is_required(&self) -> bool {
        self.min > 0
    }

    /// Whether the field is prohibited (`max = 0`)
    pub fn is_prohibited(&self) -> bool {
        self.max == Max::Bounded(0)
    }

    pub fn exceeds_max(&self, count: usize) -> bool {
        match self.max {
            Max::Bounded(m) => count > m as usize,
            Max::Unbounded => false,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
    Example,
}

impl fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::Extensible => "extensible",
            Self::Preferred => "preferred",
            Self::Example => "example",
        };
        f.write_str(s)
    }
}

/// Value set binding of a coded field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub strength: BindingStrength,
    pub value_set: String,
}

/// How a field is represented in XML when it deviates from the default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyRepresentation {
    XmlAttr,
    Xhtml,
}

/// Reference to a single datatype
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(PrimitiveType),
    /// A complex datatype or backbone structure, by descriptor name
    Complex(String),
    /// Any concrete resource; the value carries its own `resourceType`
    Resource,
}

impl TypeRef {
    pub fn parse(code: &str) -> Self {
        if let Some(primitive) = PrimitiveType::from_code(code) {
            TypeRef::Primitive(primitive)
        } else if code == "Resource" {
            TypeRef::Resource
        } else {
            TypeRef::Complex(code.to_string())
        }
    }

    pub fn code(&self) -> &str {
        match self {
            TypeRef::Primitive(p) => p.code(),
            TypeRef::Complex(name) => name,
            TypeRef::Resource => "Resource",
        }
    }

    /// Suffix used by a choice field's JSON property (`dateTime` -> `DateTime`)
    pub fn suffix(&self) -> String {
        capitalize(self.code())
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn capitalize(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Single(TypeRef),
    /// Polymorphic `[x]` field with its closed set of alternatives
    Choice(Vec<TypeRef>),
}

impl FieldType {
    pub fn alternatives(&self) -> &[TypeRef] {
        match self {
            FieldType::Single(t) => std::slice::from_ref(t),
            FieldType::Choice(types) => types,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Single(t) => write!(f, "{t}"),
            FieldType::Choice(types) => {
                let codes: Vec<&str> = types.iter().map(TypeRef::code).collect();
                write!(f, "{}", codes.join(" | "))
            }
        }
    }
}

/// Schema of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Logical name, without the `[x]` marker for choice fields
    pub name: String,
    /// Dotted location, for documentation and issue locations
    pub path: String,
    pub field_type: FieldType,
    pub cardinality: Cardinality,
    pub valid_codes: Option<ValidCodes>,
    pub binding: Option<Binding>,
    pub type_profiles: Option<Vec<String>>,
    pub representation: Option<PropertyRepresentation>,
}

impl FieldSpec {
    pub fn is_choice(&self) -> bool {
        matches!(self.field_type, FieldType::Choice(_))
    }

    pub fn is_array(&self) -> bool {
        self.cardinality.is_array()
    }

    pub fn is_required(&self) -> bool {
        self.cardinality.is_required()
    }

    /// The single declared type, `None` for choice fields
    pub fn single_type(&self) -> Option<&TypeRef> {
        match &self.field_type {
            FieldType::Single(t) => Some(t),
            FieldType::Choice(_) => None,
        }
    }

    /// JSON property name of a choice alternative (`timing` + `Period`)
    pub fn choice_key(&self, alternative: &TypeRef) -> String {
        format!("{}{}", self.name, alternative.suffix())
    }

    /// Alternative selected by a type-suffixed property name
    pub fn choice_alternative(&self, key: &str) -> Option<&TypeRef> {
        let FieldType::Choice(types) = &self.field_type else {
            return None;
        };
        let suffix = key.strip_prefix(self.name.as_str())?;
        types.iter().find(|t| t.suffix() == suffix)
    }

    /// Alternative with the given type code
    pub fn alternative(&self, type_code: &str) -> Option<&TypeRef> {
        self.field_type
            .alternatives()
            .iter()
            .find(|t| t.code() == type_code)
    }

    /// Whether `valid_codes` must be enforced (required binding)
    pub fn enforces_codes(&self) -> bool {
        self.valid_codes.is_some()
            && self
                .binding
                .as_ref()
                .is_some_and(|b| b.strength == BindingStrength::Required)
    }

    /// Whether a code is allowed by `valid_codes`.
    ///
    /// A listed system restricts the check to that system's codes. Without a
    /// system, or with a system that is not listed, any list may match.
    /// Fields without `valid_codes` allow everything.
    pub fn allows_code(&self, system: Option<&str>, code: &str) -> bool {
        let Some(valid) = &self.valid_codes else {
            return true;
        };
        match system.and_then(|s| valid.get(s)) {
            Some(codes) => codes.iter().any(|c| c == code),
            None => valid.values().flatten().any(|c| c == code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorKind {
    Resource,
    ComplexType,
    BackboneElement,
}

/// Schema of one resource type, complex datatype or backbone structure
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    name: String,
    kind: DescriptorKind,
    is_abstract: bool,
    url: Option<String>,
    /// This descriptor's name followed by its ancestors, nearest first
    lineage: Vec<String>,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl ResourceDescriptor {
    pub(crate) fn new(
        name: String,
        kind: DescriptorKind,
        is_abstract: bool,
        url: Option<String>,
        lineage: Vec<String>,
        fields: Vec<FieldSpec>,
    ) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            name,
            kind,
            is_abstract,
            url,
            lineage,
            fields,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether instances of this descriptor are concrete resources
    pub fn is_resource(&self) -> bool {
        self.kind == DescriptorKind::Resource && !self.is_abstract
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Direct base type name
    pub fn base(&self) -> Option<&str> {
        self.lineage.get(1).map(String::as_str)
    }

    /// This descriptor's name followed by its ancestors, nearest first
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// Whether this descriptor is `type_name` or derives from it
    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage.iter().any(|t| t == type_name)
    }

    /// Fields in declaration order, inherited fields first
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Field by logical name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Resolve a property name, which may be a logical field name or a
    /// type-suffixed choice name (`timingDateTime`).
    pub fn resolve(&self, key: &str) -> Option<(&FieldSpec, Option<&TypeRef>)> {
        if let Some(field) = self.field(key) {
            return Some((field, None));
        }
        self.fields
            .iter()
            .filter(|f| f.is_choice())
            .find_map(|f| f.choice_alternative(key).map(|alt| (f, Some(alt))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice_field() -> FieldSpec {
        FieldSpec {
            name: "timing".to_string(),
            path: "DeviceUseStatement.timing[x]".to_string(),
            field_type: FieldType::Choice(vec![
                TypeRef::parse("Timing"),
                TypeRef::parse("Period"),
                TypeRef::parse("dateTime"),
            ]),
            cardinality: Cardinality::new(0, Max::Bounded(1)),
            valid_codes: None,
            binding: None,
            type_profiles: None,
            representation: None,
        }
    }

    #[test]
    fn max_parses_star_and_numbers() {
        assert_eq!("*".parse::<Max>().unwrap(), Max::Unbounded);
        assert_eq!("3".parse::<Max>().unwrap(), Max::Bounded(3));
        assert!("many".parse::<Max>().is_err());

        let max: Max = serde_json::from_value(serde_json::json!("*")).unwrap();
        assert_eq!(max, Max::Unbounded);
        let max: Max = serde_json::from_value(serde_json::json!(2)).unwrap();
        assert_eq!(max, Max::Bounded(2));
    }

    #[test]
    fn cardinality_shape() {
        assert!(!Cardinality::new(1, Max::Bounded(1)).is_array());
        assert!(Cardinality::new(0, Max::Unbounded).is_array());
        assert!(Cardinality::new(0, Max::Bounded(2)).exceeds_max(3));
        assert!(!Cardinality::new(0, Max::Unbounded).exceeds_max(10_000));
        assert_eq!(Cardinality::new(1, Max::Unbounded).to_string(), "1..*");
    }

    #[test]
    fn choice_suffixes_capitalize_type_codes() {
        let field = choice_field();
        assert_eq!(
            field.choice_alternative("timingDateTime"),
            Some(&TypeRef::Primitive(PrimitiveType::DateTime))
        );
        assert_eq!(
            field.choice_alternative("timingPeriod"),
            Some(&TypeRef::Complex("Period".to_string()))
        );
        assert_eq!(field.choice_alternative("timingdateTime"), None);
        assert_eq!(field.choice_alternative("timing"), None);
        assert_eq!(
            field.choice_key(&TypeRef::Primitive(PrimitiveType::Base64Binary)),
            "timingBase64Binary"
        );
    }

    #[test]
    fn allows_code_respects_system() {
        let mut valid = ValidCodes::new();
        valid.insert(
            "http://hl7.org/fhir/metric-color".to_string(),
            vec!["red".to_string(), "blue".to_string()],
        );
        let mut field = FieldSpec {
            valid_codes: Some(valid),
            binding: Some(Binding {
                strength: BindingStrength::Required,
                value_set: "http://hl7.org/fhir/ValueSet/metric-color".to_string(),
            }),
            ..choice_field()
        };

        assert!(field.enforces_codes());
        assert!(field.allows_code(None, "red"));
        assert!(field.allows_code(Some("http://hl7.org/fhir/metric-color"), "blue"));
        assert!(field.allows_code(Some("http://example.org/colors"), "blue"));
        assert!(!field.allows_code(None, "purple"));

        if let Some(valid) = field.valid_codes.as_mut() {
            valid.insert("http://example.org/shades".to_string(), vec!["teal".to_string()]);
        }
        assert!(field.allows_code(None, "teal"));
        assert!(field.allows_code(Some("http://example.org/shades"), "teal"));
        assert!(!field.allows_code(Some("http://hl7.org/fhir/metric-color"), "teal"));
        assert!(!field.allows_code(Some("http://example.org/shades"), "red"));
    }
}
