//! Error types for the resource model

use thiserror::Error;

/// Broad classification of a model error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    TypeMismatch,
    Parse,
    Descriptor,
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid descriptor {name}: {reason}")]
    Descriptor { name: String, reason: String },

    #[error("Could not read descriptor file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::Parse(_) | Self::Json(_) => ErrorKind::Parse,
            Self::Descriptor { .. } | Self::Yaml(_) => ErrorKind::Descriptor,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn descriptor(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Descriptor {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A field name or type that the descriptor does not declare.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{type_name} has no field named '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Missing required field: {path}")]
    MissingRequired { path: String },

    #[error("{path}[x] already holds a {active} value, refusing to also set {attempted}")]
    ChoiceConflict {
        path: String,
        active: String,
        attempted: String,
    },
}

/// An assigned value whose type or cardinality shape disagrees with its field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Type mismatch at {path}: expected {expected}, found {found}")]
pub struct TypeMismatchError {
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl TypeMismatchError {
    pub(crate) fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Serialized input that cannot be mapped onto a descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected a JSON object for {0}")]
    ExpectedObject(String),

    #[error("Missing resourceType property at {0}")]
    MissingResourceType(String),

    #[error("Unknown resourceType '{0}'")]
    UnknownResourceType(String),

    #[error("resourceType mismatch: expected {expected}, found {found}")]
    ResourceTypeMismatch { expected: String, found: String },

    #[error("Unknown property '{property}' at {path}")]
    UnknownProperty { path: String, property: String },

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Choice field {path}[x] has more than one value: {}", .keys.join(", "))]
    AmbiguousChoice { path: String, keys: Vec<String> },

    #[error("Required choice field {0}[x] has no value")]
    MissingChoice(String),

    #[error("Unexpected JSON at {path}: expected {expected}, found {found}")]
    UnexpectedShape {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Invalid {type_code} value at {path}: {value}")]
    InvalidPrimitive {
        path: String,
        type_code: String,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
