use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("expected a JSON object for the resource")]
    ExpectedObject,

    #[error("missing resourceType property")]
    MissingResourceType,

    #[error("element <{element}> is not in the FHIR namespace (found {found})")]
    Namespace { element: String, found: String },

    #[error("<contained> at {0} must hold exactly one resource element")]
    ContainedShape(String),

    #[error("cannot detect format of {0}")]
    UnknownFormat(String),

    #[error(transparent)]
    Model(#[from] strata_models::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<strata_models::ParseError> for FormatError {
    fn from(err: strata_models::ParseError) -> Self {
        FormatError::Model(err.into())
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
