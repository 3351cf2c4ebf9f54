//! FHIR JSON and XML encodings for [`ResourceInstance`] values.
//!
//! - JSON goes through the model's serializable form, so key order, choice
//!   keys and `_field` companions come from descriptors.
//! - XML is written with `quick-xml` and read with `roxmltree`, resolving
//!   every element through the registry so arrays and primitive types are
//!   exact.
//! - [`json_to_xml`] / [`xml_to_json`] convert text without a registry.

mod convert;
mod error;
mod xml_reader;
mod xml_writer;

pub use convert::{json_to_xml, xml_to_json};
pub use error::{FormatError, Result};
pub use xml_reader::{from_xml, from_xml_with};
pub use xml_writer::to_xml;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use strata_models::{ParseOptions, ResourceDescriptor, ResourceInstance, SchemaRegistry};

pub const FHIR_NS: &str = "http://hl7.org/fhir";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Encode a resource as FHIR JSON text
pub fn to_json(instance: &ResourceInstance, pretty: bool) -> Result<String> {
    let value = instance.to_json_value();
    Ok(if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    })
}

/// Decode FHIR JSON text, dispatching on `resourceType`
pub fn from_json(registry: &SchemaRegistry, input: &str) -> Result<ResourceInstance> {
    from_json_with(registry, input, &ParseOptions::strict())
}

pub fn from_json_with(
    registry: &SchemaRegistry,
    input: &str,
    options: &ParseOptions,
) -> Result<ResourceInstance> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    let instance = ResourceInstance::from_json_value_with(registry, &value, options)?;
    tracing::debug!(resource_type = instance.resource_type(), "Decoded JSON resource");
    Ok(instance)
}

/// Decode FHIR JSON text against a known descriptor
pub fn from_json_as(
    registry: &SchemaRegistry,
    descriptor: &Arc<ResourceDescriptor>,
    input: &str,
) -> Result<ResourceInstance> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    let object = value.as_object().ok_or(FormatError::ExpectedObject)?;
    Ok(ResourceInstance::from_serializable(registry, descriptor, object)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    /// Sniff the format from the first significant character
    pub fn detect(input: &str) -> Option<Self> {
        match input.trim_start_matches('\u{feff}').trim_start().chars().next() {
            Some('{') => Some(Format::Json),
            Some('<') => Some(Format::Xml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }

    pub fn parse(
        self,
        registry: &SchemaRegistry,
        input: &str,
        options: &ParseOptions,
    ) -> Result<ResourceInstance> {
        match self {
            Format::Json => from_json_with(registry, input, options),
            Format::Xml => from_xml_with(registry, input, options),
        }
    }

    pub fn render(self, instance: &ResourceInstance) -> Result<String> {
        match self {
            Format::Json => to_json(instance, true),
            Format::Xml => to_xml(instance),
        }
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            other => Err(FormatError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "json",
            Format::Xml => "xml",
        })
    }
}
