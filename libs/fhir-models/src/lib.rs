//! Descriptor-driven FHIR resource model
//!
//! Instead of one Rust type per FHIR resource, every resource, datatype and
//! backbone structure is a [`ResourceInstance`] checked against a
//! [`ResourceDescriptor`]. Descriptors are data: they are loaded from JSON or
//! YAML descriptor files into a [`SchemaRegistry`], and the bundled FHIR R4
//! set is available through [`SchemaRegistry::r4`].
//!
//! # Module Organization
//!
//! - `descriptor`: resolved descriptors, field specs, cardinality and bindings
//! - `definition`: raw descriptor file model
//! - `registry`: descriptor loading, inheritance and consistency checks
//! - `instance`: `construct`, `get`, `set`, `push` and `clear`
//! - `value`: primitive elements, complex values and choice unions
//! - `serialize`: mapping to and from the FHIR JSON object model
//!
//! # Example
//!
//! ```rust
//! use strata_models::{ResourceInstance, SchemaRegistry};
//!
//! let registry = SchemaRegistry::r4();
//! let issue = ResourceInstance::construct(
//!     registry.require("OperationOutcome.issue")?.clone(),
//!     [("severity", "error"), ("code", "invalid")],
//! )?;
//! let mut outcome = ResourceInstance::new(registry.require("OperationOutcome")?.clone());
//! outcome.push("issue", issue)?;
//!
//! let json = outcome.to_json_value();
//! assert_eq!(json["issue"][0]["severity"], "error");
//!
//! let back = ResourceInstance::from_json_value(registry, &json)?;
//! assert_eq!(back, outcome);
//! # Ok::<(), strata_models::Error>(())
//! ```

mod builtin;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod instance;
pub mod registry;
pub mod serialize;
pub mod value;

pub use definition::{DescriptorDef, ElementDef};
pub use descriptor::{
    Binding, BindingStrength, Cardinality, DescriptorKind, FieldSpec, FieldType, Max,
    PrimitiveKind, PrimitiveType, PropertyRepresentation, ResourceDescriptor, TypeRef, ValidCodes,
};
pub use error::{Error, ErrorKind, ParseError, Result, SchemaError, TypeMismatchError};
pub use instance::{FieldRef, ResourceInstance};
pub use registry::{RegistryBuilder, SchemaRegistry};
pub use serialize::ParseOptions;
pub use value::{Choice, FieldValue, Primitive, PrimitiveElement, Value};
