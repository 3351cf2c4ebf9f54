//! Lexical validation of primitive values
//!
//! The model only guarantees the JSON kind of a primitive (string, number,
//! boolean). This step checks the FHIR R4 lexical space of each primitive
//! type, and calendar validity of dates.

use crate::plan::PrimitivesPlan;
use crate::validator::{IssueCode, ValidationIssue};
use chrono::{DateTime, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use strata_models::{FieldValue, Primitive, PrimitiveType, ResourceInstance, TypeRef, Value};

static ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").expect("id regex must compile"));
static CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s]+( [^\s]+)*$").expect("code regex must compile"));
static URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S*$").expect("uri regex must compile"));
static OID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^urn:oid:[0-2](\.(0|[1-9][0-9]*))+$").expect("oid regex must compile")
});
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^urn:uuid:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid regex must compile")
});
static BASE64: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*([0-9a-zA-Z+/=]){4}\s*)+$").expect("base64Binary regex must compile")
});
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})(-(0[1-9]|1[0-2])(-(0[1-9]|[12][0-9]|3[01]))?)?$")
        .expect("date regex must compile")
});
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]{4})(-(0[1-9]|1[0-2])(-(0[1-9]|[12][0-9]|3[01])(T([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?(Z|[+-]((0[0-9]|1[0-3]):[0-5][0-9]|14:00)))?)?)?$",
    )
    .expect("dateTime regex must compile")
});
static TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?$")
        .expect("time regex must compile")
});

pub fn validate_primitives(
    resource: &ResourceInstance,
    _plan: &PrimitivesPlan,
    issues: &mut Vec<ValidationIssue>,
) {
    super::walk(resource, resource.resource_type(), &mut |node, path| {
        for (field, value) in node.iter() {
            let ty = match value {
                FieldValue::Choice(choice) => choice.type_ref(),
                _ => match field.single_type() {
                    Some(ty) => ty.clone(),
                    None => continue,
                },
            };
            let TypeRef::Primitive(primitive) = ty else {
                continue;
            };

            for (index, item) in value.values().iter().enumerate() {
                let Value::Primitive(element) = item else {
                    continue;
                };
                let Some(value) = &element.value else {
                    continue;
                };
                if let Err(reason) = check(primitive, value) {
                    let item_path = super::element_path(path, field, index);
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::Value,
                            format!(
                                "Invalid {primitive} value '{}' at {item_path}: {reason}",
                                value.to_lexical()
                            ),
                        )
                        .with_location(field.path.clone())
                        .at(&item_path),
                    );
                }
            }
        }
    });
}

/// Check one value against the lexical rules of `primitive`
pub fn check(primitive: PrimitiveType, value: &Primitive) -> Result<(), String> {
    match (primitive, value) {
        (PrimitiveType::Integer, Primitive::Integer(i)) => {
            i32::try_from(*i)
                .map(|_| ())
                .map_err(|_| "outside the 32-bit integer range".to_string())
        }
        (PrimitiveType::PositiveInt, Primitive::Integer(i)) => {
            if *i < 1 || *i > i64::from(i32::MAX) {
                Err("must be between 1 and 2147483647".to_string())
            } else {
                Ok(())
            }
        }
        (PrimitiveType::UnsignedInt, Primitive::Integer(i)) => {
            if *i < 0 || *i > i64::from(i32::MAX) {
                Err("must be between 0 and 2147483647".to_string())
            } else {
                Ok(())
            }
        }
        (_, Primitive::String(s)) => check_text(primitive, s),
        _ => Ok(()),
    }
}

fn check_text(primitive: PrimitiveType, s: &str) -> Result<(), String> {
    let pattern = |re: &Regex, what: &str| {
        if re.is_match(s) {
            Ok(())
        } else {
            Err(format!("not a valid {what}"))
        }
    };

    match primitive {
        PrimitiveType::String | PrimitiveType::Markdown => {
            if s.trim().is_empty() {
                Err("must contain non-whitespace content".to_string())
            } else {
                Ok(())
            }
        }
        PrimitiveType::Id => pattern(&ID, "id (1-64 letters, digits, '-' or '.')"),
        PrimitiveType::Code => pattern(&CODE, "code"),
        PrimitiveType::Uri | PrimitiveType::Canonical => pattern(&URI, "uri"),
        PrimitiveType::Url => {
            if s.is_empty() {
                Err("url must not be empty".to_string())
            } else {
                pattern(&URI, "url")
            }
        }
        PrimitiveType::Oid => pattern(&OID, "oid"),
        PrimitiveType::Uuid => pattern(&UUID, "uuid"),
        PrimitiveType::Base64Binary => pattern(&BASE64, "base64Binary"),
        PrimitiveType::Date => {
            pattern(&DATE, "date")?;
            check_calendar(s)
        }
        PrimitiveType::DateTime => {
            pattern(&DATE_TIME, "dateTime")?;
            check_calendar(s)?;
            if s.contains('T') {
                check_timestamp(s)
            } else {
                Ok(())
            }
        }
        PrimitiveType::Instant => {
            if !s.contains('T') {
                return Err("instant must include a time and time zone".to_string());
            }
            pattern(&DATE_TIME, "instant")?;
            check_calendar(s)?;
            check_timestamp(s)
        }
        PrimitiveType::Time => {
            pattern(&TIME, "time")?;
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .map(|_| ())
                .map_err(|_| "not a valid time".to_string())
        }
        PrimitiveType::Xhtml => {
            if s.trim_start().starts_with("<div") {
                Ok(())
            } else {
                Err("narrative must be a <div> element".to_string())
            }
        }
        _ => Ok(()),
    }
}

/// Full dates must exist on the calendar (no February 30th)
fn check_calendar(s: &str) -> Result<(), String> {
    if s.len() < 10 {
        return Ok(());
    }
    NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| format!("{} is not a calendar date", &s[..10]))
}

fn check_timestamp(s: &str) -> Result<(), String> {
    if s.contains(":60") {
        // Leap second: the pattern already accepted it
        return Ok(());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|_| ())
        .map_err(|_| "not a valid timestamp".to_string())
}
