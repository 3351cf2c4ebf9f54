//! Schema-aware FHIR XML writer
//!
//! Walks a [`ResourceInstance`] in declaration order, so element order,
//! attribute placement and choice element names all come from descriptors.

use crate::error::Result;
use crate::{FHIR_NS, XHTML_NS};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use strata_models::{
    FieldSpec, FieldValue, PrimitiveElement, PrimitiveType, PropertyRepresentation,
    ResourceInstance, TypeRef, Value,
};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Encode a resource as FHIR XML
pub fn to_xml(instance: &ResourceInstance) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_instance(&mut writer, instance.resource_type(), instance, Some(FHIR_NS))?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn write_instance(
    writer: &mut XmlWriter,
    name: &str,
    instance: &ResourceInstance,
    namespace: Option<&str>,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    if let Some(ns) = namespace {
        start.push_attribute(("xmlns", ns));
    }

    let mut children = Vec::new();
    for (field, value) in instance.iter() {
        if field.representation == Some(PropertyRepresentation::XmlAttr) {
            if let Some(text) = attribute_text(value) {
                start.push_attribute((field.name.as_str(), text.as_str()));
            }
        } else {
            children.push((field, value));
        }
    }

    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for (field, value) in children {
        write_field(writer, field, value)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn attribute_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Single(Value::Primitive(p)) => p.value.as_ref().map(|v| v.to_lexical()),
        _ => None,
    }
}

fn write_field(writer: &mut XmlWriter, field: &FieldSpec, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Single(v) => write_value(writer, &field.name, field.single_type(), v),
        FieldValue::Many(values) => {
            for v in values {
                write_value(writer, &field.name, field.single_type(), v)?;
            }
            Ok(())
        }
        FieldValue::Choice(choice) => {
            let ty = choice.type_ref();
            write_value(writer, &field.choice_key(&ty), Some(&ty), &choice.value)
        }
    }
}

fn write_value(
    writer: &mut XmlWriter,
    name: &str,
    ty: Option<&TypeRef>,
    value: &Value,
) -> Result<()> {
    match (ty, value) {
        (Some(TypeRef::Primitive(PrimitiveType::Xhtml)), Value::Primitive(p)) => {
            if let Some(div) = p.value.as_ref().and_then(|v| v.as_str()) {
                write_xhtml(writer, div)?;
            }
            Ok(())
        }
        (_, Value::Primitive(p)) => write_primitive(writer, name, p),
        (Some(TypeRef::Resource), Value::Complex(resource)) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            write_instance(writer, resource.resource_type(), resource, None)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            Ok(())
        }
        (_, Value::Complex(instance)) => write_instance(writer, name, instance, None),
    }
}

fn write_primitive(writer: &mut XmlWriter, name: &str, element: &PrimitiveElement) -> Result<()> {
    let mut start = BytesStart::new(name);
    if let Some(id) = &element.id {
        start.push_attribute(("id", id.as_str()));
    }
    if let Some(value) = &element.value {
        start.push_attribute(("value", value.to_lexical().as_str()));
    }

    if element.extension.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for extension in &element.extension {
        write_instance(writer, "extension", extension, None)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Re-emit an XHTML fragment event by event so it nests into the document
pub(crate) fn write_xhtml(writer: &mut XmlWriter, fragment: &str) -> Result<()> {
    let mut reader = Reader::from_str(fragment);
    let mut depth = 0usize;
    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Start(start) => {
                let mut start = start.into_owned();
                if depth == 0 && !start.attributes().flatten().any(|a| a.key.into_inner() == b"xmlns") {
                    start.push_attribute(("xmlns", XHTML_NS));
                }
                depth += 1;
                writer.write_event(Event::Start(start))?;
            }
            Event::End(end) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(end))?;
            }
            other => {
                writer.write_event(other)?;
            }
        }
    }
    Ok(())
}
