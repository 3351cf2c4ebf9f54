//! Descriptor-free JSON <-> XML conversion
//!
//! Follows the FHIR mapping rules without knowing any field types, so the
//! result is best-effort: a single XML element becomes a JSON scalar or
//! object rather than a one-item array, and primitive values are guessed
//! from their lexical form. Use [`crate::from_xml`] when a registry is at
//! hand.

use crate::error::{FormatError, Result};
use crate::xml_writer::write_xhtml;
use crate::{FHIR_NS, XHTML_NS};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};
use serde_json::{Map, Number, Value as Json};
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Convert FHIR JSON text to FHIR XML text
pub fn json_to_xml(input: &str) -> Result<String> {
    let value: Json = serde_json::from_str(input)?;
    let object = value.as_object().ok_or(FormatError::ExpectedObject)?;
    let resource_type = object
        .get("resourceType")
        .and_then(Json::as_str)
        .ok_or(FormatError::MissingResourceType)?;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_object(&mut writer, resource_type, object, Some(FHIR_NS))?;
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Convert FHIR XML text to pretty-printed FHIR JSON text
pub fn xml_to_json(input: &str) -> Result<String> {
    let doc = Document::parse(input)?;
    let root = doc.root_element();
    let object = element_object(input, &root, true)?;
    Ok(serde_json::to_string_pretty(&Json::Object(object))?)
}

fn write_object(
    writer: &mut XmlWriter,
    name: &str,
    object: &Map<String, Json>,
    namespace: Option<&str>,
) -> Result<()> {
    let is_resource = object.contains_key("resourceType");
    let mut start = BytesStart::new(name);
    if let Some(ns) = namespace {
        start.push_attribute(("xmlns", ns));
    }
    // Element ids and extension urls are attributes; resource ids are not
    if !is_resource {
        for attr in ["id", "url"] {
            if let Some(Json::String(text)) = object.get(attr) {
                start.push_attribute((attr, text.as_str()));
            }
        }
    }

    let children: Vec<(&String, &Json)> = object
        .iter()
        .filter(|(key, _)| key.as_str() != "resourceType")
        .filter(|(key, value)| is_resource || !(matches!(key.as_str(), "id" | "url") && value.is_string()))
        .collect();

    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for (key, value) in &children {
        if let Some(field) = key.strip_prefix('_') {
            // Metadata without a sibling value still needs an element
            if !object.contains_key(field) {
                write_property(writer, field, &Json::Null, Some(value))?;
            }
            continue;
        }
        write_property(writer, key, value, object.get(&format!("_{key}")))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_property(
    writer: &mut XmlWriter,
    name: &str,
    value: &Json,
    meta: Option<&Json>,
) -> Result<()> {
    if let (Json::Array(items), _) | (Json::Null, Some(Json::Array(items))) = (value, meta) {
        let metas = meta.and_then(Json::as_array);
        let values = value.as_array();
        for i in 0..items.len() {
            let item = values.and_then(|v| v.get(i)).unwrap_or(&Json::Null);
            let item_meta = metas.and_then(|m| m.get(i)).filter(|m| !m.is_null());
            write_property(writer, name, item, item_meta)?;
        }
        return Ok(());
    }

    match value {
        Json::Object(object) if object.contains_key("resourceType") => {
            let resource_type = object
                .get("resourceType")
                .and_then(Json::as_str)
                .ok_or(FormatError::MissingResourceType)?;
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            write_object(writer, resource_type, object, None)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            Ok(())
        }
        Json::Object(object) => write_object(writer, name, object, None),
        Json::String(div) if name == "div" => write_xhtml(writer, div),
        _ => write_scalar(writer, name, value, meta),
    }
}

fn write_scalar(
    writer: &mut XmlWriter,
    name: &str,
    value: &Json,
    meta: Option<&Json>,
) -> Result<()> {
    let meta = meta.and_then(Json::as_object);
    let mut start = BytesStart::new(name);
    if let Some(Json::String(id)) = meta.and_then(|m| m.get("id")) {
        start.push_attribute(("id", id.as_str()));
    }
    match value {
        Json::String(text) => start.push_attribute(("value", text.as_str())),
        Json::Number(n) => start.push_attribute(("value", n.to_string().as_str())),
        Json::Bool(b) => start.push_attribute(("value", if *b { "true" } else { "false" })),
        _ => {}
    }

    let extensions = meta.and_then(|m| m.get("extension"));
    match extensions {
        Some(ext) => {
            writer.write_event(Event::Start(start))?;
            write_property(writer, "extension", ext, None)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        None if value.is_null() && meta.is_none() => {}
        None => writer.write_event(Event::Empty(start))?,
    }
    Ok(())
}

fn element_object(source: &str, node: &Node, is_resource: bool) -> Result<Map<String, Json>> {
    let mut object = Map::new();
    if is_resource {
        object.insert(
            "resourceType".to_string(),
            Json::String(node.tag_name().name().to_string()),
        );
    }
    for attr in node.attributes() {
        object.insert(attr.name().to_string(), Json::String(attr.value().to_string()));
    }
    for child in node.children().filter(Node::is_element) {
        let name = child.tag_name().name();
        let (value, meta) = element_value(source, &child)?;
        append(&mut object, name, value, meta);
    }
    Ok(object)
}

fn element_value(source: &str, node: &Node) -> Result<(Json, Option<Json>)> {
    if node.tag_name().namespace() == Some(XHTML_NS) {
        return Ok((Json::String(source[node.range()].to_string()), None));
    }
    if node.tag_name().name() == "contained" {
        let inner = node
            .children()
            .find(Node::is_element)
            .ok_or_else(|| FormatError::ContainedShape("contained".to_string()))?;
        return Ok((Json::Object(element_object(source, &inner, true)?), None));
    }

    let Some(text) = node.attribute("value") else {
        return Ok((Json::Object(element_object(source, node, false)?), None));
    };

    let mut meta = Map::new();
    if let Some(id) = node.attribute("id") {
        meta.insert("id".to_string(), Json::String(id.to_string()));
    }
    let mut extensions = Vec::new();
    for child in node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "extension")
    {
        extensions.push(Json::Object(element_object(source, &child, false)?));
    }
    if !extensions.is_empty() {
        meta.insert("extension".to_string(), Json::Array(extensions));
    }
    Ok((guess_scalar(text), (!meta.is_empty()).then_some(Json::Object(meta))))
}

/// Add one occurrence of `name`, promoting to an array on repetition and
/// keeping the `_name` companion index-aligned.
fn append(object: &mut Map<String, Json>, name: &str, value: Json, meta: Option<Json>) {
    let meta_key = format!("_{name}");
    let previous = match object.get_mut(name) {
        None => {
            object.insert(name.to_string(), value);
            if let Some(meta) = meta {
                object.insert(meta_key, meta);
            }
            return;
        }
        Some(Json::Array(items)) => {
            items.push(value);
            items.len() - 1
        }
        Some(existing) => {
            let first = existing.take();
            *existing = Json::Array(vec![first, value]);
            1
        }
    };

    let mut metas = match object.remove(&meta_key) {
        Some(Json::Array(items)) if previous > 1 => items,
        Some(single) => vec![single],
        None => Vec::new(),
    };
    metas.resize(previous, Json::Null);
    metas.push(meta.unwrap_or(Json::Null));
    if metas.iter().any(|m| !m.is_null()) {
        object.insert(meta_key, Json::Array(metas));
    }
}

fn guess_scalar(text: &str) -> Json {
    match text {
        "true" => Json::Bool(true),
        "false" => Json::Bool(false),
        _ => text
            .parse::<i64>()
            .ok()
            .filter(|n| n.to_string() == text)
            .map(|n| Json::Number(Number::from(n)))
            .unwrap_or_else(|| Json::String(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_xml_writes_attributes_and_contained() {
        let json = r#"{
            "resourceType": "Organization",
            "id": "o1",
            "extension": [{ "url": "http://example.org/rank", "valueInteger": 3 }],
            "contained": [{ "resourceType": "Basic", "id": "b1", "code": { "text": "x" } }],
            "active": true,
            "alias": ["A", "B"]
        }"#;

        let xml = json_to_xml(json).unwrap();
        assert!(xml.contains(r#"<Organization xmlns="http://hl7.org/fhir">"#));
        assert!(xml.contains(r#"<id value="o1"/>"#));
        assert!(xml.contains(r#"<extension url="http://example.org/rank">"#));
        assert!(xml.contains(r#"<valueInteger value="3"/>"#));
        assert!(xml.contains("<contained>"));
        assert!(xml.contains(r#"<id value="b1"/>"#));
        assert!(xml.contains(r#"<alias value="A"/>"#));
        assert!(xml.contains(r#"<alias value="B"/>"#));
    }

    #[test]
    fn xml_to_json_guesses_scalars_and_groups_repeats() {
        let xml = r#"
        <Organization xmlns="http://hl7.org/fhir">
            <id value="o1"/>
            <active value="true"/>
            <alias value="A"/>
            <alias id="second" value="007"/>
        </Organization>"#;

        let json: Json = serde_json::from_str(&xml_to_json(xml).unwrap()).unwrap();
        assert_eq!(json["resourceType"], "Organization");
        assert_eq!(json["active"], true);
        // Leading zeros keep the string form
        assert_eq!(json["alias"], serde_json::json!(["A", "007"]));
        assert_eq!(json["_alias"], serde_json::json!([null, { "id": "second" }]));
    }

    #[test]
    fn metadata_without_value_survives() {
        let json = r#"{
            "resourceType": "Basic",
            "_created": { "extension": [{ "url": "http://example.org/absent", "valueCode": "unknown" }] }
        }"#;

        let xml = json_to_xml(json).unwrap();
        assert!(xml.contains("<created>"));
        let back: Json = serde_json::from_str(&xml_to_json(&xml).unwrap()).unwrap();
        assert_eq!(back["created"]["extension"]["url"], "http://example.org/absent");
    }
}
