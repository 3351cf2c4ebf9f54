use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use std::{fs, path::PathBuf};
use strata_models::{
    Choice, Error, FieldValue, ParseError, Primitive, PrimitiveType, ResourceInstance, SchemaError,
    SchemaRegistry, Value,
};

fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn load_fixture(name: &str) -> String {
    let path = fixtures_root().join(name);
    assert!(path.exists(), "fixture missing at {:?}", path);
    fs::read_to_string(&path).expect("failed to read fixture")
}

fn fixture_names() -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(fixtures_root())
        .expect("fixture directory")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".json"))
        .collect();
    names.sort();
    names
}

fn registry() -> &'static SchemaRegistry {
    SchemaRegistry::r4()
}

fn descriptor(name: &str) -> std::sync::Arc<strata_models::ResourceDescriptor> {
    registry().require(name).unwrap().clone()
}

#[test]
fn fixtures_round_trip_to_identical_text() {
    let names = fixture_names();
    assert!(!names.is_empty());

    for name in names {
        let text = load_fixture(&name);
        let json: Json = serde_json::from_str(&text).unwrap();
        let instance = ResourceInstance::from_json_value(registry(), &json)
            .unwrap_or_else(|e| panic!("{name}: {e}"));

        let out = serde_json::to_string_pretty(&instance.to_json_value()).unwrap();
        assert_eq!(out, text.trim_end(), "{name}");

        let again = ResourceInstance::from_json_value(registry(), &instance.to_json_value()).unwrap();
        assert_eq!(again, instance, "{name}");
    }
}

#[test]
fn operation_outcome_round_trips_to_identical_json() {
    let issue = ResourceInstance::construct(
        descriptor("OperationOutcome.issue"),
        [("severity", "error"), ("code", "invalid")],
    )
    .unwrap();
    let outcome =
        ResourceInstance::construct(descriptor("OperationOutcome"), [("issue", vec![Value::from(issue)])])
            .unwrap();

    let json = outcome.to_json_value();
    assert_eq!(
        json,
        json!({
            "resourceType": "OperationOutcome",
            "issue": [{ "severity": "error", "code": "invalid" }]
        })
    );

    let parsed = ResourceInstance::from_json_value(registry(), &json).unwrap();
    assert_eq!(parsed, outcome);
    assert_eq!(
        serde_json::to_string(&parsed.to_json_value()).unwrap(),
        serde_json::to_string(&json).unwrap()
    );
}

#[test]
fn device_use_statement_rejects_two_timings() {
    let period = ResourceInstance::construct(
        descriptor("Period"),
        [("start", "2020-01-01"), ("end", "2020-02-01")],
    )
    .unwrap();
    let reference = |target: &str| {
        ResourceInstance::construct(descriptor("Reference"), [("reference", target)]).unwrap()
    };

    let err = ResourceInstance::construct(
        descriptor("DeviceUseStatement"),
        vec![
            ("status", FieldValue::from("active")),
            ("subject", FieldValue::from(reference("Patient/1"))),
            ("device", FieldValue::from(reference("Device/1"))),
            ("timingDateTime", FieldValue::from("2020-01-01")),
            ("timingPeriod", FieldValue::from(period)),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, Error::Schema(SchemaError::ChoiceConflict { .. })));

    let err = ResourceInstance::from_json_value(
        registry(),
        &json!({
            "resourceType": "DeviceUseStatement",
            "status": "active",
            "subject": { "reference": "Patient/1" },
            "timingDateTime": "2020-01-01",
            "timingPeriod": { "start": "2020-01-01" },
            "device": { "reference": "Device/1" }
        }),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Parse(ParseError::AmbiguousChoice { .. })));
}

#[test]
fn module_choice_keeps_exactly_one_alternative() {
    let mut response = ResourceInstance::new(descriptor("GuidanceResponse"));
    response.set("status", "success").unwrap();
    response
        .set("moduleCanonical", "http://example.org/PlanDefinition/a")
        .unwrap();

    assert!(response.set("moduleUri", "http://example.org/a").is_err());
    response
        .set("module", Choice::new("uri", "http://example.org/a"))
        .unwrap();

    let json = response.to_json_value();
    let module_keys: Vec<&String> = json
        .as_object()
        .unwrap()
        .keys()
        .filter(|k| k.starts_with("module"))
        .collect();
    assert_eq!(module_keys, vec!["moduleUri"]);
}

#[test]
fn strict_parse_requires_fields_lenient_does_not() {
    let json = json!({ "resourceType": "Endpoint", "status": "active" });

    let err = ResourceInstance::from_json_value(registry(), &json).unwrap_err();
    assert_eq!(err.to_string(), "Missing required field: Endpoint.connectionType");

    let endpoint = ResourceInstance::from_json_value_with(
        registry(),
        &json,
        &strata_models::ParseOptions::lenient(),
    )
    .unwrap();
    let missing: Vec<&str> = endpoint
        .missing_required()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(missing, vec!["connectionType", "payloadType", "address"]);
}

#[test]
fn custom_descriptors_from_directory() {
    let dir = std::env::temp_dir().join(format!("strata-models-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("widget.yaml"),
        r#"
name: Widget
kind: resource
base: DomainResource
elements:
  - name: label
    type: string
    min: 1
"#,
    )
    .unwrap();

    let registry = SchemaRegistry::builder()
        .with_r4_core()
        .unwrap()
        .add_dir(&dir)
        .unwrap()
        .build()
        .unwrap();
    fs::remove_dir_all(&dir).ok();

    assert!(registry.resource_types().contains(&"Widget"));
    let widget = ResourceInstance::from_json_value(
        &registry,
        &json!({ "resourceType": "Widget", "label": "sprocket" }),
    )
    .unwrap();
    assert_eq!(
        widget.get("label").unwrap().and_then(|f| f.as_single()).and_then(Value::as_str),
        Some("sprocket")
    );
}

#[test]
fn decimals_keep_their_lexical_form() {
    let decimal = Primitive::parse_lexical(PrimitiveType::Decimal, "1.50").unwrap();
    assert_eq!(decimal.to_lexical(), "1.50");
    assert_eq!(decimal.to_json().to_string(), "1.50");
    assert!(Primitive::parse_lexical(PrimitiveType::Decimal, "1,5").is_none());

    let json: Json = serde_json::from_str(r#"{ "value": 0.10, "unit": "mg" }"#).unwrap();
    let quantity =
        ResourceInstance::from_serializable(registry(), &descriptor("Quantity"), json.as_object().unwrap())
            .unwrap();
    assert_eq!(
        serde_json::to_string(&quantity.to_json_value()).unwrap(),
        r#"{"value":0.10,"unit":"mg"}"#
    );
}
