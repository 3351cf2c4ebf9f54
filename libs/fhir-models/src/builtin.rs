//! Descriptor files compiled into the crate

/// Bundled FHIR R4 descriptors, as (file name, contents) pairs
pub(crate) const R4_CORE: &[(&str, &str)] = &[
    ("base.json", include_str!("../resources/r4/base.json")),
    ("datatypes.json", include_str!("../resources/r4/datatypes.json")),
    ("Basic.json", include_str!("../resources/r4/resources/Basic.json")),
    (
        "CatalogEntry.json",
        include_str!("../resources/r4/resources/CatalogEntry.json"),
    ),
    (
        "DeviceMetric.json",
        include_str!("../resources/r4/resources/DeviceMetric.json"),
    ),
    (
        "DeviceUseStatement.json",
        include_str!("../resources/r4/resources/DeviceUseStatement.json"),
    ),
    (
        "Endpoint.json",
        include_str!("../resources/r4/resources/Endpoint.json"),
    ),
    (
        "GuidanceResponse.json",
        include_str!("../resources/r4/resources/GuidanceResponse.json"),
    ),
    (
        "OperationOutcome.json",
        include_str!("../resources/r4/resources/OperationOutcome.json"),
    ),
    (
        "Organization.json",
        include_str!("../resources/r4/resources/Organization.json"),
    ),
];
