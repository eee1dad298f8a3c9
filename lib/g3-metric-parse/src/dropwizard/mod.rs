/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use serde_json::{Map, Value};
use thiserror::Error;

use g3_metric::{DimensionMap, Metric, add_to_all};

mod rollup;

mod nested;
use nested::parse_nested_map;

mod bucket;
use bucket::{EntryNameFormat, json_to_dimensions, parse_buckets};

const KEY_SERVICE_DIMS: &str = "service_dims";

#[derive(Debug, Error)]
pub enum DropwizardParseError {
    #[error("invalid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("top level value is not an object")]
    NotAnObject,
    #[error("invalid value type for bucket {0}")]
    InvalidBucket(&'static str),
    #[error("invalid value type for entry {0}")]
    InvalidEntry(String),
}

/// The payload layout announced by the `Metrics-Schema` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Top level buckets, or an arbitrarily nested tree if no bucket matched.
    Legacy,
    /// `uwsgi.1.0` and `uwsgi.1.1`
    Uwsgi,
    /// `java-1.1`, with dimensions embedded in the entry names
    Java,
}

impl SchemaVersion {
    pub fn from_header(value: &str) -> Self {
        match value {
            "uwsgi.1.0" | "uwsgi.1.1" => SchemaVersion::Uwsgi,
            "java-1.1" => SchemaVersion::Java,
            _ => SchemaVersion::Legacy,
        }
    }
}

/// Parse a Dropwizard style json payload into metrics.
///
/// `service_dims` found at the top level are added to every metric.
pub fn parse(
    raw: &[u8],
    schema_version: &str,
    cc_enabled: bool,
) -> Result<Vec<Metric>, DropwizardParseError> {
    let Value::Object(root) = serde_json::from_slice::<Value>(raw)? else {
        return Err(DropwizardParseError::NotAnObject);
    };
    parse_map(&root, SchemaVersion::from_header(schema_version), cc_enabled)
}

/// Same as [`parse`], for an already decoded top level object.
pub fn parse_map(
    root: &Map<String, Value>,
    version: SchemaVersion,
    cc_enabled: bool,
) -> Result<Vec<Metric>, DropwizardParseError> {
    let emitter = rollup::RollupEmitter::new(cc_enabled);

    let mut metrics = match version {
        SchemaVersion::Uwsgi => parse_buckets(root, EntryNameFormat::Plain, emitter)?,
        SchemaVersion::Java => parse_buckets(root, EntryNameFormat::WithDimensions, emitter)?,
        SchemaVersion::Legacy => {
            let metrics = parse_buckets(root, EntryNameFormat::Plain, emitter)?;
            if metrics.is_empty() {
                parse_nested_map(root, &[KEY_SERVICE_DIMS], emitter)
            } else {
                metrics
            }
        }
    };

    if let Some(Value::Object(map)) = root.get(KEY_SERVICE_DIMS) {
        add_to_all(&mut metrics, &json_to_dimensions(map));
    }
    Ok(metrics)
}

/// Get the top level `service_dims` of the payload, empty on any failure.
pub fn extract_service_dims(raw: &[u8]) -> DimensionMap {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(root)) => match root.get(KEY_SERVICE_DIMS) {
            Some(Value::Object(map)) => json_to_dimensions(map),
            _ => DimensionMap::new(),
        },
        _ => DimensionMap::new(),
    }
}
