/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use serde_json::{Map, Value};

use g3_metric::{DimensionMap, Metric};

use super::DropwizardParseError;
use super::rollup::{LeafKind, RollupEmitter};

const BUCKETS: [(&str, LeafKind); 5] = [
    ("gauges", LeafKind::Gauge),
    ("counters", LeafKind::Counter),
    ("histograms", LeafKind::Histogram),
    ("meters", LeafKind::Meter),
    ("timers", LeafKind::Timer),
];

const KEY_NAME: &str = "name";
const KEY_DIMENSIONS: &str = "dimensions";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum EntryNameFormat {
    Plain,
    /// `base.name,k1=v1,k2=v2`
    WithDimensions,
}

impl EntryNameFormat {
    fn split<'a>(&self, raw: &'a str) -> (&'a str, DimensionMap) {
        let mut dims = DimensionMap::new();
        if *self == EntryNameFormat::Plain {
            return (raw, dims);
        }

        let mut iter = raw.split(',');
        let base = iter.next().unwrap_or(raw);
        for part in iter {
            if let Some((k, v)) = part.split_once('=') {
                dims.insert(k.to_string(), v.to_string());
            }
        }
        (base, dims)
    }
}

/// Convert a flat json map to dimensions, nested values are ignored.
pub(super) fn json_to_dimensions(map: &Map<String, Value>) -> DimensionMap {
    let mut dims = DimensionMap::new();
    for (k, v) in map {
        let v = match v {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        dims.insert(k.clone(), v);
    }
    dims
}

/// Parse the `gauges`, `counters`, `histograms`, `meters` and `timers` buckets.
///
/// Each bucket is either a map of `name -> rollups`, or a list of rollup maps
/// with an explicit `name` field and optional `dimensions`.
pub(super) fn parse_buckets(
    root: &Map<String, Value>,
    name_format: EntryNameFormat,
    emitter: RollupEmitter,
) -> Result<Vec<Metric>, DropwizardParseError> {
    let mut results = Vec::new();

    for (bucket, kind) in BUCKETS {
        let Some(v) = root.get(bucket) else {
            continue;
        };
        match v {
            Value::Null => {}
            Value::Object(entries) => {
                for (raw_name, entry) in entries {
                    let Value::Object(data) = entry else {
                        return Err(DropwizardParseError::InvalidEntry(format!(
                            "{bucket}.{raw_name}"
                        )));
                    };
                    let (name, dims) = name_format.split(raw_name);
                    emit_entry(name, kind, data, &[], &dims, emitter, &mut results);
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let Value::Object(data) = item else {
                        return Err(DropwizardParseError::InvalidEntry(format!("{bucket}[{i}]")));
                    };
                    let Some(raw_name) = data.get(KEY_NAME).and_then(Value::as_str) else {
                        continue;
                    };
                    let (name, mut dims) = name_format.split(raw_name);
                    if let Some(Value::Object(map)) = data.get(KEY_DIMENSIONS) {
                        dims.extend(json_to_dimensions(map));
                    }
                    emit_entry(
                        name,
                        kind,
                        data,
                        &[KEY_NAME, KEY_DIMENSIONS],
                        &dims,
                        emitter,
                        &mut results,
                    );
                }
            }
            _ => return Err(DropwizardParseError::InvalidBucket(bucket)),
        }
    }

    Ok(results)
}

fn emit_entry(
    name: &str,
    kind: LeafKind,
    data: &Map<String, Value>,
    skip_keys: &[&str],
    dims: &DimensionMap,
    emitter: RollupEmitter,
    results: &mut Vec<Metric>,
) {
    let old_len = results.len();
    emitter.emit_map(name, kind, data, skip_keys, results);
    if !dims.is_empty() {
        for m in &mut results[old_len..] {
            m.add_dimensions(dims);
        }
    }
}
