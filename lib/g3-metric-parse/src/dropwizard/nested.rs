/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::VecDeque;

use serde_json::{Map, Value};

use g3_metric::Metric;

use super::rollup::{LeafKind, ROLLUP_COUNT, ROLLUP_VALUE, RollupEmitter};

const KEY_TYPE: &str = "type";
const KEY_UNIT: &str = "unit";
const KEY_EVENT_TYPE: &str = "event_type";

struct UnvisitedNode<'a> {
    segments: Vec<&'a str>,
    map: &'a Map<String, Value>,
}

/// Walk an arbitrarily nested tree until flattened maps are found.
///
/// The keys on the way down are joined with `.` to build the metric name:
///
/// ```text
/// {"jetty": {"requests": {"30x-response": {"count": 0, "type": "counter"}}}}
/// ```
///
/// yields a counter named `jetty.requests.30x-response`. Scalars which match
/// no known shape are kept as plain gauges named after their own key. Object
/// children of a node are always visited, even if the node has scalars.
pub(super) fn parse_nested_map(
    root: &Map<String, Value>,
    skip_root_keys: &[&str],
    emitter: RollupEmitter,
) -> Vec<Metric> {
    let mut results = Vec::new();
    let mut unvisited = VecDeque::new();
    unvisited.push_back(UnvisitedNode {
        segments: Vec::new(),
        map: root,
    });

    while let Some(node) = unvisited.pop_front() {
        let is_root = node.segments.is_empty();
        let mut has_scalar = false;

        for (k, v) in node.map {
            if is_root && skip_root_keys.contains(&k.as_str()) {
                continue;
            }
            match v {
                Value::Object(child) => {
                    let mut segments = node.segments.clone();
                    segments.push(k);
                    unvisited.push_back(UnvisitedNode {
                        segments,
                        map: child,
                    });
                }
                _ => has_scalar = true,
            }
        }
        if !has_scalar {
            continue;
        }

        let name = node.segments.join(".");
        let found = parse_flattened_map(&name, node.map, emitter, &mut results);
        if found > 0 {
            continue;
        }

        for (k, v) in node.map {
            if matches!(v, Value::Object(_)) || (is_root && skip_root_keys.contains(&k.as_str()))
            {
                continue;
            }
            let name = if name.is_empty() {
                k.clone()
            } else {
                format!("{name}.{k}")
            };
            if let Some(m) = emitter.emit_plain_gauge(&name, v) {
                results.push(m);
            }
        }
    }

    results
}

/// Classify the flattened map and emit its metrics, return how many were found.
fn parse_flattened_map(
    name: &str,
    map: &Map<String, Value>,
    emitter: RollupEmitter,
    results: &mut Vec<Metric>,
) -> usize {
    let old_len = results.len();

    match map.get(KEY_TYPE).and_then(Value::as_str) {
        Some("gauge") => {
            // {"value": 0.985, "type": "gauge"}
            if map.contains_key(ROLLUP_VALUE) {
                emitter.emit_map(name, LeafKind::Gauge, map, &[], results);
            }
        }
        Some("histogram") => {
            // {"type": "histogram", "count": 1, "min": 2, "max": 2, "p99": 2, ...}
            if map.contains_key(ROLLUP_COUNT) {
                emitter.emit_map(name, LeafKind::Histogram, map, &[KEY_TYPE], results);
            }
        }
        Some("counter") => {
            // {"count": 0, "type": "counter"}
            if map.contains_key(ROLLUP_COUNT) {
                emitter.emit_map(name, LeafKind::Counter, map, &[], results);
            }
        }
        Some("meter") => {
            // {"m1": 0, "mean": 0, "count": 0, "unit": "seconds", "event_type": "requests", "type": "meter"}
            if has_meter_units(map) {
                emitter.emit_map(
                    name,
                    LeafKind::Meter,
                    map,
                    &[KEY_UNIT, KEY_EVENT_TYPE, KEY_TYPE],
                    results,
                );
            }
        }
        _ => {
            // {"m1": 0, "mean": 0, "count": 0, "unit": "seconds"}
            if matches!(
                map.get(KEY_UNIT).and_then(Value::as_str),
                Some("seconds" | "milliseconds")
            ) {
                emitter.emit_map(name, LeafKind::Rate, map, &[KEY_UNIT], results);
            }
        }
    }

    results.len() - old_len
}

fn has_meter_units(map: &Map<String, Value>) -> bool {
    map.contains_key(KEY_EVENT_TYPE)
        && matches!(
            map.get(KEY_UNIT).and_then(Value::as_str),
            Some("seconds" | "milliseconds" | "minutes")
        )
}
