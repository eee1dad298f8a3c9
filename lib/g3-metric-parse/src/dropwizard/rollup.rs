/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use serde_json::{Map, Value};

use g3_metric::{Metric, MetricType};

pub(super) const ROLLUP_COUNT: &str = "count";
pub(super) const ROLLUP_VALUE: &str = "value";

const DIMENSION_ROLLUP: &str = "rollup";
const DIMENSION_TYPE: &str = "type";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum LeafKind {
    Gauge,
    Counter,
    Histogram,
    Meter,
    Timer,
    Rate,
}

impl LeafKind {
    pub(super) fn as_str(&self) -> &'static str {
        match self {
            LeafKind::Gauge => "gauge",
            LeafKind::Counter => "counter",
            LeafKind::Histogram => "histogram",
            LeafKind::Meter => "meter",
            LeafKind::Timer => "timer",
            LeafKind::Rate => "rate",
        }
    }

    fn metric_type(&self, rollup: &str) -> MetricType {
        match self {
            LeafKind::Gauge => MetricType::Gauge,
            LeafKind::Counter => MetricType::Counter,
            _ => {
                if rollup == ROLLUP_COUNT {
                    MetricType::Counter
                } else {
                    MetricType::Gauge
                }
            }
        }
    }
}

/// Check for the `m<digits>_rate` pattern anywhere in the rollup name.
pub(super) fn is_metered_rate(rollup: &str) -> bool {
    let b = rollup.as_bytes();
    let mut offset = 0;
    while let Some(p) = memchr::memchr(b'm', &b[offset..]) {
        let digits_start = offset + p + 1;
        let digits_len = b[digits_start..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits_len > 0 && b[digits_start + digits_len..].starts_with(b"_rate") {
            return true;
        }
        offset = digits_start;
    }
    false
}

pub(super) fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Turns the `(rollup, value)` pairs of one flattened map into metrics.
#[derive(Clone, Copy)]
pub(super) struct RollupEmitter {
    cc_enabled: bool,
}

impl RollupEmitter {
    pub(super) fn new(cc_enabled: bool) -> Self {
        RollupEmitter { cc_enabled }
    }

    /// Emit one metric for a single rollup, if the value is numeric.
    pub(super) fn emit(
        &self,
        name: &str,
        kind: LeafKind,
        rollup: &str,
        value: &Value,
    ) -> Option<Metric> {
        let value = as_number(value)?;

        if !self.cc_enabled {
            let mut m = Metric::with_type(name, kind.metric_type(rollup), value);
            m.add_dimension(DIMENSION_TYPE, kind.as_str());
            return Some(m);
        }

        if is_metered_rate(rollup) {
            return None;
        }
        let mut m = match rollup {
            ROLLUP_VALUE => Metric::with_type(name, kind.metric_type(rollup), value),
            ROLLUP_COUNT => Metric::with_type(
                &format!("{name}.{rollup}"),
                MetricType::CumulativeCounter,
                value,
            ),
            _ => Metric::with_type(&format!("{name}.{rollup}"), MetricType::Gauge, value),
        };
        m.add_dimension(DIMENSION_ROLLUP, rollup);
        Some(m)
    }

    /// Emit metrics for every numeric entry of the map, except the skipped keys.
    pub(super) fn emit_map(
        &self,
        name: &str,
        kind: LeafKind,
        map: &Map<String, Value>,
        skip_keys: &[&str],
        results: &mut Vec<Metric>,
    ) {
        for (rollup, value) in map {
            if skip_keys.contains(&rollup.as_str()) {
                continue;
            }
            if let Some(m) = self.emit(name, kind, rollup, value) {
                results.push(m);
            }
        }
    }

    /// Emit a gauge for a value that matched no known shape.
    pub(super) fn emit_plain_gauge(&self, name: &str, value: &Value) -> Option<Metric> {
        let value = as_number(value)?;
        let mut m = Metric::with_value(name, value);
        if self.cc_enabled {
            m.add_dimension(DIMENSION_ROLLUP, ROLLUP_VALUE);
        }
        Some(m)
    }
}
