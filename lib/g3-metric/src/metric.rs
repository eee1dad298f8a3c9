/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use serde_json::{Map, Number, Value};

use super::{MetricType, sanitize};

pub type DimensionMap = BTreeMap<String, String>;

/// A single dimensioned data point.
///
/// The name and all dimension keys and values are sanitized on the way in,
/// so a `Metric` can be handed to any handler as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metric {
    name: String,
    r#type: MetricType,
    value: f64,
    dimensions: DimensionMap,
}

impl Metric {
    pub fn new(name: &str) -> Self {
        Metric {
            name: sanitize(name).into_owned(),
            r#type: MetricType::Gauge,
            value: 0.0,
            dimensions: DimensionMap::new(),
        }
    }

    pub fn with_value(name: &str, value: f64) -> Self {
        let mut m = Metric::new(name);
        m.value = value;
        m
    }

    pub fn with_type(name: &str, r#type: MetricType, value: f64) -> Self {
        let mut m = Metric::with_value(name, value);
        m.r#type = r#type;
        m
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn r#type(&self) -> MetricType {
        self.r#type
    }

    #[inline]
    pub fn set_type(&mut self, r#type: MetricType) {
        self.r#type = r#type;
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    #[inline]
    pub fn dimensions(&self) -> &DimensionMap {
        &self.dimensions
    }

    pub fn add_dimension(&mut self, key: &str, value: &str) {
        self.dimensions.insert(
            sanitize(key).into_owned(),
            sanitize(value).into_owned(),
        );
    }

    /// Add all entries in ascending raw key order.
    ///
    /// If two raw keys sanitize to the same key, the value of the greater raw
    /// key is kept.
    pub fn add_dimensions(&mut self, dimensions: &DimensionMap) {
        for (k, v) in dimensions {
            self.add_dimension(k, v);
        }
    }

    pub fn remove_dimension(&mut self, key: &str) -> Option<String> {
        self.dimensions.remove(&*sanitize(key))
    }

    pub fn get_dimension_value(&self, key: &str) -> Option<&str> {
        self.dimensions
            .get(&*sanitize(key))
            .map(|v| v.as_str())
    }

    /// Get the dimensions overlaid on the defaults, own values win.
    pub fn dimensions_with(&self, defaults: &DimensionMap) -> DimensionMap {
        let mut map = defaults.clone();
        for (k, v) in &self.dimensions {
            map.insert(k.clone(), v.clone());
        }
        map
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(4);
        map.insert("name".to_string(), Value::String(self.name.clone()));
        map.insert(
            "type".to_string(),
            Value::String(self.r#type.as_str().to_string()),
        );
        let value = Number::from_f64(self.value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        map.insert("value".to_string(), value);
        let mut dim_map = Map::with_capacity(self.dimensions.len());
        for (k, v) in &self.dimensions {
            dim_map.insert(k.clone(), Value::String(v.clone()));
        }
        map.insert("dimensions".to_string(), Value::Object(dim_map));
        Value::Object(map)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        let mut iter = self.dimensions.iter();
        if let Some((k, v)) = iter.next() {
            f.write_char('{')?;
            write!(f, "{k}={v}")?;
            for (k, v) in iter {
                write!(f, ",{k}={v}")?;
            }
            f.write_char('}')?;
        }
        f.write_char(' ')?;
        f.write_str(ryu::Buffer::new().format(self.value))?;
        f.write_char(' ')?;
        f.write_str(self.r#type.as_str())
    }
}

/// Add the dimensions to every metric in place.
pub fn add_to_all(metrics: &mut [Metric], extra: &DimensionMap) {
    for m in metrics.iter_mut() {
        m.add_dimensions(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(&str, &str)]) -> DimensionMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn new() {
        let m = Metric::new("TestMetric");
        assert_eq!(m.name(), "TestMetric");
        assert_eq!(m.value(), 0.0);
        assert_eq!(m.r#type(), MetricType::Gauge);
        assert!(m.dimensions().is_empty());

        let m = Metric::new("host:port=1");
        assert_eq!(m.name(), "host-port-1");

        let m = Metric::with_value("v", 1.5);
        assert_eq!(m.value(), 1.5);
        assert_eq!(m.r#type(), MetricType::Gauge);
    }

    #[test]
    fn add_dimension() {
        let mut m = Metric::new("TestMetric");
        m.add_dimension("TestDimension", "test value");
        assert_eq!(m.dimensions().len(), 1);
        assert_eq!(m.get_dimension_value("TestDimension"), Some("test value"));

        m.add_dimension("a:b", "c=d");
        assert_eq!(m.get_dimension_value("a-b"), Some("c-d"));
        assert_eq!(m.get_dimension_value("a:b"), Some("c-d"));

        m.add_dimension("TestDimension", "other");
        assert_eq!(m.dimensions().len(), 2);
        assert_eq!(m.get_dimension_value("TestDimension"), Some("other"));
    }

    #[test]
    fn add_dimension_idempotent() {
        let mut m = Metric::new("m");
        m.add_dimension("key", "value");
        let before = m.clone();
        m.add_dimension("key", "value");
        assert_eq!(m, before);
    }

    #[test]
    fn add_dimensions_collision() {
        let mut m = Metric::new("m");
        m.add_dimensions(&dims(&[("a:b", "first"), ("a=b", "second")]));
        assert_eq!(m.dimensions().len(), 1);
        // ':' sorts before '=', so the '=' key is applied last
        assert_eq!(m.get_dimension_value("a-b"), Some("second"));
    }

    #[test]
    fn remove_dimension() {
        let mut m = Metric::new("m");
        m.add_dimension("a", "1");
        assert_eq!(m.remove_dimension("a").as_deref(), Some("1"));
        assert_eq!(m.remove_dimension("a"), None);
        assert_eq!(m.get_dimension_value("a"), None);
    }

    #[test]
    fn dimensions_with_defaults() {
        let defaults = DimensionMap::new();
        let m = Metric::new("TestMetric");
        assert!(m.dimensions_with(&defaults).is_empty());

        let defaults = dims(&[("DefaultDim", "default value"), ("shared", "default")]);
        let mut m = Metric::new("TestMetric");
        m.add_dimension("TestDimension", "test value");
        m.add_dimension("shared", "own");
        let all = m.dimensions_with(&defaults);
        assert_eq!(all.len(), 3);
        assert_eq!(all.get("shared").map(|s| s.as_str()), Some("own"));
        assert_eq!(
            all.get("DefaultDim").map(|s| s.as_str()),
            Some("default value")
        );

        // neither side is touched
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults.get("shared").map(|s| s.as_str()), Some("default"));
        assert_eq!(m.dimensions().len(), 2);
    }

    #[test]
    fn equality() {
        let mut a = Metric::with_type("m", MetricType::Counter, 2.0);
        a.add_dimension("x", "1");
        a.add_dimension("y", "2");
        let mut b = Metric::with_type("m", MetricType::Counter, 2.0);
        b.add_dimension("y", "2");
        b.add_dimension("x", "1");
        assert_eq!(a, b);

        b.set_type(MetricType::Gauge);
        assert_ne!(a, b);
        b.set_type(MetricType::Counter);
        b.set_value(3.0);
        assert_ne!(a, b);
    }

    #[test]
    fn json() {
        let mut m = Metric::with_type("jetty.requests", MetricType::CumulativeCounter, 12.0);
        m.add_dimension("service", "web");
        m.add_dimension("port", "8080");
        assert_eq!(
            m.to_json().to_string(),
            r#"{"dimensions":{"port":"8080","service":"web"},"name":"jetty.requests","type":"cumcounter","value":12.0}"#
        );
    }

    #[test]
    fn display() {
        let mut m = Metric::with_type("a.b", MetricType::Counter, 3.0);
        assert_eq!(m.to_string(), "a.b 3.0 counter");
        m.add_dimension("k", "v");
        m.add_dimension("j", "w");
        assert_eq!(m.to_string(), "a.b{j=w,k=v} 3.0 counter");
    }

    #[test]
    fn to_all() {
        let mut metrics = vec![Metric::new("a"), Metric::new("b")];
        add_to_all(&mut metrics, &dims(&[("service", "web"), ("port", "80")]));
        for m in &metrics {
            assert_eq!(m.get_dimension_value("service"), Some("web"));
            assert_eq!(m.get_dimension_value("port"), Some("80"));
        }
    }
}
