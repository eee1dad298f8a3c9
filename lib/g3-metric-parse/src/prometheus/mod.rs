/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use ahash::AHashMap;
use log::debug;
use thiserror::Error;

use g3_metric::{DimensionMap, Metric, MetricNameSet, MetricType, name_allowed};

mod line;
use line::{LineParser, PromEntry, Sample};

/// The value of the `Accept` header used when scraping.
pub const ACCEPT_HEADER_VALUE: &str =
    "application/openmetrics-text; version=0.0.1,text/plain;version=0.0.4;q=0.5,*/*;q=0.1";

const LABEL_METRIC_NAME: &str = "__name__";

const FAMILY_SUFFIXES: [&str; 5] = ["_sum", "_count", "_bucket", "_total", "_created"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromParseErrorKind {
    #[error("invalid utf-8 text")]
    InvalidUtf8,
    #[error("invalid metric name")]
    InvalidName,
    #[error("invalid TYPE line")]
    InvalidTypeLine,
    #[error("unsupported metric type")]
    UnsupportedType,
    #[error("invalid label set: {0}")]
    InvalidLabels(&'static str),
    #[error("no value field")]
    NoValue,
    #[error("invalid value field")]
    InvalidValue,
    #[error("invalid timestamp field")]
    InvalidTimestamp,
}

#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct PromParseError {
    pub line: usize,
    pub kind: PromParseErrorKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromType {
    Counter,
    Gauge,
    Histogram,
    GaugeHistogram,
    Summary,
    StateSet,
    Info,
    Unknown,
}

impl FromStr for PromType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(PromType::Counter),
            "gauge" => Ok(PromType::Gauge),
            "histogram" => Ok(PromType::Histogram),
            "gaugehistogram" => Ok(PromType::GaugeHistogram),
            "summary" => Ok(PromType::Summary),
            "stateset" => Ok(PromType::StateSet),
            "info" => Ok(PromType::Info),
            "untyped" | "unknown" => Ok(PromType::Unknown),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpositionFormat {
    Text,
    OpenMetrics,
}

impl ExpositionFormat {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type
            .trim_start()
            .starts_with("application/openmetrics-text")
        {
            ExpositionFormat::OpenMetrics
        } else {
            ExpositionFormat::Text
        }
    }
}

struct PromEntryVisitor<'a> {
    buf: &'a [u8],
    offset: usize,
    line_number: usize,
    format: ExpositionFormat,
}

impl<'a> PromEntryVisitor<'a> {
    fn new(buf: &'a [u8], format: ExpositionFormat) -> Self {
        PromEntryVisitor {
            buf,
            offset: 0,
            line_number: 0,
            format,
        }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.offset >= self.buf.len() {
            return None;
        }

        self.line_number += 1;
        let left = &self.buf[self.offset..];
        match memchr::memchr(b'\n', left) {
            Some(p) => {
                self.offset += p + 1;
                Some(&left[..p])
            }
            None => {
                self.offset = self.buf.len();
                Some(left)
            }
        }
    }

    fn error(&self, kind: PromParseErrorKind) -> PromParseError {
        PromParseError {
            line: self.line_number,
            kind,
        }
    }
}

impl<'a> Iterator for PromEntryVisitor<'a> {
    type Item = Result<PromEntry<'a>, PromParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.next_line()?;
            let Ok(line) = std::str::from_utf8(line) else {
                return Some(Err(self.error(PromParseErrorKind::InvalidUtf8)));
            };

            match LineParser::new(line, self.format).parse() {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => {}
                Err(kind) => return Some(Err(self.error(kind))),
            }
        }
    }
}

fn trim_suffix<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name.len() > suffix.len() {
        name.strip_suffix(suffix)
    } else {
        None
    }
}

fn lookup_family(families: &AHashMap<&str, PromType>, name: &str) -> Option<PromType> {
    if let Some(t) = families.get(name) {
        return Some(*t);
    }
    FAMILY_SUFFIXES
        .iter()
        .filter_map(|suffix| trim_suffix(name, suffix))
        .find_map(|base| families.get(base).copied())
}

/// Get the base name, the metric type and the suffix to append to the base name.
fn convert_sample<'a>(
    name: &'a str,
    r#type: PromType,
) -> Option<(&'a str, MetricType, &'static str)> {
    match r#type {
        PromType::Gauge => Some((name, MetricType::Gauge, "")),
        PromType::Counter => Some((name, MetricType::CumulativeCounter, "")),
        PromType::Summary => {
            if let Some(base) = trim_suffix(name, "_sum") {
                Some((base, MetricType::CumulativeCounter, ""))
            } else if let Some(base) = trim_suffix(name, "_count") {
                Some((base, MetricType::CumulativeCounter, "_count"))
            } else {
                Some((name, MetricType::Gauge, "_quantile"))
            }
        }
        PromType::Histogram => {
            if let Some(base) = trim_suffix(name, "_sum") {
                Some((base, MetricType::CumulativeCounter, ""))
            } else if let Some(base) = trim_suffix(name, "_count") {
                Some((base, MetricType::CumulativeCounter, "_count"))
            } else if let Some(base) = trim_suffix(name, "_bucket") {
                Some((base, MetricType::CumulativeCounter, "_bucket"))
            } else {
                Some((name, MetricType::CumulativeCounter, ""))
            }
        }
        _ => None,
    }
}

fn sample_to_metric(
    sample: &Sample<'_>,
    name: &str,
    r#type: MetricType,
    generated_dimensions: &DimensionMap,
) -> Metric {
    let mut m = Metric::with_type(name, r#type, sample.value);
    for (k, v) in &sample.labels {
        if *k != LABEL_METRIC_NAME {
            m.add_dimension(k, v);
        }
    }
    m.add_dimensions(generated_dimensions);
    m
}

/// Extract metrics from a Prometheus text or OpenMetrics exposition body.
///
/// Samples are typed by the `# TYPE` line of their family, and those of an
/// unsupported or undeclared type are skipped. The whitelist and blacklist
/// match the base family name as exposed, so a recording rule family is
/// listed as `job:requests:rate5m` even though the emitted metric name is
/// sanitized to `job-requests-rate5m`. The prefix is prepended as is.
///
/// Any parse error fails the whole body.
pub fn extract_metrics(
    body: &[u8],
    content_type: &str,
    whitelist: Option<&MetricNameSet>,
    blacklist: Option<&MetricNameSet>,
    prefix: &str,
    generated_dimensions: &DimensionMap,
) -> Result<Vec<Metric>, PromParseError> {
    let format = ExpositionFormat::from_content_type(content_type);
    let mut families: AHashMap<&str, PromType> = AHashMap::new();
    let mut metrics = Vec::new();

    for entry in PromEntryVisitor::new(body, format) {
        let sample = match entry? {
            PromEntry::Type { name, r#type } => {
                families.insert(name, r#type);
                continue;
            }
            PromEntry::Eof => break,
            PromEntry::Sample(sample) => sample,
        };

        let Some(family_type) = lookup_family(&families, sample.name) else {
            debug!("skip sample {}: no TYPE declared", sample.name);
            continue;
        };
        let Some((base, metric_type, suffix)) = convert_sample(sample.name, family_type) else {
            debug!(
                "skip sample {}: unsupported type {family_type:?}",
                sample.name
            );
            continue;
        };
        if !name_allowed(whitelist, blacklist, base) {
            continue;
        }

        let name = format!("{prefix}{base}{suffix}");
        metrics.push(sample_to_metric(
            &sample,
            &name,
            metric_type,
            generated_dimensions,
        ));
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

    const BODY: &[u8] = br#"
# HELP go_memstats_last_gc_time_seconds Number of seconds since 1970 of last garbage collection.
# TYPE go_memstats_last_gc_time_seconds gauge
go_memstats_last_gc_time_seconds 1.579737845727797e+09
# HELP process_open_fds Number of open file descriptors.
# TYPE process_open_fds gauge
process_open_fds 30
# HELP process_virtual_memory_bytes Virtual memory size in bytes.
# TYPE process_virtual_memory_bytes counter
process_virtual_memory_bytes 9.850318848e+09
# HELP etcd_server_go_version Which Go version server is running with.
# TYPE etcd_server_go_version gauge
etcd_server_go_version{server_go_version="go1.10.8"} 1
# HELP kubelet_docker_operations_latency_microseconds Latency in microseconds of Docker operations.
# TYPE kubelet_docker_operations_latency_microseconds summary
kubelet_docker_operations_latency_microseconds{operation_type="stop_container",quantile="0.5"} 123
kubelet_docker_operations_latency_microseconds{operation_type="stop_container",quantile="0.9"} 456
kubelet_docker_operations_latency_microseconds{operation_type="stop_container",quantile="0.99"} 789
kubelet_docker_operations_latency_microseconds_sum{operation_type="stop_container"} 1.165381e+06
kubelet_docker_operations_latency_microseconds_count{operation_type="stop_container"} 202
kubelet_docker_operations_latency_microseconds{operation_type="version",quantile="0.5"} 489
kubelet_docker_operations_latency_microseconds{operation_type="version",quantile="0.9"} 650
kubelet_docker_operations_latency_microseconds{operation_type="version",quantile="0.99"} 1581
kubelet_docker_operations_latency_microseconds_sum{operation_type="version"} 4.0745267e+07
kubelet_docker_operations_latency_microseconds_count{operation_type="version"} 79973
# HELP kubelet_cgroup_manager_duration_seconds Duration in seconds for cgroup manager operations.
# TYPE kubelet_cgroup_manager_duration_seconds histogram
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="create",le="0.005"} 2
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="create",le="0.01"} 3
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="create",le="10"} 3
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="create",le="+Inf"} 3
kubelet_cgroup_manager_duration_seconds_sum{operation_type="create"} 0.01842405
kubelet_cgroup_manager_duration_seconds_count{operation_type="create"} 3
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="destroy",le="0.005"} 3
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="destroy",le="0.01"} 3
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="destroy",le="10"} 3
kubelet_cgroup_manager_duration_seconds_bucket{operation_type="destroy",le="+Inf"} 3
kubelet_cgroup_manager_duration_seconds_sum{operation_type="destroy"} 0.001487533
kubelet_cgroup_manager_duration_seconds_count{operation_type="destroy"} 3
"#;

    fn dims(pairs: &[(&str, &str)]) -> DimensionMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn metric(name: &str, r#type: MetricType, value: f64, pairs: &[(&str, &str)]) -> Metric {
        let mut m = Metric::with_type(name, r#type, value);
        m.add_dimensions(&dims(pairs));
        m
    }

    #[test]
    fn suffix_trim() {
        assert_eq!(trim_suffix("abcdef", "def"), Some("abc"));
        assert_eq!(trim_suffix("abcdef", "de"), None);
        assert_eq!(trim_suffix("def", "def"), None);
        assert_eq!(trim_suffix("cdef", "def"), Some("c"));
        assert_eq!(trim_suffix("ef", "def"), None);
    }

    #[test]
    fn content_type() {
        assert_eq!(
            ExpositionFormat::from_content_type(CONTENT_TYPE),
            ExpositionFormat::Text
        );
        assert_eq!(
            ExpositionFormat::from_content_type("application/openmetrics-text; version=0.0.1"),
            ExpositionFormat::OpenMetrics
        );
        assert_eq!(ExpositionFormat::from_content_type(""), ExpositionFormat::Text);
    }

    #[test]
    fn extract_all() {
        let metrics = extract_metrics(BODY, CONTENT_TYPE, None, None, "", &DimensionMap::new())
            .unwrap();
        assert_eq!(metrics.len(), 26);

        let expected = [
            metric(
                "go_memstats_last_gc_time_seconds",
                MetricType::Gauge,
                1.579737845727797e+09,
                &[],
            ),
            metric("process_open_fds", MetricType::Gauge, 30.0, &[]),
            metric(
                "process_virtual_memory_bytes",
                MetricType::CumulativeCounter,
                9.850318848e+09,
                &[],
            ),
            metric(
                "etcd_server_go_version",
                MetricType::Gauge,
                1.0,
                &[("server_go_version", "go1.10.8")],
            ),
            metric(
                "kubelet_docker_operations_latency_microseconds_quantile",
                MetricType::Gauge,
                123.0,
                &[("quantile", "0.5"), ("operation_type", "stop_container")],
            ),
            metric(
                "kubelet_docker_operations_latency_microseconds",
                MetricType::CumulativeCounter,
                1.165381e+06,
                &[("operation_type", "stop_container")],
            ),
            metric(
                "kubelet_docker_operations_latency_microseconds_count",
                MetricType::CumulativeCounter,
                79973.0,
                &[("operation_type", "version")],
            ),
            metric(
                "kubelet_cgroup_manager_duration_seconds_bucket",
                MetricType::CumulativeCounter,
                2.0,
                &[("le", "0.005"), ("operation_type", "create")],
            ),
            metric(
                "kubelet_cgroup_manager_duration_seconds_bucket",
                MetricType::CumulativeCounter,
                3.0,
                &[("le", "+Inf"), ("operation_type", "destroy")],
            ),
            metric(
                "kubelet_cgroup_manager_duration_seconds",
                MetricType::CumulativeCounter,
                0.01842405,
                &[("operation_type", "create")],
            ),
            metric(
                "kubelet_cgroup_manager_duration_seconds_count",
                MetricType::CumulativeCounter,
                3.0,
                &[("operation_type", "destroy")],
            ),
        ];
        for m in &expected {
            assert!(metrics.contains(m), "missing {m}");
        }

        let quantiles = metrics
            .iter()
            .filter(|m| m.name() == "kubelet_docker_operations_latency_microseconds_quantile")
            .count();
        assert_eq!(quantiles, 6);
        let buckets = metrics
            .iter()
            .filter(|m| m.name() == "kubelet_cgroup_manager_duration_seconds_bucket")
            .count();
        assert_eq!(buckets, 8);
    }

    #[test]
    fn prefix_and_whitelist() {
        let whitelist: MetricNameSet = [
            "process_virtual_memory_bytes",
            "go_memstats_last_gc_time_seconds",
        ]
        .into_iter()
        .collect();
        let metrics = extract_metrics(
            BODY,
            CONTENT_TYPE,
            Some(&whitelist),
            None,
            "123/",
            &dims(&[("foo", "bar")]),
        )
        .unwrap();

        assert_eq!(metrics.len(), 2);
        assert!(metrics.contains(&metric(
            "123/go_memstats_last_gc_time_seconds",
            MetricType::Gauge,
            1.579737845727797e+09,
            &[("foo", "bar")],
        )));
        assert!(metrics.contains(&metric(
            "123/process_virtual_memory_bytes",
            MetricType::CumulativeCounter,
            9.850318848e+09,
            &[("foo", "bar")],
        )));
    }

    #[test]
    fn blacklist() {
        let blacklist: MetricNameSet = [
            "process_virtual_memory_bytes",
            "kubelet_docker_operations_latency_microseconds",
            "kubelet_cgroup_manager_duration_seconds",
        ]
        .into_iter()
        .collect();
        let metrics = extract_metrics(
            BODY,
            CONTENT_TYPE,
            None,
            Some(&blacklist),
            "",
            &DimensionMap::new(),
        )
        .unwrap();

        assert_eq!(metrics.len(), 3);
        assert!(metrics.contains(&metric("process_open_fds", MetricType::Gauge, 30.0, &[])));
        assert!(metrics.contains(&metric(
            "etcd_server_go_version",
            MetricType::Gauge,
            1.0,
            &[("server_go_version", "go1.10.8")],
        )));
    }

    #[test]
    fn whitelist_precedence() {
        let body = b"# TYPE a gauge\na 1\n# TYPE b gauge\nb 2\n";
        let list: MetricNameSet = ["a"].into_iter().collect();
        let metrics = extract_metrics(
            body,
            CONTENT_TYPE,
            Some(&list),
            Some(&list),
            "",
            &DimensionMap::new(),
        )
        .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "a");
    }

    #[test]
    fn recording_rule_names() {
        let body = b"# TYPE job:requests:rate5m gauge\njob:requests:rate5m{job=\"api\"} 2.5\n# TYPE other gauge\nother 1\n";
        let list: MetricNameSet = ["job:requests:rate5m"].into_iter().collect();
        let metrics = extract_metrics(
            body,
            CONTENT_TYPE,
            Some(&list),
            None,
            "",
            &DimensionMap::new(),
        )
        .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "job-requests-rate5m");
        assert_eq!(metrics[0].get_dimension_value("job"), Some("api"));

        let sanitized: MetricNameSet = ["job-requests-rate5m"].into_iter().collect();
        let metrics = extract_metrics(
            body,
            CONTENT_TYPE,
            Some(&sanitized),
            None,
            "",
            &DimensionMap::new(),
        )
        .unwrap();
        assert!(metrics.is_empty());
    }

    #[test]
    fn generated_dimensions_win() {
        let body = b"# TYPE a gauge\na{foo=\"label\",__name__=\"a\"} 1\n";
        let metrics = extract_metrics(
            body,
            CONTENT_TYPE,
            None,
            None,
            "",
            &dims(&[("foo", "generated")]),
        )
        .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].get_dimension_value("foo"), Some("generated"));
        assert_eq!(metrics[0].get_dimension_value("__name__"), None);
        assert_eq!(metrics[0].dimensions().len(), 1);
    }

    #[test]
    fn skip_untyped() {
        let body = b"no_type 1\n# TYPE u untyped\nu 2\n# TYPE i info\ni_info{v=\"1\"} 1\n# TYPE g gauge\ng 3\n";
        let metrics =
            extract_metrics(body, CONTENT_TYPE, None, None, "", &DimensionMap::new()).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "g");
    }

    #[test]
    fn openmetrics() {
        let body = b"# TYPE req counter\n# UNIT req requests\nreq_total{code=\"200\"} 10 # {trace_id=\"x\"} 1\n# EOF\nreq_total 11\n";
        let metrics = extract_metrics(
            body,
            "application/openmetrics-text; version=0.0.1; charset=utf-8",
            None,
            None,
            "",
            &DimensionMap::new(),
        )
        .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(
            metrics[0],
            metric("req_total", MetricType::CumulativeCounter, 10.0, &[("code", "200")])
        );
    }

    #[test]
    fn all_or_nothing() {
        let body = b"# TYPE a gauge\na 1\na{x=\"1\" 2\n";
        let err = extract_metrics(body, CONTENT_TYPE, None, None, "", &DimensionMap::new())
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, PromParseErrorKind::InvalidLabels(_)));

        let body = b"# TYPE a gauge\na 1\n\xff\xfe 2\n";
        let err = extract_metrics(body, CONTENT_TYPE, None, None, "", &DimensionMap::new())
            .unwrap_err();
        assert_eq!(err.kind, PromParseErrorKind::InvalidUtf8);
    }

    #[test]
    fn empty_body() {
        let metrics =
            extract_metrics(b"", CONTENT_TYPE, None, None, "", &DimensionMap::new()).unwrap();
        assert!(metrics.is_empty());
    }
}
