/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
    CumulativeCounter,
}

#[derive(Debug, Error)]
#[error("unknown metric type {0}")]
pub struct ParseMetricTypeError(String);

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::CumulativeCounter => "cumcounter",
        }
    }
}

impl FromStr for MetricType {
    type Err = ParseMetricTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            "cumcounter" | "cumulative_counter" => Ok(MetricType::CumulativeCounter),
            _ => Err(ParseMetricTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
