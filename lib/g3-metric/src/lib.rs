/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod sanitize;
pub use sanitize::{is_sanitized, sanitize};

mod r#type;
pub use r#type::{MetricType, ParseMetricTypeError};

mod metric;
pub use metric::{DimensionMap, Metric, add_to_all};

mod filter;
pub use filter::{DimensionBlacklist, MetricNameSet, name_allowed};
