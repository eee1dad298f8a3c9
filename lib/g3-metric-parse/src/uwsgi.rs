/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use g3_metric::Metric;

#[derive(Debug, Error)]
pub enum WorkerStatsError {
    #[error("invalid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no workers array found")]
    NoWorkers,
    #[error("worker record is not an object")]
    WorkerNotObject,
    #[error("no string status found in worker record")]
    NoStatus,
}

fn workers_metric_name(status: &str) -> String {
    let status = if status.starts_with("sig") {
        "sig"
    } else {
        status
    };
    let mut name = String::with_capacity(status.len() + 7);
    let mut chars = status.chars();
    if let Some(c) = chars.next() {
        name.extend(c.to_uppercase());
        name.push_str(chars.as_str());
    }
    name.push_str("Workers");
    name
}

/// Count the uWSGI workers by status.
///
/// Every status gets a `<Status>Workers` gauge, and `IdleWorkers` and
/// `BusyWorkers` are always present. All statuses starting with `sig` are
/// counted as `SigWorkers`.
pub fn parse_uwsgi_workers_stats(raw: &[u8]) -> Result<Vec<Metric>, WorkerStatsError> {
    let doc: Value = serde_json::from_slice(raw)?;
    let Some(workers) = doc.get("workers").and_then(Value::as_array) else {
        return Err(WorkerStatsError::NoWorkers);
    };

    let mut registry: BTreeMap<String, u64> = BTreeMap::new();
    registry.insert("IdleWorkers".to_string(), 0);
    registry.insert("BusyWorkers".to_string(), 0);

    for worker in workers {
        let Value::Object(map) = worker else {
            return Err(WorkerStatsError::WorkerNotObject);
        };
        let Some(status) = map.get("status").and_then(Value::as_str) else {
            return Err(WorkerStatsError::NoStatus);
        };
        *registry.entry(workers_metric_name(status)).or_default() += 1;
    }

    Ok(registry
        .into_iter()
        .map(|(name, count)| Metric::with_value(&name, count as f64))
        .collect())
}
