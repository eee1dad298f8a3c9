/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use g3_metric::{Metric, MetricType};

use crate::collect::MetricSender;

const METRIC_NAME_PREFIX: &str = "g3collect";
const DIMENSION_KEY_COLLECTOR: &str = "collector";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectorSnapshot {
    pub cycles: u64,
    pub endpoint_queries: u64,
    pub query_failures: u64,
    pub parse_failures: u64,
    pub metrics_sent: u64,
}

#[derive(Debug)]
pub struct CollectorStats {
    name: String,

    cycles: AtomicU64,
    endpoint_queries: AtomicU64,
    query_failures: AtomicU64,
    parse_failures: AtomicU64,
    metrics_sent: AtomicU64,
}

impl CollectorStats {
    pub fn new(name: &str) -> Self {
        CollectorStats {
            name: name.to_string(),
            cycles: AtomicU64::new(0),
            endpoint_queries: AtomicU64::new(0),
            query_failures: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            metrics_sent: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_endpoint_query(&self) {
        self.endpoint_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_query_failure(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_metrics_sent(&self, count: usize) {
        self.metrics_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            endpoint_queries: self.endpoint_queries.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            metrics_sent: self.metrics_sent.load(Ordering::Relaxed),
        }
    }

    /// Export the counters as `g3collect.<counter>` metrics tagged with
    /// the collector name.
    pub fn to_metrics(&self) -> Vec<Metric> {
        let snap = self.snapshot();
        [
            ("cycles", snap.cycles),
            ("endpoint_queries", snap.endpoint_queries),
            ("query_failures", snap.query_failures),
            ("parse_failures", snap.parse_failures),
            ("metrics_sent", snap.metrics_sent),
        ]
        .into_iter()
        .map(|(counter, value)| {
            let mut m = Metric::with_type(
                &format!("{METRIC_NAME_PREFIX}.{counter}"),
                MetricType::CumulativeCounter,
                value as f64,
            );
            m.add_dimension(DIMENSION_KEY_COLLECTOR, &self.name);
            m
        })
        .collect()
    }
}

/// Periodically send the collector stats as metrics.
pub struct StatsEmitter {
    stats: Vec<Arc<CollectorStats>>,
    emit_interval: Duration,
    sender: MetricSender,
    quit_receiver: broadcast::Receiver<()>,
}

impl StatsEmitter {
    pub fn new(
        stats: Vec<Arc<CollectorStats>>,
        emit_interval: Duration,
        sender: MetricSender,
        quit_receiver: broadcast::Receiver<()>,
    ) -> Self {
        StatsEmitter {
            stats,
            emit_interval,
            sender,
            quit_receiver,
        }
    }

    fn emit(&self) -> bool {
        for stats in &self.stats {
            for m in stats.to_metrics() {
                if self.sender.send(m).is_err() {
                    return false;
                }
            }
        }
        true
    }

    pub async fn into_running(mut self) {
        let mut interval = tokio::time::interval(self.emit_interval);

        loop {
            tokio::select! {
                biased;

                r = self.quit_receiver.recv() => {
                    match r {
                        Ok(_) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }
                _ = interval.tick() => {
                    if !self.emit() {
                        break;
                    }
                }
            }
        }
    }
}
