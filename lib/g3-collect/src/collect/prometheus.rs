/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinSet;

use g3_metric::Metric;
use g3_metric_parse::prometheus::{PromParseError, extract_metrics};

use super::{Collector, MetricSender};
use crate::config::{PrometheusCollectorConfig, PrometheusEndpointConfig};
use crate::source::BodySource;
use crate::stats::CollectorStats;

/// Scrape Prometheus / OpenMetrics text endpoints.
pub struct PrometheusCollector<S> {
    config: Arc<PrometheusCollectorConfig>,
    source: Arc<S>,
    stats: Arc<CollectorStats>,
}

impl<S> PrometheusCollector<S>
where
    S: BodySource + Send + Sync + 'static,
{
    pub fn new(config: PrometheusCollectorConfig, source: S) -> Self {
        let stats = Arc::new(CollectorStats::new(&config.name));
        PrometheusCollector {
            config: Arc::new(config),
            source: Arc::new(source),
            stats,
        }
    }
}

async fn scrape<S: BodySource>(
    config: Arc<PrometheusCollectorConfig>,
    source: Arc<S>,
    stats: Arc<CollectorStats>,
    index: usize,
    sender: MetricSender,
) {
    let Some(ep_config) = config.endpoints.get(index) else {
        return;
    };
    let endpoint = match ep_config.endpoint() {
        Ok(ep) => ep,
        Err(e) => {
            warn!("collector {}: {e:?}", config.name);
            return;
        }
    };

    stats.add_endpoint_query();
    let fetched = match source.fetch(&endpoint).await {
        Ok(f) => f,
        Err(e) => {
            stats.add_query_failure();
            warn!("collector {}: failed to scrape {endpoint}: {e:?}", config.name);
            return;
        }
    };

    let metrics = match extract(ep_config, &fetched.body, fetched.content_type.as_deref()) {
        Ok(metrics) => metrics,
        Err(e) => {
            stats.add_parse_failure();
            warn!("collector {}: invalid response from {endpoint}: {e}", config.name);
            return;
        }
    };

    let total = metrics.len();
    let sent = super::send_metrics(metrics, &config.dimension_blacklist, &sender);
    stats.add_metrics_sent(sent);
    debug!("collector {}: {endpoint}: sent {sent} of {total} metrics", config.name);
}

fn extract(
    ep_config: &PrometheusEndpointConfig,
    body: &[u8],
    content_type: Option<&str>,
) -> Result<Vec<Metric>, PromParseError> {
    extract_metrics(
        body,
        content_type.unwrap_or_default(),
        ep_config.metrics_whitelist.as_ref(),
        ep_config.metrics_blacklist.as_ref(),
        &ep_config.prefix,
        &ep_config.generated_dimensions,
    )
}

impl<S> Collector for PrometheusCollector<S>
where
    S: BodySource + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.config.name
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    fn stats(&self) -> &Arc<CollectorStats> {
        &self.stats
    }

    async fn collect(&self, sender: &MetricSender) {
        let mut tasks = JoinSet::new();
        for index in 0..self.config.endpoints.len() {
            tasks.spawn(scrape(
                self.config.clone(),
                self.source.clone(),
                self.stats.clone(),
                index,
                sender.clone(),
            ));
        }
        while let Some(r) = tasks.join_next().await {
            if let Err(e) = r {
                warn!("collector {}: scrape task failed: {e}", self.config.name);
            }
        }
    }
}
