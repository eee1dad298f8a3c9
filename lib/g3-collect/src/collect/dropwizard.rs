/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use http::HeaderMap;
use log::{debug, info, warn};
use tokio::task::JoinSet;

use g3_metric::{DimensionMap, Metric, add_to_all};
use g3_metric_parse::{dropwizard, uwsgi};

use super::{Collector, MetricSender};
use crate::config::DropwizardCollectorConfig;
use crate::nerve::parse_nerve_config;
use crate::source::{BodySource, FetchedBody};
use crate::stats::CollectorStats;
use crate::Endpoint;

const NERVE_SERVICE_HOST: &str = "localhost";

#[derive(Clone, Debug)]
struct ServiceTarget {
    name: String,
    host: String,
    port: u16,
    path: String,
    headers: HeaderMap,
}

impl ServiceTarget {
    fn endpoint(&self, path: &str, timeout: Duration) -> anyhow::Result<Endpoint> {
        let mut endpoint = Endpoint::with_host_port(&self.name, &self.host, self.port, path, timeout)?;
        endpoint.set_headers(self.headers.clone());
        Ok(endpoint)
    }
}

/// Query Dropwizard style metrics of services, which are either set
/// statically or discovered from the local nerve config.
pub struct DropwizardCollector<S> {
    config: Arc<DropwizardCollectorConfig>,
    source: Arc<S>,
    stats: Arc<CollectorStats>,
}

impl<S> DropwizardCollector<S>
where
    S: BodySource + Send + Sync + 'static,
{
    pub fn new(config: DropwizardCollectorConfig, source: S) -> Self {
        let stats = Arc::new(CollectorStats::new(&config.name));
        DropwizardCollector {
            config: Arc::new(config),
            source: Arc::new(source),
            stats,
        }
    }

    async fn discover(&self) -> anyhow::Result<Vec<ServiceTarget>> {
        let mut targets = Vec::new();
        if !self.config.endpoints.is_empty() {
            for ep in &self.config.endpoints {
                targets.push(ServiceTarget {
                    name: ep.service_name.clone(),
                    host: ep.host.clone(),
                    port: ep.port,
                    path: ep
                        .path
                        .clone()
                        .unwrap_or_else(|| self.config.query_path.clone()),
                    headers: ep.headers.clone(),
                });
            }
        } else if let Some(path) = &self.config.nerve_config {
            let raw = tokio::fs::read(path)
                .await
                .context(format!("failed to read nerve config {}", path.display()))?;
            let services = parse_nerve_config(&raw, false)
                .context(format!("failed to parse nerve config {}", path.display()))?;
            debug!(
                "collector {}: found {} services in nerve config",
                self.config.name,
                services.len()
            );
            for service in services {
                targets.push(ServiceTarget {
                    name: service.name,
                    host: NERVE_SERVICE_HOST.to_string(),
                    port: service.port,
                    path: self.config.query_path.clone(),
                    headers: HeaderMap::new(),
                });
            }
        }

        targets.retain(|t| self.config.service_allowed(&t.name));
        Ok(targets)
    }
}

struct ServiceQuery<S> {
    config: Arc<DropwizardCollectorConfig>,
    source: Arc<S>,
    stats: Arc<CollectorStats>,
    target: ServiceTarget,
}

impl<S: BodySource> ServiceQuery<S> {
    async fn fetch(&self, path: &str) -> anyhow::Result<FetchedBody> {
        let endpoint = self.target.endpoint(path, self.config.http_timeout)?;
        self.stats.add_endpoint_query();
        debug!("collector {}: query {endpoint}", self.config.name);
        self.source
            .fetch(&endpoint)
            .await
            .context(format!("failed to query {endpoint}"))
    }

    async fn fetch_workers_stats(&self, service_dims: &DimensionMap) -> anyhow::Result<Vec<Metric>> {
        let fetched = self.fetch(&self.config.workers_stats_query_path).await?;
        let mut metrics = uwsgi::parse_uwsgi_workers_stats(&fetched.body)
            .context("failed to parse workers stats")?;
        add_to_all(&mut metrics, service_dims);
        Ok(metrics)
    }

    async fn run(self, sender: MetricSender) {
        let service = &self.target.name;
        let fetched = match self.fetch(&self.target.path).await {
            Ok(f) => f,
            Err(e) => {
                self.stats.add_query_failure();
                warn!("collector {}: service {service}: {e:?}", self.config.name);
                return;
            }
        };

        let cc_enabled = self.config.cumulative_counter_enabled(service);
        let mut metrics = match dropwizard::parse(&fetched.body, &fetched.schema, cc_enabled) {
            Ok(metrics) => metrics,
            Err(e) => {
                self.stats.add_parse_failure();
                warn!(
                    "collector {}: service {service}: failed to parse response: {e}",
                    self.config.name
                );
                return;
            }
        };

        if fetched.schema.contains("uwsgi") && self.config.workers_stats_enabled(service) {
            let service_dims = dropwizard::extract_service_dims(&fetched.body);
            match self.fetch_workers_stats(&service_dims).await {
                Ok(workers) => metrics.extend(workers),
                Err(e) => {
                    self.stats.add_query_failure();
                    info!(
                        "collector {}: service {service}: no workers stats: {e:?}",
                        self.config.name
                    );
                }
            }
        }

        let mut endpoint_dims = DimensionMap::new();
        endpoint_dims.insert("service".to_string(), service.clone());
        endpoint_dims.insert(
            "port".to_string(),
            itoa::Buffer::new().format(self.target.port).to_string(),
        );
        add_to_all(&mut metrics, &endpoint_dims);

        let total = metrics.len();
        let sent = super::send_metrics(metrics, &self.config.dimension_blacklist, &sender);
        self.stats.add_metrics_sent(sent);
        debug!(
            "collector {}: service {service}: sent {sent} of {total} metrics",
            self.config.name
        );
    }
}

impl<S> Collector for DropwizardCollector<S>
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
        let targets = match self.discover().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("collector {}: {e:?}", self.config.name);
                return;
            }
        };

        let mut tasks = JoinSet::new();
        for target in targets {
            let query = ServiceQuery {
                config: self.config.clone(),
                source: self.source.clone(),
                stats: self.stats.clone(),
                target,
            };
            tasks.spawn(query.run(sender.clone()));
        }
        while let Some(r) = tasks.join_next().await {
            if let Err(e) = r {
                warn!("collector {}: service query task failed: {e}", self.config.name);
            }
        }
    }
}
