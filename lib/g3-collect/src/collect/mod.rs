/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use g3_metric::{DimensionBlacklist, Metric};

use crate::config::{AnyCollectorConfig, CollectorConfig};
use crate::source::HttpSource;
use crate::stats::CollectorStats;

mod dropwizard;
pub use dropwizard::DropwizardCollector;

mod prometheus;
pub use prometheus::PrometheusCollector;

pub type MetricSender = mpsc::UnboundedSender<Metric>;
pub type MetricReceiver = mpsc::UnboundedReceiver<Metric>;

pub trait Collector {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    fn stats(&self) -> &Arc<CollectorStats>;

    /// Run a single collection cycle. All endpoint queries of this cycle
    /// have finished when the returned future is ready.
    fn collect(&self, sender: &MetricSender) -> impl Future<Output = ()> + Send;
}

/// Send the metrics that carry no blacklisted dimension value, and return
/// how many have been sent.
pub(crate) fn send_metrics(
    metrics: Vec<Metric>,
    dimension_blacklist: &DimensionBlacklist,
    sender: &MetricSender,
) -> usize {
    let mut sent = 0;
    for m in metrics {
        if dimension_blacklist.matches(m.dimensions()) {
            debug!("drop metric {m} as it has blacklisted dimension");
            continue;
        }
        if sender.send(m).is_err() {
            break;
        }
        sent += 1;
    }
    sent
}

pub struct CollectorRuntime<C> {
    collector: C,
    sender: MetricSender,
    quit_receiver: broadcast::Receiver<()>,
}

impl<C> CollectorRuntime<C>
where
    C: Collector + Send + Sync + 'static,
{
    pub fn new(collector: C, sender: MetricSender, quit_receiver: broadcast::Receiver<()>) -> Self {
        CollectorRuntime {
            collector,
            sender,
            quit_receiver,
        }
    }

    pub async fn into_running(mut self) {
        let mut interval = tokio::time::interval(self.collector.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

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
                    if self.sender.is_closed() {
                        break;
                    }
                    self.collector.stats().add_cycle();
                    self.collector.collect(&self.sender).await;
                }
            }
        }

        info!("collector {} stopped", self.collector.name());
    }
}

pub struct CollectorHandle {
    pub stats: Arc<CollectorStats>,
    pub join: JoinHandle<()>,
}

fn spawn<C>(collector: C, sender: MetricSender, quit_receiver: broadcast::Receiver<()>) -> CollectorHandle
where
    C: Collector + Send + Sync + 'static,
{
    let stats = collector.stats().clone();
    let runtime = CollectorRuntime::new(collector, sender, quit_receiver);
    let join = tokio::spawn(runtime.into_running());
    CollectorHandle { stats, join }
}

/// Spawn the collector described by the config, it queries endpoints over
/// plain HTTP.
pub fn spawn_collector(
    config: AnyCollectorConfig,
    sender: MetricSender,
    quit_receiver: broadcast::Receiver<()>,
) -> CollectorHandle {
    info!(
        "spawn {} collector {}",
        config.collector_type(),
        config.name()
    );
    match config {
        AnyCollectorConfig::Dropwizard(c) => {
            let collector = DropwizardCollector::new(c, HttpSource::default());
            spawn(collector, sender, quit_receiver)
        }
        AnyCollectorConfig::Prometheus(c) => {
            let collector = PrometheusCollector::new(c, HttpSource::default());
            spawn(collector, sender, quit_receiver)
        }
    }
}
