/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use g3_metric::{DimensionMap, Metric};

use crate::collect::MetricReceiver;

pub trait MetricSink {
    fn emit(&mut self, batch: &[Metric]) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub name: String,
    pub max_buffer_size: usize,
    pub flush_interval: Duration,
    pub default_dimensions: DimensionMap,
}

impl HandlerConfig {
    pub fn new(name: &str) -> Self {
        HandlerConfig {
            name: name.to_string(),
            max_buffer_size: 300,
            flush_interval: Duration::from_secs(10),
            default_dimensions: DimensionMap::new(),
        }
    }
}

/// Drain the metric channel and emit in batches.
pub struct Handler<K> {
    config: HandlerConfig,
    receiver: MetricReceiver,
    sink: K,
    buf: Vec<Metric>,
}

impl<K: MetricSink> Handler<K> {
    pub fn new(config: HandlerConfig, receiver: MetricReceiver, sink: K) -> Self {
        let buf = Vec::with_capacity(config.max_buffer_size);
        Handler {
            config,
            receiver,
            sink,
            buf,
        }
    }

    fn overlay(&self, m: &Metric) -> Metric {
        let mut out = Metric::with_type(m.name(), m.r#type(), m.value());
        out.add_dimensions(&m.dimensions_with(&self.config.default_dimensions));
        out
    }

    async fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let new_buf = Vec::with_capacity(self.config.max_buffer_size);
        let batch = std::mem::replace(&mut self.buf, new_buf);
        if let Err(e) = self.sink.emit(&batch).await {
            warn!(
                "handler {}: failed to emit {} metrics: {e:?}",
                self.config.name,
                batch.len()
            );
        }
    }

    pub async fn into_running(mut self) {
        const BATCH_SIZE: usize = 128;

        let mut recv_buf = Vec::with_capacity(BATCH_SIZE);
        let mut flush_interval = tokio::time::interval(self.config.flush_interval);

        loop {
            recv_buf.clear();

            tokio::select! {
                biased;

                _ = flush_interval.tick() => {
                    self.flush().await;
                }
                n = self.receiver.recv_many(&mut recv_buf, BATCH_SIZE) => {
                    if n == 0 {
                        self.flush().await;
                        break;
                    }

                    for m in &recv_buf {
                        let m = self.overlay(m);
                        self.buf.push(m);
                        if self.buf.len() >= self.config.max_buffer_size {
                            self.flush().await;
                        }
                    }
                }
            }
        }

        info!("handler {} stopped", self.config.name);
    }
}

/// Write each metric as a json object on its own line.
pub struct JsonLinesSink<W> {
    writer: W,
    line_buf: Vec<u8>,
}

impl<W> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer,
            line_buf: Vec::with_capacity(4096),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> MetricSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&mut self, batch: &[Metric]) -> anyhow::Result<()> {
        self.line_buf.clear();
        for m in batch {
            serde_json::to_writer(&mut self.line_buf, &m.to_json())?;
            self.line_buf.push(b'\n');
        }
        self.writer
            .write_all(&self.line_buf)
            .await
            .context("failed to write metrics")?;
        self.writer.flush().await.context("failed to flush metrics")?;
        Ok(())
    }
}
