/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use http::{HeaderMap, HeaderValue, Uri, header};
use rustls::ClientConfig;
use yaml_rust::{Yaml, yaml};

use g3_metric::{DimensionBlacklist, DimensionMap, MetricNameSet};
use g3_metric_parse::prometheus::ACCEPT_HEADER_VALUE;

use super::yaml as yaml_value;
use super::{CollectorConfig, CollectorSchedule};
use crate::{Endpoint, TlsClientConfigBuilder};

const COLLECTOR_CONFIG_TYPE: &str = "Prometheus";

const SCRAPE_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";

/// One scrape target of a Prometheus collector.
///
/// `metrics_whitelist` and `metrics_blacklist` hold family names as they
/// appear in the exposition, e.g. `job:requests:rate5m`. The metrics sent
/// carry the sanitized name, where `:` and `=` are replaced by `-`.
///
/// `https` urls accept `server_ca_file`, `client_cert_file` and
/// `client_key_file`, all PEM encoded. The system trust store is used if no
/// ca file is set.
#[derive(Clone, Debug)]
pub struct PrometheusEndpointConfig {
    url: Option<Uri>,
    headers: HeaderMap,
    timeout: Duration,
    tls: TlsClientConfigBuilder,
    tls_client: Option<Arc<ClientConfig>>,
    pub(crate) prefix: String,
    pub(crate) generated_dimensions: DimensionMap,
    pub(crate) metrics_whitelist: Option<MetricNameSet>,
    pub(crate) metrics_blacklist: Option<MetricNameSet>,
}

impl Default for PrometheusEndpointConfig {
    fn default() -> Self {
        PrometheusEndpointConfig {
            url: None,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(5),
            tls: TlsClientConfigBuilder::default(),
            tls_client: None,
            prefix: String::new(),
            generated_dimensions: DimensionMap::new(),
            metrics_whitelist: None,
            metrics_blacklist: None,
        }
    }
}

impl PrometheusEndpointConfig {
    fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let map = yaml_value::as_hash(v)?;

        let mut endpoint = PrometheusEndpointConfig::default();
        yaml_value::foreach_kv(map, |k, v| endpoint.set(k, v))?;
        endpoint.check()?;
        Ok(endpoint)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml_value::normalize_key(k).as_str() {
            "url" => {
                let s = yaml_value::as_string(v)?;
                let url = Uri::from_str(&s).map_err(|e| anyhow!("invalid url {s}: {e}"))?;
                self.url = Some(url);
                Ok(())
            }
            "prefix" => {
                self.prefix = yaml_value::as_string(v)?;
                Ok(())
            }
            "headers" => {
                self.headers = yaml_value::as_header_map(v)?;
                Ok(())
            }
            "timeout" => {
                self.timeout = yaml_value::as_duration(v)
                    .context(format!("invalid duration value for key {k}"))?;
                Ok(())
            }
            "generated_dimensions" => {
                self.generated_dimensions = yaml_value::as_dimension_map(v)
                    .context(format!("invalid dimension map value for key {k}"))?;
                Ok(())
            }
            "metrics_whitelist" => {
                let set = yaml_value::as_name_set(v)
                    .context(format!("invalid metric name list value for key {k}"))?;
                self.metrics_whitelist = Some(set);
                Ok(())
            }
            "metrics_blacklist" => {
                let set = yaml_value::as_name_set(v)
                    .context(format!("invalid metric name list value for key {k}"))?;
                self.metrics_blacklist = Some(set);
                Ok(())
            }
            "server_ca_file" | "servercafile" => {
                self.tls
                    .set_server_ca_file(PathBuf::from(yaml_value::as_string(v)?));
                Ok(())
            }
            "client_cert_file" | "clientcertfile" => {
                self.tls
                    .set_client_cert_file(PathBuf::from(yaml_value::as_string(v)?));
                Ok(())
            }
            "client_key_file" | "clientkeyfile" => {
                self.tls
                    .set_client_key_file(PathBuf::from(yaml_value::as_string(v)?));
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&mut self) -> anyhow::Result<()> {
        let Some(url) = &self.url else {
            return Err(anyhow!("url is not set"));
        };
        if self.timeout.is_zero() {
            return Err(anyhow!("timeout should not be zero"));
        }
        if url.scheme_str() == Some("https") {
            let tls_client = self
                .tls
                .build()
                .context(format!("failed to build tls client config for {url}"))?;
            self.tls_client = Some(tls_client);
        } else if !self.tls.is_empty() {
            return Err(anyhow!("tls files are set for non-https url {url}"));
        }

        self.headers
            .insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HEADER_VALUE));
        self.headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("g3collect/", env!("CARGO_PKG_VERSION"))),
        );
        let timeout = format!("{}", self.timeout.as_secs_f64());
        let timeout = HeaderValue::from_str(&timeout)
            .map_err(|e| anyhow!("invalid scrape timeout header value: {e}"))?;
        self.headers.insert(SCRAPE_TIMEOUT_HEADER, timeout);
        Ok(())
    }

    pub(crate) fn endpoint(&self) -> anyhow::Result<Endpoint> {
        let url = self.url.clone().ok_or_else(|| anyhow!("url is not set"))?;
        let mut endpoint = Endpoint::new(&url.to_string(), url, self.timeout);
        endpoint.set_headers(self.headers.clone());
        if let Some(tls_client) = &self.tls_client {
            endpoint.set_tls_client(tls_client.clone());
        }
        Ok(endpoint)
    }
}

#[derive(Clone, Debug)]
pub struct PrometheusCollectorConfig {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) endpoints: Vec<PrometheusEndpointConfig>,
    pub(crate) dimension_blacklist: DimensionBlacklist,
}

impl Default for PrometheusCollectorConfig {
    fn default() -> Self {
        PrometheusCollectorConfig {
            name: String::new(),
            interval: Duration::from_secs(10),
            endpoints: Vec::new(),
            dimension_blacklist: DimensionBlacklist::default(),
        }
    }
}

impl PrometheusCollectorConfig {
    pub(crate) fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let mut collector = PrometheusCollectorConfig::default();

        yaml_value::foreach_kv(map, |k, v| collector.set(k, v))?;

        collector.check()?;
        Ok(collector)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml_value::normalize_key(k).as_str() {
            super::CONFIG_KEY_COLLECTOR_TYPE => Ok(()),
            super::CONFIG_KEY_COLLECTOR_NAME => {
                self.name = yaml_value::as_string(v)?;
                Ok(())
            }
            "interval" => {
                self.interval = yaml_value::as_duration(v)
                    .context(format!("invalid duration value for key {k}"))?;
                Ok(())
            }
            "endpoints" => {
                self.endpoints = yaml_value::as_list(v, PrometheusEndpointConfig::parse)
                    .context(format!("invalid endpoint list value for key {k}"))?;
                Ok(())
            }
            "dimension_blacklist" => {
                self.dimension_blacklist = yaml_value::as_dimension_blacklist(v)
                    .context(format!("invalid dimension blacklist value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&mut self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow!("name is not set"));
        }
        if self.interval.is_zero() {
            return Err(anyhow!("interval should not be zero"));
        }
        if self.endpoints.is_empty() {
            return Err(anyhow!("no endpoints set"));
        }
        Ok(())
    }
}

impl CollectorConfig for PrometheusCollectorConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn collector_type(&self) -> &'static str {
        COLLECTOR_CONFIG_TYPE
    }

    fn schedule(&self) -> CollectorSchedule {
        CollectorSchedule {
            interval: self.interval,
        }
    }
}
