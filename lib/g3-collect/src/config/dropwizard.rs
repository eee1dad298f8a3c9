/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use http::HeaderMap;
use yaml_rust::{Yaml, yaml};

use g3_metric::{DimensionBlacklist, MetricNameSet};

use super::yaml as yaml_value;
use super::{CollectorConfig, CollectorSchedule};

const COLLECTOR_CONFIG_TYPE: &str = "Dropwizard";

const DEFAULT_QUERY_PATH: &str = "status/metrics";
const DEFAULT_WORKERS_STATS_QUERY_PATH: &str = "status/uwsgi";

/// A statically configured service endpoint.
#[derive(Clone, Debug)]
pub struct DropwizardEndpointConfig {
    pub(crate) service_name: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) path: Option<String>,
    pub(crate) headers: HeaderMap,
}

impl DropwizardEndpointConfig {
    fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let map = yaml_value::as_hash(v)?;

        let mut endpoint = DropwizardEndpointConfig {
            service_name: String::new(),
            host: "localhost".to_string(),
            port: 0,
            path: None,
            headers: HeaderMap::new(),
        };
        yaml_value::foreach_kv(map, |k, v| endpoint.set(k, v))?;
        endpoint.check()?;
        Ok(endpoint)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml_value::normalize_key(k).as_str() {
            "service_name" | "service" => {
                self.service_name = yaml_value::as_string(v)?;
                Ok(())
            }
            "host" => {
                self.host = yaml_value::as_string(v)?;
                Ok(())
            }
            "port" => {
                self.port = yaml_value::as_u16(v)?;
                Ok(())
            }
            "path" => {
                self.path = Some(yaml_value::as_string(v)?);
                Ok(())
            }
            "headers" => {
                self.headers = yaml_value::as_header_map(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.service_name.is_empty() {
            return Err(anyhow!("service name is not set"));
        }
        if self.port == 0 {
            return Err(anyhow!("port is not set"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct DropwizardCollectorConfig {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) http_timeout: Duration,
    pub(crate) endpoints: Vec<DropwizardEndpointConfig>,
    pub(crate) nerve_config: Option<PathBuf>,
    pub(crate) query_path: String,
    pub(crate) cumulative_counter_services: MetricNameSet,
    pub(crate) workers_stats_enabled: bool,
    pub(crate) workers_stats_query_path: String,
    pub(crate) workers_stats_blacklist: MetricNameSet,
    pub(crate) services_whitelist: Option<MetricNameSet>,
    pub(crate) services_blacklist: Option<MetricNameSet>,
    pub(crate) dimension_blacklist: DimensionBlacklist,
}

impl Default for DropwizardCollectorConfig {
    fn default() -> Self {
        DropwizardCollectorConfig {
            name: String::new(),
            interval: Duration::from_secs(10),
            http_timeout: Duration::from_secs(2),
            endpoints: Vec::new(),
            nerve_config: None,
            query_path: DEFAULT_QUERY_PATH.to_string(),
            cumulative_counter_services: MetricNameSet::default(),
            workers_stats_enabled: false,
            workers_stats_query_path: DEFAULT_WORKERS_STATS_QUERY_PATH.to_string(),
            workers_stats_blacklist: MetricNameSet::default(),
            services_whitelist: None,
            services_blacklist: None,
            dimension_blacklist: DimensionBlacklist::default(),
        }
    }
}

impl DropwizardCollectorConfig {
    pub(crate) fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let mut collector = DropwizardCollectorConfig::default();

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
            "http_timeout" => {
                self.http_timeout = yaml_value::as_duration(v)
                    .context(format!("invalid duration value for key {k}"))?;
                Ok(())
            }
            "endpoints" => {
                self.endpoints = yaml_value::as_list(v, DropwizardEndpointConfig::parse)
                    .context(format!("invalid endpoint list value for key {k}"))?;
                Ok(())
            }
            "nerve_config" => {
                let path = yaml_value::as_string(v)?;
                self.nerve_config = Some(PathBuf::from(path));
                Ok(())
            }
            "query_path" => {
                self.query_path = yaml_value::as_string(v)?;
                Ok(())
            }
            "cumulative_counter_services" => {
                self.cumulative_counter_services = yaml_value::as_name_set(v)
                    .context(format!("invalid service list value for key {k}"))?;
                Ok(())
            }
            "workers_stats_enabled" => {
                self.workers_stats_enabled = yaml_value::as_bool(v)?;
                Ok(())
            }
            "workers_stats_query_path" => {
                self.workers_stats_query_path = yaml_value::as_string(v)?;
                Ok(())
            }
            "workers_stats_blacklist" => {
                self.workers_stats_blacklist = yaml_value::as_name_set(v)
                    .context(format!("invalid service list value for key {k}"))?;
                Ok(())
            }
            "services_whitelist" => {
                let set = yaml_value::as_name_set(v)
                    .context(format!("invalid service list value for key {k}"))?;
                self.services_whitelist = if set.is_empty() { None } else { Some(set) };
                Ok(())
            }
            "services_blacklist" => {
                let set = yaml_value::as_name_set(v)
                    .context(format!("invalid service list value for key {k}"))?;
                self.services_blacklist = if set.is_empty() { None } else { Some(set) };
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
        if self.endpoints.is_empty() && self.nerve_config.is_none() {
            return Err(anyhow!("neither endpoints nor nerve config is set"));
        }
        if self.services_whitelist.is_some() && self.services_blacklist.is_some() {
            return Err(anyhow!(
                "services whitelist and blacklist should not be set at the same time"
            ));
        }
        Ok(())
    }

    /// Check if the service should be queried.
    pub(crate) fn service_allowed(&self, service: &str) -> bool {
        g3_metric::name_allowed(
            self.services_whitelist.as_ref(),
            self.services_blacklist.as_ref(),
            service,
        )
    }

    #[inline]
    pub(crate) fn cumulative_counter_enabled(&self, service: &str) -> bool {
        self.cumulative_counter_services.contains(service)
    }

    #[inline]
    pub(crate) fn workers_stats_enabled(&self, service: &str) -> bool {
        self.workers_stats_enabled && !self.workers_stats_blacklist.contains(service)
    }
}

impl CollectorConfig for DropwizardCollectorConfig {
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
