/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, YamlLoader};

mod yaml;

mod dropwizard;
pub use dropwizard::{DropwizardCollectorConfig, DropwizardEndpointConfig};

mod prometheus;
pub use prometheus::{PrometheusCollectorConfig, PrometheusEndpointConfig};

const CONFIG_KEY_COLLECTOR_TYPE: &str = "type";
const CONFIG_KEY_COLLECTOR_NAME: &str = "name";

#[derive(Clone, Copy, Debug)]
pub struct CollectorSchedule {
    pub interval: Duration,
}

pub trait CollectorConfig {
    fn name(&self) -> &str;
    fn collector_type(&self) -> &'static str;
    fn schedule(&self) -> CollectorSchedule;
}

#[derive(Clone, Debug)]
pub enum AnyCollectorConfig {
    Dropwizard(DropwizardCollectorConfig),
    Prometheus(PrometheusCollectorConfig),
}

impl CollectorConfig for AnyCollectorConfig {
    fn name(&self) -> &str {
        match self {
            AnyCollectorConfig::Dropwizard(c) => c.name(),
            AnyCollectorConfig::Prometheus(c) => c.name(),
        }
    }

    fn collector_type(&self) -> &'static str {
        match self {
            AnyCollectorConfig::Dropwizard(c) => c.collector_type(),
            AnyCollectorConfig::Prometheus(c) => c.collector_type(),
        }
    }

    fn schedule(&self) -> CollectorSchedule {
        match self {
            AnyCollectorConfig::Dropwizard(c) => c.schedule(),
            AnyCollectorConfig::Prometheus(c) => c.schedule(),
        }
    }
}

fn load_collector(map: &yaml_rust::yaml::Hash) -> anyhow::Result<AnyCollectorConfig> {
    let collector_type = map
        .get(&Yaml::String(CONFIG_KEY_COLLECTOR_TYPE.to_string()))
        .ok_or_else(|| anyhow!("no collector type set"))?;
    let collector_type = self::yaml::as_string(collector_type)?;
    match self::yaml::normalize_key(&collector_type).as_str() {
        "dropwizard" => {
            let collector = DropwizardCollectorConfig::parse(map)
                .context("failed to load this Dropwizard collector")?;
            Ok(AnyCollectorConfig::Dropwizard(collector))
        }
        "prometheus" => {
            let collector = PrometheusCollectorConfig::parse(map)
                .context("failed to load this Prometheus collector")?;
            Ok(AnyCollectorConfig::Prometheus(collector))
        }
        _ => Err(anyhow!("unsupported collector type {collector_type}")),
    }
}

/// Parse a list of collector maps, a single map is also accepted.
pub fn parse_collectors(doc: &Yaml) -> anyhow::Result<Vec<AnyCollectorConfig>> {
    let mut names = BTreeSet::new();
    let collectors =
        self::yaml::as_list(doc, |v| load_collector(self::yaml::as_hash(v)?))?;
    for collector in &collectors {
        if !names.insert(collector.name().to_string()) {
            return Err(anyhow!(
                "collector with name {} already exists",
                collector.name()
            ));
        }
    }
    Ok(collectors)
}

/// Load collectors from all the yaml docs in the string.
pub fn load_collectors_from_str(s: &str) -> anyhow::Result<Vec<AnyCollectorConfig>> {
    let docs = YamlLoader::load_from_str(s).map_err(|e| anyhow!("invalid yaml: {e}"))?;
    let mut all = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        let collectors = parse_collectors(doc).context(format!("invalid yaml doc #{i}"))?;
        all.extend(collectors);
    }
    Ok(all)
}

pub fn load_collectors_from_file(path: &Path) -> anyhow::Result<Vec<AnyCollectorConfig>> {
    let s = std::fs::read_to_string(path)
        .context(format!("failed to read config file {}", path.display()))?;
    load_collectors_from_str(&s).context(format!("failed to load config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_list() {
        let collectors = load_collectors_from_str(
            r#"
- type: Dropwizard
  name: uwsgi
  nerve_config: /etc/nerve/nerve.conf.json
- type: prometheus
  name: node
  endpoints:
    - url: http://127.0.0.1:9100/metrics
"#,
        )
        .unwrap();
        assert_eq!(collectors.len(), 2);
        assert!(matches!(collectors[0], AnyCollectorConfig::Dropwizard(_)));
        assert_eq!(collectors[0].collector_type(), "Dropwizard");
        assert!(matches!(collectors[1], AnyCollectorConfig::Prometheus(_)));
        assert_eq!(collectors[1].name(), "node");
        assert_eq!(collectors[1].schedule().interval, Duration::from_secs(10));
    }

    #[test]
    fn single_map() {
        let collectors = load_collectors_from_str(
            "type: prometheus\nname: node\nendpoints:\n  - url: http://127.0.0.1:9100/metrics\n",
        )
        .unwrap();
        assert_eq!(collectors.len(), 1);
    }

    #[test]
    fn invalid() {
        assert!(load_collectors_from_str("- name: a").is_err());
        assert!(load_collectors_from_str("- type: cpu\n  name: a").is_err());
        assert!(load_collectors_from_str("- 1").is_err());
        assert!(
            load_collectors_from_str(
                r#"
- type: dropwizard
  name: dup
  nerve_config: /tmp/a.json
- type: dropwizard
  name: dup
  nerve_config: /tmp/b.json
"#
            )
            .is_err()
        );
    }
}
