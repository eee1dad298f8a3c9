/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;

use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NerveConfigError {
    #[error("invalid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("the nerve config root is not an object")]
    NotAnObject,
}

/// A service registered in the local nerve config.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NerveService {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub port: u16,
}

/// The port is taken from the first check uri, which looks like
/// `/<protocol>/<service>/<port>/<path>`.
fn extract_port(service: &Map<String, Value>) -> Option<u16> {
    let check = service.get("checks")?.as_array()?.first()?.as_object()?;
    let uri = check.get("uri")?.as_str()?;

    let parts: Vec<&str> = uri.split('/').collect();
    if parts.len() <= 3 {
        return None;
    }
    let protocol = parts[1].trim();
    if !protocol.contains("http") && !protocol.contains("tcp") {
        return None;
    }
    parts[3].parse::<u16>().ok()
}

/// Parse the nerve config into a list of services.
///
/// Services are keyed by `<name>.<namespace>.<other>`. Entries without a
/// usable check port are dropped, and the result is deduplicated by
/// `name:port`, or by `name+namespace:port` if `namespace_included` is set.
pub fn parse_nerve_config(
    raw: &[u8],
    namespace_included: bool,
) -> Result<Vec<NerveService>, NerveConfigError> {
    let doc: Value = serde_json::from_slice(raw)?;
    let Value::Object(root) = doc else {
        return Err(NerveConfigError::NotAnObject);
    };
    let Some(services) = root.get("services").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut found: BTreeMap<String, NerveService> = BTreeMap::new();
    for (raw_name, config) in services {
        let Some(config) = config.as_object() else {
            debug!("nerve service {raw_name} is not an object");
            continue;
        };
        let Some(port) = extract_port(config) else {
            debug!("no valid check port found for nerve service {raw_name}");
            continue;
        };
        let host = config
            .get("host")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let mut segments = raw_name.split('.');
        let name = segments.next().unwrap_or_default().to_string();
        let namespace = segments.next().unwrap_or_default().to_string();

        let key = if namespace_included {
            format!("{name}{namespace}:{port}")
        } else {
            format!("{name}:{port}")
        };
        found.insert(
            key,
            NerveService {
                name,
                namespace,
                host,
                port,
            },
        );
    }

    Ok(found.into_values().collect())
}

#[derive(Clone, Debug)]
pub struct NerveEndpoint {
    pub host: String,
    pub port: u16,
}

/// Build a nerve config document that registers the given services, which
/// is the reverse of [`parse_nerve_config`].
pub fn create_minimal_nerve_config(endpoints: &BTreeMap<String, NerveEndpoint>) -> Value {
    let mut services = Map::with_capacity(endpoints.len());
    for (service, endpoint) in endpoints {
        let mut check = Map::with_capacity(1);
        check.insert(
            "uri".to_string(),
            Value::String(format!("/http/{service}/{}/status", endpoint.port)),
        );

        let mut config = Map::with_capacity(3);
        config.insert("host".to_string(), Value::String(endpoint.host.clone()));
        config.insert("port".to_string(), Value::from(endpoint.port));
        config.insert(
            "checks".to_string(),
            Value::Array(vec![Value::Object(check)]),
        );
        services.insert(service.clone(), Value::Object(config));
    }

    let mut root = Map::with_capacity(1);
    root.insert("services".to_string(), Value::Object(services));
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NERVE_CONFIG: &str = r#"{
        "heartbeat_path": "/var/run/nerve/heartbeat",
        "instance_id": "srv1-devc",
        "services": {
            "example_service.main.norcal-devc.superregion:norcal-devc.13752.new": {
                "check_interval": 7,
                "checks": [
                    {"host": "127.0.0.1", "port": 6666, "type": "http",
                     "uri": "/http/example_service.main/13752/status"}
                ],
                "host": "10.56.5.21",
                "port": 13752
            },
            "example_service.mesosstage_main.norcal-devc.superregion:norcal-devc.13752.new": {
                "checks": [
                    {"host": "127.0.0.1", "port": 6666, "type": "http",
                     "uri": "/http/example_service.mesosstage_main/22224/status"}
                ],
                "host": "10.56.5.21",
                "port": 22222
            },
            "example_service.another.norcal-devc.superregion:norcal-devc.13752.new": {
                "checks": [
                    {"host": "127.0.0.1", "port": 6666, "type": "http",
                     "uri": "/https/example_service.another/13752/status"}
                ],
                "host": "10.56.5.21",
                "port": 22222
            },
            "example_grpc_service.grpc_main.norcal-devc.superregion:norcal-devc.13752.new": {
                "checks": [
                    {"host": "127.0.0.1", "port": 12345, "type": "tcp",
                     "uri": "/tcp/example_grpc_service.another/12345/status"}
                ],
                "host": " 10.56.5.21 ",
                "port": 2222
            }
        }
    }"#;

    fn service(name: &str, namespace: &str, port: u16) -> NerveService {
        NerveService {
            name: name.to_string(),
            namespace: namespace.to_string(),
            host: "10.56.5.21".to_string(),
            port,
        }
    }

    #[test]
    fn with_namespace() {
        let services = parse_nerve_config(NERVE_CONFIG.as_bytes(), true).unwrap();
        assert_eq!(services.len(), 4);
        assert!(services.contains(&service("example_service", "main", 13752)));
        assert!(services.contains(&service("example_service", "mesosstage_main", 22224)));
        assert!(services.contains(&service("example_service", "another", 13752)));
        assert!(services.contains(&service("example_grpc_service", "grpc_main", 12345)));
    }

    #[test]
    fn without_namespace() {
        let services = parse_nerve_config(NERVE_CONFIG.as_bytes(), false).unwrap();
        let mut ports: Vec<u16> = services.iter().map(|s| s.port).collect();
        ports.sort_unstable();
        assert_eq!(ports, [12345, 13752, 22224]);
    }

    #[test]
    fn empty_config() {
        let services = parse_nerve_config(b"{}", true).unwrap();
        assert!(services.is_empty());
    }

    #[test]
    fn malformed() {
        assert!(matches!(
            parse_nerve_config(b"notjson", true),
            Err(NerveConfigError::Decode(_))
        ));
        assert!(matches!(
            parse_nerve_config(b"[]", true),
            Err(NerveConfigError::NotAnObject)
        ));
    }

    #[test]
    fn no_usable_uri() {
        let no_uri = r#"{"services": {
            "example_service.main.norcal-devc": {
                "checks": [{"host": "127.0.0.1", "type": "http"}],
                "host": "10.56.5.21",
                "port": 13752
            }
        }}"#;
        assert!(parse_nerve_config(no_uri.as_bytes(), true).unwrap().is_empty());

        let short_uri = r#"{"services": {
            "example_service.main.norcal-devc": {
                "checks": [{"uri": "/http/example_service.main"}],
                "host": "10.56.5.21"
            }
        }}"#;
        assert!(parse_nerve_config(short_uri.as_bytes(), true).unwrap().is_empty());

        let bad_protocol = r#"{"services": {
            "example_service.main.norcal-devc": {
                "checks": [{"uri": "/udp/example_service.main/1234/status"}],
                "host": "10.56.5.21"
            }
        }}"#;
        assert!(parse_nerve_config(bad_protocol.as_bytes(), true).unwrap().is_empty());
    }

    #[test]
    fn minimal_config() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "test_service.main".to_string(),
            NerveEndpoint {
                host: "localhost".to_string(),
                port: 8080,
            },
        );
        let doc = create_minimal_nerve_config(&endpoints);
        assert_eq!(
            doc["services"]["test_service.main"]["checks"][0]["uri"],
            "/http/test_service.main/8080/status"
        );

        let raw = serde_json::to_vec(&doc).unwrap();
        let services = parse_nerve_config(&raw, true).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "test_service");
        assert_eq!(services[0].namespace, "main");
        assert_eq!(services[0].host, "localhost");
        assert_eq!(services[0].port, 8080);
    }
}
