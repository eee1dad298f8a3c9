/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use http::{HeaderMap, Uri};
use rustls::ClientConfig;

/// A metrics endpoint to be queried in one collection cycle.
#[derive(Clone, Debug)]
pub struct Endpoint {
    name: String,
    uri: Uri,
    headers: HeaderMap,
    timeout: Duration,
    tls_client: Option<Arc<ClientConfig>>,
}

impl Endpoint {
    pub fn new(name: &str, uri: Uri, timeout: Duration) -> Self {
        Endpoint {
            name: name.to_string(),
            uri,
            headers: HeaderMap::new(),
            timeout,
            tls_client: None,
        }
    }

    /// Build the endpoint from a host and port pair, `path` may or may not
    /// start with a slash.
    pub fn with_host_port(
        name: &str,
        host: &str,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let path = path.trim_start_matches('/');
        let s = match IpAddr::from_str(host) {
            Ok(IpAddr::V6(ip6)) => format!("http://[{ip6}]:{port}/{path}"),
            _ => format!("http://{host}:{port}/{path}"),
        };
        let uri = Uri::from_str(&s).map_err(|e| anyhow!("invalid uri {s}: {e}"))?;
        Ok(Endpoint::new(name, uri, timeout))
    }

    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    /// Needed for `https` uris.
    pub fn set_tls_client(&mut self, tls_client: Arc<ClientConfig>) {
        self.tls_client = Some(tls_client);
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline]
    pub fn tls_client(&self) -> Option<&Arc<ClientConfig>> {
        self.tls_client.as_ref()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.uri)
    }
}
