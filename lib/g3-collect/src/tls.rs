/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use log::debug;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

#[cfg(feature = "rustls-ring")]
fn builtin_provider() -> Option<CryptoProvider> {
    Some(rustls::crypto::ring::default_provider())
}

#[cfg(all(not(feature = "rustls-ring"), feature = "rustls-aws-lc"))]
fn builtin_provider() -> Option<CryptoProvider> {
    Some(rustls::crypto::aws_lc_rs::default_provider())
}

#[cfg(not(any(feature = "rustls-ring", feature = "rustls-aws-lc")))]
fn builtin_provider() -> Option<CryptoProvider> {
    None
}

/// The process default provider if one has been installed, or the one
/// selected by crate features.
pub(crate) fn crypto_provider() -> anyhow::Result<Arc<CryptoProvider>> {
    if let Some(provider) = CryptoProvider::get_default() {
        return Ok(provider.clone());
    }
    builtin_provider()
        .map(Arc::new)
        .ok_or_else(|| anyhow!("no rustls crypto provider available"))
}

fn load_certificates(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let content = std::fs::read(path)
        .map_err(|e| anyhow!("failed to read certificate file {}: {e}", path.display()))?;
    let mut certs = Vec::new();
    for (i, r) in CertificateDer::pem_slice_iter(&content).enumerate() {
        let cert = r.map_err(|e| anyhow!("invalid certificate #{i}: {e:?}"))?;
        certs.push(cert);
    }
    if certs.is_empty() {
        return Err(anyhow!("no certificate found in {}", path.display()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let content = std::fs::read(path)
        .map_err(|e| anyhow!("failed to read private key file {}: {e}", path.display()))?;
    PrivateKeyDer::from_pem_slice(&content)
        .map_err(|e| anyhow!("invalid private key in {}: {e:?}", path.display()))
}

fn native_roots() -> anyhow::Result<RootCertStore> {
    let loaded = rustls_native_certs::load_native_certs();
    for e in &loaded.errors {
        debug!("skip native ca cert: {e}");
    }
    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(loaded.certs);
    if added == 0 {
        return Err(anyhow!("no usable native ca certificate found"));
    }
    Ok(roots)
}

/// TLS client settings of a scrape endpoint, loaded from PEM files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsClientConfigBuilder {
    server_ca_file: Option<PathBuf>,
    client_cert_file: Option<PathBuf>,
    client_key_file: Option<PathBuf>,
}

impl TlsClientConfigBuilder {
    pub fn set_server_ca_file(&mut self, path: PathBuf) {
        self.server_ca_file = Some(path);
    }

    pub fn set_client_cert_file(&mut self, path: PathBuf) {
        self.client_cert_file = Some(path);
    }

    pub fn set_client_key_file(&mut self, path: PathBuf) {
        self.client_key_file = Some(path);
    }

    pub fn is_empty(&self) -> bool {
        self.server_ca_file.is_none()
            && self.client_cert_file.is_none()
            && self.client_key_file.is_none()
    }

    pub fn check(&self) -> anyhow::Result<()> {
        match (&self.client_cert_file, &self.client_key_file) {
            (Some(_), None) => Err(anyhow!("client certificate is set without private key")),
            (None, Some(_)) => Err(anyhow!("client private key is set without certificate")),
            _ => Ok(()),
        }
    }

    /// Without a server ca file the system trust store is used.
    pub fn build(&self) -> anyhow::Result<Arc<ClientConfig>> {
        self.check()?;

        let roots = match &self.server_ca_file {
            Some(path) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certificates(path)? {
                    roots
                        .add(cert)
                        .map_err(|e| anyhow!("unusable ca certificate: {e}"))?;
                }
                roots
            }
            None => native_roots()?,
        };

        let builder = ClientConfig::builder_with_provider(crypto_provider()?)
            .with_safe_default_protocol_versions()
            .map_err(|e| anyhow!("unsupported tls protocol versions: {e}"))?
            .with_root_certificates(roots);
        let config = match (&self.client_cert_file, &self.client_key_file) {
            (Some(cert_file), Some(key_file)) => {
                let certs = load_certificates(cert_file).context("invalid client certificate")?;
                let key = load_private_key(key_file)?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| anyhow!("client certificate and key mismatch: {e}"))?
            }
            _ => builder.with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}
