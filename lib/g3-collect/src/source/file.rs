/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};

use super::{BodySource, FetchedBody};
use crate::Endpoint;

/// Serve endpoint bodies from local files, the uri path is resolved
/// relative to the root directory.
#[derive(Clone, Debug)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FileSource {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, endpoint: &Endpoint) -> PathBuf {
        let path = endpoint.uri().path().trim_start_matches('/');
        self.root.join(path)
    }
}

impl BodySource for FileSource {
    async fn fetch(&self, endpoint: &Endpoint) -> anyhow::Result<FetchedBody> {
        let path = self.file_path(endpoint);
        let body = tokio::time::timeout(endpoint.timeout(), tokio::fs::read(&path))
            .await
            .map_err(|_| anyhow!("timed out to read file {}", path.display()))?
            .context(format!("failed to read file {}", path.display()))?;
        Ok(FetchedBody::new(body))
    }
}
