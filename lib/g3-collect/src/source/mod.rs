/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;

use crate::Endpoint;

mod file;
pub use file::FileSource;

mod http_get;
pub use http_get::{HttpFetchError, HttpSource};

pub const DEFAULT_METRICS_SCHEMA: &str = "default";

/// The raw body of a metrics endpoint, not yet parsed.
#[derive(Debug)]
pub struct FetchedBody {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub schema: String,
}

impl FetchedBody {
    pub fn new(body: Vec<u8>) -> Self {
        FetchedBody {
            body,
            content_type: None,
            schema: DEFAULT_METRICS_SCHEMA.to_string(),
        }
    }
}

pub trait BodySource {
    fn fetch(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = anyhow::Result<FetchedBody>> + Send;
}
