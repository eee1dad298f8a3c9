/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

pub mod collect;
pub mod config;
pub mod handler;
pub mod nerve;
pub mod source;
pub mod stats;

mod endpoint;
pub use endpoint::Endpoint;

mod tls;
pub use tls::TlsClientConfigBuilder;
