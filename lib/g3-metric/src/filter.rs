/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use ahash::{AHashMap, AHashSet};

use super::DimensionMap;

/// A set of metric names, used as whitelist or blacklist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricNameSet {
    inner: AHashSet<String>,
}

impl MetricNameSet {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn insert(&mut self, name: String) -> bool {
        self.inner.insert(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }
}

impl<S: Into<String>> FromIterator<S> for MetricNameSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        MetricNameSet {
            inner: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Check a name against the optional whitelist and blacklist.
///
/// The blacklist is only consulted if there is no whitelist.
pub fn name_allowed(
    whitelist: Option<&MetricNameSet>,
    blacklist: Option<&MetricNameSet>,
    name: &str,
) -> bool {
    if let Some(whitelist) = whitelist {
        whitelist.contains(name)
    } else if let Some(blacklist) = blacklist {
        !blacklist.contains(name)
    } else {
        true
    }
}

/// Blacklisted values for each dimension key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DimensionBlacklist {
    inner: AHashMap<String, AHashSet<String>>,
}

impl DimensionBlacklist {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn add_values<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Check if any of the dimensions has a blacklisted value.
    pub fn matches(&self, dimensions: &DimensionMap) -> bool {
        if self.inner.is_empty() {
            return false;
        }
        dimensions.iter().any(|(k, v)| {
            self.inner
                .get(k.as_str())
                .map(|values| values.contains(v.as_str()))
                .unwrap_or(false)
        })
    }
}
