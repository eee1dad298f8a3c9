/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use yaml_rust::{Yaml, yaml};

use g3_metric::{DimensionBlacklist, DimensionMap, MetricNameSet};

#[derive(Debug, Error)]
pub enum YamlValueError {
    #[error("map key {0} is not a string")]
    NonStringKey(String),
    #[error("expected {expected}, got {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0:?} is not a valid {1}")]
    InvalidValue(String, &'static str),
}

fn type_name(v: &Yaml) -> &'static str {
    match v {
        Yaml::Real(_) => "real",
        Yaml::Integer(_) => "integer",
        Yaml::String(_) => "string",
        Yaml::Boolean(_) => "boolean",
        Yaml::Array(_) => "list",
        Yaml::Hash(_) => "map",
        Yaml::Alias(_) => "alias",
        Yaml::Null => "null",
        Yaml::BadValue => "bad value",
    }
}

fn unexpected(expected: &'static str, v: &Yaml) -> YamlValueError {
    YamlValueError::UnexpectedType {
        expected,
        found: type_name(v),
    }
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

/// Call `f` on every entry, the error of `f` gets the key as context.
pub(crate) fn foreach_kv<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table {
        let Yaml::String(key) = k else {
            return Err(YamlValueError::NonStringKey(format!("{k:?}")).into());
        };
        f(key, v).with_context(|| format!("bad value for {key}"))?;
    }
    Ok(())
}

/// Scalars are all accepted as strings.
pub(crate) fn as_string(v: &Yaml) -> Result<String, YamlValueError> {
    match v {
        Yaml::String(s) | Yaml::Real(s) => Ok(s.clone()),
        Yaml::Integer(i) => Ok(i.to_string()),
        _ => Err(unexpected("string", v)),
    }
}

pub(crate) fn as_bool(v: &Yaml) -> Result<bool, YamlValueError> {
    match v {
        Yaml::Boolean(b) => Ok(*b),
        Yaml::String(s) if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("yes") => {
            Ok(true)
        }
        Yaml::String(s) if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("no") => {
            Ok(false)
        }
        Yaml::String(s) => Err(YamlValueError::InvalidValue(s.clone(), "boolean")),
        _ => Err(unexpected("boolean", v)),
    }
}

pub(crate) fn as_u16(v: &Yaml) -> Result<u16, YamlValueError> {
    let port = match v {
        Yaml::Integer(i) => u16::try_from(*i).ok(),
        Yaml::String(s) => u16::from_str(s).ok(),
        _ => return Err(unexpected("u16", v)),
    };
    port.ok_or_else(|| YamlValueError::InvalidValue(format!("{v:?}"), "u16"))
}

fn secs_f64(s: &str) -> Result<Duration, YamlValueError> {
    f64::from_str(s)
        .ok()
        .and_then(|f| Duration::try_from_secs_f64(f).ok())
        .ok_or_else(|| YamlValueError::InvalidValue(s.to_string(), "duration"))
}

/// Plain numbers are taken as seconds, strings with units such as `1m30s`
/// go through humanize.
pub(crate) fn as_duration(v: &Yaml) -> Result<Duration, YamlValueError> {
    match v {
        Yaml::Integer(i) => u64::try_from(*i)
            .map(Duration::from_secs)
            .map_err(|_| YamlValueError::InvalidValue(i.to_string(), "duration")),
        Yaml::Real(s) => secs_f64(s),
        Yaml::String(s) => match humanize_rs::duration::parse(s) {
            Ok(d) => Ok(d),
            Err(humanize_rs::ParseError::MissingUnit) => secs_f64(s),
            Err(_) => Err(YamlValueError::InvalidValue(s.clone(), "duration")),
        },
        _ => Err(unexpected("duration", v)),
    }
}

/// A single value is taken as a list of one element.
pub(crate) fn as_list<T, E, F>(v: &Yaml, convert: F) -> anyhow::Result<Vec<T>>
where
    F: Fn(&Yaml) -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    let Yaml::Array(seq) = v else {
        let node = convert(v).map_err(Into::<anyhow::Error>::into)?;
        return Ok(vec![node]);
    };
    seq.iter()
        .enumerate()
        .map(|(i, v)| {
            convert(v)
                .map_err(Into::<anyhow::Error>::into)
                .with_context(|| format!("bad list element #{i}"))
        })
        .collect()
}

pub(crate) fn as_name_set(v: &Yaml) -> anyhow::Result<MetricNameSet> {
    let names = as_list(v, as_string)?;
    Ok(names.into_iter().collect())
}

pub(crate) fn as_hash<'a>(v: &'a Yaml) -> Result<&'a yaml::Hash, YamlValueError> {
    v.as_hash().ok_or_else(|| unexpected("map", v))
}

pub(crate) fn as_dimension_map(v: &Yaml) -> anyhow::Result<DimensionMap> {
    let mut dims = DimensionMap::new();
    foreach_kv(as_hash(v)?, |k, v| {
        dims.insert(k.to_string(), as_string(v)?);
        Ok(())
    })?;
    Ok(dims)
}

/// A map of dimension key to the list of values to drop.
pub(crate) fn as_dimension_blacklist(v: &Yaml) -> anyhow::Result<DimensionBlacklist> {
    let mut blacklist = DimensionBlacklist::default();
    foreach_kv(as_hash(v)?, |k, v| {
        blacklist.add_values(k, as_list(v, as_string)?);
        Ok(())
    })?;
    Ok(blacklist)
}

pub(crate) fn as_header_map(v: &Yaml) -> anyhow::Result<http::HeaderMap> {
    let mut headers = http::HeaderMap::new();
    foreach_kv(as_hash(v)?, |k, v| {
        let name = http::HeaderName::from_str(k)
            .map_err(|_| YamlValueError::InvalidValue(k.to_string(), "header name"))?;
        let value = as_string(v)?;
        let value = http::HeaderValue::from_str(&value)
            .map_err(|_| YamlValueError::InvalidValue(value, "header value"))?;
        headers.append(name, value);
        Ok(())
    })?;
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn load(s: &str) -> Yaml {
        YamlLoader::load_from_str(s).unwrap().pop().unwrap()
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_key("Abc"), "abc");
        assert_eq!(normalize_key("A-B_C"), "a_b_c");
    }

    #[test]
    fn kv_key_type() {
        let doc = load("123: 1");
        assert!(foreach_kv(doc.as_hash().unwrap(), |_, _| Ok(())).is_err());

        let doc = load("a: 1\nb: 2");
        let mut keys = Vec::new();
        foreach_kv(doc.as_hash().unwrap(), |k, _| {
            keys.push(k.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn duration() {
        assert_eq!(
            as_duration(&Yaml::Integer(10)).unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(
            as_duration(&Yaml::String("1m30s".to_string())).unwrap(),
            Duration::from_secs(90)
        );
        assert_eq!(
            as_duration(&Yaml::String("5".to_string())).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            as_duration(&Yaml::Real("0.5".to_string())).unwrap(),
            Duration::from_millis(500)
        );
        assert!(as_duration(&Yaml::Integer(-1)).is_err());
        assert!(as_duration(&Yaml::Boolean(true)).is_err());
    }

    #[test]
    fn bool_value() {
        assert!(as_bool(&Yaml::String("Yes".to_string())).unwrap());
        assert!(!as_bool(&Yaml::Boolean(false)).unwrap());
        assert!(matches!(
            as_bool(&Yaml::String("maybe".to_string())),
            Err(YamlValueError::InvalidValue(_, "boolean"))
        ));
        assert!(matches!(
            as_bool(&Yaml::Integer(0)),
            Err(YamlValueError::UnexpectedType {
                expected: "boolean",
                found: "integer"
            })
        ));
    }

    #[test]
    fn port_value() {
        assert_eq!(as_u16(&Yaml::Integer(8080)).unwrap(), 8080);
        assert_eq!(as_u16(&Yaml::String("443".to_string())).unwrap(), 443);
        assert!(matches!(
            as_u16(&Yaml::Integer(70000)),
            Err(YamlValueError::InvalidValue(_, "u16"))
        ));
    }

    #[test]
    fn error_context() {
        let doc = load("a:\n  b: [x, {c: 1}]");
        let e = foreach_kv(doc.as_hash().unwrap(), |_, v| {
            foreach_kv(v.as_hash().unwrap(), |_, v| as_list(v, as_string).map(|_| ()))
        })
        .unwrap_err();
        let chain: Vec<String> = e.chain().map(|e| e.to_string()).collect();
        assert_eq!(
            chain,
            [
                "bad value for a",
                "bad value for b",
                "bad list element #1",
                "expected string, got map",
            ]
        );
    }

    #[test]
    fn list_value() {
        let set = as_name_set(&load("[a, b, a]")).unwrap();
        assert_eq!(set.len(), 2);
        let set = as_name_set(&load("single")).unwrap();
        assert!(set.contains("single"));
    }

    #[test]
    fn dimension_values() {
        let dims = as_dimension_map(&load("foo: bar\nnum: 1")).unwrap();
        assert_eq!(dims.get("foo").map(|s| s.as_str()), Some("bar"));
        assert_eq!(dims.get("num").map(|s| s.as_str()), Some("1"));
        assert!(as_dimension_map(&load("[a]")).is_err());

        let blacklist = as_dimension_blacklist(&load("env: [dev, test]")).unwrap();
        let mut dims = DimensionMap::new();
        dims.insert("env".to_string(), "test".to_string());
        assert!(blacklist.matches(&dims));
    }

    #[test]
    fn headers() {
        let headers = as_header_map(&load("X-Token: abc\nAccept: text/plain")).unwrap();
        assert_eq!(headers.get("x-token").unwrap(), "abc");
        assert_eq!(headers.get(http::header::ACCEPT).unwrap(), "text/plain");
        assert!(as_header_map(&load("\"bad header\": x")).is_err());
    }
}
