/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;
use std::str::FromStr;

use super::{ExpositionFormat, PromParseErrorKind, PromType};

pub(super) struct Sample<'a> {
    pub(super) name: &'a str,
    pub(super) labels: Vec<(&'a str, Cow<'a, str>)>,
    pub(super) value: f64,
}

pub(super) enum PromEntry<'a> {
    Type { name: &'a str, r#type: PromType },
    Sample(Sample<'a>),
    Eof,
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut iter = name.bytes();
    match iter.next() {
        Some(c) if c.is_ascii_alphabetic() || c == b'_' || c == b':' => {}
        _ => return false,
    }
    iter.all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut iter = name.bytes();
    match iter.next() {
        Some(c) if c.is_ascii_alphabetic() || c == b'_' => {}
        _ => return false,
    }
    iter.all(|c| c.is_ascii_alphanumeric() || c == b'_')
}

pub(super) struct LineParser<'a> {
    line: &'a str,
    format: ExpositionFormat,
}

impl<'a> LineParser<'a> {
    pub(super) fn new(line: &'a str, format: ExpositionFormat) -> Self {
        LineParser {
            line: line.trim(),
            format,
        }
    }

    /// Parse the line, blank lines and plain comments yield nothing.
    pub(super) fn parse(self) -> Result<Option<PromEntry<'a>>, PromParseErrorKind> {
        if self.line.is_empty() {
            return Ok(None);
        }
        if let Some(comment) = self.line.strip_prefix('#') {
            return self.parse_comment(comment);
        }
        self.parse_sample().map(|s| Some(PromEntry::Sample(s)))
    }

    fn parse_comment(&self, comment: &'a str) -> Result<Option<PromEntry<'a>>, PromParseErrorKind> {
        let mut tokens = comment.split_ascii_whitespace();
        match tokens.next() {
            Some("TYPE") => {
                let name = tokens.next().ok_or(PromParseErrorKind::InvalidTypeLine)?;
                if !is_valid_metric_name(name) {
                    return Err(PromParseErrorKind::InvalidName);
                }
                let r#type = tokens.next().ok_or(PromParseErrorKind::InvalidTypeLine)?;
                let r#type = PromType::from_str(r#type)
                    .map_err(|_| PromParseErrorKind::UnsupportedType)?;
                if tokens.next().is_some() {
                    return Err(PromParseErrorKind::InvalidTypeLine);
                }
                Ok(Some(PromEntry::Type { name, r#type }))
            }
            Some("EOF") if self.format == ExpositionFormat::OpenMetrics => {
                Ok(Some(PromEntry::Eof))
            }
            // HELP, UNIT and free comments
            _ => Ok(None),
        }
    }

    fn parse_sample(&self) -> Result<Sample<'a>, PromParseErrorKind> {
        let line = self.line;
        let name_end = line
            .find(|c: char| c == '{' || c.is_ascii_whitespace())
            .unwrap_or(line.len());
        let name = &line[..name_end];
        if !is_valid_metric_name(name) {
            return Err(PromParseErrorKind::InvalidName);
        }

        let mut left = &line[name_end..];
        let mut labels = Vec::new();
        if let Some(s) = left.strip_prefix('{') {
            left = parse_labels(s, &mut labels)?;
        }

        let mut tokens = left.split_ascii_whitespace();
        let value = tokens.next().ok_or(PromParseErrorKind::NoValue)?;
        let value = f64::from_str(value).map_err(|_| PromParseErrorKind::InvalidValue)?;

        // optional timestamp, then an optional exemplar which is ignored
        if let Some(token) = tokens.next()
            && !token.starts_with('#')
        {
            if !is_valid_timestamp(token) {
                return Err(PromParseErrorKind::InvalidTimestamp);
            }
            if let Some(token) = tokens.next()
                && !token.starts_with('#')
            {
                return Err(PromParseErrorKind::InvalidTimestamp);
            }
        }

        Ok(Sample {
            name,
            labels,
            value,
        })
    }
}

fn is_valid_timestamp(s: &str) -> bool {
    i64::from_str(s).is_ok() || f64::from_str(s).map(|f| f.is_finite()).unwrap_or(false)
}

/// Parse the label set after the opening brace, return what is left after the closing brace.
fn parse_labels<'a>(
    mut s: &'a str,
    labels: &mut Vec<(&'a str, Cow<'a, str>)>,
) -> Result<&'a str, PromParseErrorKind> {
    loop {
        s = s.trim_start();
        if let Some(left) = s.strip_prefix('}') {
            return Ok(left);
        }

        let name_end = s
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .ok_or(PromParseErrorKind::InvalidLabels("unterminated label set"))?;
        let name = &s[..name_end];
        if !is_valid_label_name(name) {
            return Err(PromParseErrorKind::InvalidLabels("invalid label name"));
        }
        s = s[name_end..]
            .trim_start()
            .strip_prefix('=')
            .ok_or(PromParseErrorKind::InvalidLabels("no '=' after label name"))?
            .trim_start()
            .strip_prefix('"')
            .ok_or(PromParseErrorKind::InvalidLabels("label value not quoted"))?;

        let (value, left) = parse_label_value(s)?;
        labels.push((name, value));

        s = left.trim_start();
        if let Some(left) = s.strip_prefix(',') {
            s = left;
        } else if let Some(left) = s.strip_prefix('}') {
            return Ok(left);
        } else {
            return Err(PromParseErrorKind::InvalidLabels("unexpected char after label value"));
        }
    }
}

fn parse_label_value(s: &str) -> Result<(Cow<'_, str>, &str), PromParseErrorKind> {
    let b = s.as_bytes();
    let mut unescaped: Option<String> = None;
    let mut start = 0;
    let mut offset = 0;

    loop {
        let p = memchr::memchr2(b'"', b'\\', &b[offset..])
            .ok_or(PromParseErrorKind::InvalidLabels("unterminated label value"))?;
        let at = offset + p;
        if b[at] == b'"' {
            let value = match unescaped {
                Some(mut buf) => {
                    buf.push_str(&s[start..at]);
                    Cow::Owned(buf)
                }
                None => Cow::Borrowed(&s[..at]),
            };
            return Ok((value, &s[at + 1..]));
        }

        let buf = unescaped.get_or_insert_with(String::new);
        buf.push_str(&s[start..at]);
        match b.get(at + 1) {
            Some(b'n') => buf.push('\n'),
            Some(b'\\') => buf.push('\\'),
            Some(b'"') => buf.push('"'),
            Some(_) => {
                // keep unknown escapes as is
                buf.push('\\');
                offset = at + 1;
                start = offset;
                continue;
            }
            None => {
                return Err(PromParseErrorKind::InvalidLabels(
                    "unterminated label value",
                ));
            }
        }
        offset = at + 2;
        start = offset;
    }
}
