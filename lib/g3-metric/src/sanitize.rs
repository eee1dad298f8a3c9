/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;

const REPLACEMENT: char = '-';

#[inline]
fn is_forbidden(c: char) -> bool {
    matches!(c, ':' | '=') || c.is_control()
}

/// Replace the chars reserved by the tag formats of the backends.
///
/// All other chars, unicode included, are kept as is. The result of an
/// already sanitized string is borrowed from the input.
pub fn sanitize(s: &str) -> Cow<'_, str> {
    if is_sanitized(s) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if is_forbidden(c) {
            out.push(REPLACEMENT);
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

pub fn is_sanitized(s: &str) -> bool {
    !s.chars().any(is_forbidden)
}
