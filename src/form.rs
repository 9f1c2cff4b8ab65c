//! Strict parsing and encoding of `application/x-www-form-urlencoded` data
//!
//! Used for both query strings and form bodies. Parsing is strict so that a
//! malformed query or body is a real, observable failure: invalid or
//! truncated percent escapes, semicolon separators and non-UTF-8 decoded
//! text are all rejected.

use std::collections::HashMap;
use thiserror::Error;

/// Multi-valued form data keyed by field name.
pub type Values = HashMap<String, Vec<String>>;

/// Errors produced while parsing urlencoded data.
#[derive(Error, Debug)]
pub enum FormError {
    /// Semicolons are not accepted as pair separators
    #[error("invalid semicolon separator in query")]
    SemicolonSeparator,

    /// A `%` escape that is truncated or not followed by two hex digits
    #[error("invalid URL escape {0:?}")]
    InvalidEscape(String),

    /// Decoded text that is not valid UTF-8
    #[error("form data is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Reading the form body from the request failed
    #[error("failed to read form body: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses urlencoded input into key/value pairs, preserving wire order.
///
/// Pairs are separated by `&`, keys from values by the first `=`. A pair
/// without `=` yields an empty value; pairs with an empty key are skipped.
pub fn parse(input: &str) -> Result<Vec<(String, String)>, FormError> {
    let mut pairs = Vec::new();

    for segment in input.split('&') {
        if segment.is_empty() {
            continue;
        }
        if segment.contains(';') {
            return Err(FormError::SemicolonSeparator);
        }

        let (key, value) = match segment.split_once('=') {
            Some((key, value)) => (key, value),
            None => (segment, ""),
        };
        if key.is_empty() {
            continue;
        }

        pairs.push((unescape(key)?, unescape(value)?));
    }

    Ok(pairs)
}

/// Folds parsed pairs into a value map, appending to existing keys.
pub fn merge(values: &mut Values, pairs: Vec<(String, String)>) {
    for (key, value) in pairs {
        values.entry(key).or_default().push(value);
    }
}

/// Encodes form values in canonical order: keys sorted, values in insertion
/// order. The inverse of [`parse`] up to key ordering.
pub fn encode(values: &Values) -> String {
    let mut keys: Vec<_> = values.keys().collect();
    keys.sort();

    let mut out = String::new();
    for key in keys {
        for value in &values[key] {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&escape(key));
            out.push('=');
            out.push_str(&escape(value));
        }
    }
    out
}

/// Decodes `+` as space and `%XX` escapes.
fn unescape(input: &str) -> Result<String, FormError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if i + 2 >= bytes.len() {
                    // Truncated escape; report the offending tail
                    return Err(FormError::InvalidEscape(input[i..].to_string()));
                }
                let hi = hex_digit(bytes[i + 1]);
                let lo = hex_digit(bytes[i + 2]);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        let end = (i + 3).min(bytes.len());
                        return Err(FormError::InvalidEscape(input[i..end].to_string()));
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Ok(String::from_utf8(out)?)
}

/// Escapes a component the way `application/x-www-form-urlencoded` expects:
/// space as `+`, unreserved characters verbatim, everything else as `%XX`.
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
