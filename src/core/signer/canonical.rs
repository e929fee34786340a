//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n       (every header line newline-terminated)
//! \n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Each component is normalized so that identical requests always produce
//! byte-identical output.
use std::fmt;

use http::HeaderMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::core::crypto::sha256_hex;

/// Everything except the RFC 3986 unreserved characters
/// (`A-Z a-z 0-9 - _ . ~`) is percent-encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A fully normalized request, ready to be hashed into the string to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: String,
    pub uri: String,
    pub query: String,
    pub headers: String,
    pub signed_headers: String,
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// Build the canonical form of a request.
    ///
    /// `path` and `query` are taken as they appear on the wire. Only the
    /// headers named in `signed_headers` participate; names are matched
    /// case-insensitively.
    pub fn new(
        method: &str,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        signed_headers: &[&str],
        payload_hash: &str,
    ) -> Self {
        Self {
            method: method.to_string(),
            uri: encode_path(path),
            query: canonical_query_string(query.unwrap_or_default()),
            headers: canonical_headers(headers, signed_headers),
            signed_headers: signed_headers_list(signed_headers),
            payload_hash: payload_hash.to_string(),
        }
    }

    /// Hex SHA-256 of the canonical string.
    pub fn hash(&self) -> String {
        sha256_hex(self.to_string())
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method, self.uri, self.query, self.headers, self.signed_headers, self.payload_hash
        )
    }
}

/// Percent-encode every path segment individually, keeping `/` separators.
///
/// A segment can never gain a separator: a literal `%2F` inside a segment is
/// encoded again (`%252F`) instead of being turned into `/`. Empty paths
/// normalize to `/`.
pub fn encode_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    path.split('/')
        .map(|segment| utf8_percent_encode(segment, URI_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Sort query parameters and re-encode keys and values.
///
/// Parameters are decoded with form semantics (`+` is a space) and then
/// encoded with the unreserved set, so `a=x y` and `a=x%20y` sign the same.
/// Ordering is by encoded key, then encoded value. A parameter without a
/// value renders as `key=`.
pub fn canonical_query_string(query: &str) -> String {
    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (uri_encode(&form_decode(key)), uri_encode(&form_decode(value)))
        })
        .collect();

    params.sort();

    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block: one `name:value` line per signed header,
/// sorted by lower-cased name, every line newline-terminated.
///
/// Values are trimmed and runs of whitespace collapse to a single space.
/// Repeated headers are joined with `,`. A signed header absent from the map
/// renders with an empty value.
pub fn canonical_headers(headers: &HeaderMap, signed_headers: &[&str]) -> String {
    let mut names: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    names.sort();
    names.dedup();

    let mut block = String::new();
    for name in names {
        let value = headers
            .get_all(name.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| collapse_whitespace(v.trim()))
            .collect::<Vec<_>>()
            .join(",");
        block.push_str(&name);
        block.push(':');
        block.push_str(&value);
        block.push('\n');
    }
    block
}

/// Semicolon-joined, sorted, lower-cased signed header names.
pub fn signed_headers_list(signed_headers: &[&str]) -> String {
    let mut names: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    names.sort();
    names.dedup();
    names.join(";")
}

fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn form_decode(input: &str) -> String {
    percent_decode_str(&input.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
