//! Small shared helpers: base64, address-list normalization, IPv4
//! validation, and a generic reverse-proxy fetch.

use crate::error::{full_body, ResponseBody};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper::header::HeaderValue;
use hyper::{Response, StatusCode};
use std::collections::HashSet;
use tracing::debug;

/// Base64-encode a string (standard alphabet, padded).
pub fn encode_base64(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

/// Base64-decode a string. Malformed input (bad alphabet, bad padding, or
/// non-UTF-8 payload) yields an empty string rather than an error.
pub fn decode_base64(input: &str) -> String {
    match STANDARD.decode(input.trim().as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Normalize a raw address blob into discrete address lines.
///
/// Splits on newlines, whitespace, commas, pipes, semicolons, and quotes,
/// trims each piece, drops blanks and `#` comments, and deduplicates while
/// preserving first-occurrence order. Idempotent: re-applying to its own
/// joined output yields the same lines.
pub fn organize_addresses(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let separators =
        |c: char| c.is_whitespace() || c == ',' || c == '|' || c == ';' || c == '"' || c == '\'';

    for line in text.lines() {
        // Comment lines are dropped whole, before tokenization
        if line.trim_start().starts_with('#') {
            continue;
        }
        for piece in line.split(separators) {
            let entry = piece.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            if seen.insert(entry.to_string()) {
                out.push(entry.to_string());
            }
        }
    }

    out
}

/// Check whether a string is a syntactically valid dotted-quad IPv4 address.
pub fn is_valid_ipv4(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|part| {
        !part.is_empty()
            && part.len() <= 3
            && part.chars().all(|c| c.is_ascii_digit())
            && part.parse::<u16>().map(|v| v <= 255).unwrap_or(false)
    })
}

/// Split an address line into host and port. Lines without a parseable
/// port are rejected.
pub fn split_host_port(line: &str) -> Option<(&str, u16)> {
    let (host, port) = line.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

/// Fetch a URL and repackage it as a response to the caller: status and
/// Content-Type are forwarded, everything else is dropped.
pub async fn proxy_fetch(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Response<ResponseBody>> {
    let upstream = client.get(url).send().await?;
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = upstream.bytes().await?;

    debug!(url, status = status.as_u16(), bytes = body.len(), "Proxied upstream response");

    let mut response = Response::builder().status(status);
    if let Some(ct) = content_type {
        if let Ok(value) = HeaderValue::from_str(&ct) {
            response = response.header(hyper::header::CONTENT_TYPE, value);
        }
    }
    Ok(response
        .body(full_body(body))
        .expect("valid response builder"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        for s in ["", "hello", "socks5://user@1.2.3.4:443?host=h", "a b c ~!@#$%"] {
            assert_eq!(decode_base64(&encode_base64(s)), s);
        }
    }

    #[test]
    fn test_base64_malformed_decode() {
        assert_eq!(decode_base64("not base64!!!"), "");
        assert_eq!(decode_base64("a"), "");
        assert_eq!(decode_base64("====="), "");
    }

    #[test]
    fn test_organize_addresses_basic() {
        let lines = organize_addresses("1.2.3.4:443\n5.6.7.8:80\n\n# comment\n1.2.3.4:443");
        assert_eq!(lines, vec!["1.2.3.4:443", "5.6.7.8:80"]);
    }

    #[test]
    fn test_organize_addresses_comment_line_dropped_whole() {
        // A comment body must not leak tokens into the output
        let lines = organize_addresses("1.2.3.4:443\n# 9.9.9.9:53 bad node\n  # indented\n5.6.7.8:80");
        assert_eq!(lines, vec!["1.2.3.4:443", "5.6.7.8:80"]);
    }

    #[test]
    fn test_organize_addresses_separators() {
        let lines = organize_addresses("1.2.3.4:443, 5.6.7.8:80|9.9.9.9:1080\t\"8.8.8.8:53\"");
        assert_eq!(
            lines,
            vec!["1.2.3.4:443", "5.6.7.8:80", "9.9.9.9:1080", "8.8.8.8:53"]
        );
    }

    #[test]
    fn test_organize_addresses_idempotent() {
        let input = "a:1,b:2\n# drop me\n\nb:2 c:3";
        let once = organize_addresses(input);
        let twice = organize_addresses(&once.join("\n"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_is_valid_ipv4() {
        assert!(is_valid_ipv4("255.255.255.255"));
        assert!(is_valid_ipv4("0.0.0.0"));
        assert!(is_valid_ipv4("192.168.1.1"));

        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("1.2.3.4.5"));
        assert!(!is_valid_ipv4("1.2.3."));
        assert!(!is_valid_ipv4("a.b.c.d"));
        assert!(!is_valid_ipv4("1234.1.1.1"));
        assert!(!is_valid_ipv4(""));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("1.2.3.4:443"), Some(("1.2.3.4", 443)));
        assert_eq!(split_host_port("example.com:80"), Some(("example.com", 80)));
        assert_eq!(split_host_port("1.2.3.4"), None);
        assert_eq!(split_host_port("1.2.3.4:notaport"), None);
        assert_eq!(split_host_port(":443"), None);
        assert_eq!(split_host_port("1.2.3.4:99999"), None);
    }
}
