//! Pure field extraction from request metadata and response headers.
//!
//! Everything here is a stateless lookup or string transform; no I/O, no
//! clock. The [`DefaultFormatter`] composes these into the default record
//! shape, and custom formatters are free to reuse them.
//!
//! [`DefaultFormatter`]: crate::DefaultFormatter

use crate::types::LogInfo;
use axum::http::{header, HeaderMap, Uri, Version};

/// Client address: the `X-Forwarded-For` request header when present and
/// non-empty, otherwise the peer address the connection was accepted from.
pub fn remote_addr(info: &LogInfo) -> Option<String> {
    let forwarded = info
        .request
        .headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match forwarded {
        Some(value) => Some(value.to_owned()),
        None => info.request.remote_addr.map(|addr| addr.ip().to_string()),
    }
}

/// The `Host` request header, verbatim.
pub fn hostname(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::HOST)
}

/// The `User-Agent` request header, verbatim.
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::USER_AGENT)
}

/// The response `Content-Type` header, verbatim.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::CONTENT_TYPE)
}

/// Declared response length from the `Content-Length` header.
///
/// Absent, unparseable, or `"0"` all yield `None`: a zero length is
/// indistinguishable from "not yet known" for streamed bodies, a quirk
/// retained for compatibility with the historical record shape. Genuinely
/// empty bodies therefore report `None` rather than `0`.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(header::CONTENT_LENGTH)?.to_str().ok()?;
    match value.trim() {
        "" | "0" => None,
        value => value.parse().ok(),
    }
}

/// Request path with percent-encoded slashes (`%2F`) decoded back to `/`,
/// a workaround for proxies that escape path separators.
pub fn path_info(uri: &Uri) -> String {
    let path = uri.path();
    if !path.contains('%') {
        return path.to_owned();
    }
    path.replace("%2F", "/").replace("%2f", "/")
}

/// Raw query string prefixed with `?`, or the empty string when the
/// request carries no query.
pub fn query_string(uri: &Uri) -> String {
    match uri.query() {
        Some(query) if !query.is_empty() => format!("?{query}"),
        _ => String::new(),
    }
}

/// Protocol version rendered in the `HTTP/1.1` style.
pub fn http_version(version: Version) -> String {
    format!("{version:?}")
}

/// Parses the leading digits of a status token as an integer, tolerating
/// a trailing reason phrase (`"200 OK"` parses to `200`).
pub fn parse_status(token: &str) -> Option<u16> {
    let token = token.trim_start();
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    token[..end].parse().ok()
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parse_status_tolerates_reason_phrase() {
        assert_eq!(parse_status("200"), Some(200));
        assert_eq!(parse_status("200 OK"), Some(200));
        assert_eq!(parse_status("404 Not Found"), Some(404));
        assert_eq!(parse_status("OK"), None);
        assert_eq!(parse_status(""), None);
    }

    #[test]
    fn content_length_zero_and_absent_are_unknown() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert_eq!(content_length(&headers), None);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&headers), Some(42));

        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_static("not-a-number"),
        );
        assert_eq!(content_length(&headers), None);
    }

    #[test]
    fn content_length_matches_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static("6"));
        assert_eq!(content_length(&headers), Some(6));
    }

    #[test]
    fn path_info_decodes_escaped_separators() {
        let uri: Uri = "/a%2Fb".parse().unwrap();
        assert_eq!(path_info(&uri), "/a/b");

        let uri: Uri = "/a%2fb".parse().unwrap();
        assert_eq!(path_info(&uri), "/a/b");

        let uri: Uri = "/plain/path".parse().unwrap();
        assert_eq!(path_info(&uri), "/plain/path");
    }

    #[test]
    fn query_string_is_prefixed_or_empty() {
        let uri: Uri = "/hello".parse().unwrap();
        assert_eq!(query_string(&uri), "");

        let uri: Uri = "/hello?body=1".parse().unwrap();
        assert_eq!(query_string(&uri), "?body=1");
    }

    #[test]
    fn http_version_renders_wire_style() {
        assert_eq!(http_version(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(http_version(Version::HTTP_2), "HTTP/2.0");
    }
}
