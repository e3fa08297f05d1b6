//! Data types for per-request access-log records.
//!
//! This module contains the core data structures handed to a [`Formatter`]
//! when a response body finishes streaming: a snapshot of the inbound
//! request and the completion-time response metadata.
//!
//! [`Formatter`]: crate::Formatter

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, StatusCode, Uri, Version};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::time::Duration;

/// The record posted to a [`Sink`]: a string-keyed mapping of scalar or
/// null values, serializable to the sink's wire format. No further schema
/// is enforced.
///
/// [`Sink`]: crate::Sink
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Read-only snapshot of an inbound request, taken before the inner
/// service runs.
///
/// The middleware only reads from the request; the snapshot exists so the
/// original request can move into the inner service while its metadata
/// stays available for the completion-time record.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request URI including path and query parameters
    pub uri: Uri,
    /// HTTP protocol version
    pub version: Version,
    /// Request headers. `HeaderMap` matches names case-insensitively.
    pub headers: HeaderMap,
    /// Peer address, when the server was started with
    /// [`into_make_service_with_connect_info`].
    ///
    /// [`into_make_service_with_connect_info`]: axum::Router::into_make_service_with_connect_info
    pub remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub(crate) fn capture(request: &axum::extract::Request) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            remote_addr,
        }
    }
}

/// Everything known about a completed exchange, assembled when the
/// response body finishes streaming and passed to the [`Formatter`].
///
/// Constructed once per request and discarded after the record is built.
///
/// [`Formatter`]: crate::Formatter
#[derive(Debug, Clone)]
pub struct LogInfo {
    /// Snapshot of the inbound request
    pub request: RequestContext,
    /// Response status code
    pub status: StatusCode,
    /// Response headers, captured when the response envelope was produced
    pub headers: HeaderMap,
    /// Wall-clock time at which the response body completed
    pub completed_at: DateTime<Utc>,
    /// Elapsed time from just before the inner service ran until the
    /// response body completed
    pub runtime: Duration,
    /// Declared response length per the `Content-Length` policy: `None`
    /// when the header is absent, unparseable, or `"0"`
    pub content_length: Option<u64>,
}
