//! # Effluent
//!
//! An Axum middleware that emits one structured access-log record per
//! completed request/response exchange and ships it to a Fluentd-style
//! collector, without adding latency to the request path.
//!
//! ## Features
//!
//! - **Completion-triggered**: the record is built only after the full
//!   response body has been streamed to the client (or the transfer was
//!   abandoned), so byte counts and runtimes are accurate
//! - **Exactly once**: one record per exchange, even for streamed, empty,
//!   or aborted bodies
//! - **Non-blocking delivery**: records are handed to a background
//!   transport; collector failures never reach the request path
//! - **Pluggable**: swap the record shape ([`Formatter`]) or the
//!   transport ([`Sink`]) independently
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use effluent::AccessLogLayer;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // Default transport: Fluentd forward protocol on 127.0.0.1:24224.
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .layer(AccessLogLayer::new("myapp"));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom record shape
//!
//! A caller-supplied [`Formatter`] fully replaces the default one:
//!
//! ```rust,no_run
//! use effluent::{AccessLogLayer, Record, TracingSink};
//! use serde_json::Value;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let layer = AccessLogLayer::with_sink("myapp", TracingSink).format_fn(|info| {
//!     let mut record = Record::new();
//!     record.insert(
//!         "path".to_owned(),
//!         Value::String(info.request.uri.path().to_owned()),
//!     );
//!     record.insert("status".to_owned(), Value::from(info.status.as_u16()));
//!     record
//! });
//! # }
//! ```
//!
//! ## What gets logged when
//!
//! The layer snapshots the request, runs the inner service, and wraps the
//! response body. Once the body finishes streaming — end-of-stream or
//! close, whichever comes first — it assembles a [`LogInfo`], runs the
//! formatter, and posts the record. An inner service that fails before
//! producing a response propagates its error unchanged and no record is
//! emitted: only completed exchanges are logged.

use axum::extract::Request;
use axum::response::Response;
use chrono::Utc;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

mod body_wrapper;
use body_wrapper::{observe_completion, CompletionGuard};

pub mod fields;

pub mod formatter;
pub use formatter::{DefaultFormatter, FormatFn, Formatter};

pub mod sink;
pub use sink::{ForwardConfig, ForwardSink, MultiSink, Sink, TracingSink};

pub mod types;
pub use types::{LogInfo, Record, RequestContext};

/// Cloneable reference to the layer's sink, attached to every request's
/// extensions.
///
/// Downstream handlers may pull this out to emit additional records over
/// the same transport. Purely additive — nothing in the middleware
/// depends on it being read.
///
/// # Examples
///
/// ```rust
/// use axum::Extension;
/// use effluent::{Record, SinkHandle};
///
/// async fn handler(Extension(sink): Extension<SinkHandle>) -> &'static str {
///     sink.post("myapp.audit", Record::new());
///     "ok"
/// }
/// ```
#[derive(Clone)]
pub struct SinkHandle(Arc<dyn Sink>);

impl SinkHandle {
    /// Post an additional record over the shared transport.
    pub fn post(&self, tag: &str, record: Record) {
        self.0.post(tag, record);
    }
}

/// Tower layer for completion-triggered access logging.
///
/// Holds only immutable configuration — the tag identifying the log
/// stream, the sink, and the formatter — all resolved once here, then
/// shared by every service the layer wraps.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use effluent::{AccessLogLayer, TracingSink};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let layer = AccessLogLayer::with_sink("myapp", TracingSink);
///
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
/// # }
/// ```
#[derive(Clone)]
pub struct AccessLogLayer {
    tag: Arc<str>,
    sink: Arc<dyn Sink>,
    formatter: Arc<dyn Formatter>,
}

impl AccessLogLayer {
    /// Create a layer posting to the conventional local collector
    /// (`127.0.0.1:24224`) with the default record shape.
    ///
    /// `tag` identifies the log stream to the collector. Must be called
    /// within a tokio runtime; the default sink spawns its delivery
    /// worker here.
    pub fn new(tag: &str) -> Self {
        Self::with_sink(tag, ForwardSink::new())
    }

    /// Create a layer posting to the supplied sink instead of the
    /// default collector client.
    pub fn with_sink<S: Sink>(tag: &str, sink: S) -> Self {
        Self {
            tag: Arc::from(tag),
            sink: Arc::new(sink),
            formatter: Arc::new(DefaultFormatter),
        }
    }

    /// Replace the default record shape. The supplied formatter is the
    /// only one called.
    pub fn formatter<F: Formatter>(mut self, formatter: F) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Closure convenience for [`formatter`](Self::formatter).
    pub fn format_fn<F>(self, format: F) -> Self
    where
        F: Fn(&LogInfo) -> Record + Send + Sync + 'static,
    {
        self.formatter(FormatFn(format))
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            tag: self.tag.clone(),
            sink: self.sink.clone(),
            formatter: self.formatter.clone(),
        }
    }
}

/// Tower service implementation for completion-triggered access logging.
///
/// Wraps an inner service; created by [`AccessLogLayer`], not directly.
/// The service reads the request's metadata and the response envelope's
/// status and headers, and defers everything else to the moment the
/// response body completes. It never reads body bytes itself.
#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    tag: Arc<str>,
    sink: Arc<dyn Sink>,
    formatter: Arc<dyn Formatter>,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let started_at = Instant::now();
        let context = RequestContext::capture(&request);

        debug!(method = %context.method, uri = %context.uri, "request received");

        // Additive side channel; see SinkHandle.
        request.extensions_mut().insert(SinkHandle(self.sink.clone()));

        let tag = self.tag.clone();
        let sink = self.sink.clone();
        let formatter = self.formatter.clone();
        let future = self.inner.call(request);

        Box::pin(async move {
            // An inner-service failure propagates unchanged: no response
            // envelope, no record.
            let response = future.await?;

            let (parts, body) = response.into_parts();
            let status = parts.status;
            let headers = parts.headers.clone();

            let guard = CompletionGuard::new(move || {
                let completed_at = Utc::now();
                let runtime = started_at.elapsed();
                let content_length = fields::content_length(&headers);

                debug!(
                    status = %status,
                    runtime_ms = runtime.as_millis() as u64,
                    "response completed"
                );

                let info = LogInfo {
                    request: context,
                    status,
                    headers,
                    completed_at,
                    runtime,
                    content_length,
                };
                let record = formatter.format(&info);
                sink.post(&tag, record);
            });

            let body = observe_completion(body, guard);
            Ok(Response::from_parts(parts, body))
        })
    }
}
