use axum::{
    body::Body,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use bytes::Bytes;
use effluent::{AccessLogLayer, ForwardSink, MultiSink, Record, SinkHandle, TracingSink};
use serde_json::Value;
use std::time::Duration;
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

// Demo server handlers

async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    sleep(Duration::from_millis(50)).await; // Simulate some work
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Emits an extra record over the shared sink, alongside the access log.
async fn audit_handler(Extension(sink): Extension<SinkHandle>) -> impl IntoResponse {
    let mut record = Record::new();
    record.insert("action".to_owned(), Value::String("demo-audit".to_owned()));
    sink.post("demo.audit", record);
    "audited"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    info!("Starting access-log middleware demo server");

    // Every record goes to the local console and, when a collector is
    // listening on 127.0.0.1:24224, to Fluentd as well.
    let sink = MultiSink::new().with(TracingSink).with(ForwardSink::new());
    let layer = AccessLogLayer::with_sink("demo.access", sink);

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/streaming", get(streaming_handler))
        .route("/audit", get(audit_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(layer)
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello      - Simple greeting");
    info!("  POST /echo       - Echo request body");
    info!("  GET  /streaming  - Streaming response (record fires after the last chunk)");
    info!("  GET  /audit      - Posts an extra record via the SinkHandle extension");
    info!("");
    info!("Try these commands:");
    info!("  curl http://localhost:3000/hello");
    info!("  curl -X POST -d 'Hello from client' http://localhost:3000/echo");
    info!("  curl http://localhost:3000/streaming");
    info!("  curl http://localhost:3000/audit");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
