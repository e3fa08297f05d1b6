//! Record transports.
//!
//! A [`Sink`] accepts a tag and a [`Record`] and delivers them somewhere
//! else, best-effort. `post` must return quickly and must never surface a
//! delivery problem to its caller: it runs on the task that is finishing
//! a response body, and nothing that happens here may alter the response
//! the client receives.
//!
//! [`ForwardSink`] is the default transport: a bounded queue drained by a
//! background task that ships each record to a Fluentd-compatible
//! collector as a forward-protocol event. [`TracingSink`] emits records
//! as local structured logs, and [`MultiSink`] fans out to several sinks.

use crate::types::Record;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Destination for completed-request records.
///
/// Shared across all concurrent requests; `post` takes `&self` and must
/// be safe to call from many tasks at once without one caller blocking
/// another. Delivery is fire-and-forget: the middleware does not await
/// confirmation and never retries.
pub trait Sink: Send + Sync + 'static {
    /// Hand one record to the transport. Must not block the calling task
    /// for an unbounded time, and must not panic on delivery failure.
    fn post(&self, tag: &str, record: Record);
}

/// Configuration for [`ForwardSink`].
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Collector address. Defaults to the conventional local collector,
    /// `127.0.0.1:24224`.
    pub addr: SocketAddr,
    /// Queue depth between request tasks and the delivery worker. When
    /// the queue is full, new records are dropped.
    pub queue_capacity: usize,
    /// Pause after a failed connection attempt before the worker tries
    /// the next queued record.
    pub reconnect_delay: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 24224)),
            queue_capacity: 8192,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ForwardError {
    #[error("connect to collector failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("write to collector failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Event {
    tag: String,
    timestamp: i64,
    record: Record,
}

/// Fluentd forward-protocol client.
///
/// `post` enqueues onto a bounded channel and returns immediately; a
/// background task owns the TCP connection and writes each event as a
/// JSON-mode forward frame, `["tag", unix_time, {record}]`. Delivery is
/// best-effort: records are dropped when the queue is full, when the
/// collector is unreachable, or when a write fails, and every drop is
/// reported through `tracing` rather than to the request path. Nothing
/// is buffered across process restarts.
///
/// # Examples
///
/// ```rust,no_run
/// use effluent::{AccessLogLayer, ForwardConfig, ForwardSink};
///
/// # #[tokio::main]
/// # async fn main() {
/// let sink = ForwardSink::with_config(ForwardConfig {
///     addr: "10.0.0.5:24224".parse().unwrap(),
///     ..ForwardConfig::default()
/// });
/// let layer = AccessLogLayer::with_sink("myapp", sink);
/// # }
/// ```
pub struct ForwardSink {
    tx: mpsc::Sender<Event>,
}

impl ForwardSink {
    /// Connect to the conventional local collector, `127.0.0.1:24224`.
    ///
    /// Must be called within a tokio runtime: the delivery worker is
    /// spawned here.
    pub fn new() -> Self {
        Self::with_config(ForwardConfig::default())
    }

    /// Connect with explicit address, queue depth, and reconnect pacing.
    pub fn with_config(config: ForwardConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        tokio::spawn(deliver(rx, config));
        Self { tx }
    }
}

impl Default for ForwardSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ForwardSink {
    fn post(&self, tag: &str, record: Record) {
        let event = Event {
            tag: tag.to_owned(),
            timestamp: chrono::Utc::now().timestamp(),
            record,
        };
        if let Err(err) = self.tx.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    debug!(tag = %tag, "collector queue full, record dropped");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!(tag = %tag, "delivery worker gone, record dropped");
                }
            }
        }
    }
}

async fn deliver(mut rx: mpsc::Receiver<Event>, config: ForwardConfig) {
    let mut conn: Option<TcpStream> = None;
    while let Some(event) = rx.recv().await {
        if let Err(err) = forward(&mut conn, &event, &config).await {
            warn!(tag = %event.tag, error = %err, "record dropped");
            if matches!(err, ForwardError::Connect(_)) {
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }
    }
}

// One delivery attempt per event. A failed write poisons the connection;
// the next event reconnects.
async fn forward(
    conn: &mut Option<TcpStream>,
    event: &Event,
    config: &ForwardConfig,
) -> Result<(), ForwardError> {
    // JSON-mode forward frame: ["tag", unix_time, {record}]
    let frame = serde_json::to_vec(&(&event.tag, event.timestamp, &event.record))?;

    let stream = match conn {
        Some(stream) => stream,
        None => {
            let stream = TcpStream::connect(config.addr)
                .await
                .map_err(ForwardError::Connect)?;
            let _ = stream.set_nodelay(true);
            debug!(addr = %config.addr, "collector connected");
            conn.insert(stream)
        }
    };

    if let Err(err) = stream.write_all(&frame).await {
        *conn = None;
        return Err(ForwardError::Write(err));
    }
    Ok(())
}

/// Sink that emits each record as a local structured log event.
///
/// Records go out at INFO level under the `access_log` target, rendered
/// as JSON. Useful in development and as a secondary destination behind
/// a [`MultiSink`].
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn post(&self, tag: &str, record: Record) {
        info!(
            target: "access_log",
            tag = %tag,
            "{}",
            serde_json::Value::Object(record)
        );
    }
}

/// Sink that delegates to multiple inner sinks.
///
/// Every inner sink receives its own copy of each record, in registration
/// order. Each `post` is non-blocking per the [`Sink`] contract, so the
/// fan-out stays non-blocking as a whole.
///
/// # Examples
///
/// ```rust,no_run
/// use effluent::{ForwardSink, MultiSink, TracingSink};
///
/// # #[tokio::main]
/// # async fn main() {
/// let sink = MultiSink::new().with(ForwardSink::new()).with(TracingSink);
/// # }
/// ```
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl MultiSink {
    /// Create a new empty MultiSink.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink to the chain. Returns self for builder pattern.
    pub fn with<S: Sink>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Returns true if no sinks have been added.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the number of sinks in the chain.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl Sink for MultiSink {
    fn post(&self, tag: &str, record: Record) {
        for sink in &self.sinks {
            sink.post(tag, record.clone());
        }
    }
}
