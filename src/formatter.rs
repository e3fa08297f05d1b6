//! Record construction from completed-exchange metadata.
//!
//! A [`Formatter`] turns a [`LogInfo`] into the [`Record`] posted to the
//! sink. [`DefaultFormatter`] produces the standard access-log shape;
//! substituting a custom formatter replaces it entirely — the layer calls
//! exactly one formatter per request.

use crate::fields;
use crate::types::{LogInfo, Record};
use serde_json::Value;

/// Strategy for building the per-request record.
///
/// Implementations must be pure over their input and must not panic for
/// any well-formed [`LogInfo`]: the formatter runs on the task that is
/// finishing the response body, so a panic there unwinds into the
/// transport. Callers own this guarantee for custom formatters.
///
/// # Examples
///
/// ```rust
/// use effluent::{Formatter, LogInfo, Record};
/// use serde_json::Value;
///
/// struct PathOnly;
///
/// impl Formatter for PathOnly {
///     fn format(&self, info: &LogInfo) -> Record {
///         let mut record = Record::new();
///         record.insert(
///             "path".to_owned(),
///             Value::String(info.request.uri.path().to_owned()),
///         );
///         record
///     }
/// }
/// ```
pub trait Formatter: Send + Sync + 'static {
    /// Build the record for one completed exchange.
    fn format(&self, info: &LogInfo) -> Record;
}

/// Adapter implementing [`Formatter`] for plain closures.
///
/// # Examples
///
/// ```rust
/// use effluent::{FormatFn, Record};
///
/// let formatter = FormatFn(|_info: &effluent::LogInfo| Record::new());
/// ```
pub struct FormatFn<F>(pub F);

impl<F> Formatter for FormatFn<F>
where
    F: Fn(&LogInfo) -> Record + Send + Sync + 'static,
{
    fn format(&self, info: &LogInfo) -> Record {
        (self.0)(info)
    }
}

/// The default record shape.
///
/// | key | value |
/// |---|---|
/// | `remote_addr` | `X-Forwarded-For`, else peer address, else null |
/// | `hostname` | `Host` request header, else null |
/// | `accessed_at` | completion time, RFC 3339 |
/// | `request_method` | verbatim |
/// | `path_info` | path with `%2F` decoded to `/` |
/// | `query_string` | `""` or `"?" + query` |
/// | `http_version` | `"HTTP/1.1"` style |
/// | `http_status` | integer |
/// | `user_agent` | verbatim, else null |
/// | `content_type` | response header, else null |
/// | `content_length` | integer, null when absent or `"0"` |
/// | `runtime` | seconds as a float |
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn format(&self, info: &LogInfo) -> Record {
        let mut record = Record::new();
        record.insert(
            "remote_addr".to_owned(),
            nullable(fields::remote_addr(info)),
        );
        record.insert(
            "hostname".to_owned(),
            nullable(fields::hostname(&info.request.headers)),
        );
        record.insert(
            "accessed_at".to_owned(),
            Value::String(info.completed_at.to_rfc3339()),
        );
        record.insert(
            "request_method".to_owned(),
            Value::String(info.request.method.to_string()),
        );
        record.insert(
            "path_info".to_owned(),
            Value::String(fields::path_info(&info.request.uri)),
        );
        record.insert(
            "query_string".to_owned(),
            Value::String(fields::query_string(&info.request.uri)),
        );
        record.insert(
            "http_version".to_owned(),
            Value::String(fields::http_version(info.request.version)),
        );
        record.insert(
            "http_status".to_owned(),
            match fields::parse_status(&info.status.to_string()) {
                Some(status) => Value::from(status),
                None => Value::Null,
            },
        );
        record.insert(
            "user_agent".to_owned(),
            nullable(fields::user_agent(&info.request.headers)),
        );
        record.insert(
            "content_type".to_owned(),
            nullable(fields::content_type(&info.headers)),
        );
        record.insert(
            "content_length".to_owned(),
            match info.content_length {
                Some(length) => Value::from(length),
                None => Value::Null,
            },
        );
        record.insert(
            "runtime".to_owned(),
            Value::from(info.runtime.as_secs_f64()),
        );
        record
    }
}

fn nullable(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}
