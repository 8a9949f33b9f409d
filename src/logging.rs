//! The logger collaborator and the tag set threaded through every call to it.
//!
//! The only concrete implementation shipped here is [`TracingLogger`], built on `tracing` the
//! same way the `tracing_support` example in this crate family instruments resolver execution
//! with spans. Callers may supply their own [`Logger`] instead.

use std::time::Duration;

/// The tag set passed to every logger callback for one subscription or mutation.
#[derive(Debug, Clone, Default)]
pub struct Tags {
    /// The connection's current `url` tag, set by the `url` verb.
    pub url: String,
    /// The raw query text.
    pub query: String,
    /// The variables, JSON-serialized.
    pub query_variables: String,
    /// The client-chosen subscription/mutation id.
    pub id: String,
    /// The operation kind, once parsing succeeded.
    pub query_type: Option<String>,
    /// The operation name, once parsing succeeded.
    pub query_name: Option<String>,
}

/// Receives structured execution events. Implemented by the hosting application; this crate's
/// only concrete implementation is [`TracingLogger`].
pub trait Logger: Send + Sync {
    /// Called immediately before a computation runs. `initial` is `true` only for a
    /// subscription's very first execution.
    fn start_execution(&self, tags: &Tags, initial: bool);

    /// Called immediately after a computation finishes, successfully or not.
    fn finish_execution(&self, tags: &Tags, elapsed: Duration);

    /// Called for every opaque error, and for sanitizable errors that are also taking the retry
    /// branch. `retry` is `true` when this error was swallowed and is being retried rather than
    /// reported to the client.
    fn log_error(&self, tags: &Tags, err: &(dyn std::error::Error + Send + Sync), retry: bool);
}

/// The default [`Logger`], backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn start_execution(&self, tags: &Tags, initial: bool) {
        tracing::debug!(
            url = %tags.url,
            id = %tags.id,
            query_type = tags.query_type.as_deref().unwrap_or("unknown"),
            query_name = tags.query_name.as_deref().unwrap_or("unknown"),
            initial,
            "starting execution",
        );
    }

    fn finish_execution(&self, tags: &Tags, elapsed: Duration) {
        tracing::debug!(
            url = %tags.url,
            id = %tags.id,
            query_type = tags.query_type.as_deref().unwrap_or("unknown"),
            query_name = tags.query_name.as_deref().unwrap_or("unknown"),
            elapsed_ms = elapsed.as_millis() as u64,
            "finished execution",
        );
    }

    fn log_error(&self, tags: &Tags, err: &(dyn std::error::Error + Send + Sync), retry: bool) {
        tracing::error!(
            url = %tags.url,
            id = %tags.id,
            query = %tags.query,
            query_variables = %tags.query_variables,
            retry,
            error = %err,
            "execution error",
        );
    }
}
