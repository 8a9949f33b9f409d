//! Error classification: the sanitizable/opaque split, and the typed error surface for the
//! connection's protocol-level boundaries.

use std::fmt;

use derive_more::{Display, Error, From};

use crate::logging::{Logger, Tags};

/// The literal text sent to the client in place of any opaque error's real message.
pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// An error whose author has declared its text safe to disclose to a client.
pub trait SanitizedError: std::error::Error + Send + Sync {
    /// The text to send to the client verbatim.
    fn client_message(&self) -> String {
        self.to_string()
    }
}

/// The request was malformed: bad JSON, an unknown verb, a query that failed to parse.
#[derive(Debug, Display, Error)]
#[display("{_0}")]
pub struct ClientError(pub String);

impl SanitizedError for ClientError {}

/// A server-side error that is nonetheless safe to disclose (e.g. a business-rule rejection
/// raised deliberately by a resolver).
#[derive(Debug, Display, Error)]
#[display("{_0}")]
pub struct SafeError(pub String);

impl SanitizedError for SafeError {}

/// An error produced by resolving a query, mutation, or middleware. Distinguishes sanitizable
/// errors (client-safe text) from opaque ones (logged, replaced by [`INTERNAL_SERVER_ERROR`]) via
/// a tagged variant rather than a downcast.
///
/// The sanitizable variant precomputes its client-facing text at construction time (rather than
/// storing `Box<dyn SanitizedError>` and calling `client_message()` later), so that both variants
/// can carry a plain `Box<dyn Error + Send + Sync>` for logging.
#[derive(Debug)]
pub enum ExecutionError {
    /// Safe to show the client as-is.
    Sanitized {
        source: Box<dyn std::error::Error + Send + Sync>,
        message: String,
    },
    /// Not safe to show the client; always logged.
    Opaque(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sanitized { source, .. } => source.fmt(f),
            Self::Opaque(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl ExecutionError {
    /// Wraps any opaque error.
    pub fn opaque(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Opaque(Box::new(err))
    }

    /// Wraps a sanitizable error.
    pub fn sanitized(err: impl SanitizedError + 'static) -> Self {
        let message = err.client_message();
        Self::Sanitized {
            source: Box::new(err),
            message,
        }
    }

    /// `true` for the variant the reactive runtime recognizes as a request to cancel, i.e. one
    /// carrying [`Cancelled`]. Cancellation is unwrapped here rather than string-matched.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Opaque(e) if e.downcast_ref::<Cancelled>().is_some())
    }

    /// Produces the text to send to the client, logging through `logger` when the error is
    /// opaque (always) or when `retry` is set (sanitizable errors only log on the retry path).
    pub fn sanitize(&self, logger: &dyn Logger, tags: &Tags, retry: bool) -> String {
        match self {
            Self::Sanitized { source, message } => {
                if retry {
                    logger.log_error(tags, source.as_ref(), true);
                }
                message.clone()
            }
            Self::Opaque(e) => {
                logger.log_error(tags, e.as_ref(), retry);
                INTERNAL_SERVER_ERROR.to_string()
            }
        }
    }

    /// Produces the client-safe text for a setup-time failure (parsing or preparing a query or
    /// mutation), unconditionally logging it first. Unlike [`Self::sanitize`], both branches log:
    /// validation failures should always reach the logger, not just the opaque ones.
    pub fn report(&self, logger: &dyn Logger, tags: &Tags) -> String {
        match self {
            Self::Sanitized { source, message } => {
                logger.log_error(tags, source.as_ref(), false);
                message.clone()
            }
            Self::Opaque(e) => {
                logger.log_error(tags, e.as_ref(), false);
                INTERNAL_SERVER_ERROR.to_string()
            }
        }
    }
}

/// The context-cancellation sentinel. Subscription and mutation computations that observe
/// cancellation return this (wrapped as [`ExecutionError::Opaque`]) so it can be recognized by
/// [`ExecutionError::is_cancelled`] without string-matching.
#[derive(Debug, Display, Error, Default)]
#[display("operation cancelled")]
pub struct Cancelled;

/// Errors at the connection/protocol boundary. Every variant is client-safe: these are protocol
/// and validation errors, never execution errors.
#[derive(Debug, Display, Error, From)]
pub enum ConnectionError {
    /// Attempted to (re)use a subscription id that is already live.
    #[display("duplicate subscription")]
    DuplicateSubscription,

    /// The registry is already at its live-subscription cap.
    #[display("too many subscriptions")]
    TooManySubscriptions,

    /// The envelope's `type` field was not a recognized verb.
    #[display("unknown message type")]
    UnknownMessageType,

    /// The envelope or its `message` payload failed to decode.
    #[display("{_0}")]
    #[from]
    Codec(serde_json::Error),
}

impl SanitizedError for ConnectionError {}
