//! Traits for the pieces this crate treats as external collaborators: the query language
//! parser/validator, the executor, the structural diff algorithm, and the dependency-tracking
//! reactive runtime. None of these are implemented here, a real query engine supplies them,
//! the same way a [`juniper::RootNode`] is supplied to `juniper_graphql_ws::Schema`.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;

use crate::error::ExecutionError;

/// The opaque result value exchanged between the executor, the differ, and the client.
///
/// This crate treats it as JSON because the transport is JSON envelopes; a query engine with a
/// richer internal representation is expected to convert into this on its way out.
pub type Value = serde_json::Value;

/// Variables supplied alongside a query or mutation document.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Arbitrary metadata a [`Middleware`](crate::middleware::Middleware) may attach to an
/// execution, propagated verbatim into the outbound envelope.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// What kind of operation a parsed query turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// A read-only query.
    Query,
    /// A single-shot mutation.
    Mutation,
    /// A long-lived subscription.
    Subscription,
}

/// A query or mutation document that has already been parsed and validated against a schema
/// root. Produced once at subscribe/mutate time and reused for every re-execution.
pub trait PreparedOperation<Ctx>: Send + Sync {
    /// The kind of operation this document represents.
    fn kind(&self) -> OperationKind;

    /// The operation's name, if the document gave it one.
    fn name(&self) -> Option<&str>;

    /// Executes the operation against the given context and variables.
    fn execute<'a>(
        &'a self,
        ctx: &'a Ctx,
        variables: &'a Variables,
    ) -> BoxFuture<'a, Result<Value, ExecutionError>>;
}

/// Parses and validates queries against one schema (the query root or the mutation root).
pub trait SchemaRoot<Ctx>: Send + Sync {
    /// Parses `query` and validates it against this schema, returning a reusable prepared
    /// operation. Parsing and validation happen as a single step here, since this crate has no
    /// use for an intermediate parsed-but-unvalidated state.
    fn parse_and_prepare(
        &self,
        query: &str,
        variables: &Variables,
    ) -> Result<Arc<dyn PreparedOperation<Ctx>>, ExecutionError>;
}

/// Computes the structural delta between the previously delivered value and a freshly computed
/// one. Returns `None` when they are equivalent, meaning nothing should be sent to the client.
pub trait Differ: Send + Sync {
    /// Diffs `current` against `previous` (`None` on the very first computation).
    fn diff(&self, previous: Option<&Value>, current: &Value) -> Option<Value>;
}

/// A handle to a live reactive computation scheduled by a [`RerunnerFactory`].
pub trait Rerunner: Send + Sync {
    /// Forces one immediate re-execution, bypassing the minimum rerun interval. Used to let
    /// subscriptions observe post-mutation state without waiting on ambient invalidation.
    fn rerun_immediately<'a>(&'a self) -> BoxFuture<'a, ()>;

    /// Stops the computation. Idempotent.
    fn stop<'a>(&'a self) -> BoxFuture<'a, ()>;
}

/// The result of one computation invocation, as interpreted by the reactive runtime.
pub enum RerunOutcome {
    /// Execution succeeded (or failed and was already reported); keep the runner armed and wait
    /// for the next dependency invalidation.
    Continue,
    /// Retry on the next invalidation without discarding the dependency cache collected so far.
    Retry,
    /// The runner is done; do not schedule it again (used by mutations after their one run, and
    /// by cancelled/initial-errored subscriptions after they report and tear down).
    Stop,
}

/// The closure a [`RerunnerFactory`] repeatedly invokes. Takes an owned, already-decorated
/// context clone for this particular run.
pub type ComputationFn<Ctx> =
    Arc<dyn Fn(Ctx) -> BoxFuture<'static, RerunOutcome> + Send + Sync>;

/// Spawns [`Rerunner`]s. Implemented by the dependency-tracking reactive runtime; this crate
/// only calls through the trait.
pub trait RerunnerFactory<Ctx>: Send + Sync {
    /// Spawns a rerunner that calls `computation(base_ctx.clone())` once immediately, then again
    /// on every dependency invalidation, never more often than `min_interval` apart.
    fn spawn(
        &self,
        base_ctx: Ctx,
        computation: ComputationFn<Ctx>,
        min_interval: Duration,
    ) -> Arc<dyn Rerunner>;
}
