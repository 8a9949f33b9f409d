//! The middleware chain: an ordered pipeline of user hooks wrapping one computation, with a
//! framework-appended terminal middleware that performs the actual resolve.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    collaborators::{Metadata, PreparedOperation, Value, Variables},
    error::ExecutionError,
};

/// What a middleware (and the terminal resolver) receive.
pub struct ComputationInput<Ctx> {
    /// The decorated, per-run context.
    pub context: Ctx,
    /// The subscription or mutation id.
    pub subscription_id: String,
    /// The prepared operation to execute.
    pub operation: Arc<dyn PreparedOperation<Ctx>>,
    /// The raw query text, for logging.
    pub raw_query: String,
    /// The variables this run executes with.
    pub variables: Variables,
    /// The last successfully delivered value, or `None` for mutations and initial runs.
    pub previous: Option<Value>,
}

/// What a middleware (and the terminal resolver) produce.
pub struct ComputationOutput {
    /// The freshly computed value, if execution succeeded.
    pub current: Option<Value>,
    /// The error, if execution failed.
    pub error: Option<ExecutionError>,
    /// Metadata to thread into the outbound envelope.
    pub metadata: Metadata,
}

impl ComputationOutput {
    fn failed(error: ExecutionError) -> Self {
        Self {
            current: None,
            error: Some(error),
            metadata: Metadata::new(),
        }
    }
}

/// The rest of the chain, as seen by one middleware. Calling it runs every middleware after this
/// one, terminating in the resolver.
pub type Next<Ctx> =
    Arc<dyn Fn(ComputationInput<Ctx>) -> BoxFuture<'static, ComputationOutput> + Send + Sync>;

/// One layer of the chain. Implementations typically call `next(input)`, inspect or mutate the
/// resulting `output.metadata`, and return it; a middleware that never calls `next` short-circuits
/// the rest of the chain (including the terminal resolve).
pub trait Middleware<Ctx>: Send + Sync {
    /// Runs this layer, given the already-assembled input and the continuation.
    fn call(&self, input: ComputationInput<Ctx>, next: Next<Ctx>) -> BoxFuture<'static, ComputationOutput>;
}

/// Builds the chain for one execution: every registered middleware, outermost first, wrapping a
/// terminal middleware that invokes `input.operation`. Rebuilt per execution, so middlewares may
/// legitimately hold no state across runs.
pub fn build_chain<Ctx>(middlewares: &[Arc<dyn Middleware<Ctx>>]) -> Next<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    let terminal: Next<Ctx> = Arc::new(|input: ComputationInput<Ctx>| {
        Box::pin(async move {
            match input.operation.execute(&input.context, &input.variables).await {
                Ok(value) => ComputationOutput {
                    current: Some(value),
                    error: None,
                    metadata: Metadata::new(),
                },
                Err(e) => ComputationOutput::failed(e),
            }
        })
    });

    middlewares.iter().rev().fold(terminal, |next, mw| {
        let mw = Arc::clone(mw);
        let next = Arc::clone(&next);
        Arc::new(move |input: ComputationInput<Ctx>| mw.call(input, Arc::clone(&next)))
    })
}
