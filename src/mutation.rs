//! The mutation handler: a one-shot runner sharing the subscription registry's id space,
//! serialized against other mutations on the same connection by the mutation mutex.

use std::sync::Arc;

use futures::Sink;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    collaborators::Variables,
    connection::Connection,
    envelope::OutboundEnvelope,
    error::ExecutionError,
    runner::{make_computation, report_setup_failure},
    writer::WriteError,
};

/// Runs one mutation. Parses and prepares against the mutation schema, then registers a
/// single-shot runner under `id` exactly as a subscription would, so `unsubscribe` can cancel a
/// mutation mid-flight. The runner's computation acquires the connection-wide mutation mutex for
/// its whole execution and, on success, broadcasts an immediate rerun to every live subscription.
pub async fn mutate<Ctx, W>(
    connection: Arc<Connection<Ctx, W>>,
    id: String,
    query: String,
    variables: Variables,
) -> Result<(), ExecutionError>
where
    Ctx: Clone + Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    connection
        .registry
        .check_capacity(&id)
        .await
        .map_err(ExecutionError::sanitized)?;

    let operation = match connection.mutation_schema.parse_and_prepare(&query, &variables) {
        Ok(operation) => operation,
        Err(err) => {
            report_setup_failure(&connection, &id, &query, &variables, &err).await;
            return Ok(());
        }
    };
    let previous: Arc<AsyncMutex<Option<crate::collaborators::Value>>> =
        Arc::new(AsyncMutex::new(None));

    let computation = make_computation(
        Arc::clone(&connection),
        id.clone(),
        Arc::clone(&operation),
        query,
        variables,
        previous,
        true,
    );

    let runner = connection.rerunner_factory.spawn(
        connection.base_context.clone(),
        computation,
        connection.min_rerun_interval,
    );

    if let Err(registry_err) = connection.registry.insert(id, Arc::clone(&runner)).await {
        runner.stop().await;
        return Err(ExecutionError::sanitized(registry_err));
    }
    Ok(())
}
