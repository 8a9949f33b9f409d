//! The subscription runner: setup under the registry, and the computation closure shared by
//! subscriptions and mutations.

use std::{sync::Arc, time::Instant};

use futures::Sink;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    collaborators::{ComputationFn, PreparedOperation, RerunOutcome, Value, Variables},
    connection::Connection,
    envelope::OutboundEnvelope,
    error::ExecutionError,
    logging::Tags,
    middleware::{build_chain, ComputationInput},
    writer::WriteError,
};

/// Starts a subscription. Parses and prepares against the query schema, spawns a rerunner, and
/// registers it under `id`. If the registry rejects the id (duplicate or over capacity) the
/// just-spawned rerunner is stopped so nothing keeps running unregistered.
pub async fn subscribe<Ctx, W>(
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

    let operation = match connection.query_schema.parse_and_prepare(&query, &variables) {
        Ok(operation) => operation,
        Err(err) => {
            report_setup_failure(&connection, &id, &query, &variables, &err).await;
            return Ok(());
        }
    };
    let previous: Arc<AsyncMutex<Option<Value>>> = Arc::new(AsyncMutex::new(None));

    let computation = make_computation(
        Arc::clone(&connection),
        id.clone(),
        Arc::clone(&operation),
        query,
        variables,
        previous,
        false,
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

/// Logs and replies to a parse/prepare failure that happened before any runner was spawned, with
/// the query text and variables attached so the log carries what was actually sent.
pub(crate) async fn report_setup_failure<Ctx, W>(
    connection: &Arc<Connection<Ctx, W>>,
    id: &str,
    query: &str,
    variables: &Variables,
    err: &ExecutionError,
) where
    Ctx: Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    let tags = Tags {
        url: connection.url().await,
        query: query.to_string(),
        query_variables: serde_json::to_string(variables).unwrap_or_default(),
        id: id.to_string(),
        ..Tags::default()
    };
    let message = err.report(connection.logger.as_ref(), &tags);
    connection
        .writer
        .write_or_close(OutboundEnvelope::error(id.to_string(), message))
        .await;
}

/// Builds the [`ComputationFn`] shared by subscriptions and mutations. `is_mutation` selects
/// between the two error/success treatments used by subscriptions and one-shot mutations.
pub(crate) fn make_computation<Ctx, W>(
    connection: Arc<Connection<Ctx, W>>,
    id: String,
    operation: Arc<dyn PreparedOperation<Ctx>>,
    raw_query: String,
    variables: Variables,
    previous: Arc<AsyncMutex<Option<Value>>>,
    is_mutation: bool,
) -> ComputationFn<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    Arc::new(move |ctx: Ctx| {
        let connection = Arc::clone(&connection);
        let id = id.clone();
        let operation = Arc::clone(&operation);
        let raw_query = raw_query.clone();
        let variables = variables.clone();
        let previous = Arc::clone(&previous);
        Box::pin(async move {
            run_once(connection, id, operation, raw_query, variables, previous, is_mutation, ctx).await
        })
    })
}

/// One execution of a subscription or mutation computation.
async fn run_once<Ctx, W>(
    connection: Arc<Connection<Ctx, W>>,
    id: String,
    operation: Arc<dyn PreparedOperation<Ctx>>,
    raw_query: String,
    variables: Variables,
    previous: Arc<AsyncMutex<Option<Value>>>,
    is_mutation: bool,
    ctx: Ctx,
) -> RerunOutcome
where
    Ctx: Clone + Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    let _mutation_guard = if is_mutation {
        Some(connection.mutate_mu.lock().await)
    } else {
        None
    };

    let ctx = (connection.make_ctx)(ctx);

    let previous_snapshot = previous.lock().await.clone();
    let was_initial = previous_snapshot.is_none();

    let tags = Tags {
        url: connection.url().await,
        query: raw_query.clone(),
        query_variables: serde_json::to_string(&variables).unwrap_or_default(),
        id: id.clone(),
        query_type: Some(format!("{:?}", operation.kind())),
        query_name: operation.name().map(String::from),
    };

    connection.logger.start_execution(&tags, was_initial);

    let chain = build_chain(&connection.middlewares);
    let input = ComputationInput {
        context: ctx,
        subscription_id: id.clone(),
        operation,
        raw_query,
        variables,
        previous: previous_snapshot.clone(),
    };

    let start = Instant::now();
    let output = chain(input).await;
    connection.logger.finish_execution(&tags, start.elapsed());

    if let Some(err) = output.error {
        if err.is_cancelled() {
            schedule_removal(&connection, id);
            return RerunOutcome::Stop;
        }

        if is_mutation || was_initial {
            let message = err.sanitize(connection.logger.as_ref(), &tags, false);
            let envelope = OutboundEnvelope::error(id.clone(), message);
            connection.writer.write_or_close(envelope).await;
            schedule_removal(&connection, id);
            return RerunOutcome::Stop;
        }

        err.sanitize(connection.logger.as_ref(), &tags, true);
        return RerunOutcome::Retry;
    }

    let current = output.current.expect("success path always yields a value");

    if is_mutation {
        let diff = connection.differ.diff(None, &current);
        let message = diff.unwrap_or(current);
        let envelope = OutboundEnvelope::result(id.clone(), message, output.metadata);
        connection.writer.write_or_close(envelope).await;
        schedule_removal(&connection, id);
        spawn_broadcast(&connection);
        return RerunOutcome::Stop;
    }

    let diff = connection.differ.diff(previous_snapshot.as_ref(), &current);
    *previous.lock().await = Some(current.clone());

    if was_initial || diff.is_some() {
        let message = diff.unwrap_or(current);
        let envelope = OutboundEnvelope::update(id, message, output.metadata);
        connection.writer.write_or_close(envelope).await;
    }

    RerunOutcome::Continue
}

/// Removes `id` from the registry on a fresh task. Must not run inline: the caller is the
/// reactive runtime's own computation, which already holds its internal per-id lock, and removing
/// synchronously here would re-enter it.
fn schedule_removal<Ctx, W>(connection: &Arc<Connection<Ctx, W>>, id: String)
where
    Ctx: Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    let connection = Arc::clone(connection);
    tokio::spawn(async move {
        connection.registry.remove(&id).await;
    });
}

/// Forces every live subscription to rerun immediately. Spawned as a fresh task so it never runs
/// from inside the registry mutex a mutation's own teardown may already hold.
pub(crate) fn spawn_broadcast<Ctx, W>(connection: &Arc<Connection<Ctx, W>>)
where
    Ctx: Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    let connection = Arc::clone(connection);
    tokio::spawn(async move {
        connection.registry.rerun_all_immediately().await;
    });
}
