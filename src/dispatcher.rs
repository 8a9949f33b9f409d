//! The dispatcher: decodes one envelope and routes it to the subscribe/unsubscribe/mutate/echo/url
//! handler named by its `type`.

use std::sync::Arc;

use futures::Sink;

use crate::{
    connection::Connection,
    envelope::{InboundEnvelope, OperationMessage, OutboundEnvelope},
    error::{ClientError, ExecutionError},
    logging::Tags,
    mutation, runner,
    writer::WriteError,
};

/// Handles one decoded inbound envelope, writing whatever outbound envelope (if any) the handler
/// produces. Never fails: any handler error becomes an `error` envelope addressed to the inbound
/// id, sanitized through the logger, rather than propagating.
pub async fn dispatch<Ctx, W>(connection: &Arc<Connection<Ctx, W>>, envelope: InboundEnvelope)
where
    Ctx: Clone + Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    let id = envelope.id;
    let result = route(connection, &id, &envelope.kind, envelope.message).await;

    if let Err(err) = result {
        let tags = Tags {
            url: connection.url().await,
            id: id.clone(),
            ..Tags::default()
        };
        let message = err.report(connection.logger.as_ref(), &tags);
        connection
            .writer
            .write_or_close(OutboundEnvelope::error(id, message))
            .await;
    }
}

async fn route<Ctx, W>(
    connection: &Arc<Connection<Ctx, W>>,
    id: &str,
    kind: &str,
    message: Option<Box<serde_json::value::RawValue>>,
) -> Result<(), ExecutionError>
where
    Ctx: Clone + Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    match kind {
        "subscribe" => {
            let op = decode_operation(message)?;
            runner::subscribe(Arc::clone(connection), id.to_string(), op.query, op.variables).await
        }
        "unsubscribe" => {
            connection.registry.remove(id).await;
            Ok(())
        }
        "mutate" => {
            let op = decode_operation(message)?;
            mutation::mutate(Arc::clone(connection), id.to_string(), op.query, op.variables).await
        }
        "echo" => {
            connection
                .writer
                .write_or_close(OutboundEnvelope::echo(id.to_string()))
                .await;
            Ok(())
        }
        "url" => {
            let url: String = decode_message(message)?;
            *connection.url.write().await = url;
            Ok(())
        }
        _ => Err(ExecutionError::sanitized(ClientError("unknown message type".into()))),
    }
}

fn decode_operation(
    message: Option<Box<serde_json::value::RawValue>>,
) -> Result<OperationMessage, ExecutionError> {
    decode_message(message)
}

fn decode_message<T: serde::de::DeserializeOwned>(
    message: Option<Box<serde_json::value::RawValue>>,
) -> Result<T, ExecutionError> {
    let raw = message.ok_or_else(|| {
        ExecutionError::sanitized(ClientError("missing message payload".into()))
    })?;
    serde_json::from_str(raw.get())
        .map_err(|e| ExecutionError::sanitized(ClientError(e.to_string())))
}
