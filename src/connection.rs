//! The connection: owns the registry, the writer, and every collaborator, and drives the read
//! loop until the socket closes.

use std::{sync::Arc, time::Duration};

use futures::{Sink, Stream, StreamExt};

use crate::{
    collaborators::{Differ, RerunnerFactory, SchemaRoot},
    dispatcher::dispatch,
    envelope::{InboundEnvelope, OutboundEnvelope},
    logging::{Logger, TracingLogger},
    middleware::Middleware,
    registry::SubscriptionRegistry,
    writer::{SocketWriter, WriteError},
};

/// The default cap on live subscriptions per connection.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 200;

/// The default minimum interval between re-executions of one subscription.
pub const DEFAULT_MIN_RERUN_INTERVAL: Duration = Duration::from_secs(5);

/// Builds a [`Connection`]. Mirrors `juniper_graphql_ws::ConnectionConfig`'s `with_*` style.
pub struct ConnectionConfig<Ctx> {
    context: Ctx,
    max_subscriptions: usize,
    min_rerun_interval: Duration,
    url: String,
    middlewares: Vec<Arc<dyn Middleware<Ctx>>>,
    logger: Arc<dyn Logger>,
}

impl<Ctx> ConnectionConfig<Ctx> {
    /// Starts a config carrying the base context every computation is decorated from.
    pub fn new(context: Ctx) -> Self {
        Self {
            context,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            min_rerun_interval: DEFAULT_MIN_RERUN_INTERVAL,
            url: String::new(),
            middlewares: Vec::new(),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Overrides the live-subscription cap (default [`DEFAULT_MAX_SUBSCRIPTIONS`]).
    pub fn with_max_subscriptions(mut self, max_subscriptions: usize) -> Self {
        self.max_subscriptions = max_subscriptions;
        self
    }

    /// Overrides the minimum rerun interval (default [`DEFAULT_MIN_RERUN_INTERVAL`]).
    pub fn with_min_rerun_interval(mut self, min_rerun_interval: Duration) -> Self {
        self.min_rerun_interval = min_rerun_interval;
        self
    }

    /// Seeds the `url` log tag (the `url` verb updates it later).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Appends a middleware to the chain (registration order is outermost-first).
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware<Ctx>>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Overrides the default [`TracingLogger`].
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

/// Owns one socket session's worth of state.
pub struct Connection<Ctx, W> {
    pub(crate) query_schema: Arc<dyn SchemaRoot<Ctx>>,
    pub(crate) mutation_schema: Arc<dyn SchemaRoot<Ctx>>,
    pub(crate) base_context: Ctx,
    pub(crate) make_ctx: Arc<dyn Fn(Ctx) -> Ctx + Send + Sync>,
    pub(crate) middlewares: Arc<Vec<Arc<dyn Middleware<Ctx>>>>,
    pub(crate) differ: Arc<dyn Differ>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) rerunner_factory: Arc<dyn RerunnerFactory<Ctx>>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) writer: Arc<SocketWriter<W>>,
    pub(crate) mutate_mu: tokio::sync::Mutex<()>,
    pub(crate) url: tokio::sync::RwLock<String>,
    pub(crate) min_rerun_interval: Duration,
}

impl<Ctx, W> Connection<Ctx, W>
where
    Ctx: Clone + Send + Sync + 'static,
    W: Sink<OutboundEnvelope> + Unpin + Send + 'static,
    W::Error: WriteError,
{
    /// Assembles a connection from a config plus the collaborators this crate treats as external:
    /// the query and mutation schema roots, the differ, and the rerunner factory.
    #[allow(clippy::too_many_arguments, reason = "one argument per external collaborator")]
    pub fn new(
        config: ConnectionConfig<Ctx>,
        sink: W,
        query_schema: Arc<dyn SchemaRoot<Ctx>>,
        mutation_schema: Arc<dyn SchemaRoot<Ctx>>,
        make_ctx: Arc<dyn Fn(Ctx) -> Ctx + Send + Sync>,
        differ: Arc<dyn Differ>,
        rerunner_factory: Arc<dyn RerunnerFactory<Ctx>>,
    ) -> Self {
        Self {
            query_schema,
            mutation_schema,
            base_context: config.context,
            make_ctx,
            middlewares: Arc::new(config.middlewares),
            differ,
            logger: config.logger,
            rerunner_factory,
            registry: Arc::new(SubscriptionRegistry::new(config.max_subscriptions)),
            writer: Arc::new(SocketWriter::new(sink)),
            mutate_mu: tokio::sync::Mutex::new(()),
            url: tokio::sync::RwLock::new(config.url),
            min_rerun_interval: config.min_rerun_interval,
        }
    }

    /// Runs the read loop until the socket closes or yields a terminal error, then tears down
    /// every live runner.
    pub async fn serve<S>(self: Arc<Self>, mut incoming: S)
    where
        S: Stream<Item = Result<InboundEnvelope, serde_json::Error>> + Unpin,
    {
        while let Some(frame) = incoming.next().await {
            match frame {
                Ok(envelope) => dispatch(&self, envelope).await,
                Err(_) => break,
            }
        }
        self.registry.remove_all().await;
    }

    /// The connection's current `url` log tag.
    pub(crate) async fn url(&self) -> String {
        self.url.read().await.clone()
    }
}

#[cfg(test)]
mod test {
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        collaborators::{PreparedOperation, Value, Variables},
        error::ExecutionError,
    };

    struct EchoSchema;

    struct EchoOp;

    impl PreparedOperation<()> for EchoOp {
        fn kind(&self) -> crate::collaborators::OperationKind {
            crate::collaborators::OperationKind::Query
        }

        fn name(&self) -> Option<&str> {
            None
        }

        fn execute<'a>(
            &'a self,
            _ctx: &'a (),
            _variables: &'a Variables,
        ) -> BoxFuture<'a, Result<Value, ExecutionError>> {
            Box::pin(async move { Ok(Value::from(1)) })
        }
    }

    impl SchemaRoot<()> for EchoSchema {
        fn parse_and_prepare(
            &self,
            _query: &str,
            _variables: &Variables,
        ) -> Result<Arc<dyn PreparedOperation<()>>, ExecutionError> {
            Ok(Arc::new(EchoOp))
        }
    }

    struct IdentityDiffer;

    impl Differ for IdentityDiffer {
        fn diff(&self, previous: Option<&Value>, current: &Value) -> Option<Value> {
            if previous == Some(current) {
                None
            } else {
                Some(current.clone())
            }
        }
    }

    struct ImmediateRerunnerFactory;

    struct NoopRunner;

    impl crate::collaborators::Rerunner for NoopRunner {
        fn rerun_immediately<'a>(&'a self) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }

        fn stop<'a>(&'a self) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }
    }

    impl RerunnerFactory<()> for ImmediateRerunnerFactory {
        fn spawn(
            &self,
            base_ctx: (),
            computation: crate::collaborators::ComputationFn<()>,
            _min_interval: Duration,
        ) -> Arc<dyn crate::collaborators::Rerunner> {
            tokio::spawn(computation(base_ctx));
            Arc::new(NoopRunner)
        }
    }

    #[derive(Debug, derive_more::Display, derive_more::Error)]
    #[display("closed")]
    struct NeverFails;

    impl WriteError for NeverFails {}

    struct VecSink(Vec<OutboundEnvelope>);

    impl Sink<OutboundEnvelope> for VecSink {
        type Error = NeverFails;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: OutboundEnvelope) -> Result<(), Self::Error> {
            self.get_mut().0.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_connection() -> Arc<Connection<(), VecSink>> {
        let config = ConnectionConfig::new(());
        Arc::new(Connection::new(
            config,
            VecSink(Vec::new()),
            Arc::new(EchoSchema),
            Arc::new(EchoSchema),
            Arc::new(|ctx| ctx),
            Arc::new(IdentityDiffer),
            Arc::new(ImmediateRerunnerFactory),
        ))
    }

    #[tokio::test]
    async fn serve_empties_registry_on_stream_end() {
        let connection = test_connection();
        let incoming = futures::stream::iter(Vec::<Result<InboundEnvelope, serde_json::Error>>::new());
        connection.clone().serve(incoming).await;
        assert!(connection.registry.is_empty().await);
    }

    #[tokio::test]
    async fn url_tag_defaults_empty() {
        let connection = test_connection();
        assert_eq!(connection.url().await, "");
    }
}
