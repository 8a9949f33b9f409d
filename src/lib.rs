#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![deny(missing_docs, warnings)]

//! The live-query connection core: a per-connection registry of reactive subscriptions and
//! serialized mutations, multiplexed over a single framed JSON transport. See [`Connection`] for
//! the entry point and [`collaborators`] for the traits a query engine must supply.

pub mod collaborators;
pub mod connection;
mod dispatcher;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod middleware;
mod mutation;
pub mod registry;
mod runner;
mod util;
pub mod writer;

pub use self::{
    collaborators::{Differ, OperationKind, PreparedOperation, RerunOutcome, Rerunner, RerunnerFactory, SchemaRoot},
    connection::{Connection, ConnectionConfig, DEFAULT_MAX_SUBSCRIPTIONS, DEFAULT_MIN_RERUN_INTERVAL},
    error::{ClientError, ConnectionError, ExecutionError, SafeError, SanitizedError},
    logging::{Logger, Tags, TracingLogger},
    middleware::{ComputationInput, ComputationOutput, Middleware},
    registry::SubscriptionRegistry,
};
