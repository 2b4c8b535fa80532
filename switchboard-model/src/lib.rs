//! Switchboard Model
//!
//! Pure data types and traits for command-dispatch RPC, decoupled from the
//! gRPC transport: the error taxonomy, parameter bags, configuration,
//! dependency references, commands, schemas, and counters.

pub mod command;
pub mod config;
pub mod counters;
pub mod error;
pub mod parameters;
pub mod references;
pub mod schema;

// Re-exports
pub use command::{Command, CommandFuture, CommandSet, Commandable, FnCommand};
pub use config::{ConfigParams, ConnectionParams, CredentialParams, Protocol};
pub use counters::{CachedCounters, Counter, CounterTiming, Counters, NullCounters};
pub use error::{BoxError, ErrorCategory, ErrorDescription, RpcError};
pub use parameters::Parameters;
pub use references::{DependencyResolver, References};
pub use schema::{ObjectSchema, Schema, TypeCode};
