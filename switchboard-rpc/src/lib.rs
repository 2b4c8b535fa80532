//! Switchboard RPC
//!
//! Command-dispatch over gRPC: an `Endpoint` multiplexes any number of named
//! commands onto the single `commandable.Commandable/invoke` method, and a
//! `CommandableClient` calls them through the same envelope.

pub mod client;
pub mod commandable_client;
pub mod commandable_service;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod envelope;
pub mod interceptor;
pub mod service;
pub mod tls;

pub use client::{Client, ClientOptions};
pub use commandable_client::CommandableClient;
pub use commandable_service::CommandableService;
pub use connection::{ConfigConnectionResolver, ConnectionResolver, Discovery, MemoryDiscovery, ResolvedConnection};
pub use endpoint::{Endpoint, EndpointOptions, Registrable};
pub use interceptor::{action, interceptor, Interceptor, MethodAction, MethodFuture, Next};
pub use service::{Service, ServiceRegistration, ServiceRegistry};

// Re-export the model so consumers need a single dependency
pub use switchboard_model as model;
