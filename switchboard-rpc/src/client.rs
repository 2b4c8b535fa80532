//! Client base
//!
//! Opens a tonic channel to a resolved address and performs unary calls on
//! it. Transport failures come back as `Transport` errors carrying the gRPC
//! code name.

use crate::connection::{ConfigConnectionResolver, ConnectionResolver};
use crate::tls;
use http::uri::PathAndQuery;
use std::sync::Arc;
use std::time::Duration;
use switchboard_model::{
    ConfigParams, CounterTiming, Counters, DependencyResolver, ErrorCategory, NullCounters, References, RpcError,
};
use tonic::transport::{Channel, Endpoint as TransportEndpoint};
use tonic::{Code, Status};
use tracing::{debug, error, info};

/// Tunables read from the `options.*` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    /// Parsed and exposed, but no retry loop consults it.
    pub retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(10_000),
            timeout: Duration::from_millis(10_000),
            retries: 3,
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &ConfigParams) -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: config
                .get_as_duration_ms("options.connect_timeout")
                .unwrap_or(defaults.connect_timeout),
            timeout: config.get_as_duration_ms("options.timeout").unwrap_or(defaults.timeout),
            retries: config
                .get_as_integer("options.retries")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.retries),
        }
    }
}

/// gRPC status code as an upper-snake error code.
pub fn status_code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
        #[allow(unreachable_patterns)]
        _ => "UNKNOWN",
    }
}

/// Convert a transport status into a structured error.
pub fn from_status(correlation_id: Option<&str>, status: &Status) -> RpcError {
    RpcError::new(
        ErrorCategory::Transport,
        correlation_id,
        status_code_name(status.code()),
        status.message(),
    )
    .with_details("grpc_code", status.code() as i32)
}

pub struct Client {
    options: ClientOptions,
    config_resolver: ConfigConnectionResolver,
    custom_resolver: Option<Arc<dyn ConnectionResolver>>,
    dependency_resolver: DependencyResolver,
    counters: Arc<dyn Counters>,
    channel: Option<Channel>,
    uri: Option<String>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            options: ClientOptions::default(),
            config_resolver: ConfigConnectionResolver::for_client(),
            custom_resolver: None,
            dependency_resolver: DependencyResolver::new().with_default("counters", "counters"),
            counters: Arc::new(NullCounters),
            channel: None,
            uri: None,
        }
    }

    /// Replace the config-driven resolver.
    pub fn with_connection_resolver(mut self, resolver: Arc<dyn ConnectionResolver>) -> Self {
        self.custom_resolver = Some(resolver);
        self
    }

    pub fn configure(&mut self, config: &ConfigParams) -> Result<(), RpcError> {
        self.config_resolver.configure(config)?;
        self.dependency_resolver.configure(config);
        self.options = ClientOptions::from_config(config);
        Ok(())
    }

    pub fn set_references(&mut self, references: &References) {
        self.config_resolver.set_references(references);
        if let Some(counters) = self.dependency_resolver.get_optional::<dyn Counters>(references, "counters") {
            self.counters = counters;
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Target URI of the open channel.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> Result<(), RpcError> {
        if self.is_open() {
            return Ok(());
        }

        let connection = match &self.custom_resolver {
            Some(resolver) => resolver.resolve(correlation_id).await?,
            None => self.config_resolver.resolve(correlation_id).await?,
        };
        let uri = connection.uri();
        let cannot_connect = |message: &str| {
            RpcError::connection(correlation_id, "CANNOT_CONNECT", message).with_details("uri", &uri)
        };

        let mut endpoint = TransportEndpoint::from_shared(uri.clone())
            .map_err(|e| cannot_connect("Invalid connection URI").with_cause(e))?
            .connect_timeout(self.options.connect_timeout)
            .timeout(self.options.timeout);

        if connection.protocol.is_secure() {
            let tls_config = tls::client_tls_config(correlation_id, &connection.host, connection.credential.as_ref())
                .await
                .map_err(|e| e.with_details("uri", &uri))?;
            endpoint = endpoint
                .tls_config(tls_config)
                .map_err(|e| cannot_connect("Invalid TLS configuration").with_cause(e))?;
        }

        let channel = endpoint.connect().await.map_err(|e| {
            error!(correlation_id, uri = %uri, "Failed to connect: {}", e);
            cannot_connect("Failed to connect").with_cause(e)
        })?;

        info!(correlation_id, "Connected to GRPC service at {}", uri);
        self.channel = Some(channel);
        self.uri = Some(uri);
        Ok(())
    }

    /// Drop the channel. Idempotent.
    pub async fn close(&mut self, correlation_id: Option<&str>) -> Result<(), RpcError> {
        if self.channel.take().is_some() {
            debug!(correlation_id, uri = ?self.uri, "Closed GRPC connection");
        }
        self.uri = None;
        Ok(())
    }

    /// Count a call and start timing it.
    pub fn instrument(&self, correlation_id: Option<&str>, name: &str) -> CounterTiming {
        tracing::trace!(correlation_id, method = %name, "Calling remote method");
        self.counters.increment_one(&format!("{}.call_count", name));
        CounterTiming::begin(&self.counters, &format!("{}.call_time", name))
    }

    pub fn instrument_error(&self, correlation_id: Option<&str>, name: &str, err: &RpcError) {
        self.counters.increment_one(&format!("{}.call_errors", name));
        error!(correlation_id, method = %name, code = %err.code, "Failed to call remote method: {}", err.message);
    }

    /// Unary call of `/<service>/<method>`; the method name is lowercased.
    pub async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        correlation_id: Option<&str>,
        request: Req,
    ) -> Result<Resp, RpcError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let channel = self.channel.clone().ok_or_else(|| {
            RpcError::invalid_state(correlation_id, "NO_CONNECTION", "Client is not opened")
                .with_details("method", method)
        })?;

        let path = PathAndQuery::try_from(format!("/{}/{}", service, method.to_lowercase())).map_err(|e| {
            RpcError::invocation(correlation_id, "INVALID_METHOD", "Invalid method path")
                .with_details("method", method)
                .with_cause(e)
        })?;

        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready().await.map_err(|e| {
            RpcError::new(
                ErrorCategory::Transport,
                correlation_id,
                "UNAVAILABLE",
                format!("Service was not ready: {}", e),
            )
        })?;

        let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
        let response = grpc
            .unary(tonic::Request::new(request), path, codec)
            .await
            .map_err(|status| from_status(correlation_id, &status).with_details("method", method))?;
        Ok(response.into_inner())
    }
}
