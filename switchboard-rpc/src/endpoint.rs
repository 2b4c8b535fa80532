//! Server multiplexer
//!
//! An `Endpoint` owns one listening gRPC server. Services attach to it via
//! `Registrable` registrations which run during `open`, before the listener
//! starts accepting, so no request is dispatched against a half-filled
//! command table. All commands share the single `invoke` method.

use crate::connection::{ConfigConnectionResolver, ConnectionResolver, ResolvedConnection};
use crate::dispatch::{CommandEntry, CommandRouter, InvokeService};
use crate::interceptor::MethodAction;
use crate::tls;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use switchboard_model::{ConfigParams, References, RpcError, Schema};
use switchboard_proto::commandable::commandable_server::CommandableServer;
use switchboard_proto::{InvokeReply, InvokeRequest};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codegen::Service as TowerService;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;
use tracing::{debug, error, info, warn};

/// Tunables read from the `options.*` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOptions {
    /// Accepted for symmetry with clients; the server side does not dial.
    pub connect_timeout: Duration,
    /// Per-request bound enforced by the server.
    pub timeout: Duration,
    /// Largest decoded `invoke` request, in bytes.
    pub request_max_size: usize,
    pub maintenance_enabled: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(60_000),
            timeout: Duration::from_millis(10_000),
            request_max_size: 1024 * 1024,
            maintenance_enabled: false,
        }
    }
}

impl EndpointOptions {
    pub fn from_config(config: &ConfigParams) -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: config
                .get_as_duration_ms("options.connect_timeout")
                .unwrap_or(defaults.connect_timeout),
            timeout: config.get_as_duration_ms("options.timeout").unwrap_or(defaults.timeout),
            request_max_size: config
                .get_as_integer("options.request_max_size")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.request_max_size),
            maintenance_enabled: config
                .get_as_boolean("options.maintenance_enabled")
                .unwrap_or(defaults.maintenance_enabled),
        }
    }
}

/// A collaborator that contributes methods and services when the endpoint starts.
pub trait Registrable: Send + Sync {
    fn register(&self, endpoint: &Endpoint) -> Result<(), RpcError>;
}

impl<F> Registrable for F
where
    F: Fn(&Endpoint) -> Result<(), RpcError> + Send + Sync,
{
    fn register(&self, endpoint: &Endpoint) -> Result<(), RpcError> {
        self(endpoint)
    }
}

/// Identity of a registration: the address of its shared allocation.
fn registration_id(registration: &Arc<dyn Registrable>) -> usize {
    Arc::as_ptr(registration) as *const () as usize
}

struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
    local_addr: SocketAddr,
    uri: String,
}

#[derive(Default)]
struct State {
    server: Option<ServerHandle>,
    /// Present only while the start sequence runs.
    routes: Option<RoutesBuilder>,
    /// Registration currently running, for command ownership.
    registering: Option<usize>,
}

pub struct Endpoint {
    options: EndpointOptions,
    config_resolver: ConfigConnectionResolver,
    custom_resolver: Option<Arc<dyn ConnectionResolver>>,
    router: Arc<CommandRouter>,
    registrations: Mutex<Vec<Arc<dyn Registrable>>>,
    state: Mutex<State>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint {
    pub fn new() -> Self {
        Self {
            options: EndpointOptions::default(),
            config_resolver: ConfigConnectionResolver::for_server(),
            custom_resolver: None,
            router: Arc::new(CommandRouter::new()),
            registrations: Mutex::new(Vec::new()),
            state: Mutex::new(State::default()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the config-driven resolver.
    pub fn with_connection_resolver(mut self, resolver: Arc<dyn ConnectionResolver>) -> Self {
        self.custom_resolver = Some(resolver);
        self
    }

    pub fn configure(&mut self, config: &ConfigParams) -> Result<(), RpcError> {
        self.config_resolver.configure(config)?;
        self.options = EndpointOptions::from_config(config);
        self.router.set_maintenance(self.options.maintenance_enabled);
        Ok(())
    }

    pub fn set_references(&mut self, references: &References) {
        self.config_resolver.set_references(references);
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    fn resolver(&self) -> Arc<dyn ConnectionResolver> {
        match &self.custom_resolver {
            Some(resolver) => resolver.clone(),
            None => Arc::new(self.config_resolver.clone()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_registrations(&self) -> MutexGuard<'_, Vec<Arc<dyn Registrable>>> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.lock_state().server.is_some()
    }

    /// Bound socket address while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_state().server.as_ref().map(|s| s.local_addr)
    }

    pub fn is_maintenance_enabled(&self) -> bool {
        self.router.is_maintenance()
    }

    pub fn set_maintenance_enabled(&self, enabled: bool) {
        self.router.set_maintenance(enabled);
    }

    /// Live command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        self.router.names()
    }

    /// Dispatch one envelope through the command table, as the wire
    /// `invoke` method does.
    pub async fn invoke(&self, request: InvokeRequest) -> InvokeReply {
        self.router.invoke(request).await
    }

    pub async fn open(&self, correlation_id: Option<&str>) -> Result<(), RpcError> {
        let _guard = self.lifecycle.lock().await;
        if self.is_open() {
            return Ok(());
        }

        let resolver = self.resolver();
        let connection = resolver.resolve(correlation_id).await?;

        match self.start(correlation_id, resolver.as_ref(), &connection).await {
            Ok(handle) => {
                info!(correlation_id, addr = %handle.local_addr, "Opened GRPC service at {}", handle.uri);
                self.lock_state().server = Some(handle);
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = self.lock_state();
                    state.routes = None;
                    state.registering = None;
                }
                self.router.clear();
                error!(correlation_id, uri = %connection.uri(), "Failed to open GRPC service: {}", e);
                Err(e.with_correlation_id(correlation_id))
            }
        }
    }

    async fn start(
        &self,
        correlation_id: Option<&str>,
        resolver: &dyn ConnectionResolver,
        connection: &ResolvedConnection,
    ) -> Result<ServerHandle, RpcError> {
        let uri = connection.uri();
        let cannot_connect = |message: &str| {
            RpcError::connection(correlation_id, "CANNOT_CONNECT", message).with_details("uri", &uri)
        };

        // TLS material is validated before binding or announcing anything
        let mut builder = Server::builder().timeout(self.options.timeout);
        if connection.protocol.is_secure() {
            let tls_config = tls::server_tls_config(correlation_id, connection.credential.as_ref())
                .await
                .map_err(|e| e.with_details("uri", &uri))?;
            builder = builder
                .tls_config(tls_config)
                .map_err(|e| cannot_connect("Invalid TLS configuration").with_cause(e))?;
        }

        let listener = TcpListener::bind(connection.address())
            .await
            .map_err(|e| cannot_connect("Failed to bind listener").with_cause(e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| cannot_connect("Failed to read bound address").with_cause(e))?;

        // Announce the port actually bound, which differs when 0 was asked for
        let announced = ResolvedConnection {
            port: local_addr.port(),
            ..connection.clone()
        };
        resolver.register(correlation_id, &announced).await?;

        self.lock_state().routes = Some(RoutesBuilder::default());
        self.perform_registrations()?;

        let mut routes = self.lock_state().routes.take().unwrap_or_default();
        if !self.router.is_empty() {
            let invoke = CommandableServer::new(InvokeService::new(self.router.clone()))
                .max_decoding_message_size(self.options.request_max_size);
            routes.add_service(invoke);
        }

        let server = builder.add_routes(routes.routes());

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let incoming = TcpListenerStream::new(listener);
        let task = tokio::spawn(async move {
            server
                .serve_with_incoming_shutdown(incoming, async {
                    // A dropped sender also means shut down
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(ServerHandle {
            shutdown,
            task,
            local_addr,
            uri,
        })
    }

    fn perform_registrations(&self) -> Result<(), RpcError> {
        let registrations = self.lock_registrations().clone();
        for registration in registrations {
            self.lock_state().registering = Some(registration_id(&registration));
            let result = registration.register(self);
            self.lock_state().registering = None;
            result?;
        }
        Ok(())
    }

    /// Stop serving. Tables are cleared even when shutdown fails.
    pub async fn close(&self, correlation_id: Option<&str>) -> Result<(), RpcError> {
        let _guard = self.lifecycle.lock().await;
        let server = self.lock_state().server.take();
        self.router.clear();

        let Some(server) = server else {
            return Ok(());
        };

        if server.shutdown.send(()).is_err() {
            warn!(correlation_id, "GRPC server task already stopped");
        }

        match server.task.await {
            Ok(Ok(())) => {
                info!(correlation_id, "Closed GRPC service at {}", server.uri);
                Ok(())
            }
            Ok(Err(e)) => {
                error!(correlation_id, "GRPC server failed during shutdown: {}", e);
                Err(RpcError::connection(correlation_id, "SHUTDOWN_FAILED", "GRPC server failed to shut down")
                    .with_details("uri", &server.uri)
                    .with_cause(e))
            }
            Err(e) => {
                warn!(correlation_id, "Could not observe GRPC server shutdown: {}", e);
                Ok(())
            }
        }
    }

    /// Append a registration. It runs on every subsequent `open`.
    pub fn register(&self, registration: Arc<dyn Registrable>) {
        self.lock_registrations().push(registration);
    }

    /// Remove a registration by identity, along with the commands it added.
    pub fn unregister(&self, registration: &Arc<dyn Registrable>) {
        let id = registration_id(registration);
        self.lock_registrations().retain(|r| registration_id(r) != id);
        let removed = self.router.remove_owned_by(id);
        if removed > 0 {
            debug!(count = removed, "Removed commands of unregistered service");
        }
    }

    pub fn registration_count(&self) -> usize {
        self.lock_registrations().len()
    }

    /// Add a command. Last write wins for a given name.
    pub fn register_commandable_method(&self, name: &str, schema: Option<Arc<dyn Schema>>, action: MethodAction) {
        let owner = self.lock_state().registering;
        self.router.register(name, CommandEntry { action, schema }, owner);
        debug!(method = %name, "Registered commandable method");
    }

    /// Add a generated tonic service. Only valid while `open` runs the
    /// registrations, since a built router cannot take new routes.
    pub fn register_service<S>(&self, service: S) -> Result<(), RpcError>
    where
        S: TowerService<http::Request<tonic::body::Body>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Response: axum::response::IntoResponse,
        S::Future: Send + 'static,
    {
        let mut state = self.lock_state();
        match state.routes.as_mut() {
            Some(routes) => {
                routes.add_service(service);
                debug!(service = S::NAME, "Registered GRPC service");
                Ok(())
            }
            None => Err(RpcError::invalid_state(
                None,
                "NOT_OPENING",
                "Services can only be registered while the endpoint is opening",
            )
            .with_details("service", S::NAME)),
        }
    }
}
