//! Service base
//!
//! A `Service` is the per-logical-service façade over an `Endpoint`. It
//! either creates a private endpoint (and then owns its open/close) or
//! attaches to a shared one found under the `endpoint` role, in which case
//! its own open/close only flip a flag.

use crate::endpoint::{Endpoint, Registrable};
use crate::interceptor::{Interceptor, MethodAction, MethodFuture, Next};
use std::convert::Infallible;
use std::sync::{Arc, RwLock, Weak};
use switchboard_model::{BoxError, ConfigParams, DependencyResolver, Parameters, References, RpcError, Schema};
use tonic::codegen::Service as TowerService;
use tonic::server::NamedService;
use tracing::debug;

/// The user-supplied part of a service.
pub trait ServiceRegistration: Send + Sync {
    /// Resolve collaborators. Runs from `Service::set_references`.
    fn set_references(&self, _resolver: &DependencyResolver, _references: &References) -> Result<(), RpcError> {
        Ok(())
    }

    /// Contribute methods. Runs each time the endpoint opens.
    fn register(&self, registry: &mut ServiceRegistry<'_>) -> Result<(), RpcError>;
}

/// Registration surface handed to a `ServiceRegistration`.
pub struct ServiceRegistry<'a> {
    endpoint: &'a Endpoint,
    name: Option<&'a str>,
    interceptors: &'a Arc<RwLock<Vec<Interceptor>>>,
}

impl<'a> ServiceRegistry<'a> {
    pub fn service_name(&self) -> Option<&str> {
        self.name
    }

    /// `"<service>.<name>"`, or `name` for an unnamed service.
    pub fn qualify(&self, name: &str) -> String {
        match self.name {
            Some(service) if !service.is_empty() => format!("{}.{}", service, name),
            _ => name.to_string(),
        }
    }

    /// Register `action` under the qualified `name`, behind this service's
    /// interceptors and then `schema` validation.
    pub fn register_method(&mut self, name: &str, schema: Option<Arc<dyn Schema>>, action: MethodAction) {
        let validated: MethodAction = match schema {
            Some(schema) => Arc::new(move |cid: Option<String>, args: Parameters| -> MethodFuture {
                match schema.validate(cid.as_deref(), &args) {
                    Ok(()) => action(cid, args),
                    Err(e) => Box::pin(async move { Err(Box::new(e) as BoxError) }),
                }
            }),
            None => action,
        };

        let interceptors = self.interceptors.clone();
        let wrapped: MethodAction = Arc::new(move |cid: Option<String>, args: Parameters| {
            // Snapshot so interceptors added later apply to later calls
            let chain: Arc<[Interceptor]> = interceptors
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .into();
            Next::new(chain, validated.clone()).run(cid, args)
        });

        self.endpoint
            .register_commandable_method(&self.qualify(name), None, wrapped);
    }

    /// Register a command under `name` exactly, validated by the endpoint.
    pub fn register_commandable_method(&mut self, name: &str, schema: Option<Arc<dyn Schema>>, action: MethodAction) {
        self.endpoint.register_commandable_method(name, schema, action);
    }

    /// Mount a generated tonic service on the endpoint's server.
    pub fn register_service<S>(&mut self, service: S) -> Result<(), RpcError>
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
        self.endpoint.register_service(service)
    }
}

struct ServiceInner {
    name: Option<String>,
    interceptors: Arc<RwLock<Vec<Interceptor>>>,
    registration: Arc<dyn ServiceRegistration>,
}

impl Registrable for ServiceInner {
    fn register(&self, endpoint: &Endpoint) -> Result<(), RpcError> {
        let mut registry = ServiceRegistry {
            endpoint,
            name: self.name.as_deref(),
            interceptors: &self.interceptors,
        };
        self.registration.register(&mut registry)
    }
}

enum EndpointHandle {
    /// Created by this service; open/close are delegated.
    Local(Arc<Endpoint>),
    /// Injected and possibly shared; never opened or closed from here.
    Shared(Weak<Endpoint>),
}

pub struct Service {
    name: Option<String>,
    dependency_resolver: DependencyResolver,
    config: ConfigParams,
    endpoint: Option<EndpointHandle>,
    opened: bool,
    inner: Arc<ServiceInner>,
}

impl Service {
    pub fn new(name: Option<&str>, registration: Arc<dyn ServiceRegistration>) -> Self {
        let name = name.filter(|n| !n.is_empty()).map(str::to_string);
        Self {
            inner: Arc::new(ServiceInner {
                name: name.clone(),
                interceptors: Arc::new(RwLock::new(Vec::new())),
                registration,
            }),
            name,
            dependency_resolver: DependencyResolver::new()
                .with_default("endpoint", "endpoint")
                .with_default("counters", "counters"),
            config: ConfigParams::new(),
            endpoint: None,
            opened: false,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declare a dependency role with its default locator.
    pub fn with_dependency(mut self, role: &str, locator: &str) -> Self {
        self.dependency_resolver = self.dependency_resolver.with_default(role, locator);
        self
    }

    pub fn configure(&mut self, config: &ConfigParams) {
        self.config = config.clone();
        self.dependency_resolver.configure(config);
    }

    fn registration(&self) -> Arc<dyn Registrable> {
        self.inner.clone()
    }

    fn local_endpoint(&self, references: Option<&References>) -> Result<Arc<Endpoint>, RpcError> {
        let mut endpoint = Endpoint::new();
        endpoint.configure(&self.config)?;
        if let Some(references) = references {
            endpoint.set_references(references);
        }
        Ok(Arc::new(endpoint))
    }

    /// Resolve collaborators and attach to an endpoint.
    pub fn set_references(&mut self, references: &References) -> Result<(), RpcError> {
        if self.opened {
            return Err(RpcError::invalid_state(None, "ALREADY_OPENED", "Service is already opened")
                .with_details("service", self.name.as_deref().unwrap_or("")));
        }

        self.inner
            .registration
            .set_references(&self.dependency_resolver, references)?;

        self.unset_references();
        let handle = match self.dependency_resolver.get_optional::<Endpoint>(references, "endpoint") {
            Some(shared) => EndpointHandle::Shared(Arc::downgrade(&shared)),
            None => {
                debug!(service = ?self.name, "No endpoint reference, creating a local endpoint");
                EndpointHandle::Local(self.local_endpoint(Some(references))?)
            }
        };
        self.endpoint = Some(handle);

        if let Some(endpoint) = self.endpoint() {
            endpoint.register(self.registration());
        }
        Ok(())
    }

    /// Detach from the endpoint, removing this service's commands.
    pub fn unset_references(&mut self) {
        if let Some(endpoint) = self.endpoint() {
            endpoint.unregister(&self.registration());
        }
        self.endpoint = None;
    }

    /// The attached endpoint, if still alive.
    pub fn endpoint(&self) -> Option<Arc<Endpoint>> {
        match self.endpoint.as_ref()? {
            EndpointHandle::Local(endpoint) => Some(endpoint.clone()),
            EndpointHandle::Shared(endpoint) => endpoint.upgrade(),
        }
    }

    pub fn has_local_endpoint(&self) -> bool {
        matches!(self.endpoint, Some(EndpointHandle::Local(_)))
    }

    /// Append an interceptor. Ignored until an endpoint is attached.
    pub fn register_interceptor(&self, interceptor: Interceptor) {
        if self.endpoint.is_none() {
            debug!(service = ?self.name, "No endpoint attached, interceptor ignored");
            return;
        }
        self.inner
            .interceptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(interceptor);
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> Result<(), RpcError> {
        if self.opened {
            return Ok(());
        }

        if self.endpoint.is_none() {
            let endpoint = self.local_endpoint(None)?;
            endpoint.register(self.registration());
            self.endpoint = Some(EndpointHandle::Local(endpoint));
        }

        match &self.endpoint {
            Some(EndpointHandle::Local(endpoint)) => endpoint.open(correlation_id).await?,
            Some(EndpointHandle::Shared(endpoint)) if endpoint.strong_count() == 0 => {
                return Err(no_endpoint(correlation_id, self.name.as_deref()));
            }
            _ => {}
        }

        self.opened = true;
        Ok(())
    }

    pub async fn close(&mut self, correlation_id: Option<&str>) -> Result<(), RpcError> {
        if !self.opened {
            return Ok(());
        }

        self.opened = false;
        match &self.endpoint {
            None => Err(no_endpoint(correlation_id, self.name.as_deref())),
            Some(EndpointHandle::Local(endpoint)) => endpoint.close(correlation_id).await,
            Some(EndpointHandle::Shared(_)) => Ok(()),
        }
    }
}

fn no_endpoint(correlation_id: Option<&str>, name: Option<&str>) -> RpcError {
    RpcError::invalid_state(correlation_id, "NO_ENDPOINT", "Endpoint is not set").with_details("service", name.unwrap_or(""))
}
