//! Connection resolution
//!
//! Turns configuration (and optionally a discovery service) into a concrete
//! `host:port` plus protocol and credential material.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use switchboard_model::{ConfigParams, ConnectionParams, CredentialParams, Protocol, References, RpcError};

/// Default bind host for endpoints.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
/// Default dial host for clients.
pub const DEFAULT_CLIENT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3000;

/// A fully resolved connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub credential: Option<CredentialParams>,
}

impl ResolvedConnection {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            credential: None,
        }
    }

    pub fn uri(&self) -> String {
        format!("{}://{}", self.protocol, self.address())
    }

    /// `host:port`, with IPv6 literals in brackets.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Resolves where to bind or dial, and announces bound endpoints.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(&self, correlation_id: Option<&str>) -> Result<ResolvedConnection, RpcError>;

    /// Announce a bound endpoint so that clients can find it.
    async fn register(&self, correlation_id: Option<&str>, connection: &ResolvedConnection) -> Result<(), RpcError>;
}

/// Service-discovery backend keyed by `connection.discovery_key`.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn register(
        &self,
        correlation_id: Option<&str>,
        key: &str,
        connection: &ResolvedConnection,
    ) -> Result<(), RpcError>;

    async fn resolve_one(&self, correlation_id: Option<&str>, key: &str) -> Result<Option<ResolvedConnection>, RpcError>;
}

/// In-process discovery, mostly for tests and single-binary setups.
#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    entries: RwLock<HashMap<String, ResolvedConnection>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn register(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
        connection: &ResolvedConnection,
    ) -> Result<(), RpcError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), connection.clone());
        Ok(())
    }

    async fn resolve_one(&self, _correlation_id: Option<&str>, key: &str) -> Result<Option<ResolvedConnection>, RpcError> {
        Ok(self.entries.read().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }
}

/// Resolver backed by the `connection.*` and `credential.*` config sections.
#[derive(Clone)]
pub struct ConfigConnectionResolver {
    default_host: String,
    connection: ConnectionParams,
    credential: Option<CredentialParams>,
    discovery: Option<Arc<dyn Discovery>>,
}

impl ConfigConnectionResolver {
    pub fn new(default_host: &str) -> Self {
        Self {
            default_host: default_host.to_string(),
            connection: ConnectionParams::default(),
            credential: None,
            discovery: None,
        }
    }

    pub fn for_server() -> Self {
        Self::new(DEFAULT_SERVER_HOST)
    }

    pub fn for_client() -> Self {
        Self::new(DEFAULT_CLIENT_HOST)
    }

    pub fn configure(&mut self, config: &ConfigParams) -> Result<(), RpcError> {
        self.connection = ConnectionParams::from_config(config)?;
        self.credential = CredentialParams::from_config(config);
        Ok(())
    }

    /// Picks up an optional `discovery` collaborator.
    pub fn set_references(&mut self, references: &References) {
        if let Some(discovery) = references.get::<dyn Discovery>("discovery") {
            self.discovery = Some(discovery);
        }
    }

    fn from_params(&self) -> ResolvedConnection {
        ResolvedConnection {
            protocol: self.connection.protocol.unwrap_or_default(),
            host: self.connection.host.clone().unwrap_or_else(|| self.default_host.clone()),
            port: self.connection.port.unwrap_or(DEFAULT_PORT),
            credential: self.credential.clone(),
        }
    }
}

#[async_trait]
impl ConnectionResolver for ConfigConnectionResolver {
    async fn resolve(&self, correlation_id: Option<&str>) -> Result<ResolvedConnection, RpcError> {
        if let (Some(key), Some(discovery)) = (&self.connection.discovery_key, &self.discovery) {
            if let Some(mut found) = discovery.resolve_one(correlation_id, key).await? {
                if found.credential.is_none() {
                    found.credential = self.credential.clone();
                }
                return Ok(found);
            }
            // Bind side: nothing registered yet, fall back to configured params
            tracing::debug!(correlation_id, key = %key, "Discovery key not registered, using configured connection");
        }
        Ok(self.from_params())
    }

    async fn register(&self, correlation_id: Option<&str>, connection: &ResolvedConnection) -> Result<(), RpcError> {
        match (&self.connection.discovery_key, &self.discovery) {
            (Some(key), Some(discovery)) => discovery.register(correlation_id, key, connection).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults() {
        let resolved = ConfigConnectionResolver::for_server().resolve(None).await.unwrap();
        assert_eq!(resolved.uri(), "http://0.0.0.0:3000");
        assert!(resolved.credential.is_none());
    }

    #[tokio::test]
    async fn test_configured_connection() {
        let mut resolver = ConfigConnectionResolver::for_client();
        resolver
            .configure(&ConfigParams::from_tuples([
                ("connection.protocol", "https"),
                ("connection.port", "8443"),
                ("credential.ssl_ca_file", "ca.pem"),
            ]))
            .unwrap();

        let resolved = resolver.resolve(None).await.unwrap();
        assert_eq!(resolved.uri(), "https://localhost:8443");
        assert_eq!(resolved.credential.unwrap().ssl_ca_file.as_deref(), Some("ca.pem"));
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let loopback = ResolvedConnection::new(Protocol::Http, "::1", 3000);
        assert_eq!(loopback.address(), "[::1]:3000");
        assert_eq!(loopback.uri(), "http://[::1]:3000");
        assert!(loopback.address().parse::<std::net::SocketAddr>().is_ok());

        let bracketed = ResolvedConnection::new(Protocol::Https, "[fe80::1]", 8443);
        assert_eq!(bracketed.uri(), "https://[fe80::1]:8443");

        let named = ResolvedConnection::new(Protocol::Http, "localhost", 3000);
        assert_eq!(named.address(), "localhost:3000");
    }

    #[tokio::test]
    async fn test_discovery_register_then_resolve() {
        let discovery: Arc<dyn Discovery> = Arc::new(MemoryDiscovery::new());
        let refs = References::new().with("discovery", discovery);
        let config = ConfigParams::from_tuples([("connection.discovery_key", "items"), ("connection.port", "4100")]);

        let mut server = ConfigConnectionResolver::for_server();
        server.configure(&config).unwrap();
        server.set_references(&refs);
        let bound = ResolvedConnection::new(Protocol::Http, "10.0.0.5", 4100);
        server.register(None, &bound).await.unwrap();

        let mut client = ConfigConnectionResolver::for_client();
        client
            .configure(&ConfigParams::from_tuples([("connection.discovery_key", "items")]))
            .unwrap();
        client.set_references(&refs);
        assert_eq!(client.resolve(None).await.unwrap(), bound);
    }
}
