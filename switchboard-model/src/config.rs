//! Configuration parameters
//!
//! `ConfigParams` is a flat map of dotted keys (`connection.port`). Typed
//! sections (`ConnectionParams`, `CredentialParams`) are read from it once,
//! with defaults applied at construction.

use crate::RpcError;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Flat, ordered key/value configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigParams {
    values: BTreeMap<String, String>,
}

impl ConfigParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tuples<K: Into<String>, V: ToString>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.to_string())).collect(),
        }
    }

    /// Parse a TOML document, flattening nested tables into dotted keys.
    pub fn from_toml_str(text: &str) -> Result<Self, RpcError> {
        let table: toml::Table = text.parse().map_err(|e| {
            RpcError::configuration(None, "BAD_CONFIG", "Failed to parse TOML configuration").with_cause(e)
        })?;

        let mut config = Self::new();
        flatten_toml("", &toml::Value::Table(table), &mut config.values);
        Ok(config)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_as_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    pub fn get_as_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_as_boolean(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Read a millisecond count as a `Duration`.
    pub fn get_as_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_as_integer(key)
            .filter(|ms| *ms >= 0)
            .map(|ms| Duration::from_millis(ms as u64))
    }

    /// Keys under `<prefix>.`, with the prefix stripped.
    pub fn get_section(&self, prefix: &str) -> ConfigParams {
        let dotted = format!("{}.", prefix);
        Self {
            values: self
                .values
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(&dotted).map(|rest| (rest.to_string(), v.clone())))
                .collect(),
        }
    }

    /// Copy of `self` with every key of `other` applied on top.
    pub fn override_with(&self, other: &ConfigParams) -> ConfigParams {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten_toml(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, inner) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_toml(&path, inner, out);
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

// ==================== Connection ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn parse(s: &str) -> Result<Self, RpcError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(RpcError::configuration(
                None,
                "BAD_CONFIG",
                format!("Unsupported protocol '{}', expected http or https", other),
            )
            .with_details("protocol", other)),
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// The `connection.*` section. Unset fields are left to the resolver's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub protocol: Option<Protocol>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub discovery_key: Option<String>,
}

impl ConnectionParams {
    /// Read from a full config. A `connection.uri` takes precedence over the
    /// individual protocol/host/port keys.
    pub fn from_config(config: &ConfigParams) -> Result<Self, RpcError> {
        let section = config.get_section("connection");
        let mut params = Self {
            discovery_key: section.get_as_string("discovery_key"),
            ..Default::default()
        };

        if let Some(uri) = section.get("uri") {
            params.apply_uri(uri)?;
            return Ok(params);
        }

        if let Some(protocol) = section.get("protocol") {
            params.protocol = Some(Protocol::parse(protocol)?);
        }
        params.host = section.get_as_string("host");
        if let Some(port) = section.get("port") {
            params.port = Some(parse_port(port)?);
        }
        Ok(params)
    }

    fn apply_uri(&mut self, uri: &str) -> Result<(), RpcError> {
        let bad_uri = |cause: String| {
            RpcError::configuration(None, "BAD_CONFIG", format!("Invalid connection uri '{}'", uri))
                .with_details("uri", uri)
                .with_cause(cause)
        };

        let parsed: http::Uri = uri.parse().map_err(|e: http::uri::InvalidUri| bad_uri(e.to_string()))?;
        if let Some(scheme) = parsed.scheme_str() {
            self.protocol = Some(Protocol::parse(scheme)?);
        }
        self.host = Some(
            parsed
                .host()
                .ok_or_else(|| bad_uri("missing host".to_string()))?
                .to_string(),
        );
        self.port = parsed.port_u16();
        Ok(())
    }
}

fn parse_port(value: &str) -> Result<u16, RpcError> {
    value.trim().parse().map_err(|_| {
        RpcError::configuration(None, "BAD_CONFIG", format!("Invalid port '{}'", value))
            .with_details("port", value)
    })
}

/// The `credential.*` section: PEM file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialParams {
    pub ssl_key_file: Option<String>,
    pub ssl_crt_file: Option<String>,
    pub ssl_ca_file: Option<String>,
}

impl CredentialParams {
    pub fn from_config(config: &ConfigParams) -> Option<Self> {
        let section = config.get_section("credential");
        let params = Self {
            ssl_key_file: section.get_as_string("ssl_key_file"),
            ssl_crt_file: section.get_as_string("ssl_crt_file"),
            ssl_ca_file: section.get_as_string("ssl_ca_file"),
        };
        if params == Self::default() {
            None
        } else {
            Some(params)
        }
    }
}
