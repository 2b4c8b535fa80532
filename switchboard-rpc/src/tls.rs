//! TLS material loading
//!
//! PEM text is read from the files named by the `credential.*` section. A CA
//! file may hold a bundle; it is split into one certificate per PEM block.

use switchboard_model::{CredentialParams, RpcError};
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Split a PEM bundle on certificate boundaries.
pub fn split_pem_bundle(bundle: &str) -> Vec<String> {
    let mut certs = Vec::new();
    let mut rest = bundle;

    while let Some(start) = rest.find(PEM_BEGIN) {
        let tail = &rest[start..];
        let Some(end) = tail.find(PEM_END) else {
            break;
        };
        let block_end = end + PEM_END.len();
        certs.push(format!("{}\n", &tail[..block_end]));
        rest = &tail[block_end..];
    }

    certs
}

async fn read_pem(correlation_id: Option<&str>, kind: &str, path: &str) -> Result<String, RpcError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        RpcError::connection(correlation_id, "CANNOT_READ_CREDENTIAL", format!("Failed to read {} file", kind))
            .with_details("path", path)
            .with_cause(e)
    })
}

async fn read_ca_bundle(correlation_id: Option<&str>, path: &str) -> Result<Vec<String>, RpcError> {
    let bundle = read_pem(correlation_id, "CA", path).await?;
    let certs = split_pem_bundle(&bundle);
    if certs.is_empty() {
        return Err(
            RpcError::connection(correlation_id, "NO_CERTIFICATES", "CA file contains no PEM certificates")
                .with_details("path", path),
        );
    }
    Ok(certs)
}

fn missing(correlation_id: Option<&str>, key: &str) -> RpcError {
    RpcError::connection(
        correlation_id,
        "NO_CREDENTIAL",
        format!("Secure protocol requires credential.{}", key),
    )
    .with_details("key", key)
}

/// Server identity plus optional client CA roots.
pub async fn server_tls_config(
    correlation_id: Option<&str>,
    credential: Option<&CredentialParams>,
) -> Result<ServerTlsConfig, RpcError> {
    let credential = credential.ok_or_else(|| missing(correlation_id, "ssl_crt_file"))?;
    let crt_file = credential
        .ssl_crt_file
        .as_deref()
        .ok_or_else(|| missing(correlation_id, "ssl_crt_file"))?;
    let key_file = credential
        .ssl_key_file
        .as_deref()
        .ok_or_else(|| missing(correlation_id, "ssl_key_file"))?;

    let cert = read_pem(correlation_id, "certificate", crt_file).await?;
    let key = read_pem(correlation_id, "private key", key_file).await?;
    let mut config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if let Some(ca_file) = credential.ssl_ca_file.as_deref() {
        // tonic takes the client roots as one PEM blob
        let roots = read_ca_bundle(correlation_id, ca_file).await?;
        config = config.client_ca_root(Certificate::from_pem(roots.concat()));
    }

    Ok(config)
}

/// CA roots plus optional client identity, verified against `host`.
pub async fn client_tls_config(
    correlation_id: Option<&str>,
    host: &str,
    credential: Option<&CredentialParams>,
) -> Result<ClientTlsConfig, RpcError> {
    let mut config = ClientTlsConfig::new().domain_name(host);
    let Some(credential) = credential else {
        return Ok(config);
    };

    if let Some(ca_file) = credential.ssl_ca_file.as_deref() {
        let roots = read_ca_bundle(correlation_id, ca_file).await?;
        config = config.ca_certificates(roots.into_iter().map(Certificate::from_pem));
    }

    if let (Some(crt_file), Some(key_file)) = (credential.ssl_crt_file.as_deref(), credential.ssl_key_file.as_deref()) {
        let cert = read_pem(correlation_id, "certificate", crt_file).await?;
        let key = read_pem(correlation_id, "private key", key_file).await?;
        config = config.identity(Identity::from_pem(cert, key));
    }

    Ok(config)
}
