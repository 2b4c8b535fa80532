//! Switchboard Daemon (`switchboardd`)
//!
//! `serve` hosts the built-in `system` commands on one gRPC endpoint until
//! SIGINT/SIGTERM. `call` invokes a command on a running endpoint and prints
//! the JSON result.

mod system;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_rpc::model::{Commandable, ConfigParams, References};
use switchboard_rpc::{CommandableClient, CommandableService};
use system::SystemController;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "switchboardd", version, about = "Switchboard command-dispatch daemon")]
struct Args {
    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: DaemonCommand,
}

#[derive(Subcommand, Debug)]
enum DaemonCommand {
    /// Host the `system` commands until interrupted
    Serve {
        /// TOML config file (`[connection]`, `[credential]`, `[options]` tables)
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Override `connection.host`
        #[arg(long)]
        host: Option<String>,
        /// Override `connection.port`
        #[arg(long)]
        port: Option<u16>,
    },
    /// Invoke `<service>.<command>` and print the result
    Call {
        service: String,
        command: String,
        /// Arguments as a JSON object
        #[arg(long, short)]
        args: Option<String>,
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Correlation id (random when omitted)
        #[arg(long)]
        correlation_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        DaemonCommand::Serve { config, host, port } => serve(config, host, port).await,
        DaemonCommand::Call {
            service,
            command,
            args,
            host,
            port,
            correlation_id,
        } => call(&service, &command, args.as_deref(), &host, port, correlation_id).await,
    }
}

fn load_config(path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> anyhow::Result<ConfigParams> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            ConfigParams::from_toml_str(&text)?
        }
        None => ConfigParams::new(),
    };
    if let Some(host) = host {
        config.set("connection.host", host);
    }
    if let Some(port) = port {
        config.set("connection.port", port);
    }
    Ok(config)
}

async fn serve(path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("switchboardd v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = load_config(path, host, port)?;
    let correlation_id = Uuid::new_v4().to_string();

    let controller: Arc<dyn Commandable> = Arc::new(SystemController::new());
    let references = References::new().with("controller", controller);

    let mut service = CommandableService::new("system");
    service.configure(&config);
    service.set_references(&references)?;
    service.open(Some(&correlation_id)).await.map_err(|e| {
        tracing::error!("Failed to start: {}", e);
        anyhow::anyhow!("{}", e)
    })?;

    if let Some(addr) = service.endpoint().and_then(|e| e.local_addr()) {
        tracing::info!("Serving system commands on {}", addr);
    }
    tracing::info!("Daemon ready. Press Ctrl+C to stop.");

    shutdown_signal().await;
    tracing::info!("Shutdown signal received...");

    if let Err(e) = service.close(Some(&correlation_id)).await {
        tracing::error!("Shutdown error: {}", e);
    }

    tracing::info!("Daemon stopped");
    Ok(())
}

async fn call(
    service: &str,
    command: &str,
    args: Option<&str>,
    host: &str,
    port: u16,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    let params = args
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--args must be valid JSON")?;
    let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut client = CommandableClient::new(service);
    client.configure(&ConfigParams::from_tuples([
        ("connection.host", host.to_string()),
        ("connection.port", port.to_string()),
    ]))?;
    client.open(Some(&correlation_id)).await?;

    let outcome = client.call_command(command, Some(&correlation_id), params).await;
    client.close(Some(&correlation_id)).await?;

    match outcome {
        Ok(Some(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
        Ok(None) => println!("(no value)"),
        Err(e) => {
            let description = switchboard_rpc::model::ErrorDescription::from(&e);
            eprintln!("{}", serde_json::to_string_pretty(&description)?);
            anyhow::bail!("{} failed with {}", command, e.code);
        }
    }
    Ok(())
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    // Only apply defaults if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // h2 and hyper are chatty at debug
    for noisy in ["h2=warn", "hyper=warn", "tower=warn"] {
        if let Ok(directive) = noisy.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_overrides() {
        let config = load_config(None, Some("127.0.0.1".to_string()), Some(4000)).unwrap();
        assert_eq!(config.get("connection.host"), Some("127.0.0.1"));
        assert_eq!(config.get_as_integer("connection.port"), Some(4000));
    }
}
