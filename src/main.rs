//! Portrelay - TCP Relay
//!
//! This is the main entry point for the Portrelay application.

use anyhow::{bail, Result};
use clap::Parser;
use portrelay::config::{load_config, Config, ProxyConfig};
use portrelay::helper::{parse_destination, parse_interface_addr};
use portrelay::relay::EventReceiver;
use portrelay::Registry;
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Portrelay - relay TCP connections between local interfaces and fixed destinations
#[derive(Parser, Debug)]
#[command(name = "portrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra route as INBOUND,DESTINATION or INBOUND,OUTBOUND,DESTINATION
    #[arg(short, long = "route", value_parser = parse_route)]
    routes: Vec<ProxyConfig>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    config.proxies.extend(args.routes);
    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }
    if config.proxies.is_empty() {
        bail!("No routes configured; pass --route or a config file with [[proxy]] entries");
    }

    info!("Portrelay v{}", portrelay::VERSION);

    let (registry, events) = Registry::new(&config.relay).with_events();
    tokio::spawn(log_events(events));

    for proxy in &config.proxies {
        let route = proxy.route();
        match registry.create(route).await {
            Ok(port) => info!(
                route = %route.key(),
                "{}:{} -> {}",
                route.inbound,
                port,
                route.destination
            ),
            Err(e) => error!(route = %route.key(), "{}", e.describe()),
        }
    }

    wait_for_shutdown().await;

    if let Err(e) = registry.close_all().await {
        warn!("Error during shutdown: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}

/// Parse a `--route` value
fn parse_route(value: &str) -> Result<ProxyConfig, String> {
    let parts: Vec<&str> = value.split(',').collect();
    let (inbound, outbound, destination) = match parts.as_slice() {
        [inbound, destination] => (inbound, None, destination),
        [inbound, outbound, destination] => (inbound, Some(outbound), destination),
        _ => return Err(format!("expected INBOUND[,OUTBOUND],DESTINATION, got {:?}", value)),
    };

    let proxy = ProxyConfig {
        inbound: parse_interface_addr(inbound).map_err(|e| e.to_string())?,
        outbound: outbound
            .map(|addr| parse_interface_addr(addr))
            .transpose()
            .map_err(|e| e.to_string())?,
        destination: parse_destination(destination).map_err(|e| e.to_string())?,
    };
    proxy.validate()?;
    Ok(proxy)
}

/// Log every event reported by the registry
async fn log_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        if event.is_fatal() {
            error!("{}", event);
        } else {
            warn!("{}", event);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
                return;
            }
            Err(e) => warn!("Failed to setup SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received Ctrl+C, shutting down...");
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_two_parts() {
        let proxy = parse_route("127.0.0.1,10.0.0.2:9000").unwrap();
        assert_eq!(proxy.inbound.to_string(), "127.0.0.1");
        assert!(proxy.outbound.is_none());
        assert_eq!(proxy.destination.port(), 9000);
    }

    #[test]
    fn test_parse_route_three_parts() {
        let proxy = parse_route("::1, ::1 ,[::1]:22").unwrap();
        assert_eq!(proxy.outbound.map(|a| a.to_string()), Some("::1".to_string()));
    }

    #[test]
    fn test_parse_route_invalid() {
        assert!(parse_route("127.0.0.1").is_err());
        assert!(parse_route("bogus,10.0.0.2:9000").is_err());
        assert!(parse_route("127.0.0.1,10.0.0.2:0").is_err());
        assert!(parse_route("127.0.0.1,::1,10.0.0.2:9000").is_err());
    }
}
