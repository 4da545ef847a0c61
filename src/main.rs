//! CoAP ↔ HTTP cross-protocol gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   CoAP client ──UDP──▶ coap::server ──┐                  ┌──▶ ProxyCoapClient ──▶ CoAP endpoint pool ──▶ CoAP server
//!                                       ├──▶ resolver ─────┤
//!   HTTP client ──TCP──▶ http::server ──┘   (translate)    ├──▶ ProxyHttpClient ──▶ HTTP client pool  ──▶ HTTP origin
//!                                                          └──▶ TargetResource (local)
//!
//!   Every forward returns a PendingResponse; the ingress awaits it and
//!   translates the CoAP response back for its own transport.
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use coap_gateway::coap::server::CoapServer;
use coap_gateway::config::{load_config, GatewayConfig};
use coap_gateway::http::HttpServer;
use coap_gateway::lifecycle::signals::spawn_signal_handler;
use coap_gateway::lifecycle::{Gateway, Shutdown};
use coap_gateway::observability::{logging, metrics};
use coap_gateway::resolver::RequestHandler;

#[derive(Parser, Debug)]
#[command(name = "coap-gateway", version, about = "CoAP/HTTP cross-protocol gateway")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CoAP listen port (overrides the configured bind address)
    coap_port: Option<u16>,

    /// HTTP listen port (overrides the configured bind address)
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(port) = args.coap_port {
        config.coap.bind_address = with_port(&config.coap.bind_address, port);
    }
    if let Some(port) = args.http_port {
        config.http.bind_address = with_port(&config.http.bind_address, port);
    }

    logging::init_tracing(&config.observability.log_level);
    tracing::info!("coap-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        mode = ?config.mode,
        coap_address = %config.coap.bind_address,
        http_address = %config.http.bind_address,
        coap_endpoints = config.pools.coap_endpoints,
        http_clients = config.pools.http_clients,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let gateway = Gateway::build(&config)?;

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let mut servers = JoinSet::new();

    if config.mode.runs_coap() {
        let server = CoapServer::bind(&config.coap.bind_address, gateway.resolver.clone()).await?;
        servers.spawn(server.run(shutdown.subscribe()));
    }

    if config.mode.runs_http() {
        let listener = TcpListener::bind(&config.http.bind_address).await?;
        let handler: Arc<dyn RequestHandler> = gateway.resolver.clone();
        let server = HttpServer::new(&config, gateway.table.clone(), handler);
        servers.spawn(server.run(listener, shutdown.subscribe()));
    }

    // One server failing takes the other down with it.
    while let Some(result) = servers.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Server failed");
                shutdown.trigger();
            }
            Err(e) => {
                tracing::error!(error = %e, "Server task panicked");
                shutdown.trigger();
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Replace the port of `address`, keeping its host.
fn with_port(address: &str, port: u16) -> String {
    match address.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", address, port),
    }
}
