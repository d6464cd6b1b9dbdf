//! Gangway daemon entry point.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;

use gangway::config::Config;
use gangway::dns::run_dns_server;
use gangway::docker::DockerApi;
use gangway::filter::MembershipFilter;
use gangway::provider::{Pipeline, Provider};
use gangway::synth::Synthesizer;
use gangway::transport::SocketClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting gangway daemon with config: {:?}", cfg);

    // Discovery pipeline over the control socket
    let client = SocketClient::new(cfg.socket_path.clone());
    let api = Arc::new(DockerApi::new(client));
    let filter = MembershipFilter::new(cfg.network_name.clone(), cfg.name_suffix.clone());
    let synthesizer = Synthesizer::new(
        cfg.network_name.clone(),
        cfg.domain.clone(),
        cfg.entry_point.clone(),
    );
    let provider = Provider::new(
        Pipeline::new(api, filter, synthesizer),
        Duration::from_secs(cfg.poll_interval_secs),
    );

    // Snapshot consumer: each cycle's configuration goes to stdout as one
    // JSON document for the proxy to pick up.
    let (tx, mut rx) = mpsc::unbounded_channel();
    provider.start(tx)?;

    let consumer = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            info!(
                "publishing configuration: {} services, {} routers",
                snapshot.http.services.len(),
                snapshot.http.routers.len()
            );
            match serde_json::to_string(&snapshot) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("failed to serialize snapshot: {}", e),
            }
        }
    });

    // Optional name-encoded-IP DNS responder
    let dns_handle = if cfg.dns_enabled {
        let (bind, ttl, fallback) = (cfg.dns_bind, cfg.dns_ttl, cfg.dns_fallback);
        Some(tokio::spawn(async move {
            if let Err(e) = run_dns_server(bind, ttl, fallback).await {
                error!("DNS responder failed: {}", e);
            }
        }))
    } else {
        None
    };

    // Graceful shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    provider.stop().await;
    consumer.abort();
    if let Some(handle) = dns_handle {
        handle.abort();
    }

    info!("Shutdown complete.");
    Ok(())
}
