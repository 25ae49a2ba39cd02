//! Deal Hunter Web Server
//!
//! HTTP interface for triggering scans and browsing remembered opportunities.

use anyhow::Result;
use deal_hunter::api::{create_app, AppState, ScanRefusal};
use deal_hunter::{Config, DealPipeline, MemoryStore};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Override with RUST_LOG, e.g. RUST_LOG=debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    println!();
    println!("{}", "=".repeat(64));
    println!("  DEAL HUNTER - WEB SERVER");
    println!("{}", "=".repeat(64));
    println!("  Feeds:           {}", config.scanner.feed_urls.len());
    println!("  Threshold:       ${}", config.deal_threshold);
    println!("  Memory:          {}", config.memory_path);
    println!(
        "  Background scan: {}",
        if config.background_scan {
            format!("every {}s", config.scan_interval_seconds)
        } else {
            "DISABLED".to_string()
        }
    );
    println!("{}", "=".repeat(64));
    println!();

    info!("Initializing application state...");
    let pipeline = DealPipeline::from_config(&config)?;
    let memory = MemoryStore::load(&config.memory_path).await?;

    let state = AppState::new(pipeline, memory);

    if config.background_scan {
        let scanner_state = state.clone();
        let interval = config.scan_interval_seconds;
        tokio::spawn(async move {
            info!("Starting background scanner...");
            run_scanner(scanner_state, interval).await;
        });
    }

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    println!();
    println!("  API:    http://localhost:{}/api", config.server_port);
    println!("  Health: http://localhost:{}/health", config.server_port);
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

/// Background scanner that runs a cycle every `interval` seconds
async fn run_scanner(state: AppState, interval: u64) {
    loop {
        let scan_start = Instant::now();

        match state.run_scan().await {
            Ok(found) => {
                debug!(
                    "Background scan finished in {:?} with {} new opportunities",
                    scan_start.elapsed(),
                    found.len()
                );
            }
            Err(ScanRefusal::Busy) => {
                warn!("Skipping background scan: another scan is running");
            }
            Err(ScanRefusal::Failed(e)) => {
                error!("Background scan failed: {}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}
