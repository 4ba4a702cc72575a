//! Consolidated order book feed service entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dashmap::DashMap;
use futures::StreamExt;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookfeed::aggregator::Aggregator;
use bookfeed::api::{create_router, AppState};
use bookfeed::config::Config;
use bookfeed::connector::{ExchangeConnector, StatusBoard};
use bookfeed::metrics;
use bookfeed::orderbook::BookSnapshot;
use bookfeed::utils::shutdown_signal;

/// Consolidated crypto order book feed service.
#[derive(Parser, Debug)]
#[command(name = "bookfeed")]
#[command(about = "Aggregates exchange depth streams into one consolidated book feed")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP/WebSocket server port.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the feed service (default).
    Run {
        /// HTTP/WebSocket server port.
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Subscribe to a running feed and print best bid/offer per update.
    Watch {
        /// Subscription endpoint of a running bookfeed instance.
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws/book")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("bookfeed=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Watch { url }) => cmd_watch(url).await,
        Some(Command::Run { port }) => cmd_run(port).await,
        None => cmd_run(args.port).await,
    }
}

/// Run the feed service.
async fn cmd_run(port: u16) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    // Initialize metrics
    metrics::install_recorder().map_err(|e| anyhow::anyhow!("metrics recorder: {e}"))?;
    metrics::init_metrics();

    let venues = config.venues();
    if venues.is_empty() {
        warn!("No known exchanges configured; serving an empty consolidated book");
    }

    info!("Symbol: {}", config.symbol);
    info!("Depth limit: {} levels per side", config.depth_limit);
    info!(
        "Exchanges: {}",
        venues
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Start the single-writer aggregation task
    let (aggregator, handle) = Aggregator::new(config.symbol.clone(), config.depth_limit);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    // Start one connector per venue
    let status: StatusBoard = Arc::new(DashMap::new());
    for venue in venues {
        let connector = ExchangeConnector::new(
            venue,
            config.symbol.clone(),
            books.clone(),
            handle.clone(),
            status.clone(),
            config.backoff_policy(),
            config.keepalive_interval(),
            config.handshake_timeout(),
        );
        tokio::spawn(connector.run());
    }

    // Serve subscribers and ops endpoints
    let state = AppState::new(
        handle,
        status,
        config.symbol.clone(),
        config.subscriber_poll_interval(),
    );
    let router = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Serving subscribers on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("BOOKFEED - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Symbol: {}", config.symbol);
    println!("  Depth limit: {} levels per side", config.depth_limit);
    println!("  Handshake timeout: {}s", config.handshake_timeout_s);
    println!("  Keepalive interval: {}s", config.keepalive_interval_s);
    println!(
        "  Reconnect backoff: {}ms initial, {}s max, {} retries",
        config.reconnect_initial_ms, config.reconnect_max_delay_s, config.reconnect_max_retries
    );
    println!("  Subscriber poll: {}ms", config.subscriber_poll_ms);
    println!("  Exchanges:");
    for venue in config.venues() {
        let spec = venue.spec();
        println!(
            "    - {} (wss://{}:{}{})",
            venue,
            spec.host,
            spec.port,
            venue.path(&config.symbol)
        );
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Subscribe to a running feed and print the best bid/offer per snapshot.
async fn cmd_watch(url: String) -> anyhow::Result<()> {
    use tokio_tungstenite::tungstenite::Message;

    println!("Connecting to {url}...");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await?;
    println!("Subscribed. Waiting for snapshots (Ctrl+C to stop).");

    loop {
        tokio::select! {
            frame = ws.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                };

                match message {
                    Message::Text(text) => {
                        let snapshot: BookSnapshot = match serde_json::from_str(&text) {
                            Ok(snapshot) => snapshot,
                            Err(e) => {
                                warn!("Skipping undecodable snapshot: {}", e);
                                continue;
                            }
                        };
                        print_bbo(&snapshot);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("Feed closed.");
    Ok(())
}

/// Print one best-bid-offer line for a snapshot.
fn print_bbo(snapshot: &BookSnapshot) {
    let bid = snapshot
        .best_bid()
        .map(|l| format!("{} x {}", l.price, l.quantity))
        .unwrap_or_else(|| "-".to_string());
    let ask = snapshot
        .best_ask()
        .map(|l| format!("{} x {}", l.price, l.quantity))
        .unwrap_or_else(|| "-".to_string());
    let spread = snapshot
        .spread()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "[v{}] {} | bid {} | ask {} | spread {}",
        snapshot.version, snapshot.symbol, bid, ask, spread
    );
}
