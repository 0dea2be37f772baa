use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use devlens::config::{ConfigLoader, ObserverConfig};
use devlens::observer::{Observer, CONSOLE_LOG, NETWORK_LOG, WEBSOCKET_UPDATE};

/// Observer for devlens-instrumented applications
#[derive(Parser)]
#[command(name = "devlens-observer")]
#[command(about = "Receives captured network and console events and prints them as JSON lines")]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on for relay WebSocket connections
    #[arg(short, long)]
    port: Option<u16>,

    /// Port to listen on for HTTP ingestion
    #[arg(long)]
    http_port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct ChannelEvent<'a, T> {
    channel: &'a str,
    payload: T,
}

fn print_event<T: Serialize>(channel: &str, payload: T) {
    match serde_json::to_string(&ChannelEvent { channel, payload }) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to render {} event: {}", channel, e),
    }
}

/// Print every channel event until the observer goes away.
async fn print_channels(observer: Observer) {
    let mut network = observer.channels().network_log();
    let mut console = observer.channels().console_log();
    let mut websocket = observer.channels().websocket_update();

    loop {
        let lagged = tokio::select! {
            event = network.recv() => match event {
                Ok(record) => { print_event(NETWORK_LOG, record); None }
                Err(RecvError::Lagged(skipped)) => Some((NETWORK_LOG, skipped)),
                Err(RecvError::Closed) => break,
            },
            event = console.recv() => match event {
                Ok(record) => { print_event(CONSOLE_LOG, record); None }
                Err(RecvError::Lagged(skipped)) => Some((CONSOLE_LOG, skipped)),
                Err(RecvError::Closed) => break,
            },
            event = websocket.recv() => match event {
                Ok(update) => { print_event(WEBSOCKET_UPDATE, update); None }
                Err(RecvError::Lagged(skipped)) => Some((WEBSOCKET_UPDATE, skipped)),
                Err(RecvError::Closed) => break,
            },
        };
        if let Some((channel, skipped)) = lagged {
            warn!("Printer fell behind on {}, skipped {} events", channel, skipped);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let mut config: ObserverConfig = match &args.config {
        Some(path) => ConfigLoader::new(path).load()?.observer,
        None => ObserverConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.relay_port = port;
    }
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    info!("Starting devlens observer v{}", env!("CARGO_PKG_VERSION"));

    let relay_addr: SocketAddr = format!("{}:{}", config.host, config.relay_port).parse()?;
    let http_addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;

    let observer = Observer::new(&config);
    tokio::spawn(print_channels(observer.clone()));

    tokio::select! {
        result = observer.run(relay_addr, http_addr) => {
            if let Err(e) = result {
                warn!("Observer error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!("Observer stopped");
    Ok(())
}
