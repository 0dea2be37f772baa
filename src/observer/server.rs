use anyhow::Result;
use futures_util::StreamExt;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{web, Observer};
use crate::error::DecodeError;

/// Accept producer connections on the relay socket.
pub async fn serve_relay(listener: TcpListener, observer: Observer) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                info!("Producer connected from {}", addr);
                let observer = observer.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_producer(socket, addr, observer).await {
                        warn!("Error handling producer {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept relay connection: {}", e);
            }
        }
    }
}

async fn handle_producer(socket: TcpStream, addr: SocketAddr, observer: Observer) -> Result<()> {
    let mut stream = accept_async(socket).await?;

    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => {
                if let Err(e) = observer.ingest_frame(text.as_str()).await {
                    warn!("Dropping frame from {}: {}", addr, e);
                }
            }
            Message::Binary(_) => {
                warn!("Dropping frame from {}: {}", addr, DecodeError::BinaryFrame);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("Producer {} disconnected", addr);
    Ok(())
}

/// Accept HTTP ingestion connections.
pub async fn serve_http(listener: TcpListener, observer: Observer) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                debug!("HTTP connection from {}", addr);
                let observer = observer.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(socket);
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(
                            io,
                            service_fn(move |req| web::handle_http_request(req, observer.clone())),
                        )
                        .await
                    {
                        debug!("HTTP connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept HTTP connection: {}", e);
            }
        }
    }
}
