//! HTTP ingestion: the same payloads as the relay socket, one POST each.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Display;
use tracing::{debug, warn};

use super::Observer;
use crate::envelope::Envelope;
use crate::types::{ConsoleLogRecord, RequestRecord, SocketUpdate};

const WEBSOCKET_PREFIX: &str = "/api/websocket/";

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn respond_json(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = respond(status, body.to_string());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, String>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| format!("Failed to read body: {}", e))?
        .to_bytes();
    serde_json::from_slice(&body).map_err(|e| format!("Malformed payload: {}", e))
}

async fn ingest<T, B>(
    req: Request<B>,
    observer: &Observer,
    into_envelope: impl FnOnce(T) -> Envelope,
) -> Response<Full<Bytes>>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    match read_json::<T, B>(req).await {
        Ok(payload) => {
            let applied = observer.ingest(into_envelope(payload)).await;
            respond_json(StatusCode::OK, json!({ "success": true, "applied": format!("{:?}", applied) }))
        }
        Err(e) => {
            warn!("Rejected HTTP payload: {}", e);
            respond_json(StatusCode::BAD_REQUEST, json!({ "success": false, "error": e }))
        }
    }
}

/// Route one ingestion request.
pub async fn handle_http_request<B>(
    req: Request<B>,
    observer: Observer,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("HTTP request: {} {}", method, path);

    if method == Method::OPTIONS {
        return Ok(respond(StatusCode::NO_CONTENT, Bytes::new()));
    }

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/status") => {
            let (records, console_logs) = observer.counts().await;
            respond_json(
                StatusCode::OK,
                json!({
                    "status": "online",
                    "version": env!("CARGO_PKG_VERSION"),
                    "records": records,
                    "console_logs": console_logs,
                }),
            )
        }
        (&Method::POST, "/api/network") => {
            ingest::<RequestRecord, B>(req, &observer, Envelope::network).await
        }
        (&Method::POST, "/api/console") => {
            ingest::<ConsoleLogRecord, B>(req, &observer, Envelope::console).await
        }
        (&Method::POST, route) if route.len() > WEBSOCKET_PREFIX.len() && route.starts_with(WEBSOCKET_PREFIX) => {
            let ws_id = route[WEBSOCKET_PREFIX.len()..].to_string();
            ingest::<SocketUpdate, B>(req, &observer, move |update| {
                Envelope::socket_update(ws_id, update)
            })
            .await
        }
        _ => respond(StatusCode::NOT_FOUND, "404 Not Found"),
    };

    Ok(response)
}
