//! Outbound-request interception.
//!
//! [`InterceptedHttp`] implements [`HttpClient`] itself, so it drops in
//! wherever the wrapped delegate was used. The delegate always receives the
//! caller's request and options untouched and the caller always gets the
//! delegate's response or error back untouched; the capture path only reads.

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::capture::Capture;
use crate::types::{
    Headers, RecordKind, RequestRecord, BINARY_PLACEHOLDER, FORM_PLACEHOLDER, UNREADABLE_RESPONSE,
    UNSERIALIZABLE_BODY,
};
use crate::util::{millis, new_record_id};

/// Base used to resolve path-only URLs when extracting query parameters
const RELATIVE_BASE: &str = "http://localhost/";

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Form(Vec<(String, String)>),
    Binary(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// Per-call overrides layered on top of the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The single entry point an application issues HTTP calls through.
#[async_trait]
pub trait HttpClient: Send + Sync {
    type Error: fmt::Display + Send;

    async fn fetch(
        &self,
        request: HttpRequest,
        options: RequestOptions,
    ) -> Result<HttpResponse, Self::Error>;
}

pub struct InterceptedHttp<C> {
    inner: C,
    capture: Capture,
}

impl<C: HttpClient> InterceptedHttp<C> {
    pub fn new(inner: C, capture: Capture) -> Self {
        Self { inner, capture }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for InterceptedHttp<C> {
    type Error = C::Error;

    async fn fetch(
        &self,
        request: HttpRequest,
        options: RequestOptions,
    ) -> Result<HttpResponse, Self::Error> {
        if !self.capture.observes(&request.url) {
            return self.inner.fetch(request, options).await;
        }

        let started = Instant::now();
        let record = begin_record(&request, &options);

        match self.inner.fetch(request, options).await {
            Ok(response) => {
                let elapsed_ms = millis(started.elapsed());
                self.capture
                    .network(complete_record(record, response.clone(), elapsed_ms));
                Ok(response)
            }
            Err(error) => {
                let elapsed_ms = millis(started.elapsed());
                debug!("Observed request {} failed: {}", record.url, error);
                self.capture.network(RequestRecord {
                    elapsed_ms,
                    response_body: format!("Error: {}", error),
                    ..record
                });
                Err(error)
            }
        }
    }
}

/// Everything known before the call is issued.
fn begin_record(request: &HttpRequest, options: &RequestOptions) -> RequestRecord {
    let method = options.method.as_ref().unwrap_or(&request.method);

    let mut headers = Headers::default();
    for (name, value) in request.headers.iter().chain(options.headers.iter()) {
        headers.set_request(name.as_str(), header_text(value.as_bytes()));
    }

    let body = options.body.as_ref().unwrap_or(&request.body);

    RequestRecord {
        id: new_record_id(),
        kind: RecordKind::Request,
        method: method.as_str().to_string(),
        url: request.url.clone(),
        status: 0,
        elapsed_ms: 0,
        cookies: parse_cookies(&headers.request),
        query_params: parse_query(&request.url),
        headers,
        request_body: describe_body(body),
        response_body: String::new(),
        socket_state: None,
        messages: None,
        summary: None,
    }
}

/// Reads status, headers and body from a copy of the response.
fn complete_record(mut record: RequestRecord, response: HttpResponse, elapsed_ms: u64) -> RequestRecord {
    record.status = response.status.as_u16();
    record.elapsed_ms = elapsed_ms;
    for (name, value) in response.headers.iter() {
        record
            .headers
            .set_response(name.as_str(), header_text(value.as_bytes()));
    }
    let content_type = response
        .headers
        .get(header::CONTENT_TYPE)
        .map(|value| header_text(value.as_bytes()).to_ascii_lowercase())
        .unwrap_or_default();
    record.response_body = describe_response(&content_type, &response.body);
    record
}

fn header_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub(crate) fn describe_body(body: &RequestBody) -> String {
    match body {
        RequestBody::Empty => String::new(),
        RequestBody::Text(text) => text.clone(),
        RequestBody::Json(value) => {
            serde_json::to_string(value).unwrap_or_else(|_| UNSERIALIZABLE_BODY.to_string())
        }
        RequestBody::Form(_) => FORM_PLACEHOLDER.to_string(),
        RequestBody::Binary(_) => BINARY_PLACEHOLDER.to_string(),
    }
}

fn describe_response(content_type: &str, body: &Bytes) -> String {
    if body.is_empty() {
        return String::new();
    }

    if content_type.contains("application/json") || content_type.contains("+json") {
        serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|json| serde_json::to_string_pretty(&json).ok())
            .unwrap_or_else(|| UNREADABLE_RESPONSE.to_string())
    } else if content_type.contains("text/") {
        String::from_utf8(body.to_vec()).unwrap_or_else(|_| UNREADABLE_RESPONSE.to_string())
    } else {
        BINARY_PLACEHOLDER.to_string()
    }
}

/// `k=v; k2=v2` from the effective cookie header, percent-decoded.
fn parse_cookies(request_headers: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    let raw = request_headers.get("cookie")?;
    let mut cookies = BTreeMap::new();
    for pair in raw.split(';') {
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let decoded = percent_decode_str(value)
            .decode_utf8()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.insert(key.to_string(), decoded);
    }
    Some(cookies)
}

/// A key seen once maps to a string, a repeated key to an array.
fn parse_query(url: &str) -> Option<BTreeMap<String, Value>> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(RELATIVE_BASE).ok()?.join(url).ok()?
        }
        Err(_) => return None,
    };

    let mut params: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in parsed.query_pairs() {
        let value = Value::String(value.into_owned());
        match params.remove(&*key) {
            None => {
                params.insert(key.into_owned(), value);
            }
            Some(Value::Array(mut values)) => {
                values.push(value);
                params.insert(key.into_owned(), Value::Array(values));
            }
            Some(previous) => {
                params.insert(key.into_owned(), Value::Array(vec![previous, value]));
            }
        }
    }
    Some(params)
}

/// The real network, through `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    type Error = reqwest::Error;

    async fn fetch(
        &self,
        request: HttpRequest,
        options: RequestOptions,
    ) -> Result<HttpResponse, Self::Error> {
        let method = options.method.unwrap_or(request.method);
        let mut headers = request.headers;
        headers.extend(options.headers);

        let builder = self.client.request(method, &request.url).headers(headers);
        let builder = match options.body.unwrap_or(request.body) {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Binary(bytes) => builder.body(bytes),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MemorySink, RelayFilter};
    use crate::envelope::Envelope;
    use http::HeaderValue;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct FakeError(String);

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    struct FakeHttp {
        outcome: Result<HttpResponse, FakeError>,
        delay: Duration,
        seen: Mutex<Vec<(HttpRequest, RequestOptions)>>,
    }

    impl FakeHttp {
        fn responding(content_type: &str, body: &'static [u8]) -> Self {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
            Self {
                outcome: Ok(HttpResponse {
                    status: StatusCode::OK,
                    headers,
                    body: Bytes::from_static(body),
                }),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                outcome: Err(FakeError(message.to_string())),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for FakeHttp {
        type Error = FakeError;

        async fn fetch(
            &self,
            request: HttpRequest,
            options: RequestOptions,
        ) -> Result<HttpResponse, FakeError> {
            self.seen.lock().unwrap().push((request, options));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()
        }
    }

    fn intercept(fake: FakeHttp) -> (InterceptedHttp<FakeHttp>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let capture = Capture::new(sink.clone(), RelayFilter::for_address("ws://127.0.0.1:3927/ws"));
        (InterceptedHttp::new(fake, capture), sink)
    }

    fn only_record(sink: &MemorySink) -> RequestRecord {
        let mut envelopes = sink.take();
        assert_eq!(envelopes.len(), 1, "expected exactly one envelope");
        match envelopes.remove(0) {
            Envelope::Network { data } => data,
            other => panic!("unexpected envelope {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_get_is_recorded() {
        let mut fake = FakeHttp::responding("application/json; charset=utf-8", br#"{"id":1,"title":"hello"}"#);
        fake.delay = Duration::from_millis(120);
        let (http, sink) = intercept(fake);

        let response = http
            .fetch(HttpRequest::get("/posts/1"), RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let record = only_record(&sink);
        assert_eq!(record.kind, RecordKind::Request);
        assert_eq!(record.method, "GET");
        assert_eq!(record.url, "/posts/1");
        assert_eq!(record.status, 200);
        assert_eq!(record.elapsed_ms, 120);
        assert_eq!(record.response_body, "{\n  \"id\": 1,\n  \"title\": \"hello\"\n}");
        assert_eq!(record.headers.response["content-type"], "application/json; charset=utf-8");
    }

    #[tokio::test]
    async fn test_interception_preserves_response() {
        let plain = FakeHttp::responding("text/plain", b"pong");
        let expected = plain
            .fetch(HttpRequest::get("https://example.com/ping"), RequestOptions::default())
            .await;

        let (http, _sink) = intercept(FakeHttp::responding("text/plain", b"pong"));
        let observed = http
            .fetch(HttpRequest::get("https://example.com/ping"), RequestOptions::default())
            .await;

        assert_eq!(observed, expected);
    }

    #[tokio::test]
    async fn test_delegate_receives_inputs_unchanged() {
        let (http, _sink) = intercept(FakeHttp::responding("text/plain", b"ok"));
        let mut request = HttpRequest::new(Method::POST, "https://example.com/items");
        request.body = RequestBody::Text("a".into());
        let options = RequestOptions {
            method: Some(Method::PUT),
            ..Default::default()
        };

        http.fetch(request.clone(), options.clone()).await.unwrap();

        let seen = http.inner().seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(request, options)]);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_reraised() {
        let (http, sink) = intercept(FakeHttp::failing("connection refused"));

        let result = http
            .fetch(HttpRequest::get("https://example.com/down"), RequestOptions::default())
            .await;
        assert_eq!(result, Err(FakeError("connection refused".into())));

        let record = only_record(&sink);
        assert_eq!(record.status, 0);
        assert_eq!(record.response_body, "Error: connection refused");
        assert!(record.headers.response.is_empty());
    }

    #[tokio::test]
    async fn test_self_traffic_is_not_captured() {
        let (http, sink) = intercept(FakeHttp::responding("text/plain", b"ok"));

        let response = http
            .fetch(HttpRequest::get("http://127.0.0.1:3927/ws"), RequestOptions::default())
            .await;

        assert!(response.is_ok());
        assert!(sink.take().is_empty());
        assert_eq!(http.inner().seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_binary_bodies_use_placeholder() {
        let (http, sink) = intercept(FakeHttp::responding("image/png", &[0x89, 0x50, 0x4e, 0x47]));
        let mut request = HttpRequest::new(Method::POST, "https://example.com/upload");
        request.body = RequestBody::Binary(Bytes::from_static(&[0, 1, 2, 255]));

        http.fetch(request, RequestOptions::default()).await.unwrap();

        let record = only_record(&sink);
        assert_eq!(record.request_body, BINARY_PLACEHOLDER);
        assert_eq!(record.response_body, BINARY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_options_override_request() {
        let (http, sink) = intercept(FakeHttp::responding("text/plain", b"ok"));
        let mut request = HttpRequest::new(Method::GET, "https://example.com/search?q=rust&tag=a&tag=b");
        request.headers.insert("x-trace", HeaderValue::from_static("from-request"));
        request.headers.insert("accept", HeaderValue::from_static("text/plain"));
        let mut options = RequestOptions {
            method: Some(Method::POST),
            body: Some(RequestBody::Json(json!({"page": 2}))),
            ..Default::default()
        };
        options.headers.insert("x-trace", HeaderValue::from_static("from-options"));
        options
            .headers
            .insert("cookie", HeaderValue::from_static("session=abc%20def; theme=dark; broken"));

        http.fetch(request, options).await.unwrap();

        let record = only_record(&sink);
        assert_eq!(record.method, "POST");
        assert_eq!(record.request_body, r#"{"page":2}"#);
        assert_eq!(record.headers.request["x-trace"], "from-options");
        assert_eq!(record.headers.request["accept"], "text/plain");

        let cookies = record.cookies.unwrap();
        assert_eq!(cookies["session"], "abc def");
        assert_eq!(cookies["theme"], "dark");
        assert_eq!(cookies.len(), 2);

        let query = record.query_params.unwrap();
        assert_eq!(query["q"], json!("rust"));
        assert_eq!(query["tag"], json!(["a", "b"]));
    }

    #[test]
    fn test_response_descriptions() {
        assert_eq!(describe_response("text/html", &Bytes::from_static(b"<p>hi</p>")), "<p>hi</p>");
        assert_eq!(describe_response("application/json", &Bytes::from_static(b"{oops")), UNREADABLE_RESPONSE);
        assert_eq!(describe_response("text/plain", &Bytes::from_static(&[0xff, 0xfe])), UNREADABLE_RESPONSE);
        assert_eq!(describe_response("", &Bytes::new()), "");
        assert_eq!(describe_response("", &Bytes::from_static(b"raw")), BINARY_PLACEHOLDER);
    }

    #[test]
    fn test_form_body_placeholder() {
        let body = RequestBody::Form(vec![("a".into(), "b".into())]);
        assert_eq!(describe_body(&body), FORM_PLACEHOLDER);
        assert_eq!(describe_body(&RequestBody::Empty), "");
    }

    #[test]
    fn test_unparseable_url_has_no_query() {
        assert!(parse_query("http://[::1").is_none());
        assert_eq!(parse_query("/plain").unwrap().len(), 0);
    }

    #[test]
    fn test_no_cookie_header_means_no_cookies() {
        assert!(parse_cookies(&BTreeMap::new()).is_none());
    }
}
