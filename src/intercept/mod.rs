//! Call-surface interceptors.
//!
//! Each interceptor is a wrapper implementing the same trait as the delegate
//! it wraps, so installing one is a matter of constructing it once at start-up
//! and using it in place of the delegate. Nothing global is patched.

pub mod console;
pub mod http;
pub mod layer;
pub mod socket;

pub use console::{Console, InterceptedConsole, StdConsole};
pub use self::http::{
    HttpClient, HttpRequest, HttpResponse, InterceptedHttp, ReqwestClient, RequestBody,
    RequestOptions,
};
pub use layer::CaptureLayer;
pub use socket::{InterceptedSockets, ObservedSocket, SocketConnector, TungsteniteConnector};
