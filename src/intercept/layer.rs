//! Bridge from `tracing` to console records.
//!
//! Installing [`CaptureLayer`] on a subscriber makes every `tracing` event of
//! the host application show up on the observer as a console log line, next
//! to whatever the subscriber already does with it.

use serde_json::{Map, Value};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::layer::{Context, Layer};

use crate::capture::Capture;
use crate::transport::in_transport_task;
use crate::types::{ConsoleLogRecord, LogArg, LogLevel};

/// Crates on the relay path. Their events are never captured, or every
/// relay send would log, be captured and be sent again. Connection tasks
/// spawned by the HTTP client run outside the transport task, so the
/// task-local mark alone does not cover them.
const RELAY_PATH_TARGETS: &[&str] = &[
    "devlens",
    "tungstenite",
    "tokio_tungstenite",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
    "tokio_rustls",
    "want",
    "mio",
];

/// Fields the `log` bridge adds to every forwarded record
const LOG_BRIDGE_FIELD_PREFIX: &str = "log.";

fn on_relay_path(target: &str) -> bool {
    RELAY_PATH_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[derive(Clone)]
pub struct CaptureLayer {
    capture: Capture,
}

impl CaptureLayer {
    pub fn new(capture: Capture) -> Self {
        Self { capture }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.capture.is_enabled() || in_transport_task() {
            return;
        }

        // Events forwarded from `log` carry their real target in fields
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        if on_relay_path(metadata.target()) {
            return;
        }

        let mut visitor = ArgVisitor::default();
        event.record(&mut visitor);

        let level = if *metadata.level() == Level::ERROR {
            LogLevel::Error
        } else if *metadata.level() == Level::WARN {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };

        let mut args = Vec::with_capacity(2);
        if let Some(message) = visitor.message {
            args.push(LogArg::Str(message));
        }
        if !visitor.fields.is_empty() {
            args.push(LogArg::Json(Value::Object(visitor.fields)));
        }

        self.capture.console(ConsoleLogRecord::new(level, args));
    }
}

#[derive(Default)]
struct ArgVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for ArgVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name().starts_with(LOG_BRIDGE_FIELD_PREFIX) {
            return;
        }
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.insert(field.name().to_string(), Value::String(rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name().starts_with(LOG_BRIDGE_FIELD_PREFIX) {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name().starts_with(LOG_BRIDGE_FIELD_PREFIX) {
            return;
        }
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.fields.insert(field.name().to_string(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::Bool(value));
    }
}
