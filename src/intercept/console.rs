//! Structured-log interception.

use crate::capture::Capture;
use crate::types::{ConsoleLogRecord, LogArg, LogLevel};

/// The four logging entry points of an application.
pub trait Console: Send + Sync {
    fn log(&self, args: &[LogArg]);
    fn info(&self, args: &[LogArg]);
    fn warn(&self, args: &[LogArg]);
    fn error(&self, args: &[LogArg]);
}

/// Terminal output: `log`/`info` to stdout, `warn`/`error` to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsole;

impl StdConsole {
    fn line(args: &[LogArg]) -> String {
        args.iter().map(LogArg::render).collect::<Vec<_>>().join(" ")
    }
}

impl Console for StdConsole {
    fn log(&self, args: &[LogArg]) {
        println!("{}", Self::line(args));
    }

    fn info(&self, args: &[LogArg]) {
        println!("{}", Self::line(args));
    }

    fn warn(&self, args: &[LogArg]) {
        eprintln!("{}", Self::line(args));
    }

    fn error(&self, args: &[LogArg]) {
        eprintln!("{}", Self::line(args));
    }
}

/// Calls the wrapped console first, then records the call. Arguments are
/// kept as passed; they are only turned into JSON when the envelope is
/// encoded.
pub struct InterceptedConsole<C> {
    inner: C,
    capture: Capture,
}

impl<C: Console> InterceptedConsole<C> {
    pub fn new(inner: C, capture: Capture) -> Self {
        Self { inner, capture }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn record(&self, level: LogLevel, args: &[LogArg]) {
        if self.capture.is_enabled() {
            self.capture
                .console(ConsoleLogRecord::new(level, args.to_vec()));
        }
    }
}

impl<C: Console> Console for InterceptedConsole<C> {
    fn log(&self, args: &[LogArg]) {
        self.inner.log(args);
        self.record(LogLevel::Info, args);
    }

    fn info(&self, args: &[LogArg]) {
        self.inner.info(args);
        self.record(LogLevel::Info, args);
    }

    fn warn(&self, args: &[LogArg]) {
        self.inner.warn(args);
        self.record(LogLevel::Warn, args);
    }

    fn error(&self, args: &[LogArg]) {
        self.inner.error(args);
        self.record(LogLevel::Error, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MemorySink, RelayFilter};
    use crate::envelope::Envelope;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Remembers every call, tagged with the entry point used.
    #[derive(Default)]
    struct FakeConsole {
        calls: Mutex<Vec<(&'static str, Vec<LogArg>)>>,
    }

    impl FakeConsole {
        fn push(&self, method: &'static str, args: &[LogArg]) {
            self.calls.lock().unwrap().push((method, args.to_vec()));
        }
    }

    impl Console for FakeConsole {
        fn log(&self, args: &[LogArg]) {
            self.push("log", args);
        }

        fn info(&self, args: &[LogArg]) {
            self.push("info", args);
        }

        fn warn(&self, args: &[LogArg]) {
            self.push("warn", args);
        }

        fn error(&self, args: &[LogArg]) {
            self.push("error", args);
        }
    }

    fn levels(envelopes: Vec<Envelope>) -> Vec<LogLevel> {
        envelopes
            .into_iter()
            .filter_map(|envelope| match envelope {
                Envelope::Console { data } => Some(data.level),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_wrapped_console_still_called() {
        let sink = Arc::new(MemorySink::new());
        let console = InterceptedConsole::new(
            FakeConsole::default(),
            Capture::new(sink.clone(), RelayFilter::new()),
        );

        console.log(&["a".into()]);
        console.info(&["b".into()]);
        console.warn(&["c".into()]);
        console.error(&["d".into()]);

        let calls = console.inner().calls.lock().unwrap();
        let methods: Vec<&str> = calls.iter().map(|(method, _)| *method).collect();
        assert_eq!(methods, vec!["log", "info", "warn", "error"]);

        assert_eq!(
            levels(sink.take()),
            vec![LogLevel::Info, LogLevel::Info, LogLevel::Warn, LogLevel::Error]
        );
    }

    #[test]
    fn test_args_are_kept_structured() {
        let sink = Arc::new(MemorySink::new());
        let console = InterceptedConsole::new(
            FakeConsole::default(),
            Capture::new(sink.clone(), RelayFilter::new()),
        );

        let args = vec![
            LogArg::from("user"),
            LogArg::Json(json!({"id": 7, "roles": ["admin"]})),
            LogArg::Float(f64::INFINITY),
        ];
        console.warn(&args);

        let envelopes = sink.take();
        let Envelope::Console { data } = &envelopes[0] else {
            panic!("expected a console envelope");
        };
        assert_eq!(data.args, args);

        let frame: serde_json::Value = serde_json::from_str(&envelopes[0].to_frame().unwrap()).unwrap();
        assert_eq!(frame["data"]["args"], json!(["user", {"id": 7, "roles": ["admin"]}, "inf"]));
    }

    #[test]
    fn test_disabled_capture_only_forwards() {
        let console = InterceptedConsole::new(FakeConsole::default(), Capture::disabled());
        console.error(&["boom".into()]);
        assert_eq!(console.inner().calls.lock().unwrap().len(), 1);
    }
}
