//! Tracing setup and the in-app console buffer

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Lines kept for the console tab
pub const CONSOLE_CAPACITY: usize = 500;

/// Shared, bounded list of formatted log lines
#[derive(Clone, Default)]
pub struct ConsoleLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        lines.push_back(line);
        while lines.len() > CONSOLE_CAPACITY {
            lines.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

/// Mirrors every event into a [`ConsoleLog`] as `[HH:MM:SS] [LEVEL] message key=value`
pub struct ConsoleLayer {
    console: ConsoleLog,
}

impl ConsoleLayer {
    pub fn new(console: ConsoleLog) -> Self {
        Self { console }
    }
}

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.console.push(format_line(
            &chrono::Local::now().format("%H:%M:%S").to_string(),
            *event.metadata().level(),
            &visitor.message,
            &visitor.fields,
        ));
    }
}

fn format_line(timestamp: &str, level: Level, message: &str, fields: &str) -> String {
    let mut line = format!("[{}] [{}] {}", timestamp, level, message);
    if !fields.is_empty() {
        line.push_str(fields);
    }
    line
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stderr and console
pub fn init(console: ConsoleLog) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(ConsoleLayer::new(console))
        .try_init();
    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn test_console_captures_message_and_fields() {
        let console = ConsoleLog::new();
        let subscriber = tracing_subscriber::registry().with(ConsoleLayer::new(console.clone()));
        tracing::subscriber::with_default(subscriber, || {
            info!(channel = "News 24", attempt = 2, "retry scheduled");
            warn!("engine unavailable");
        });

        let lines = console.snapshot();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[INFO] retry scheduled"));
        assert!(lines[0].ends_with(" channel=News 24 attempt=2"));
        assert!(lines[1].contains("[WARN] engine unavailable"));
    }

    #[test]
    fn test_console_is_bounded() {
        let console = ConsoleLog::new();
        for i in 0..CONSOLE_CAPACITY + 10 {
            console.push(format!("line {}", i));
        }
        let lines = console.snapshot();
        assert_eq!(lines.len(), CONSOLE_CAPACITY);
        assert_eq!(lines[0], "line 10");

        console.clear();
        assert!(console.is_empty());
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line("12:00:00", Level::DEBUG, "tick", " state=Playing"),
            "[12:00:00] [DEBUG] tick state=Playing"
        );
    }
}
