//! Structured JSON-lines logging
//!
//! Every event becomes one JSON object:
//!
//! ```text
//! {"level":"info","time":"2026-01-01T12:00:00.000Z","msg":"completed","scope":"code_fix","duration_ms":812}
//! ```
//!
//! `scope` comes from the nearest span (or the event itself) that records a
//! `scope` field, and falls back to `server`. All other span and event
//! fields are flattened next to it.
//!
//! The destination is resolved once at startup into a [`LoggerConfig`]: a
//! log file in the preferred directory when it is writable, stderr
//! otherwise. stdout is never used, it carries the MCP protocol.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Scope used when neither the event nor its spans name one
pub const DEFAULT_SCOPE: &str = "server";

/// Log file name inside the log directory
pub const LOG_FILE: &str = "server.log";

/// Default preview length for prompts and outputs
pub const PREVIEW_CHARS: usize = 400;

/// Shorten long values for log previews
pub fn truncate(value: &str, max: usize) -> Cow<'_, str> {
    let total = value.chars().count();
    if total <= max {
        return Cow::Borrowed(value);
    }

    let head: String = value.chars().take(max).collect();
    Cow::Owned(format!("{}… (truncated, {} chars total)", head, total))
}

/// Map a user-supplied level name onto a tracing directive
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    File(PathBuf),
    Stderr,
}

/// Logger settings resolved once during startup
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Level directive (trace, debug, info, warn, error)
    pub level: &'static str,
    pub destination: LogDestination,
    /// Why the preferred directory was not used, if it wasn't
    pub fallback_reason: Option<String>,
}

impl LoggerConfig {
    /// Probe the preferred directory and pick a destination
    pub fn resolve(level: &str, preferred_dir: &Path) -> Self {
        let level = normalize_level(level);

        match probe_log_dir(preferred_dir) {
            Ok(path) => Self {
                level,
                destination: LogDestination::File(path),
                fallback_reason: None,
            },
            Err(e) => Self {
                level,
                destination: LogDestination::Stderr,
                fallback_reason: Some(format!("{}: {}", preferred_dir.display(), e)),
            },
        }
    }
}

fn probe_log_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE);
    OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(path)
}

/// In-memory sink, used by tests to inspect emitted entries
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }

    /// Raw lines in emission order
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Parsed entries in emission order
    pub fn entries(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

/// Destination writer for [`JsonLayer`]
#[derive(Debug)]
pub enum LogSink {
    File(Mutex<File>),
    Stderr,
    Memory(MemorySink),
}

impl LogSink {
    /// Open the configured destination, downgrading to stderr on failure
    pub fn open(destination: &LogDestination) -> (Self, Option<String>) {
        match destination {
            LogDestination::File(path) => {
                match OpenOptions::new().create(true).append(true).open(path) {
                    Ok(file) => (Self::File(Mutex::new(file)), None),
                    Err(e) => (Self::Stderr, Some(format!("{}: {}", path.display(), e))),
                }
            }
            LogDestination::Stderr => (Self::Stderr, None),
        }
    }

    fn write_line(&self, line: &str) {
        match self {
            Self::File(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(file, "{}", line);
                }
            }
            Self::Stderr => {
                let _ = writeln!(std::io::stderr().lock(), "{}", line);
            }
            Self::Memory(sink) => sink.push(line),
        }
    }
}

/// Fields recorded on a span, stored in its extensions
struct SpanFields(Map<String, Value>);

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.0
            .insert(field.name().to_string(), Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warning",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

/// `tracing_subscriber` layer writing one JSON object per event
pub struct JsonLayer {
    sink: LogSink,
}

impl JsonLayer {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for JsonLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = Map::new();
        attrs.record(&mut JsonVisitor(&mut fields));
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            values.record(&mut JsonVisitor(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Map::new();

        // Outer spans first so inner spans and the event win on conflicts
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.clone());
                }
            }
        }
        event.record(&mut JsonVisitor(&mut fields));

        let msg = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let scope = fields
            .remove("scope")
            .unwrap_or_else(|| Value::from(DEFAULT_SCOPE));

        let mut entry = Map::new();
        entry.insert("level".to_string(), Value::from(level_name(event.metadata().level())));
        entry.insert(
            "time".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        entry.insert("msg".to_string(), Value::from(msg));
        entry.insert("scope".to_string(), scope);
        entry.extend(fields);

        self.sink.write_line(&Value::Object(entry).to_string());
    }
}

/// Install the global subscriber. RUST_LOG, when set, overrides the level.
pub fn init(config: &LoggerConfig) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));
    let (sink, open_error) = LogSink::open(&config.destination);

    tracing_subscriber::registry()
        .with(filter)
        .with(JsonLayer::new(sink))
        .try_init()?;

    if let Some(reason) = config.fallback_reason.as_deref().or(open_error.as_deref()) {
        tracing::warn!(reason = %reason, "log directory unavailable, logging to stderr");
    }

    Ok(())
}

/// Subscriber writing to memory, for use with `tracing::subscriber::set_default`
pub fn memory_subscriber(
    level: LevelFilter,
) -> (impl Subscriber + Send + Sync + 'static, MemorySink) {
    let sink = MemorySink::new();
    let subscriber = tracing_subscriber::registry()
        .with(level)
        .with(JsonLayer::new(LogSink::Memory(sink.clone())));
    (subscriber, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, info_span, warn};

    fn capture<F: FnOnce()>(f: F) -> Vec<Value> {
        let (subscriber, sink) = memory_subscriber(LevelFilter::DEBUG);
        tracing::subscriber::with_default(subscriber, f);
        sink.entries()
    }

    #[test]
    fn test_entry_shape() {
        let entries = capture(|| {
            info!(duration_ms = 12u64, ok = true, "completed");
        });

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry["level"], "info");
        assert_eq!(entry["msg"], "completed");
        assert_eq!(entry["scope"], DEFAULT_SCOPE);
        assert_eq!(entry["duration_ms"], 12);
        assert_eq!(entry["ok"], true);
        assert!(entry["time"].as_str().unwrap().ends_with('Z'));
        assert!(entry.get("message").is_none());
    }

    #[test]
    fn test_scope_from_span() {
        let entries = capture(|| {
            let span = info_span!("tool", scope = "code_fix");
            let _enter = span.enter();
            debug!(prompt_length = 42u64, "rendered prompt");
        });

        assert_eq!(entries[0]["scope"], "code_fix");
        assert_eq!(entries[0]["level"], "debug");
        assert_eq!(entries[0]["prompt_length"], 42);
    }

    #[test]
    fn test_event_scope_overrides_span() {
        let entries = capture(|| {
            let span = info_span!("tool", scope = "code_fix");
            let _enter = span.enter();
            info!(scope = "server", "override");
        });

        assert_eq!(entries[0]["scope"], "server");
    }

    #[test]
    fn test_warn_is_named_warning() {
        let entries = capture(|| warn!("careful"));
        assert_eq!(entries[0]["level"], "warning");
    }

    #[test]
    fn test_level_filter_applies() {
        let (subscriber, sink) = memory_subscriber(LevelFilter::INFO);
        tracing::subscriber::with_default(subscriber, || {
            debug!("hidden");
            info!("shown");
        });

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["msg"], "shown");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");

        let long = "x".repeat(500);
        let preview = truncate(&long, 400);
        assert!(preview.starts_with(&"x".repeat(400)));
        assert!(preview.ends_with("(truncated, 500 chars total)"));
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let value = "é".repeat(5);
        assert_eq!(truncate(&value, 5), value.as_str());
        assert!(truncate(&value, 4).starts_with("éééé…"));
    }

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("critical"), "error");
        assert_eq!(normalize_level("verbose"), "info");
    }

    #[test]
    fn test_resolve_uses_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");

        let config = LoggerConfig::resolve("debug", &logs);
        assert_eq!(config.level, "debug");
        assert_eq!(config.destination, LogDestination::File(logs.join(LOG_FILE)));
        assert!(config.fallback_reason.is_none());
        assert!(logs.join(LOG_FILE).exists());
    }

    #[test]
    fn test_resolve_falls_back_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("file");
        std::fs::write(&not_a_dir, "").unwrap();

        let config = LoggerConfig::resolve("info", &not_a_dir.join("logs"));
        assert_eq!(config.destination, LogDestination::Stderr);
        assert!(config.fallback_reason.is_some());
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let (sink, err) = LogSink::open(&LogDestination::File(path.clone()));
        assert!(err.is_none());

        let subscriber = tracing_subscriber::registry().with(JsonLayer::new(sink));
        tracing::subscriber::with_default(subscriber, || {
            info!("one");
            info!("two");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["msg"], "one");
    }
}
