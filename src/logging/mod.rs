// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Logging module - console output plus an in-memory tail for the shell

use anyhow::Result;
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Layer};

use crate::core::EventLog;

/// Most recent diagnostic lines, shared between the capture layer and
/// the query surface
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<EventLog<String>>>,
}

impl LogBuffer {
    /// Buffer retaining the newest `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(EventLog::new(capacity))),
        }
    }

    /// Append one rendered line, evicting the oldest when full
    pub fn push(&self, line: String) {
        self.lines.lock().append(line);
    }

    /// Retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().all()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Renders every event as `time\tLEVEL\tmessage\tkey=value...` into a
/// [`LogBuffer`]
pub struct LogCaptureLayer {
    buffer: LogBuffer,
}

impl LogCaptureLayer {
    /// Layer writing into `buffer`
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        let _ = write!(self.fields, "\t{}={}", name, value);
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{}\t{}\t{}{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            event.metadata().level(),
            visitor.message,
            visitor.fields
        );
        self.buffer.push(line);
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init(level: &str, buffer: LogBuffer) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_target(false).with_ansi(true))
        .with(LogCaptureLayer::new(buffer))
        .try_init()?;

    Ok(())
}
