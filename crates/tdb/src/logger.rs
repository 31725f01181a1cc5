//! The logging surface handed to build rules and engine internals.
//!
//! Engine diagnostics go through `tracing` as usual; this trait is the
//! user-facing channel: what a build script's author sees when they run
//! their script. Adapters compose the usual way: wrap a base logger in
//! [`Filtered`] for verbosity control or [`Prefixed`] to tag a subsystem.

use std::sync::Arc;

/// Numeric verbosity threshold. Messages at or below the configured
/// level are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Verbosity(pub u32);

impl Verbosity {
    pub const SILENT: Verbosity = Verbosity(0);
    pub const ERRORS: Verbosity = Verbosity(50);
    pub const WARNINGS: Verbosity = Verbosity(100);
    pub const INFO: Verbosity = Verbosity(200);
    pub const DEBUG: Verbosity = Verbosity(300);
}

/// Three-sink logging interface.
pub trait Logger: Send + Sync {
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn log(&self, message: &str);
}

/// Discards everything.
pub struct NullLogger;

impl Logger for NullLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn log(&self, _message: &str) {}
}

/// Routes messages to the `tracing` subscriber. This is the default
/// logger when a builder is configured without one.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn log(&self, message: &str) {
        tracing::info!("{message}");
    }
}

/// Drops messages above the configured verbosity threshold.
pub struct Filtered {
    inner: Arc<dyn Logger>,
    level: Verbosity,
}

impl Filtered {
    pub fn new(inner: Arc<dyn Logger>, level: Verbosity) -> Self {
        Self { inner, level }
    }
}

impl Logger for Filtered {
    fn error(&self, message: &str) {
        if self.level >= Verbosity::ERRORS {
            self.inner.error(message);
        }
    }

    fn warn(&self, message: &str) {
        if self.level >= Verbosity::WARNINGS {
            self.inner.warn(message);
        }
    }

    fn log(&self, message: &str) {
        if self.level >= Verbosity::INFO {
            self.inner.log(message);
        }
    }
}

/// Prepends a constant prefix to every message.
pub struct Prefixed {
    inner: Arc<dyn Logger>,
    prefix: String,
}

impl Prefixed {
    pub fn new(inner: Arc<dyn Logger>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

impl Logger for Prefixed {
    fn error(&self, message: &str) {
        self.inner.error(&format!("{}{}", self.prefix, message));
    }

    fn warn(&self, message: &str) {
        self.inner.warn(&format!("{}{}", self.prefix, message));
    }

    fn log(&self, message: &str) {
        self.inner.log(&format!("{}{}", self.prefix, message));
    }
}
