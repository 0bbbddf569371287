//! Named, span-scoped loggers.
//!
//! Contexts get their logger from a [`LoggerFactory`] that is passed down
//! explicitly at composition time. A [`ScopedLogger`] owns a `tracing` span
//! named `handler` carrying the logger name, so everything the pipeline and
//! the handlers log for one dispatch is grouped under it.

use std::fmt::Display;

use tracing::{Level, Span};

/// Creates loggers scoped by name.
#[derive(Debug, Clone, Default)]
pub struct LoggerFactory {
    _private: (),
}

impl LoggerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a logger scoped to `name`.
    pub fn get_logger(&self, name: &str) -> ScopedLogger {
        let span = tracing::info_span!("handler", logger = %name);
        ScopedLogger {
            name: name.to_string(),
            span,
        }
    }
}

/// A logger bound to a name and a span.
///
/// The `is_*_enabled` predicates let callers skip building expensive payloads
/// when the level is filtered out.
#[derive(Debug, Clone)]
pub struct ScopedLogger {
    name: String,
    span: Span,
}

impl ScopedLogger {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The span every event of this logger is recorded in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn trace(&self, message: impl Display) {
        self.span
            .in_scope(|| tracing::trace!(target: "courier::handler", "{message}"));
    }

    pub fn debug(&self, message: impl Display) {
        self.span
            .in_scope(|| tracing::debug!(target: "courier::handler", "{message}"));
    }

    pub fn info(&self, message: impl Display) {
        self.span
            .in_scope(|| tracing::info!(target: "courier::handler", "{message}"));
    }

    pub fn warn(&self, message: impl Display) {
        self.span
            .in_scope(|| tracing::warn!(target: "courier::handler", "{message}"));
    }

    pub fn error(&self, message: impl Display) {
        self.span
            .in_scope(|| tracing::error!(target: "courier::handler", "{message}"));
    }

    pub fn is_trace_enabled(&self) -> bool {
        Self::enabled(Level::TRACE)
    }

    pub fn is_debug_enabled(&self) -> bool {
        Self::enabled(Level::DEBUG)
    }

    pub fn is_info_enabled(&self) -> bool {
        Self::enabled(Level::INFO)
    }

    pub fn is_warn_enabled(&self) -> bool {
        Self::enabled(Level::WARN)
    }

    pub fn is_error_enabled(&self) -> bool {
        Self::enabled(Level::ERROR)
    }

    fn enabled(level: Level) -> bool {
        // `enabled!` needs a constant level.
        match level {
            Level::TRACE => tracing::enabled!(target: "courier::handler", Level::TRACE),
            Level::DEBUG => tracing::enabled!(target: "courier::handler", Level::DEBUG),
            Level::INFO => tracing::enabled!(target: "courier::handler", Level::INFO),
            Level::WARN => tracing::enabled!(target: "courier::handler", Level::WARN),
            _ => tracing::enabled!(target: "courier::handler", Level::ERROR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_keeps_its_name() {
        let logger = LoggerFactory::new().get_logger("handler:Ping.42");
        assert_eq!(logger.name(), "handler:Ping.42");
    }

    #[test]
    fn levels_are_disabled_without_a_subscriber() {
        let logger = LoggerFactory::new().get_logger("quiet");
        assert!(!logger.is_debug_enabled());
        // Logging with nothing installed is a no-op.
        logger.error("nobody listens");
    }
}
