//! Per-request loggers.
//!
//! Every request gets its own [`RequestLogger`], built by the method's
//! [`LoggerFactory`] from the request and message IDs. The default factory
//! writes through `tracing`, inside a span carrying both IDs.

use std::fmt;
use std::sync::Arc;

use tracing::Level;

/// Correlation fields handed to a [`LoggerFactory`].
#[derive(Debug, Clone)]
pub struct LogFields {
    pub message_id: Arc<str>,
    pub request_id: String,
}

/// Sink for one request's structured log lines.
pub trait Logger: Send + Sync {
    /// Write one line. `payload` is attached as a structured field.
    fn event(&self, level: Level, message: &str, payload: Option<&dyn fmt::Debug>);

    fn info(&self, message: &str) {
        self.event(Level::INFO, message, None);
    }

    fn warn(&self, message: &str) {
        self.event(Level::WARN, message, None);
    }

    fn debug(&self, message: &str, payload: &dyn fmt::Debug) {
        self.event(Level::DEBUG, message, Some(payload));
    }

    fn error(&self, message: &str, payload: &dyn fmt::Debug) {
        self.event(Level::ERROR, message, Some(payload));
    }
}

pub type RequestLogger = Arc<dyn Logger>;

pub type LoggerFactory = Arc<dyn Fn(&LogFields) -> RequestLogger + Send + Sync>;

/// [`Logger`] that emits `tracing` events inside a request span.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    span: tracing::Span,
}

impl TracingLogger {
    pub fn new(fields: &LogFields) -> Self {
        let span = tracing::info_span!(
            "grpc_method",
            message_id = %fields.message_id,
            request_id = %fields.request_id,
        );
        Self { span }
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

macro_rules! emit {
    ($level:expr, $message:expr, $payload:expr) => {
        match $payload {
            Some(payload) => tracing::event!($level, payload = ?payload, "{}", $message),
            None => tracing::event!($level, "{}", $message),
        }
    };
}

impl Logger for TracingLogger {
    fn event(&self, level: Level, message: &str, payload: Option<&dyn fmt::Debug>) {
        let _entered = self.span.enter();

        if level == Level::ERROR {
            emit!(Level::ERROR, message, payload);
        } else if level == Level::WARN {
            emit!(Level::WARN, message, payload);
        } else if level == Level::INFO {
            emit!(Level::INFO, message, payload);
        } else if level == Level::DEBUG {
            emit!(Level::DEBUG, message, payload);
        } else {
            emit!(Level::TRACE, message, payload);
        }
    }
}

/// Factory producing [`TracingLogger`]s. Used when no factory is configured.
pub fn tracing_logger_factory() -> LoggerFactory {
    Arc::new(|fields: &LogFields| Arc::new(TracingLogger::new(fields)) as RequestLogger)
}
