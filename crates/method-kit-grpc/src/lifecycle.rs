//! Structured lifecycle log lines, shared by both call shapes.
//!
//! Everything goes through the request's own logger. Payloads are only
//! logged at debug level.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::error_chain;
use crate::logger::{Logger, RequestLogger};

pub const REQUEST_RECEIVED: &str = "Request received";
pub const REQUEST_PAYLOAD: &str = "Request made with payload";
pub const REQUEST_CANCELLED: &str = "Request cancelled by client";
pub const REQUEST_COMPLETED: &str = "Request completed";
pub const RESPONSE_GENERATED: &str = "Response generated";
pub const RESPONSE_PAYLOAD: &str = "Responding with payload";
pub const REQUEST_FAILED: &str = "Error while handling request";
pub const AUTH_STARTED: &str = "Authenticating request";
pub const AUTH_FINISHED: &str = "Finished authenticating request";

pub fn log_request_start(logger: &dyn Logger) {
    logger.info(REQUEST_RECEIVED);
}

pub fn log_request_params(logger: &dyn Logger, params: &dyn fmt::Debug) {
    logger.debug(REQUEST_PAYLOAD, params);
}

pub fn log_request_cancel(logger: &dyn Logger) {
    logger.info(REQUEST_CANCELLED);
}

pub fn log_request_end(logger: &dyn Logger) {
    logger.info(REQUEST_COMPLETED);
}

pub fn log_response(logger: &dyn Logger, data: &dyn fmt::Debug) {
    logger.info(RESPONSE_GENERATED);
    logger.debug(RESPONSE_PAYLOAD, data);
}

/// Log the full error chain. This is independent of what the caller sees.
pub fn log_error(logger: &dyn Logger, err: &(dyn std::error::Error + 'static)) {
    logger.error(REQUEST_FAILED, &error_chain(err));
}

/// Logs [`REQUEST_COMPLETED`] exactly once: on the first [`RequestEnd::log`]
/// call, or on drop if nobody called it.
pub(crate) struct RequestEnd {
    logger: RequestLogger,
    logged: AtomicBool,
}

impl RequestEnd {
    pub(crate) fn new(logger: RequestLogger) -> Self {
        Self {
            logger,
            logged: AtomicBool::new(false),
        }
    }

    pub(crate) fn log(&self) {
        if !self.logged.swap(true, Ordering::AcqRel) {
            log_request_end(&*self.logger);
        }
    }
}

impl Drop for RequestEnd {
    fn drop(&mut self) {
        self.log();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public_error::PublicError;
    use crate::test_support::RecordingLogger;
    use std::sync::Arc;
    use tracing::Level;

    #[test]
    fn lifecycle_lines_use_expected_levels() {
        let logger = RecordingLogger::new();

        log_request_start(&logger);
        log_request_params(&logger, &"params");
        log_response(&logger, &"reply");
        log_request_cancel(&logger);
        log_request_end(&logger);

        let levels: Vec<_> = logger
            .records()
            .into_iter()
            .map(|r| (r.level, r.message))
            .collect();
        assert_eq!(
            levels,
            vec![
                (Level::INFO, REQUEST_RECEIVED.to_string()),
                (Level::DEBUG, REQUEST_PAYLOAD.to_string()),
                (Level::INFO, RESPONSE_GENERATED.to_string()),
                (Level::DEBUG, RESPONSE_PAYLOAD.to_string()),
                (Level::INFO, REQUEST_CANCELLED.to_string()),
                (Level::INFO, REQUEST_COMPLETED.to_string()),
            ]
        );
    }

    #[test]
    fn errors_are_logged_with_their_cause() {
        let logger = RecordingLogger::new();
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = PublicError::with_source("Upstream failed", cause).unwrap();

        log_error(&logger, &err);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::ERROR);
        let payload = records[0].payload.as_deref().unwrap();
        assert!(payload.contains("Upstream failed"));
        assert!(payload.contains("socket closed"));
    }

    #[test]
    fn request_end_logs_once() {
        let logger = RecordingLogger::new();
        let end = RequestEnd::new(Arc::new(logger.clone()));

        end.log();
        end.log();
        drop(end);

        assert_eq!(logger.count(REQUEST_COMPLETED), 1);
    }

    #[test]
    fn request_end_logs_on_drop() {
        let logger = RecordingLogger::new();
        drop(RequestEnd::new(Arc::new(logger.clone())));

        assert_eq!(logger.count(REQUEST_COMPLETED), 1);
    }
}
