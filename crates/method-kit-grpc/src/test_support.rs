//! Helpers shared by the unit tests.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Level;

use crate::logger::{LogFields, Logger, LoggerFactory, RequestLogger};
use crate::method::MethodOptions;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Record {
    pub level: Level,
    pub message: String,
    pub payload: Option<String>,
}

/// Logger that keeps every line in memory. Clones share the same records.
#[derive(Clone, Default)]
pub(crate) struct RecordingLogger {
    records: Arc<Mutex<Vec<Record>>>,
    fields: Arc<Mutex<Vec<LogFields>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out this logger and remembering the fields it saw.
    pub fn factory(&self) -> LoggerFactory {
        let logger = self.clone();
        Arc::new(move |fields: &LogFields| {
            logger.fields.lock().unwrap().push(fields.clone());
            Arc::new(logger.clone()) as RequestLogger
        })
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    pub fn count(&self, message: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.message == message)
            .count()
    }

    pub fn payloads(&self, message: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .filter_map(|r| r.payload)
            .collect()
    }

    pub fn fields(&self) -> Vec<LogFields> {
        self.fields.lock().unwrap().clone()
    }

    /// Wait until `message` has been logged at least `times` times.
    pub async fn wait_for(&self, message: &str, times: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while self.count(message) < times {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(
            waited.is_ok(),
            "timed out waiting for {:?} x{}; got {:?}",
            message,
            times,
            self.messages()
        );
    }
}

impl Logger for RecordingLogger {
    fn event(&self, level: Level, message: &str, payload: Option<&dyn fmt::Debug>) {
        self.records.lock().unwrap().push(Record {
            level,
            message: message.to_string(),
            payload: payload.map(|p| format!("{:?}", p)),
        });
    }
}

/// Point a method's logger factory at a [`RecordingLogger`].
pub(crate) trait RecordedOptions {
    fn logger_factory_from(self, recorder: &RecordingLogger) -> Self;
}

impl<E> RecordedOptions for MethodOptions<E> {
    fn logger_factory_from(self, recorder: &RecordingLogger) -> Self {
        let factory = recorder.factory();
        self.logger_factory(move |fields: &LogFields| factory(fields))
    }
}
