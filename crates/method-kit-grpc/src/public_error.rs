//! Marker error whose message may be shown to remote callers.

use tonic::Code;

use crate::error::{BoxError, GrpcError};

/// An error whose message is safe to send to the caller.
///
/// Methods configured with private errors redact every message except the
/// ones carried by a `PublicError`. The message must not be empty.
///
/// ```
/// use method_kit_grpc::PublicError;
///
/// let err = PublicError::new("Order not found").unwrap();
/// assert_eq!(err.to_string(), "Order not found");
///
/// assert!(PublicError::new("").is_err());
/// ```
#[derive(Debug)]
pub struct PublicError {
    message: String,
    code: Option<Code>,
    source: Option<BoxError>,
}

impl PublicError {
    pub fn new(message: impl Into<String>) -> Result<Self, InvalidPublicError> {
        let message = message.into();
        if message.is_empty() {
            return Err(InvalidPublicError);
        }

        Ok(Self {
            message,
            code: None,
            source: None,
        })
    }

    /// Publish `message` while keeping the underlying error as `source()`
    /// for logging.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Result<Self, InvalidPublicError> {
        let mut err = Self::new(message)?;
        err.source = Some(source.into());
        Ok(err)
    }

    /// Publish a [`GrpcError`], keeping its code and message.
    pub fn from_grpc(err: impl GrpcError) -> Result<Self, InvalidPublicError> {
        Ok(Self::new(err.message())?.with_code(err.code()))
    }

    /// Status code to report instead of `Internal`.
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<Code> {
        self.code
    }
}

impl std::fmt::Display for PublicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PublicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl GrpcError for PublicError {
    fn code(&self) -> Code {
        self.code.unwrap_or(Code::Internal)
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// Returned when a [`PublicError`] is built without a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPublicError;

impl std::fmt::Display for InvalidPublicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("No message provided for public error")
    }
}

impl std::error::Error for InvalidPublicError {}
