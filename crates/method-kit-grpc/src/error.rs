//! Error types shared by the method wrappers.

use tonic::metadata::MetadataMap;
use tonic::{Code, Status};

/// Error currency of handlers and auth hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message sent to callers in place of a redacted error.
pub const GENERIC_ERROR_MESSAGE: &str = "Call terminated before completion";

/// Errors that know which gRPC status they map to.
///
/// Handlers hand these to the wrapper in one of two ways:
///
/// - [`GrpcError::into_status`] keeps the code; the message is still
///   redacted by methods with private errors.
/// - [`PublicError::from_grpc`](crate::PublicError::from_grpc) keeps the
///   code and always publishes the message.
///
/// # Example
///
/// ```ignore
/// use method_kit_grpc::{BoxError, GrpcError, PublicError};
/// use tonic::Code;
///
/// #[derive(Debug)]
/// struct AccountLocked(String);
///
/// impl GrpcError for AccountLocked {
///     fn code(&self) -> Code {
///         Code::FailedPrecondition
///     }
///
///     fn message(&self) -> &str {
///         &self.0
///     }
/// }
///
/// // inside a handler
/// return Err(BoxError::from(PublicError::from_grpc(AccountLocked(name))?));
/// ```
pub trait GrpcError: std::fmt::Debug {
    fn code(&self) -> Code;
    fn message(&self) -> &str;

    fn into_status(self) -> Status
    where
        Self: Sized,
    {
        Status::new(self.code(), self.message())
    }
}

/// A formatted error, ready to be handed to the transport.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub code: Code,
    pub message: String,
    pub metadata: MetadataMap,
}

impl ErrorResponse {
    pub fn into_status(self) -> Status {
        Status::with_metadata(self.code, self.message, self.metadata)
    }
}

impl From<ErrorResponse> for Status {
    fn from(err: ErrorResponse) -> Self {
        err.into_status()
    }
}

/// Render an error and its `source()` chain on one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Locked(String);

    impl GrpcError for Locked {
        fn code(&self) -> Code {
            Code::FailedPrecondition
        }
        fn message(&self) -> &str {
            &self.0
        }
    }

    #[test]
    fn grpc_error_into_status() {
        let status = Locked("account locked".to_string()).into_status();

        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(status.message(), "account locked");
    }

    #[test]
    fn error_response_into_status_keeps_metadata() {
        let mut metadata = MetadataMap::new();
        metadata.insert("retry-after", "5".parse().unwrap());

        let status: Status = ErrorResponse {
            code: Code::Unavailable,
            message: "try later".to_string(),
            metadata,
        }
        .into();

        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "try later");
        assert_eq!(status.metadata().get("retry-after").unwrap(), "5");
    }

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "lookup failed")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = Wrapped(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert_eq!(error_chain(&err), "lookup failed: caused by: disk gone");
    }
}
