//! # method-kit-grpc
//!
//! Request-lifecycle wrappers for tonic methods.
//!
//! Wrap a handler in a [`UnaryMethod`] or [`StreamingMethod`] and every call
//! gets a request id, a request-scoped logger, an optional auth hook,
//! consistent error formatting and response metadata. Handlers stay plain
//! async functions; the generated service trait just forwards to
//! [`Executable::exec`] or to the closure returned by
//! [`Executable::register`].
//!
//! ## Quick Start - Unary
//!
//! ```ignore
//! use method_kit_grpc::{BoxError, Executable, MethodOptions, MethodRequest, MethodSettings, UnaryMethod};
//!
//! let settings: MethodSettings = MethodSettings::builder().with_dotenv().build()?;
//!
//! let say_hello = UnaryMethod::new(
//!     |request: MethodRequest<HelloRequest>, _responses, metadata| async move {
//!         metadata.insert("x-greeted", "1");
//!         Ok::<_, BoxError>(HelloReply { message: format!("Hello {}!", request.params.name) })
//!     },
//!     "[Greeter:SayHello]",
//!     MethodOptions::from_settings(&settings, ()),
//!     (),
//! );
//!
//! #[tonic::async_trait]
//! impl greeter_server::Greeter for MyGreeter {
//!     async fn say_hello(&self, request: Request<HelloRequest>) -> Result<Response<HelloReply>, Status> {
//!         self.say_hello.exec(request).await
//!     }
//! }
//! ```
//!
//! ## Quick Start - Server Streaming
//!
//! ```ignore
//! use method_kit_grpc::{BoxError, MethodOptions, ResponseStream, StreamingMethod, StreamingRequest};
//!
//! let count = StreamingMethod::new(
//!     |request: StreamingRequest<CountRequest, CountReply>, _responses, _metadata| async move {
//!         for n in 0..request.params.up_to {
//!             request.send(CountReply { n })?;
//!         }
//!         Ok::<_, BoxError>(())
//!     },
//!     "[Counter:Count]",
//!     MethodOptions::new(),
//!     (),
//! );
//!
//! #[tonic::async_trait]
//! impl counter_server::Counter for MyCounter {
//!     type CountStream = ResponseStream<CountReply>;
//!
//!     async fn count(&self, request: Request<CountRequest>) -> Result<Response<Self::CountStream>, Status> {
//!         self.count.exec(request).await
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization (default)

pub mod config;
mod context;
mod error;
mod lifecycle;
mod logger;
pub mod metadata;
mod method;
mod public_error;
mod request_id;
mod streaming;
mod unary;

#[cfg(test)]
mod test_support;

pub use config::{ConfigBuilder, ConfigError, Environment, MethodSettings};
pub use context::{MethodRequest, RequestContext};
pub use error::{BoxError, ErrorResponse, GrpcError, GENERIC_ERROR_MESSAGE};
pub use lifecycle::{
    log_error, log_request_cancel, log_request_end, log_request_params, log_request_start,
    log_response,
};
pub use logger::{tracing_logger_factory, LogFields, Logger, LoggerFactory, RequestLogger, TracingLogger};
pub use metadata::{build_metadata, headers, HeaderKey, ResponseMetadata, TIMESTAMP_KEY};
pub use method::{AuthHook, ErrorOptions, ExecFuture, Executable, HandlerFuture, MethodCore, MethodOptions};
pub use public_error::{InvalidPublicError, PublicError};
pub use request_id::{
    generate_id, generate_id_with_len, DEFAULT_REQUEST_ID_BYTES, MIN_REQUEST_ID_BYTES,
};
pub use streaming::{
    ResponseSender, ResponseStream, StreamClosed, StreamError, StreamingMethod, StreamingRequest,
};
pub use unary::UnaryMethod;

pub use tonic::{Code, Request, Response, Status};
pub use method_kit::LogFormat;

#[cfg(feature = "tracing")]
pub use method_kit::{init_logging, init_logging_from_env};
