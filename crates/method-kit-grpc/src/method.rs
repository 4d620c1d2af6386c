//! Shared method configuration and services.
//!
//! [`MethodCore`] holds what every wrapped method needs: the message id, the
//! [`MethodOptions`] and the response-type table. [`UnaryMethod`] and
//! [`StreamingMethod`] compose it and implement [`Executable`].
//!
//! [`UnaryMethod`]: crate::UnaryMethod
//! [`StreamingMethod`]: crate::StreamingMethod

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tonic::metadata::MetadataMap;
use tonic::{Code, Request, Status};

use crate::config::MethodSettings;
use crate::context::RequestContext;
use crate::error::{BoxError, ErrorResponse, GENERIC_ERROR_MESSAGE};
use crate::lifecycle::{self, AUTH_FINISHED, AUTH_STARTED};
use crate::logger::{tracing_logger_factory, LogFields, LoggerFactory, RequestLogger};
use crate::metadata::{build_metadata, ResponseMetadata};
use crate::public_error::PublicError;
use crate::request_id::{generate_id_with_len, DEFAULT_REQUEST_ID_BYTES, MIN_REQUEST_ID_BYTES};

/// Boxed future returned by handlers and auth hooks.
pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

/// Boxed future returned by a registered method.
pub type ExecFuture<O> = Pin<Box<dyn Future<Output = O> + Send>>;

/// Hook run before the handler; an error rejects the request.
pub type AuthHook<E> = Arc<dyn Fn(&RequestContext<E>) -> HandlerFuture<()> + Send + Sync>;

/// A wrapped method the transport can drive.
///
/// Implemented by [`UnaryMethod`](crate::UnaryMethod) and
/// [`StreamingMethod`](crate::StreamingMethod).
pub trait Executable: Send + Sync + Sized + 'static {
    type Params: Send + 'static;
    type Output: Send + 'static;

    /// Run the full request lifecycle for one call.
    fn exec(&self, call: Request<Self::Params>) -> impl Future<Output = Self::Output> + Send;

    /// Turn the method into a cloneable entry point, for use inside a
    /// generated tonic service trait.
    ///
    /// ```ignore
    /// struct Orders {
    ///     get_order: Arc<dyn Fn(Request<GetOrder>) -> ExecFuture<Result<Response<Order>, Status>> + Send + Sync>,
    /// }
    ///
    /// #[tonic::async_trait]
    /// impl orders_server::Orders for Orders {
    ///     async fn get_order(&self, request: Request<GetOrder>) -> Result<Response<Order>, Status> {
    ///         (self.get_order)(request).await
    ///     }
    /// }
    /// ```
    fn register(
        self,
    ) -> impl Fn(Request<Self::Params>) -> ExecFuture<Self::Output> + Clone + Send + Sync + 'static
    {
        let method = Arc::new(self);
        move |call: Request<Self::Params>| -> ExecFuture<Self::Output> {
            let method = Arc::clone(&method);
            Box::pin(async move { method.exec(call).await })
        }
    }
}

/// Per-method configuration.
///
/// `E` is an extension record cloned into every request (database pools,
/// clients and the like).
pub struct MethodOptions<E = ()> {
    private_errors: bool,
    prefix_errors: bool,
    request_id_bytes: usize,
    logger_factory: LoggerFactory,
    auth: Option<AuthHook<E>>,
    extensions: E,
}

impl MethodOptions<()> {
    pub fn new() -> Self {
        Self::with_extensions(())
    }
}

impl Default for MethodOptions<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> MethodOptions<E> {
    pub fn with_extensions(extensions: E) -> Self {
        Self {
            private_errors: false,
            prefix_errors: false,
            request_id_bytes: DEFAULT_REQUEST_ID_BYTES,
            logger_factory: tracing_logger_factory(),
            auth: None,
            extensions,
        }
    }

    pub fn from_settings(settings: &MethodSettings, extensions: E) -> Self {
        Self::with_extensions(extensions)
            .private_errors(settings.private_errors())
            .prefix_errors(settings.prefix_errors)
            .request_id_bytes(settings.request_id_bytes)
    }

    /// Redact messages of errors that are not [`PublicError`]s.
    pub fn private_errors(mut self, private: bool) -> Self {
        self.private_errors = private;
        self
    }

    /// Prefix caller-visible error messages with the message id.
    pub fn prefix_errors(mut self, prefix: bool) -> Self {
        self.prefix_errors = prefix;
        self
    }

    /// Random bytes per request id; values below
    /// [`MIN_REQUEST_ID_BYTES`] are raised to it.
    pub fn request_id_bytes(mut self, num_bytes: usize) -> Self {
        self.request_id_bytes = num_bytes.max(MIN_REQUEST_ID_BYTES);
        self
    }

    pub fn logger_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&LogFields) -> RequestLogger + Send + Sync + 'static,
    {
        self.logger_factory = Arc::new(factory);
        self
    }

    /// Run `auth` before every handler invocation.
    ///
    /// The hook sees the request context (metadata, ids, extensions) but not
    /// the decoded params, so one hook can guard methods of any message type.
    /// Checks that depend on the params belong in the handler. The hook must
    /// copy what it needs before returning its future.
    pub fn auth<F, Fut, Err>(mut self, auth: F) -> Self
    where
        F: Fn(&RequestContext<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Err>> + Send + 'static,
        Err: Into<BoxError>,
    {
        self.auth = Some(Arc::new(move |ctx: &RequestContext<E>| -> HandlerFuture<()> {
            let fut = auth(ctx);
            Box::pin(async move { fut.await.map_err(Into::into) })
        }));
        self
    }

    pub fn is_private(&self) -> bool {
        self.private_errors
    }

    pub fn extensions(&self) -> &E {
        &self.extensions
    }
}

impl<E: Clone> Clone for MethodOptions<E> {
    fn clone(&self) -> Self {
        Self {
            private_errors: self.private_errors,
            prefix_errors: self.prefix_errors,
            request_id_bytes: self.request_id_bytes,
            logger_factory: Arc::clone(&self.logger_factory),
            auth: self.auth.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

/// Overrides for [`MethodCore::format_error`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorOptions<'a> {
    metadata: Option<&'a ResponseMetadata>,
    code: Option<Code>,
}

impl<'a> ErrorOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom metadata to send along with the error.
    pub fn metadata(mut self, metadata: &'a ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Status code to report, regardless of the error.
    pub fn code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }
}

/// State and services shared by both call shapes.
pub struct MethodCore<E = (), Rs = ()> {
    message_id: Arc<str>,
    options: MethodOptions<E>,
    responses: Arc<Rs>,
}

impl<E, Rs> MethodCore<E, Rs> {
    /// `message_id` labels log lines and, optionally, error messages;
    /// typically `"[Service:Method]"`.
    pub fn new(message_id: impl Into<Arc<str>>, options: MethodOptions<E>, responses: Rs) -> Self {
        Self {
            message_id: message_id.into(),
            options,
            responses: Arc::new(responses),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn options(&self) -> &MethodOptions<E> {
        &self.options
    }

    pub fn responses(&self) -> &Arc<Rs> {
        &self.responses
    }

    /// Outbound metadata: the handler's entries plus a `timestamp`.
    pub fn build_metadata(&self, custom: &ResponseMetadata) -> MetadataMap {
        build_metadata(custom.entries())
    }

    /// Whether `err`'s message may be shown to the caller.
    pub fn is_public_error(&self, err: &(dyn StdError + 'static)) -> bool {
        !self.options.private_errors || err.is::<PublicError>()
    }

    /// Turn `err` into what the caller receives.
    ///
    /// The code is taken from `options`, then from a [`PublicError`] or
    /// [`Status`] error, and is `Internal` otherwise.
    pub fn format_error(
        &self,
        err: &(dyn StdError + 'static),
        options: ErrorOptions<'_>,
    ) -> ErrorResponse {
        let message = if self.is_public_error(err) {
            public_message(err)
        } else {
            GENERIC_ERROR_MESSAGE.to_string()
        };

        let message = if self.options.prefix_errors && !self.message_id.is_empty() {
            format!("{} {}", self.message_id, message)
        } else {
            message
        };

        let code = options
            .code
            .or_else(|| error_code(err))
            .unwrap_or(Code::Internal);

        let metadata = match options.metadata {
            Some(custom) => self.build_metadata(custom),
            None => build_metadata(std::iter::empty::<(&str, &str)>()),
        };

        ErrorResponse {
            code,
            message,
            metadata,
        }
    }

    /// Build the logger and context for a new request and log its start.
    pub(crate) fn start_request(&self, metadata: MetadataMap) -> RequestContext<E>
    where
        E: Clone,
    {
        let request_id = generate_id_with_len(self.options.request_id_bytes);
        let logger = (self.options.logger_factory)(&LogFields {
            message_id: Arc::clone(&self.message_id),
            request_id: request_id.clone(),
        });

        lifecycle::log_request_start(&*logger);

        RequestContext::new(
            logger,
            metadata,
            request_id,
            Arc::clone(&self.message_id),
            self.options.extensions.clone(),
        )
    }

    /// Run the auth hook, if any.
    pub(crate) async fn authenticate(&self, ctx: &RequestContext<E>) -> Result<(), BoxError> {
        let Some(auth) = &self.options.auth else {
            return Ok(());
        };

        ctx.logger().debug(AUTH_STARTED, &ctx.request_id());
        auth(ctx).await?;
        ctx.logger().debug(AUTH_FINISHED, &ctx.request_id());
        Ok(())
    }
}

/// Caller-facing text of `err`. `Status` and `PublicError` carry their own
/// message; `Display` would add the code and metadata.
fn public_message(err: &(dyn StdError + 'static)) -> String {
    if let Some(status) = err.downcast_ref::<Status>() {
        return status.message().to_string();
    }
    if let Some(public) = err.downcast_ref::<PublicError>() {
        return public.message().to_string();
    }
    err.to_string()
}

fn error_code(err: &(dyn StdError + 'static)) -> Option<Code> {
    if let Some(public) = err.downcast_ref::<PublicError>() {
        return public.code();
    }
    err.downcast_ref::<Status>().map(Status::code)
}
