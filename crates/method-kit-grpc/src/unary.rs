//! One request, one response.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::context::MethodRequest;
use crate::error::BoxError;
use crate::lifecycle::{self, RequestEnd};
use crate::metadata::ResponseMetadata;
use crate::method::{ErrorOptions, Executable, HandlerFuture, MethodCore, MethodOptions};

type UnaryHandler<Req, Resp, E, Rs> =
    Arc<dyn Fn(MethodRequest<Req, E>, Arc<Rs>, ResponseMetadata) -> HandlerFuture<Resp> + Send + Sync>;

/// Wraps a unary handler with the request lifecycle.
///
/// `exec` logs the start and the params, runs the auth hook, awaits the
/// handler, and answers with either the payload or a formatted error. Both
/// carry the handler's [`ResponseMetadata`] plus a timestamp. "Request
/// completed" is logged exactly once, even if the transport drops the call.
///
/// ```ignore
/// let get_order = UnaryMethod::new(
///     |request: MethodRequest<GetOrder, Store>, _responses, metadata: ResponseMetadata| async move {
///         let order = request.extensions().find(request.params.id).await?;
///         metadata.insert("x-cache", "miss");
///         Ok::<_, BoxError>(order)
///     },
///     "[Orders:GetOrder]",
///     MethodOptions::with_extensions(store).private_errors(true),
///     (),
/// );
/// ```
pub struct UnaryMethod<Req, Resp, E = (), Rs = ()> {
    core: MethodCore<E, Rs>,
    handler: UnaryHandler<Req, Resp, E, Rs>,
}

impl<Req, Resp, E, Rs> UnaryMethod<Req, Resp, E, Rs>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    E: 'static,
    Rs: 'static,
{
    pub fn new<F, Fut, Err>(
        handler: F,
        message_id: impl Into<Arc<str>>,
        options: MethodOptions<E>,
        responses: Rs,
    ) -> Self
    where
        F: Fn(MethodRequest<Req, E>, Arc<Rs>, ResponseMetadata) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Err>> + Send + 'static,
        Err: Into<BoxError>,
    {
        let handler: UnaryHandler<Req, Resp, E, Rs> =
            Arc::new(move |request, responses, metadata| -> HandlerFuture<Resp> {
                let fut = handler(request, responses, metadata);
                Box::pin(async move { fut.await.map_err(Into::into) })
            });

        Self {
            core: MethodCore::new(message_id, options, responses),
            handler,
        }
    }

    pub fn core(&self) -> &MethodCore<E, Rs> {
        &self.core
    }
}

impl<Req, Resp, E, Rs> Executable for UnaryMethod<Req, Resp, E, Rs>
where
    Req: fmt::Debug + Send + 'static,
    Resp: fmt::Debug + Send + 'static,
    E: Clone + Send + Sync + 'static,
    Rs: Send + Sync + 'static,
{
    type Params = Req;
    type Output = Result<Response<Resp>, Status>;

    async fn exec(&self, call: Request<Req>) -> Result<Response<Resp>, Status> {
        // Exists before anything can fail, so every outcome can carry it.
        let response_metadata = ResponseMetadata::new();

        let (metadata, _extensions, params) = call.into_parts();
        let ctx = self.core.start_request(metadata);
        let logger = Arc::clone(ctx.logger());
        let _end = RequestEnd::new(Arc::clone(&logger));

        lifecycle::log_request_params(&*logger, &params);

        let result = match self.core.authenticate(&ctx).await {
            Ok(()) => {
                (self.handler)(
                    MethodRequest::new(params, ctx),
                    Arc::clone(self.core.responses()),
                    response_metadata.clone(),
                )
                .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(payload) => {
                lifecycle::log_response(&*logger, &payload);
                let mut response = Response::new(payload);
                *response.metadata_mut() = self.core.build_metadata(&response_metadata);
                Ok(response)
            }
            Err(err) => {
                lifecycle::log_error(&*logger, &*err);
                let formatted = self
                    .core
                    .format_error(&*err, ErrorOptions::new().metadata(&response_metadata));
                Err(formatted.into_status())
            }
        }
    }
}
