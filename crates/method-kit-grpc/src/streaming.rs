//! One request, a stream of responses.
//!
//! [`StreamingMethod::exec`] hands the transport a [`ResponseStream`] right
//! away and runs the lifecycle on a spawned task. The handler writes chunks
//! through a [`ResponseSender`]; each chunk is logged and queued in call
//! order. The stream ends with one terminal frame:
//!
//! - on success, a `Code::Ok` status carrying the response metadata, which
//!   tonic sends as trailers;
//! - on failure, the formatted error status.
//!
//! Two interrupts can end a call early. Dropping the [`ResponseStream`]
//! before its terminal frame means the client cancelled. Calling
//! [`ResponseStream::abort`] reports a transport failure. A listener task
//! logs either one as soon as it happens. The handler is left running;
//! its later sends fail with [`StreamClosed`].

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::sync::{mpsc, watch};
use tokio_stream::Stream;
use tonic::metadata::MetadataMap;
use tonic::{Code, Request, Response, Status};

use crate::context::RequestContext;
use crate::error::{BoxError, GENERIC_ERROR_MESSAGE};
use crate::lifecycle::{self, RequestEnd};
use crate::logger::RequestLogger;
use crate::metadata::ResponseMetadata;
use crate::method::{ErrorOptions, Executable, HandlerFuture, MethodCore, MethodOptions};

/// Transport failure reported through [`ResponseStream::abort`].
pub type StreamError = Arc<dyn StdError + Send + Sync>;

enum Frame<T> {
    Chunk(T),
    End(MetadataMap),
    Error(Status),
}

#[derive(Clone)]
enum CallState {
    Active,
    Cancelled,
    Failed(StreamError),
    Finished,
}

impl CallState {
    fn is_active(&self) -> bool {
        matches!(self, CallState::Active)
    }
}

/// Shared call state. Only the first transition away from `Active` sticks.
#[derive(Clone)]
struct CallSignal(Arc<watch::Sender<CallState>>);

impl CallSignal {
    fn new() -> Self {
        let (tx, _) = watch::channel(CallState::Active);
        Self(Arc::new(tx))
    }

    fn transition(&self, next: CallState) -> bool {
        self.0.send_if_modified(move |state| {
            if state.is_active() {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn state(&self) -> CallState {
        self.0.borrow().clone()
    }

    /// Resolves with the first non-active state, or `None` once every
    /// handle to the call is gone.
    fn settled(&self) -> impl Future<Output = Option<CallState>> + Send + 'static {
        let mut rx = self.0.subscribe();
        async move {
            let state = rx.wait_for(|state| !state.is_active()).await.ok()?.clone();
            Some(state)
        }
    }
}

/// Returned by [`ResponseSender::send`] once the call is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Response stream is closed")
    }
}

impl StdError for StreamClosed {}

/// Response body of a streaming call, handed to tonic.
pub struct ResponseStream<T> {
    frames: mpsc::UnboundedReceiver<Frame<T>>,
    signal: CallSignal,
    done: bool,
}

impl<T> ResponseStream<T> {
    /// Report a transport-level failure. Fires the `on_error` callbacks and
    /// logs the error; no-op once the call is over.
    pub fn abort(&self, err: impl Into<BoxError>) {
        let err: StreamError = Arc::from(err.into());
        self.signal.transition(CallState::Failed(err));
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        let item = match ready!(self.frames.poll_recv(cx)) {
            Some(Frame::Chunk(chunk)) => return Poll::Ready(Some(Ok(chunk))),
            Some(Frame::End(metadata)) => Err(Status::with_metadata(Code::Ok, "", metadata)),
            Some(Frame::Error(status)) => Err(status),
            // producer went away without a terminal frame
            None => Err(Status::internal(GENERIC_ERROR_MESSAGE)),
        };

        self.done = true;
        Poll::Ready(Some(item))
    }
}

impl<T> Drop for ResponseStream<T> {
    fn drop(&mut self) {
        if !self.done {
            self.signal.transition(CallState::Cancelled);
        }
    }
}

/// Write side of a streaming call.
pub struct ResponseSender<T> {
    frames: mpsc::UnboundedSender<Frame<T>>,
    signal: CallSignal,
    logger: RequestLogger,
}

impl<T> Clone for ResponseSender<T> {
    fn clone(&self) -> Self {
        Self {
            frames: self.frames.clone(),
            signal: self.signal.clone(),
            logger: Arc::clone(&self.logger),
        }
    }
}

impl<T: fmt::Debug> ResponseSender<T> {
    /// Log `data` as a response and queue it.
    ///
    /// Never waits: the queue is unbounded, so a handler that outpaces a slow
    /// client keeps every pending chunk in memory. Long or fast producers
    /// should pace themselves, e.g. by yielding between batches or checking
    /// [`is_cancelled`](Self::is_cancelled).
    pub fn send(&self, data: T) -> Result<(), StreamClosed> {
        if !self.signal.state().is_active() {
            return Err(StreamClosed);
        }

        lifecycle::log_response(&*self.logger, &data);
        self.frames
            .send(Frame::Chunk(data))
            .map_err(|_| StreamClosed)
    }
}

impl<T> ResponseSender<T> {
    /// Run `callback` if the client cancels the call.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let settled = self.signal.settled();
        tokio::spawn(async move {
            if let Some(CallState::Cancelled) = settled.await {
                callback();
            }
        });
    }

    /// Run `callback` if the transport reports a failure.
    pub fn on_error<F>(&self, callback: F)
    where
        F: FnOnce(StreamError) + Send + 'static,
    {
        let settled = self.signal.settled();
        tokio::spawn(async move {
            if let Some(CallState::Failed(err)) = settled.await {
                callback(err);
            }
        });
    }

    /// Resolves once the client cancels. Pends forever if the call ends
    /// another way while this sender is alive.
    pub async fn cancelled(&self) {
        match self.signal.settled().await {
            Some(CallState::Cancelled) | None => {}
            Some(_) => std::future::pending::<()>().await,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.signal.state(), CallState::Cancelled)
    }
}

/// Request passed to streaming handlers.
pub struct StreamingRequest<Req, Resp, E = ()> {
    pub params: Req,
    context: RequestContext<E>,
    stream: ResponseSender<Resp>,
}

impl<Req, Resp, E> StreamingRequest<Req, Resp, E> {
    fn new(params: Req, context: RequestContext<E>, stream: ResponseSender<Resp>) -> Self {
        Self {
            params,
            context,
            stream,
        }
    }

    pub fn context(&self) -> &RequestContext<E> {
        &self.context
    }

    /// The write side; clone it to send from another task.
    pub fn sender(&self) -> &ResponseSender<Resp> {
        &self.stream
    }

    pub fn into_parts(self) -> (Req, RequestContext<E>, ResponseSender<Resp>) {
        (self.params, self.context, self.stream)
    }
}

impl<Req, Resp: fmt::Debug, E> StreamingRequest<Req, Resp, E> {
    pub fn send(&self, data: Resp) -> Result<(), StreamClosed> {
        self.stream.send(data)
    }
}

impl<Req, Resp, E> Deref for StreamingRequest<Req, Resp, E> {
    type Target = RequestContext<E>;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl<Req: fmt::Debug, Resp, E: fmt::Debug> fmt::Debug for StreamingRequest<Req, Resp, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingRequest")
            .field("params", &self.params)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

type StreamingHandler<Req, Resp, E, Rs> = Arc<
    dyn Fn(StreamingRequest<Req, Resp, E>, Arc<Rs>, ResponseMetadata) -> HandlerFuture<()>
        + Send
        + Sync,
>;

/// Wraps a server-streaming handler with the request lifecycle.
///
/// ```ignore
/// let list_orders = StreamingMethod::new(
///     |request: StreamingRequest<ListOrders, Order, Store>, _responses, _metadata| async move {
///         for order in request.extensions().orders(&request.params.customer).await? {
///             request.send(order)?;
///         }
///         Ok::<_, BoxError>(())
///     },
///     "[Orders:ListOrders]",
///     MethodOptions::with_extensions(store),
///     (),
/// );
/// ```
pub struct StreamingMethod<Req, Resp, E = (), Rs = ()> {
    core: Arc<MethodCore<E, Rs>>,
    handler: StreamingHandler<Req, Resp, E, Rs>,
}

impl<Req, Resp, E, Rs> StreamingMethod<Req, Resp, E, Rs>
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
        F: Fn(StreamingRequest<Req, Resp, E>, Arc<Rs>, ResponseMetadata) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<(), Err>> + Send + 'static,
        Err: Into<BoxError>,
    {
        let handler: StreamingHandler<Req, Resp, E, Rs> =
            Arc::new(move |request, responses, metadata| -> HandlerFuture<()> {
                let fut = handler(request, responses, metadata);
                Box::pin(async move { fut.await.map_err(Into::into) })
            });

        Self {
            core: Arc::new(MethodCore::new(message_id, options, responses)),
            handler,
        }
    }

    pub fn core(&self) -> &MethodCore<E, Rs> {
        &self.core
    }
}

impl<Req, Resp, E, Rs> Executable for StreamingMethod<Req, Resp, E, Rs>
where
    Req: fmt::Debug + Send + 'static,
    Resp: fmt::Debug + Send + 'static,
    E: Clone + Send + Sync + 'static,
    Rs: Send + Sync + 'static,
{
    type Params = Req;
    type Output = Result<Response<ResponseStream<Resp>>, Status>;

    async fn exec(&self, call: Request<Req>) -> Result<Response<ResponseStream<Resp>>, Status> {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let signal = CallSignal::new();

        let (metadata, _extensions, params) = call.into_parts();
        let ctx = self.core.start_request(metadata);
        let logger = Arc::clone(ctx.logger());
        let end = Arc::new(RequestEnd::new(Arc::clone(&logger)));

        tokio::spawn(listen_for_interrupts(
            signal.settled(),
            Arc::clone(&logger),
            Arc::clone(&end),
        ));

        let sender = ResponseSender {
            frames: frames_tx.clone(),
            signal: signal.clone(),
            logger: Arc::clone(&logger),
        };
        let call = signal.clone();
        let core = Arc::clone(&self.core);
        let handler = Arc::clone(&self.handler);

        tokio::spawn(async move {
            let response_metadata = ResponseMetadata::new();
            lifecycle::log_request_params(&*logger, &params);

            let result = match core.authenticate(&ctx).await {
                Ok(()) => {
                    handler(
                        StreamingRequest::new(params, ctx, sender),
                        Arc::clone(core.responses()),
                        response_metadata.clone(),
                    )
                    .await
                }
                Err(err) => Err(err),
            };

            if let Err(err) = &result {
                lifecycle::log_error(&*logger, &**err);
            }

            // An interrupt already closed the call; its listener logs the end.
            if !call.transition(CallState::Finished) {
                return;
            }

            match result {
                Ok(()) => {
                    end.log();
                    let metadata = core.build_metadata(&response_metadata);
                    let _ = frames_tx.send(Frame::End(metadata));
                }
                Err(err) => {
                    let status = core
                        .format_error(&*err, ErrorOptions::new().metadata(&response_metadata))
                        .into_status();
                    let _ = frames_tx.send(Frame::Error(status));
                    end.log();
                }
            }
        });

        Ok(Response::new(ResponseStream {
            frames: frames_rx,
            signal,
            done: false,
        }))
    }
}

async fn listen_for_interrupts(
    settled: impl Future<Output = Option<CallState>>,
    logger: RequestLogger,
    end: Arc<RequestEnd>,
) {
    match settled.await {
        Some(CallState::Cancelled) => {
            lifecycle::log_request_cancel(&*logger);
            end.log();
        }
        Some(CallState::Failed(err)) => {
            lifecycle::log_error(&*logger, &*err);
            end.log();
        }
        _ => {}
    }
}
