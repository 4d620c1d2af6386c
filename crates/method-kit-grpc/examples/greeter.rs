//! Greeter example
//!
//! Wraps a unary and a server-streaming handler and drives them the way a
//! generated tonic service would, without a network listener.
//!
//! Run with:
//! ```bash
//! LOG_FORMAT=json RUST_LOG=debug cargo run -p method-kit-grpc --example greeter
//! ```

use std::sync::Arc;

use method_kit_grpc::{
    headers, init_logging_from_env, BoxError, Code, Executable, MethodOptions, MethodRequest,
    MethodSettings, PublicError, Request, RequestContext, ResponseMetadata, Status,
    StreamingMethod, StreamingRequest, UnaryMethod,
};
use tokio_stream::StreamExt;

#[derive(Debug, Clone)]
struct HelloRequest {
    name: String,
}

#[derive(Debug, Clone)]
struct HelloReply {
    message: String,
}

/// Shared by every request of both methods.
#[derive(Debug, Clone)]
struct Greetings {
    salutation: &'static str,
}

fn check_token(ctx: &RequestContext<Greetings>) -> impl std::future::Future<Output = Result<(), Status>> {
    let authorized = ctx.header(headers::AUTHORIZATION) == Some("Bearer demo");
    async move {
        if authorized {
            Ok(())
        } else {
            Err(Status::unauthenticated("Missing or invalid token"))
        }
    }
}

fn call<T>(params: T) -> Request<T> {
    let mut request = Request::new(params);
    request
        .metadata_mut()
        .insert("authorization", "Bearer demo".parse().expect("valid metadata"));
    request
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env();

    let settings: MethodSettings = MethodSettings::builder().with_dotenv().build()?;
    let greetings = Greetings { salutation: "Hello" };

    let say_hello = UnaryMethod::new(
        |request: MethodRequest<HelloRequest, Greetings>, _: Arc<()>, metadata: ResponseMetadata| async move {
            if request.params.name.is_empty() {
                return Err(BoxError::from(
                    PublicError::new("A name is required")?.with_code(Code::InvalidArgument),
                ));
            }
            metadata.insert("x-greeted", request.params.name.clone());
            Ok(HelloReply {
                message: format!("{}, {}!", request.extensions().salutation, request.params.name),
            })
        },
        "[Greeter:SayHello]",
        MethodOptions::from_settings(&settings, greetings.clone()).auth(check_token),
        (),
    );

    let say_hello_stream = StreamingMethod::new(
        |request: StreamingRequest<HelloRequest, HelloReply, Greetings>, _: Arc<()>, _: ResponseMetadata| async move {
            for n in 1..=3 {
                request.send(HelloReply {
                    message: format!(
                        "{} #{}, {}!",
                        request.extensions().salutation,
                        n,
                        request.params.name
                    ),
                })?;
            }
            Ok::<_, BoxError>(())
        },
        "[Greeter:SayHelloStream]",
        MethodOptions::from_settings(&settings, greetings).auth(check_token),
        (),
    );

    let say_hello = say_hello.register();

    let reply = say_hello(call(HelloRequest { name: "World".into() })).await?;
    tracing::info!(
        message = %reply.get_ref().message,
        greeted = ?reply.metadata().get("x-greeted"),
        "SayHello replied"
    );

    match say_hello(call(HelloRequest { name: String::new() })).await {
        Ok(_) => tracing::warn!("SayHello accepted an empty name"),
        Err(status) => tracing::info!(code = ?status.code(), message = %status.message(), "SayHello rejected"),
    }

    match say_hello(Request::new(HelloRequest { name: "Mallory".into() })).await {
        Ok(_) => tracing::warn!("SayHello accepted an anonymous call"),
        Err(status) => tracing::info!(code = ?status.code(), "SayHello rejected anonymous call"),
    }

    let mut stream = say_hello_stream
        .exec(call(HelloRequest { name: "Stream".into() }))
        .await?
        .into_inner();

    while let Some(item) = stream.next().await {
        match item {
            Ok(reply) => tracing::info!(message = %reply.message, "SayHelloStream chunk"),
            Err(status) if status.code() == Code::Ok => {
                tracing::info!(timestamp = ?status.metadata().get("timestamp"), "SayHelloStream ended");
            }
            Err(status) => tracing::error!(code = ?status.code(), "SayHelloStream failed"),
        }
    }

    Ok(())
}
