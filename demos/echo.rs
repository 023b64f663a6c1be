//! Echo server - one argument in, the same stream back out.
//!
//! This example demonstrates:
//! - Registering a raw handle that returns its argument stream as its output
//! - Serving it over TCP with the server builder
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=streaming_invoker=trace cargo run --example echo -- 127.0.0.1:7000
//! ```
//!
//! Each connection sends a Start frame, Data frames with argument index 0,
//! then END (or half-closes). Every Data payload comes back as a Result frame
//! with result index 0 and the same content type.

use streaming_invoker::{FnHandle, FunctionRegistry, InvokerError, Server, Shape};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streaming_invoker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7000".to_string());

    let mut registry = FunctionRegistry::new();
    registry.register(
        "echo",
        FnHandle::new(1, |args| match args {
            Shape::One(input) => Ok(Shape::One(input)),
            other => Err(InvokerError::Internal(format!("unexpected arguments {:?}", other))),
        }),
    );

    let server = Server::builder("echo")
        .registry(registry)
        .max_concurrent_invocations(32)
        .build();

    let listener = TcpListener::bind(&addr).await?;
    server.serve(listener).await?;

    Ok(())
}
