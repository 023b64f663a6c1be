//! Sum - a two-argument function driven end to end over a socket.
//!
//! This example demonstrates:
//! - A handle consuming two argument streams at once
//! - Typed payload conversion with `ContentCodec`
//! - Talking to the server with raw frames from the client side
//!
//! # Running
//!
//! ```sh
//! cargo run --example sum
//! ```

use futures::stream::{self, SelectAll};
use futures::StreamExt;
use streaming_invoker::codec::ContentCodec;
use streaming_invoker::demux::ArgumentStream;
use streaming_invoker::protocol::{
    decode_output, encode_end, encode_input, DataFrame, FrameBuffer, InputSignal, OutputSignal,
    StartFrame,
};
use streaming_invoker::{FnHandle, FunctionRegistry, Message, Outputs, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Add up every number on every argument.
async fn total(mut arguments: SelectAll<ArgumentStream>) -> streaming_invoker::error::Result<Message> {
    let mut sum = 0i64;
    while let Some(message) = arguments.next().await {
        let n: i64 = ContentCodec::decode(&message?)?;
        sum += n;
    }
    ContentCodec::encode(&sum, "text/plain")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streaming_invoker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut registry = FunctionRegistry::new();
    registry.register(
        "sum",
        FnHandle::new(2, |args| {
            let arguments = stream::select_all(args.into_vec());
            Ok(Outputs::One(stream::once(total(arguments)).boxed()))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = Server::builder("sum").registry(registry).build();
    tokio::spawn(async move { server.serve(listener).await });

    // Client side: Start, interleaved arguments, END
    let request: Vec<InputSignal> = vec![
        StartFrame::new(["text/plain"]).into(),
        DataFrame::new(0, "text/plain", "1").into(),
        DataFrame::new(1, "text/plain", "10").into(),
        DataFrame::new(0, "application/json", "2").into(),
        DataFrame::new(1, "text/plain", "20").into(),
    ];
    let mut bytes = Vec::new();
    for signal in &request {
        bytes.extend(encode_input(signal)?);
    }
    bytes.extend(encode_end());

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&bytes).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;

    for frame in FrameBuffer::new().push(&response)? {
        match decode_output(&frame)? {
            OutputSignal::Result(result) => println!(
                "result[{}] {} = {}",
                result.result_index,
                result.content_type,
                String::from_utf8_lossy(result.payload())
            ),
            OutputSignal::Error(status) => println!("error: {}", status),
            OutputSignal::End => println!("end"),
        }
    }

    Ok(())
}
