//! Echo Server - simple request/response example.
//!
//! This example demonstrates:
//! - Building a server with the fluent builder
//! - Registering a handler with typed input/output
//! - Driving it through the loopback transport while it announces itself
//!   to an in-memory directory
//!
//! Run with `RUST_LOG=debug cargo run --example echo` to see announce ticks.

use std::sync::Arc;
use std::time::Duration;

use peer_rpc::directory::MemoryDirectory;
use peer_rpc::transport::{ChannelTransport, DEFAULT_CHANNEL_CAPACITY};
use peer_rpc::{PeerRpcServer, Responder, RpcServerRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Input structure for the echo service.
#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo service.
#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (transport, mut peer) = ChannelTransport::new(DEFAULT_CHANNEL_CAPACITY);
    let directory = Arc::new(MemoryDirectory::new());

    let server = PeerRpcServer::builder()
        .announce_period(Duration::from_secs(1))
        .handler(|req: RpcServerRequest, res: Responder| async move {
            let input: EchoInput = req.payload_as()?;
            res.reply(&EchoOutput {
                echo: input.message,
            })
            .await
        })
        .build(directory.clone(), Arc::new(transport))?;

    server.listen("rpc:echo", 1337).await?;

    for (i, message) in ["hello", "peer", "world"].iter().enumerate() {
        peer.request(RpcServerRequest::new(
            i.to_string(),
            "rpc:echo",
            json!({ "message": message }),
        ))
        .await?;

        if let Some(response) = peer.next_response().await {
            println!("[{}] {}", response.rid, response.data);
        }
    }

    tokio::time::sleep(Duration::from_millis(2500)).await;
    server.close().await;

    println!(
        "announced {} times, rpc:echo -> {:?}",
        directory.announce_count(),
        directory.lookup("rpc:echo")
    );
    Ok(())
}
