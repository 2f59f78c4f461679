//! # Ping client
//!
//! Connects to the ping server as `alice` (or the first argument), sends a
//! `ping`, polls for the reply and disconnects.
//!
//! Demonstrates:
//! - Connect with automatic heartbeat
//! - Emitting an event and polling the mailbox

use kasflows_client::RelayClient;
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let name = std::env::args().nth(1).unwrap_or_else(|| "alice".to_string());
    let mut client = RelayClient::new("http://127.0.0.1:8000")?;

    let status = client.connect(&name).await?;
    println!("connect: {}", status.status);

    client.emit("ping", json!({ "text": "hello" })).await?;

    for _ in 0..10 {
        if let Some(reply) = client.check_messages().await? {
            println!("reply: {reply}");
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    println!("clients: {:?}", client.clients().await?);

    let status = client.disconnect().await?;
    println!("disconnect: {}", status.status);
    Ok(())
}
