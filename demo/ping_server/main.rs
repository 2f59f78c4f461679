//! # Ping server
//!
//! Runs a relay on 127.0.0.1:8000 that answers every `ping` event by
//! leaving a `pong` in the sender's mailbox.
//!
//! Demonstrates:
//! - Registering connect/disconnect/event handlers on an embedded relay
//! - Writing replies into a client mailbox from a handler

use kasflows_core::events;
use kasflows_server::{shutdown_signal, RelayServer, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .with_target(false)
        .init();

    let server = RelayServer::new(ServerConfig::default())?;
    let bus = server.relay().bus();

    bus.on(events::CONNECT, |data: &Value| {
        info!(payload = %data, "client joined");
        Ok(())
    });
    bus.on(events::DISCONNECT, |data: &Value| {
        info!(payload = %data, "client left");
        Ok(())
    });

    let relay = Arc::downgrade(server.relay());
    bus.on("ping", move |data: &Value| {
        let relay = relay
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("relay shut down"))?;
        let sender = data["sender"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("ping without sender"))?;
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        relay.mailboxes().put(
            sender,
            json!({
                "reply": "pong",
                "echo": data.get("text").cloned().unwrap_or(Value::Null),
                "timestamp": timestamp,
            }),
        );
        Ok(())
    });

    info!(address = %server.config().bind_addr(), "ping server starting");
    server.run(shutdown_signal()).await?;
    Ok(())
}
