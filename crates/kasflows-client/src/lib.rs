//! kasflows-client: async client for the kasflows presence relay.
//!
//! # Quick Start
//!
//! ```no_run
//! use kasflows_client::RelayClient;
//! use serde_json::json;
//!
//! # async fn example() -> kasflows_client::ClientResult<()> {
//! let mut client = RelayClient::new("http://127.0.0.1:8000")?;
//! client.connect("alice").await?;
//! client.emit("ping", json!({"text": "hello"})).await?;
//!
//! if let Some(reply) = client.check_messages().await? {
//!     println!("{reply}");
//! }
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{ClientConfig, RelayClient, StatusResponse};
pub use error::{ClientError, ClientResult};
