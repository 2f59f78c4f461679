//! kasflows-core: in-memory presence relay.
//!
//! Tracks which named clients are connected (with idle expiry), keeps a
//! single-slot mailbox per client, and dispatches named events to one
//! registered handler each. The HTTP surface lives in `kasflows-server`.

pub mod bus;
pub mod error;
pub mod mailbox;
pub mod registry;
pub mod relay;
pub mod sweeper;
pub mod token;

// Re-export commonly used items at crate root.
pub use bus::{DispatchOutcome, EventBus, EventHandler};
pub use error::{RelayError, RelayResult};
pub use mailbox::MailboxStore;
pub use registry::{AnnounceOutcome, DisconnectOutcome, SessionRegistry};
pub use relay::{AnnounceReceipt, Relay, RelayConfig};
pub use sweeper::{ExpirySweeper, SweeperHandle};
pub use token::TokenAuthority;

/// Relay protocol version reported by the service descriptor.
pub const VERSION: &str = "1.0.0";

/// Well-known event names dispatched by the relay itself.
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
}
