//! wa-gateway: HTTP gateway over a WhatsApp client session.
//!
//! Exposes QR login and outbound text/image messaging over HTTP. Protocol
//! work happens behind [`protocol::MessagingClient`]; the bundled
//! [`LocalClient`] is a file-backed session implementing it.
//!
//! ## Modules
//!
//! - `types` - JIDs and recipient parsing
//! - `protocol` - client capability trait, outgoing messages, QR pairing
//! - `service` - login gating, message composition and sending
//! - `api` - axum routes
//! - `client` / `state` - the local file-backed session
//! - `config` - configuration management

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod service;
pub mod state;
pub mod types;

pub use client::{ClientError, LocalClient};
pub use config::{Config, ConfigError};
pub use error::GatewayError;
pub use protocol::{MessagingClient, OutboundMessage, SendResponse};
pub use service::{GatewayService, SendRequest};
pub use state::SessionState;
pub use types::{parse_recipient, Recipient, JID};
