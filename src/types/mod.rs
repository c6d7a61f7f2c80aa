//! Types module for WhatsApp protocol types.
//!
//! Holds JIDs and the recipient parser used by outbound requests.

mod jid;

pub use jid::*;
