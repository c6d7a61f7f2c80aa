//! WhatsApp JID (Jabber ID) types and recipient parsing.
//!
//! Outbound requests carry a free-form phone number or address; the parser
//! here turns it into the structured JID the client sends to.

use std::fmt;
use std::str::FromStr;

use log::error;

/// Known JID servers on WhatsApp
pub mod servers {
    pub const DEFAULT_USER: &str = "s.whatsapp.net";
}

/// MessageID is the internal ID of a WhatsApp message.
pub type MessageID = String;

/// JID represents a WhatsApp user ID.
///
/// Regular JIDs are a user/server pair; device JIDs additionally carry an
/// agent and a device number (`user.agent:device@server`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JID {
    pub user: String,
    pub raw_agent: u8,
    pub device: u16,
    pub server: String,
}

impl JID {
    /// Creates a new regular JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            ..Default::default()
        }
    }

    /// Returns true if the JID is empty (no server).
    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl fmt::Display for JID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw_agent > 0 {
            write!(f, "{}.{}:{}@{}", self.user, self.raw_agent, self.device, self.server)
        } else if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}", self.server)
        }
    }
}

/// Error type for JID parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to parse JID: {0}")]
pub struct ParseJIDError(pub String);

impl FromStr for JID {
    type Err = ParseJIDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = match s.split_once('@') {
            None => return Ok(JID::new("", s)),
            Some((_, server)) if server.contains('@') => {
                return Err(ParseJIDError("unexpected number of @ in JID".to_string()));
            }
            Some(parts) => parts,
        };

        let mut jid = JID::new(user_part, server);

        if let Some((user, ad)) = user_part.split_once('.') {
            if ad.contains('.') {
                return Err(ParseJIDError("unexpected number of dots in JID".to_string()));
            }
            let (agent, device) = match ad.split_once(':') {
                Some((agent, device)) => (agent, Some(device)),
                None => (ad, None),
            };
            jid.user = user.to_string();
            jid.raw_agent = agent
                .parse()
                .map_err(|_| ParseJIDError("failed to parse agent from JID".to_string()))?;
            if let Some(device) = device {
                jid.device = device
                    .parse()
                    .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?;
            }
        } else if let Some((user, device)) = user_part.split_once(':') {
            jid.user = user.to_string();
            jid.device = device
                .parse()
                .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?;
        }

        Ok(jid)
    }
}

/// A recipient address parsed from user input.
///
/// `valid` is false when the input could not be turned into a usable
/// user/server pair; the JID is still populated with whatever was parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub jid: JID,
    pub valid: bool,
}

impl Recipient {
    pub fn local_part(&self) -> &str {
        &self.jid.user
    }

    pub fn domain(&self) -> &str {
        &self.jid.server
    }
}

/// Parse a phone number (`+6281234567890`) or full address (`user@server`).
///
/// A leading `+` is dropped. Bare numbers land on the default user server.
pub fn parse_recipient(input: &str) -> Recipient {
    let arg = input.strip_prefix('+').unwrap_or(input);

    if !arg.contains('@') {
        return Recipient {
            jid: JID::new(arg, servers::DEFAULT_USER),
            valid: !arg.is_empty(),
        };
    }

    match arg.parse::<JID>() {
        Ok(jid) if jid.user.is_empty() => {
            error!("Invalid JID {arg}: no user specified");
            Recipient { jid, valid: false }
        }
        Ok(jid) if jid.server.is_empty() => {
            error!("Invalid JID {arg}: no server specified");
            Recipient { jid, valid: false }
        }
        Ok(jid) => Recipient { jid, valid: true },
        Err(err) => {
            error!("Invalid JID {arg}: {err}");
            Recipient {
                jid: JID::default(),
                valid: false,
            }
        }
    }
}
