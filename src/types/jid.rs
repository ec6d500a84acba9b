//! Account and device identifiers.
//!
//! A JID is a `user@server` address. Device-specific JIDs carry an agent
//! and/or device number: `user.agent:device@server`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Known JID servers.
pub mod servers {
    pub const DEFAULT_USER: &str = "s.whatsapp.net";
    pub const GROUP: &str = "g.us";
    pub const BROADCAST: &str = "broadcast";
    pub const HIDDEN_USER: &str = "lid";
    pub const NEWSLETTER: &str = "newsletter";

    /// Servers a message can be addressed to.
    pub const MESSAGEABLE: &[&str] = &[DEFAULT_USER, GROUP, BROADCAST, HIDDEN_USER, NEWSLETTER];
}

/// MessageID is the client-generated ID of a message.
pub type MessageID = String;

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

    /// Returns a version of the JID without agent and device.
    pub fn to_non_ad(&self) -> Self {
        Self::new(self.user.clone(), self.server.clone())
    }

    pub fn is_group(&self) -> bool {
        self.server == servers::GROUP
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

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseJIDError {
    #[error("unexpected number of @ in JID")]
    TooManyAts,
    #[error("unexpected number of dots in JID")]
    TooManyDots,
    #[error("unexpected number of colons in JID")]
    TooManyColons,
    #[error("failed to parse agent from JID: {0:?}")]
    Agent(String),
    #[error("failed to parse device from JID: {0:?}")]
    Device(String),
}

fn parse_device(raw: &str) -> Result<u16, ParseJIDError> {
    raw.parse().map_err(|_| ParseJIDError::Device(raw.to_string()))
}

impl FromStr for JID {
    type Err = ParseJIDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('@').collect();
        let (user, server) = match parts.as_slice() {
            [server] => return Ok(JID::new("", *server)),
            [user, server] => (*user, *server),
            _ => return Err(ParseJIDError::TooManyAts),
        };

        let mut jid = JID::new(user, server);

        if user.contains('.') {
            let user_parts: Vec<&str> = user.split('.').collect();
            let [name, ad] = user_parts.as_slice() else {
                return Err(ParseJIDError::TooManyDots);
            };
            jid.user = name.to_string();

            let ad_parts: Vec<&str> = ad.split(':').collect();
            match ad_parts.as_slice() {
                [agent] | [agent, _] => {
                    jid.raw_agent = agent
                        .parse()
                        .map_err(|_| ParseJIDError::Agent(agent.to_string()))?;
                }
                _ => return Err(ParseJIDError::TooManyColons),
            }
            if let [_, device] = ad_parts.as_slice() {
                jid.device = parse_device(device)?;
            }
        } else if user.contains(':') {
            let user_parts: Vec<&str> = user.split(':').collect();
            let [name, device] = user_parts.as_slice() else {
                return Err(ParseJIDError::TooManyColons);
            };
            jid.user = name.to_string();
            jid.device = parse_device(device)?;
        }

        Ok(jid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_jid() {
        let jid: JID = "447808025786@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "447808025786");
        assert_eq!(jid.server, servers::DEFAULT_USER);
        assert_eq!(jid.device, 0);
        assert_eq!(jid.raw_agent, 0);
    }

    #[test]
    fn test_parse_device_jid() {
        let jid: JID = "1234567890:2@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 2);
        assert_eq!(jid.to_non_ad(), JID::new("1234567890", servers::DEFAULT_USER));
    }

    #[test]
    fn test_parse_ad_jid() {
        let jid: JID = "1234567890.1:3@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.raw_agent, 1);
        assert_eq!(jid.device, 3);
        assert_eq!(jid.to_string(), "1234567890.1:3@s.whatsapp.net");
    }

    #[test]
    fn test_server_only_jid() {
        let jid: JID = "g.us".parse().unwrap();
        assert!(jid.user.is_empty());
        assert_eq!(jid.to_string(), "g.us");
    }

    #[test]
    fn test_malformed_jids() {
        assert_eq!(
            "1.2.3@s.whatsapp.net".parse::<JID>(),
            Err(ParseJIDError::TooManyDots)
        );
        assert_eq!("1:2:3@s.whatsapp.net".parse::<JID>(), Err(ParseJIDError::TooManyColons));
        assert_eq!("a@b@c".parse::<JID>(), Err(ParseJIDError::TooManyAts));
        assert!(matches!(
            "123:x@s.whatsapp.net".parse::<JID>(),
            Err(ParseJIDError::Device(_))
        ));
        assert!(matches!(
            "123.y@s.whatsapp.net".parse::<JID>(),
            Err(ParseJIDError::Agent(_))
        ));
    }

    #[test]
    fn test_group_jid() {
        let jid: JID = "123456789-1234567890@g.us".parse().unwrap();
        assert_eq!(jid.user, "123456789-1234567890");
        assert!(jid.is_group());
    }
}
