use serde::{Deserialize, Serialize};

use crate::constants::ADDRESS_SEPARATOR;

// User identity = identifier unique within an environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserIdentity(pub String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transport address of this user on `host` (`<id>@<host>`).
    pub fn to_address(&self, host: &str) -> String {
        format!("{}{}{}", self.0, ADDRESS_SEPARATOR, host)
    }

    /// Extract the user part of a transport address: the text before the
    /// first separator. Addresses without a separator, or with an empty user
    /// part, carry no usable identity.
    pub fn from_address(address: &str) -> Option<Self> {
        let (user, _host) = address.split_once(ADDRESS_SEPARATOR)?;
        if user.is_empty() {
            return None;
        }
        Some(Self(user.to_string()))
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// State of the single connection to the messaging network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let alice = UserIdentity::from("alice");
        let addr = alice.to_address("xmpp.veil.chat");
        assert_eq!(addr, "alice@xmpp.veil.chat");
        assert_eq!(UserIdentity::from_address(&addr), Some(alice));
    }

    #[test]
    fn test_address_takes_text_before_first_separator() {
        let id = UserIdentity::from_address("bob@host@extra/resource").unwrap();
        assert_eq!(id.as_str(), "bob");
    }

    #[test]
    fn test_address_without_separator_rejected() {
        assert_eq!(UserIdentity::from_address("no-separator"), None);
        assert_eq!(UserIdentity::from_address("@host"), None);
    }
}
