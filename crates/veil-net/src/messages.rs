use serde::{Deserialize, Serialize};

use veil_shared::UserIdentity;

/// A message as delivered by the messaging network: addresses plus the
/// (encrypted) body text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    /// Origin address, `<user>@<host>[/resource]`
    pub from: String,
    pub to: String,
    pub body: String,
}

impl InboundMessage {
    /// Sender identity taken from the origin address, if it has one.
    pub fn sender(&self) -> Option<UserIdentity> {
        UserIdentity::from_address(&self.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_from_full_address() {
        let msg = InboundMessage {
            from: "alice@xmpp.veil.chat/desktop".into(),
            to: "bob@xmpp.veil.chat".into(),
            body: "ciphertext".into(),
        };
        assert_eq!(msg.sender(), Some(UserIdentity::from("alice")));
    }

    #[test]
    fn test_sender_missing() {
        let msg = InboundMessage {
            from: "xmpp.veil.chat".into(),
            to: "bob@xmpp.veil.chat".into(),
            body: "ciphertext".into(),
        };
        assert_eq!(msg.sender(), None);
    }
}
