//! Message Pipeline: encrypt-on-send, decrypt-on-receive.
//!
//! Store access happens on the controller task ([`record_outgoing`],
//! [`deliver`]); the crypto steps ([`seal`], [`open`]) block and run on the
//! background worker. Plaintext never reaches the transport and ciphertext
//! never reaches the store.

use tracing::{debug, trace};

use veil_net::InboundMessage;
use veil_shared::{MessageEnvelope, UserIdentity};
use veil_store::{Database, Message};

use crate::error::{Result, SessionError};
use crate::identity::IdentityService;

/// Persist an outgoing message before anything is sent. The record stays
/// marked as sent even if encryption or delivery later fails.
pub fn record_outgoing(
    db: &Database,
    owner: &UserIdentity,
    recipient: &UserIdentity,
    plaintext: &str,
) -> Result<Message> {
    let message = Message::outgoing(owner.clone(), recipient.clone(), plaintext.to_string());
    db.insert_message(&message)?;
    debug!(to = %recipient, id = %message.id, "Outgoing message recorded");
    Ok(message)
}

/// Wrap `plaintext` in a text envelope and encrypt it for `recipient`.
pub fn seal(
    identity: &dyn IdentityService,
    recipient: &UserIdentity,
    plaintext: &str,
) -> Result<String> {
    let envelope = MessageEnvelope::text(plaintext);
    let serialized = envelope
        .to_json()
        .map_err(|e| SessionError::MalformedMessage {
            sender: recipient.clone(),
            reason: e.to_string(),
        })?;

    identity
        .encrypt(recipient, serialized.as_bytes())
        .map_err(|source| SessionError::Encrypt {
            recipient: recipient.clone(),
            source,
        })
}

/// Identity of whoever sent `message`.
pub fn sender_of(message: &InboundMessage) -> Result<UserIdentity> {
    message
        .sender()
        .ok_or_else(|| SessionError::MissingSender(message.from.clone()))
}

/// Decrypt an inbound body and extract the text it carries.
pub fn open(identity: &dyn IdentityService, sender: &UserIdentity, ciphertext: &str) -> Result<String> {
    let decrypted = identity
        .decrypt(sender, ciphertext)
        .map_err(|source| SessionError::Decrypt {
            sender: sender.clone(),
            source,
        })?;

    let malformed = |reason: String| SessionError::MalformedMessage {
        sender: sender.clone(),
        reason,
    };
    let envelope = MessageEnvelope::from_json(&decrypted).map_err(|e| malformed(e.to_string()))?;
    let body = envelope.into_text().map_err(|e| malformed(e.to_string()))?;
    trace!(from = %sender, body = %body, "Decrypted message");
    Ok(body)
}

/// Result of storing a decrypted inbound message.
#[derive(Debug)]
pub struct Delivered {
    pub message: Message,
    /// The sender was not a contact before this message.
    pub new_contact: bool,
}

/// Store a decrypted message for `owner`, creating the sender's contact entry
/// on first contact.
pub fn deliver(
    db: &Database,
    owner: &UserIdentity,
    sender: &UserIdentity,
    body: String,
) -> Result<Delivered> {
    let new_contact = db.add_contact(owner, sender)?;
    let message = Message::incoming(owner.clone(), sender.clone(), body);
    db.insert_message(&message)?;
    debug!(from = %sender, id = %message.id, new_contact, "Inbound message stored");
    Ok(Delivered {
        message,
        new_contact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityDirectory, LocalIdentityService};
    use crate::error::ErrorClass;

    const URL: &str = "https://identity.test";

    fn signed_up(directory: &IdentityDirectory, user: &str) -> LocalIdentityService {
        let service = LocalIdentityService::new(directory.clone());
        service.init(URL, None).unwrap();
        service.sign_up(&UserIdentity::from(user)).unwrap();
        service
    }

    fn inbound(from: &str, body: String) -> InboundMessage {
        InboundMessage {
            from: from.into(),
            to: "bob@loopback".into(),
            body,
        }
    }

    #[test]
    fn test_send_then_receive() {
        let directory = IdentityDirectory::new();
        let alice_id = signed_up(&directory, "alice");
        let bob_id = signed_up(&directory, "bob");
        let alice_db = Database::open_in_memory().unwrap();
        let bob_db = Database::open_in_memory().unwrap();
        let alice = UserIdentity::from("alice");
        let bob = UserIdentity::from("bob");

        record_outgoing(&alice_db, &alice, &bob, "hello").unwrap();
        assert_eq!(alice_db.get_conversation(&alice, &bob, 10, 0).unwrap().len(), 1);

        let ciphertext = seal(&alice_id, &bob, "hello").unwrap();
        assert!(!ciphertext.is_empty());
        assert_ne!(ciphertext, "hello");

        let message = inbound("alice@loopback/desktop", ciphertext);
        let sender = sender_of(&message).unwrap();
        let body = open(&bob_id, &sender, &message.body).unwrap();
        let delivered = deliver(&bob_db, &bob, &sender, body).unwrap();

        assert!(delivered.new_contact);
        assert_eq!(delivered.message.body, "hello");
        assert!(bob_db.has_contact(&bob, &alice).unwrap());
        let history = bob_db.get_conversation(&bob, &alice, 10, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender(), &alice);
    }

    #[test]
    fn test_known_sender_is_not_added_twice() {
        let db = Database::open_in_memory().unwrap();
        let bob = UserIdentity::from("bob");
        let alice = UserIdentity::from("alice");
        db.add_contact(&bob, &alice).unwrap();

        let delivered = deliver(&db, &bob, &alice, "again".into()).unwrap();
        assert!(!delivered.new_contact);
        assert_eq!(db.list_contacts(&bob).unwrap().len(), 1);
    }

    #[test]
    fn test_address_without_separator_is_discarded() {
        let err = sender_of(&inbound("loopback", "x".into())).unwrap_err();
        assert!(matches!(err, SessionError::MissingSender(_)));
        assert_eq!(err.classify(), ErrorClass::SilentDiscard);
    }

    #[test]
    fn test_garbage_ciphertext_is_discarded() {
        let directory = IdentityDirectory::new();
        signed_up(&directory, "alice");
        let bob_id = signed_up(&directory, "bob");

        let err = open(&bob_id, &UserIdentity::from("alice"), "AAAA").unwrap_err();
        assert!(matches!(err, SessionError::Decrypt { .. }));
        assert_eq!(err.classify(), ErrorClass::SilentDiscard);
    }

    #[test]
    fn test_non_text_envelope_is_discarded() {
        let directory = IdentityDirectory::new();
        let alice_id = signed_up(&directory, "alice");
        let bob_id = signed_up(&directory, "bob");

        let payload = br#"{"type":"image","payload":{"body":"..."}}"#;
        let ciphertext = alice_id.encrypt(&UserIdentity::from("bob"), payload).unwrap();
        let err = open(&bob_id, &UserIdentity::from("alice"), &ciphertext).unwrap_err();
        assert!(matches!(err, SessionError::MalformedMessage { .. }));
    }
}
