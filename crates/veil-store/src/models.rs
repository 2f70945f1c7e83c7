//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veil_shared::UserIdentity;

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A member of the local user's contact set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// The local user owning this contact entry.
    pub owner: UserIdentity,
    /// The contact's identity.
    pub contact: UserIdentity,
    /// When the contact was added locally.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "received" => Some(Self::Received),
            _ => None,
        }
    }
}

/// A single plaintext chat message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// The local user owning this conversation.
    pub owner: UserIdentity,
    /// The other side of the conversation.
    pub contact: UserIdentity,
    pub direction: Direction,
    /// Decrypted message text.
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Outgoing message from `owner` to `contact`, stamped now.
    pub fn outgoing(owner: UserIdentity, contact: UserIdentity, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            contact,
            direction: Direction::Sent,
            body,
            timestamp: Utc::now(),
        }
    }

    /// Incoming message from `contact` to `owner`, stamped now.
    pub fn incoming(owner: UserIdentity, contact: UserIdentity, body: String) -> Self {
        Self {
            direction: Direction::Received,
            ..Self::outgoing(owner, contact, body)
        }
    }

    pub fn sender(&self) -> &UserIdentity {
        match self.direction {
            Direction::Sent => &self.owner,
            Direction::Received => &self.contact,
        }
    }

    pub fn recipient(&self) -> &UserIdentity {
        match self.direction {
            Direction::Sent => &self.contact,
            Direction::Received => &self.owner,
        }
    }
}
