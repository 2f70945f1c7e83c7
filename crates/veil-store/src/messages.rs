use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use uuid::Uuid;

use veil_shared::UserIdentity;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Direction, Message};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, owner, contact, direction, body, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.owner.as_str(),
                message.contact.as_str(),
                message.direction.as_str(),
                message.body,
                // fixed-width so lexical order matches time order
                message.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        Ok(())
    }

    /// Conversation between `owner` and `contact`, oldest first.
    pub fn get_conversation(
        &self,
        owner: &UserIdentity,
        contact: &UserIdentity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner, contact, direction, body, timestamp
             FROM messages
             WHERE owner = ?1 AND contact = ?2
             ORDER BY timestamp ASC, rowid ASC
             LIMIT ?3 OFFSET ?4",
        )?;

        let rows = stmt.query_map(
            params![owner.as_str(), contact.as_str(), limit, offset],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let contact: String = row.get(2)?;
    let direction_str: String = row.get(3)?;
    let body: String = row.get(4)?;
    let ts_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let direction = Direction::parse(&direction_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown direction: {direction_str}").into(),
        )
    })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id,
        owner: UserIdentity(owner),
        contact: UserIdentity(contact),
        direction,
        body,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_in_order() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserIdentity::from("alice");
        let bob = UserIdentity::from("bob");

        let first = Message::outgoing(alice.clone(), bob.clone(), "hi bob".into());
        let second = Message::incoming(alice.clone(), bob.clone(), "hi alice".into());
        db.insert_message(&first).unwrap();
        db.insert_message(&second).unwrap();

        let conversation = db.get_conversation(&alice, &bob, 50, 0).unwrap();
        assert_eq!(conversation, vec![first, second]);
        assert_eq!(conversation[0].sender(), &alice);
        assert_eq!(conversation[1].sender(), &bob);
        assert_eq!(conversation[1].recipient(), &alice);

        assert!(db.get_conversation(&bob, &alice, 50, 0).unwrap().is_empty());
    }
}
