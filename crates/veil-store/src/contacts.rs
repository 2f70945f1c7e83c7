//! CRUD operations for [`Contact`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use veil_shared::UserIdentity;

use crate::database::Database;
use crate::error::Result;
use crate::models::Contact;

impl Database {
    /// Add `contact` to `owner`'s contact set. Returns `true` if a new entry
    /// was created, `false` if it already existed.
    pub fn add_contact(&self, owner: &UserIdentity, contact: &UserIdentity) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO contacts (owner, contact, created_at)
             VALUES (?1, ?2, ?3)",
            params![owner.as_str(), contact.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn has_contact(&self, owner: &UserIdentity, contact: &UserIdentity) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM contacts WHERE owner = ?1 AND contact = ?2",
            params![owner.as_str(), contact.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List `owner`'s contacts, ordered by name.
    pub fn list_contacts(&self, owner: &UserIdentity) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT owner, contact, created_at
             FROM contacts
             WHERE owner = ?1
             ORDER BY contact ASC",
        )?;

        let rows = stmt.query_map(params![owner.as_str()], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let owner: String = row.get(0)?;
    let contact: String = row.get(1)?;
    let created_str: String = row.get(2)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Contact {
        owner: UserIdentity(owner),
        contact: UserIdentity(contact),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_contact_once() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserIdentity::from("alice");
        let bob = UserIdentity::from("bob");

        assert!(db.add_contact(&alice, &bob).unwrap());
        assert!(!db.add_contact(&alice, &bob).unwrap());

        let contacts = db.list_contacts(&alice).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].contact, bob);
        assert!(db.has_contact(&alice, &bob).unwrap());
    }

    #[test]
    fn test_contacts_scoped_by_owner() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserIdentity::from("alice");
        let bob = UserIdentity::from("bob");
        let carol = UserIdentity::from("carol");

        db.add_contact(&alice, &carol).unwrap();
        db.add_contact(&bob, &alice).unwrap();

        assert_eq!(db.list_contacts(&alice).unwrap().len(), 1);
        assert!(!db.has_contact(&alice, &alice).unwrap());
        assert!(db.has_contact(&bob, &alice).unwrap());
        assert!(db.list_contacts(&carol).unwrap().is_empty());
    }
}
