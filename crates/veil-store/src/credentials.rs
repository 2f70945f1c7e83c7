//! Credential blobs and the known-users list.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use veil_shared::{CredentialBlob, UserIdentity};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Settings key holding the known-users list (JSON array, most recent first).
const USERS_KEY: &str = "users";

impl Database {
    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Store `blob` for `user`, replacing any previous value.
    pub fn save_credentials(&self, user: &UserIdentity, blob: &CredentialBlob) -> Result<()> {
        self.conn().execute(
            "INSERT INTO credentials (user, blob, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user) DO UPDATE SET blob = excluded.blob, updated_at = excluded.updated_at",
            params![user.as_str(), blob.encode(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Load the credentials of `user`.
    ///
    /// Returns [`StoreError::NotFound`] both when nothing is stored and when
    /// the stored value does not decode to a blob of the expected size.
    pub fn load_credentials(&self, user: &UserIdentity) -> Result<CredentialBlob> {
        let stored: Option<String> = self
            .conn()
            .query_row(
                "SELECT blob FROM credentials WHERE user = ?1",
                params![user.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(stored) = stored else {
            return Err(StoreError::NotFound);
        };

        CredentialBlob::decode(&stored).ok_or_else(|| {
            tracing::warn!(user = %user, "Cannot load credentials");
            StoreError::NotFound
        })
    }

    // ------------------------------------------------------------------
    // Known users
    // ------------------------------------------------------------------

    /// Known users, most recently used first.
    pub fn list_users(&self) -> Result<Vec<String>> {
        let stored: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![USERS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Move `user` to the front of the known-users list, dropping any other
    /// occurrence, and persist the whole list.
    pub fn record_user(&self, user: &str) -> Result<Vec<String>> {
        let mut users = self.list_users().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable users list");
            Vec::new()
        });
        users.retain(|u| u != user);
        users.insert(0, user.to_string());

        let json = serde_json::to_string(&users)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![USERS_KEY, json],
        )?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use veil_shared::constants::CREDENTIAL_BLOB_SIZE;

    use super::*;

    fn blob(fill: u8) -> CredentialBlob {
        CredentialBlob::from_bytes([fill; CREDENTIAL_BLOB_SIZE])
    }

    #[test]
    fn test_save_then_load() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserIdentity::from("alice");

        db.save_credentials(&alice, &blob(0x11)).unwrap();
        assert_eq!(db.load_credentials(&alice).unwrap(), blob(0x11));

        db.save_credentials(&alice, &blob(0x22)).unwrap();
        assert_eq!(db.load_credentials(&alice).unwrap(), blob(0x22));
    }

    #[test]
    fn test_unknown_user_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.load_credentials(&UserIdentity::from("nobody")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_corrupt_blob_not_found() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserIdentity::from("alice");
        let encoded = blob(0x33).encode();

        db.conn()
            .execute(
                "INSERT INTO credentials (user, blob, updated_at) VALUES (?1, ?2, ?3)",
                params!["alice", &encoded[..encoded.len() - 8], Utc::now().to_rfc3339()],
            )
            .unwrap();

        assert!(matches!(
            db.load_credentials(&alice),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_record_user_moves_to_front_once() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.list_users().unwrap().is_empty());

        db.record_user("alice").unwrap();
        db.record_user("stg@bob").unwrap();
        db.record_user("alice").unwrap();
        db.record_user("alice").unwrap();

        assert_eq!(db.list_users().unwrap(), vec!["alice", "stg@bob"]);
    }

    #[test]
    fn test_users_list_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open_in(dir.path()).unwrap();
            db.record_user("carol").unwrap();
            db.record_user("dave").unwrap();
        }
        let db = Database::open_in(dir.path()).unwrap();
        assert_eq!(db.list_users().unwrap(), vec!["dave", "carol"]);
    }
}
