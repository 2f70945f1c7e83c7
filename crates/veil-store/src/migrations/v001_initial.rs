//! v001 -- Initial schema creation.
//!
//! Creates `settings`, `credentials`, `contacts` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Settings (small key/value records, e.g. the known users list)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL                        -- JSON
);

-- ----------------------------------------------------------------
-- Credentials (one encoded blob per user identity)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS credentials (
    user       TEXT PRIMARY KEY NOT NULL,
    blob       TEXT NOT NULL,                  -- base64 versioned record
    updated_at TEXT NOT NULL                   -- RFC-3339
);

-- ----------------------------------------------------------------
-- Contacts, scoped by local user
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    owner      TEXT NOT NULL,
    contact    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (owner, contact)
);

-- ----------------------------------------------------------------
-- Conversation history, scoped by (local user, contact)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    owner     TEXT NOT NULL,
    contact   TEXT NOT NULL,
    direction TEXT NOT NULL,                   -- 'sent' | 'received'
    body      TEXT NOT NULL,                   -- plaintext, never ciphertext
    timestamp TEXT NOT NULL                    -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(owner, contact, timestamp);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
