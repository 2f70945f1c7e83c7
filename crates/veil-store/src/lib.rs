//! # veil-store
//!
//! Local durable storage for the Veil client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for credentials, the
//! known-users list, contacts and conversation history. The handle is owned
//! by a single task; it is not shared across threads.

pub mod contacts;
pub mod credentials;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
