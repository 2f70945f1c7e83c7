//! # veil-shared
//!
//! Types and primitives shared by every Veil crate: the deployment
//! environment table, the message envelope, the credential blob codec and the
//! crypto helpers backing the bundled identity service.

pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod environment;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use credentials::CredentialBlob;
pub use environment::{EndpointOverrides, Endpoints, Environment};
pub use protocol::MessageEnvelope;
pub use types::{ConnectionState, UserIdentity};
