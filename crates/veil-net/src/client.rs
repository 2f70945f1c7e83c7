//! Seam to the real-time messaging client library.
//!
//! The library owns the wire protocol (TLS, stream negotiation, reconnects).
//! It is driven through [`TransportClient`] and reports everything it observes
//! as [`ClientEvent`]s on a channel handed to
//! [`spawn_transport`](crate::spawn_transport).

use async_trait::async_trait;

use crate::error::TransportError;
use crate::messages::InboundMessage;

/// Parameters of one connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Full address of the local user, `<user>@<host>`.
    pub jid: String,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("jid", &self.jid)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"..")
            .finish()
    }
}

/// Client-level connection state as reported by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything the client library reports back.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Error(String),
    SslErrors(Vec<String>),
    StateChanged(ClientState),
    MessageReceived(InboundMessage),
    PresenceReceived { from: String },
    IqReceived { id: String, from: String },
    /// Diagnostic output of the library itself.
    Log(String),
}

#[async_trait]
pub trait TransportClient: Send + Sync + 'static {
    /// Start connecting with `config`. Completion or failure of the attempt
    /// is reported through [`ClientEvent`]s; an `Err` here means the attempt
    /// could not even be started.
    async fn connect_to_server(&mut self, config: ConnectionConfig) -> Result<(), TransportError>;

    /// Tear down the connection. Must tolerate being called while
    /// disconnected.
    async fn disconnect_from_server(&mut self);

    /// Queue a message for delivery to `to`. Delivery failures surface later
    /// as [`ClientEvent::Error`].
    async fn send_message(&mut self, to: &str, body: &str) -> Result<(), TransportError>;
}
