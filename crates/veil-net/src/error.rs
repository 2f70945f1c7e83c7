use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Secure connection error: {0}")]
    Tls(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport session closed")]
    Closed,
}
