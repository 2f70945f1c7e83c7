// Transport session over a pluggable real-time messaging client.

pub mod client;
pub mod error;
pub mod memory;
pub mod messages;
pub mod session;

pub use client::{ClientEvent, ClientState, ConnectionConfig, TransportClient};
pub use error::TransportError;
pub use memory::{MemoryClient, MemoryNetwork};
pub use messages::InboundMessage;
pub use session::{spawn_transport, TransportCommand, TransportEvent, TransportHandle};
