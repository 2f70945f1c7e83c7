//! # veil-client
//!
//! Session core of the Veil secure chat client: authentication against the
//! identity service, the connection to the messaging network, and the
//! encrypt/decrypt pipeline between the network and the local store.

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod worker;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use error::{ErrorClass, SessionError};
pub use events::SessionEvent;
pub use identity::{IdentityDirectory, IdentityService, IdentityServiceError, LocalIdentityService};
pub use session::{SessionController, SessionHandle};
pub use state::AuthState;

/// Install the global tracing subscriber. `RUST_LOG` wins over the built-in
/// filter. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("veil_client=debug,veil_net=debug,veil_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Version string shown to users.
pub fn current_version() -> String {
    format!("{}-alpha", env!("CARGO_PKG_VERSION"))
}
