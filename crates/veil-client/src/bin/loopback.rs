//! # veil-loopback
//!
//! Runs two complete client sessions against the in-process network and
//! identity directory: both users sign up, one adds the other as a contact
//! and sends a message, the other prints what it received.
//!
//! `RUST_LOG=veil_client=trace` shows every step.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::sync::broadcast;
use tracing::info;

use veil_client::{
    ClientConfig, IdentityDirectory, LocalIdentityService, SessionController, SessionEvent,
    SessionHandle,
};
use veil_net::{spawn_transport, MemoryNetwork};
use veil_store::Database;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

fn start_client(
    config: &ClientConfig,
    network: &MemoryNetwork,
    directory: &IdentityDirectory,
) -> anyhow::Result<SessionHandle> {
    let (client, client_events) = network.client();
    let (transport, transport_events) = spawn_transport(client, client_events);
    let identity = Arc::new(LocalIdentityService::new(directory.clone()));
    let db = Database::open_in_memory().context("opening in-memory store")?;
    Ok(SessionController::spawn(
        config,
        db,
        identity,
        transport,
        transport_events,
    )?)
}

/// Wait for the first event matching `pred`, failing on session errors.
async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    what: &str,
    pred: impl Fn(&SessionEvent) -> bool,
) -> anyhow::Result<SessionEvent> {
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let event = events.recv().await?;
            if let SessionEvent::Error { message } = &event {
                bail!("session error while waiting for {what}: {message}");
            }
            if pred(&event) {
                return Ok(event);
            }
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {what}"))?
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    veil_client::init_tracing();

    let mut config = ClientConfig::from_env();
    // Everything stays in-process; ignore any real endpoint overrides.
    config.overrides = Default::default();
    info!(version = %veil_client::current_version(), "Starting loopback demo");

    let network = MemoryNetwork::new();
    let directory = IdentityDirectory::new();

    let alice = start_client(&config, &network, &directory)?;
    let bob = start_client(&config, &network, &directory)?;
    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    alice.sign_up("alice").await?;
    bob.sign_up("bob").await?;
    wait_for(&mut alice_events, "alice to connect", |e| {
        matches!(e, SessionEvent::Connected)
    })
    .await?;
    wait_for(&mut bob_events, "bob to connect", |e| {
        matches!(e, SessionEvent::Connected)
    })
    .await?;

    alice.add_contact("bob").await?;
    wait_for(&mut alice_events, "contact bob", |e| {
        matches!(e, SessionEvent::ContactAdded { .. })
    })
    .await?;

    alice.send_message("bob", "hello from alice").await?;
    let received = wait_for(&mut bob_events, "bob to receive", |e| {
        matches!(e, SessionEvent::NewMessage { .. })
    })
    .await?;

    if let SessionEvent::NewMessage { sender, body } = received {
        println!("bob received from {sender}: {body}");
    }
    let contacts: Vec<String> = bob
        .contacts()
        .await?
        .into_iter()
        .map(|c| c.contact.to_string())
        .collect();
    println!("bob's contacts: {contacts:?}");

    alice.shutdown().await?;
    bob.shutdown().await?;
    Ok(())
}
