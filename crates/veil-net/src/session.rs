//! Transport session orchestration with tokio mpsc command/notification pattern.
//!
//! The session loop runs in a dedicated tokio task and owns the
//! [`TransportClient`]. External code talks to it through a typed command
//! channel and listens on a notification channel, so connection configuration
//! is applied strictly in order and never races an attempt already in flight.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use veil_shared::ConnectionState;

use crate::client::{ClientEvent, ClientState, ConnectionConfig, TransportClient};
use crate::error::TransportError;
use crate::messages::InboundMessage;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Connect (or reconnect) with the given configuration.
    Connect(ConnectionConfig),
    /// Tear the connection down. No-op when already disconnected.
    Disconnect,
    /// Send an already-encrypted body to a full address.
    SendMessage { to: String, body: String },
    /// Request the current connection state.
    GetState(oneshot::Sender<ConnectionState>),
    /// Stop the session task.
    Shutdown,
}

/// Notifications sent *from* the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    Connected,
    Disconnected,
    Error(TransportError),
    MessageReceived(InboundMessage),
    PresenceReceived { from: String },
    IqReceived { id: String, from: String },
}

/// Cloneable handle to a running transport session.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), TransportError> {
        self.send(TransportCommand::Connect(config)).await
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.send(TransportCommand::Disconnect).await
    }

    /// Fire-and-forget send.
    pub async fn send_message(&self, to: String, body: String) -> Result<(), TransportError> {
        self.send(TransportCommand::SendMessage { to, body }).await
    }

    pub async fn state(&self) -> Result<ConnectionState, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.send(TransportCommand::GetState(tx)).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.send(TransportCommand::Shutdown).await
    }

    async fn send(&self, cmd: TransportCommand) -> Result<(), TransportError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Spawn the transport session in a background tokio task.
///
/// `client_events` is the channel the client library reports on. Returns the
/// command handle and the notification receiver.
pub fn spawn_transport<C: TransportClient>(
    client: C,
    client_events: mpsc::Receiver<ClientEvent>,
) -> (TransportHandle, mpsc::Receiver<TransportEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<TransportCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<TransportEvent>(256);

    let session = TransportSession {
        client,
        state: ConnectionState::Disconnected,
        notif_tx,
    };
    tokio::spawn(session.run(cmd_rx, client_events));

    (TransportHandle { cmd_tx }, notif_rx)
}

struct TransportSession<C> {
    client: C,
    state: ConnectionState,
    notif_tx: mpsc::Sender<TransportEvent>,
}

impl<C: TransportClient> TransportSession<C> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<TransportCommand>,
        mut client_rx: mpsc::Receiver<ClientEvent>,
    ) {
        loop {
            tokio::select! {
                // --- Incoming commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(TransportCommand::Shutdown) => {
                            info!("Transport shutdown requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("Command channel closed, shutting down transport");
                            break;
                        }
                    }
                }

                // --- Client library events ---
                Some(event) = client_rx.recv() => {
                    self.handle_client_event(event).await;
                }
            }
        }

        if self.state.is_active() {
            self.client.disconnect_from_server().await;
        }
        info!("Transport event loop terminated");
    }

    async fn handle_command(&mut self, cmd: TransportCommand) {
        match cmd {
            TransportCommand::Connect(config) => {
                if self.state.is_active() {
                    debug!("Dropping current connection before reconnecting");
                    self.client.disconnect_from_server().await;
                    self.set_state(ConnectionState::Disconnected).await;
                }

                info!(jid = %config.jid, host = %config.host, port = config.port, "Connecting");
                self.set_state(ConnectionState::Connecting).await;

                if let Err(e) = self.client.connect_to_server(config).await {
                    warn!(error = %e, "Connection attempt failed to start");
                    self.fail(e).await;
                }
            }
            TransportCommand::Disconnect => {
                if self.state == ConnectionState::Disconnected {
                    debug!("Already disconnected");
                    return;
                }
                self.client.disconnect_from_server().await;
                self.set_state(ConnectionState::Disconnected).await;
            }
            TransportCommand::SendMessage { to, body } => {
                if self.state != ConnectionState::Connected {
                    warn!(to = %to, state = ?self.state, "Sending while not connected");
                }
                if let Err(e) = self.client.send_message(&to, &body).await {
                    warn!(to = %to, error = %e, "Send failed");
                }
            }
            TransportCommand::GetState(reply) => {
                let _ = reply.send(self.state);
            }
            TransportCommand::Shutdown => {}
        }
    }

    async fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => {
                self.set_state(ConnectionState::Connected).await;
            }
            ClientEvent::Disconnected => {
                self.set_state(ConnectionState::Disconnected).await;
            }
            ClientEvent::StateChanged(state) => {
                let mapped = match state {
                    ClientState::Disconnected => ConnectionState::Disconnected,
                    ClientState::Connecting => ConnectionState::Connecting,
                    ClientState::Connected => ConnectionState::Connected,
                };
                self.set_state(mapped).await;
            }
            ClientEvent::Error(reason) => {
                warn!(reason = %reason, "Client error");
                self.fail(TransportError::Connection(reason)).await;
            }
            ClientEvent::SslErrors(errors) => {
                // No partial trust: any certificate problem fails the session.
                warn!(errors = ?errors, "TLS errors");
                self.fail(TransportError::Tls(errors.join("; "))).await;
            }
            ClientEvent::MessageReceived(message) => {
                debug!(from = %message.from, len = message.body.len(), "Message received");
                self.notify(TransportEvent::MessageReceived(message)).await;
            }
            ClientEvent::PresenceReceived { from } => {
                self.notify(TransportEvent::PresenceReceived { from }).await;
            }
            ClientEvent::IqReceived { id, from } => {
                self.notify(TransportEvent::IqReceived { id, from }).await;
            }
            ClientEvent::Log(text) => {
                debug!(target: "veil_net::client", "{text}");
            }
        }
    }

    /// Error state is only entered from an active connection; the error
    /// itself is always reported.
    async fn fail(&mut self, error: TransportError) {
        if self.state.is_active() {
            self.set_state(ConnectionState::Error).await;
        }
        self.notify(TransportEvent::Error(error)).await;
    }

    async fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Transport state changed");
        self.state = state;
        self.notify(TransportEvent::StateChanged(state)).await;

        match state {
            ConnectionState::Connected => self.notify(TransportEvent::Connected).await,
            ConnectionState::Disconnected => self.notify(TransportEvent::Disconnected).await,
            _ => {}
        }
    }

    async fn notify(&self, event: TransportEvent) {
        if self.notif_tx.send(event).await.is_err() {
            debug!("Transport notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;

    fn config(user: &str) -> ConnectionConfig {
        ConnectionConfig {
            jid: format!("{user}@loopback"),
            host: "loopback".into(),
            port: 5222,
            password: "secret".into(),
        }
    }

    async fn next_non_state(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        loop {
            match rx.recv().await.expect("transport alive") {
                TransportEvent::StateChanged(_) => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn test_session_loop_is_spawnable() {
        fn assert_send<T: Send>(_: &T) {}

        let (client, client_rx) = MemoryNetwork::new().client();
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let (notif_tx, _notif_rx) = mpsc::channel(1);
        let session = TransportSession {
            client,
            state: ConnectionState::Disconnected,
            notif_tx,
        };
        assert_send(&session.run(cmd_rx, client_rx));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let network = MemoryNetwork::new();
        let (client, events) = network.client();
        let (handle, mut rx) = spawn_transport(client, events);

        handle.connect(config("alice")).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::StateChanged(ConnectionState::Connecting))
        );
        assert_eq!(next_non_state(&mut rx).await, TransportEvent::Connected);
        assert_eq!(handle.state().await.unwrap(), ConnectionState::Connected);
        assert!(network.is_connected("alice@loopback"));

        handle.disconnect().await.unwrap();
        assert_eq!(next_non_state(&mut rx).await, TransportEvent::Disconnected);
        assert_eq!(handle.state().await.unwrap(), ConnectionState::Disconnected);
        assert!(!network.is_connected("alice@loopback"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let network = MemoryNetwork::new();
        let (client, events) = network.client();
        let (handle, mut rx) = spawn_transport(client, events);

        handle.disconnect().await.unwrap();
        handle.disconnect().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tls_errors_become_session_error() {
        let network = MemoryNetwork::new();
        network.fail_tls_for("loopback");
        let (client, events) = network.client();
        let (handle, mut rx) = spawn_transport(client, events);

        handle.connect(config("alice")).await.unwrap();
        match next_non_state(&mut rx).await {
            TransportEvent::Error(TransportError::Tls(_)) => {}
            other => panic!("expected TLS error, got {other:?}"),
        }
        assert_eq!(handle.state().await.unwrap(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_messages_are_forwarded() {
        let network = MemoryNetwork::new();
        let (alice, alice_events) = network.client();
        let (bob, bob_events) = network.client();
        let (alice, mut alice_rx) = spawn_transport(alice, alice_events);
        let (bob, mut bob_rx) = spawn_transport(bob, bob_events);

        alice.connect(config("alice")).await.unwrap();
        bob.connect(config("bob")).await.unwrap();
        assert_eq!(next_non_state(&mut alice_rx).await, TransportEvent::Connected);
        assert_eq!(next_non_state(&mut bob_rx).await, TransportEvent::Connected);

        alice
            .send_message("bob@loopback".into(), "opaque".into())
            .await
            .unwrap();

        match next_non_state(&mut bob_rx).await {
            TransportEvent::MessageReceived(msg) => {
                assert_eq!(msg.from, "alice@loopback");
                assert_eq!(msg.body, "opaque");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_library_state_and_extension_events() {
        let network = MemoryNetwork::new();
        let (client, events) = network.client();
        let (handle, mut rx) = spawn_transport(client, events);

        handle.connect(config("alice")).await.unwrap();
        assert_eq!(next_non_state(&mut rx).await, TransportEvent::Connected);

        let jid = "alice@loopback";
        assert!(
            network
                .inject(jid, ClientEvent::PresenceReceived { from: "bob@loopback".into() })
                .await
        );
        assert_eq!(
            next_non_state(&mut rx).await,
            TransportEvent::PresenceReceived {
                from: "bob@loopback".into()
            }
        );

        assert!(
            network
                .inject(jid, ClientEvent::StateChanged(ClientState::Disconnected))
                .await
        );
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::StateChanged(ConnectionState::Disconnected))
        );
        assert_eq!(rx.recv().await, Some(TransportEvent::Disconnected));
    }
}
