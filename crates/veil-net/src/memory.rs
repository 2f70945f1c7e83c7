//! In-process loopback network.
//!
//! Routes messages between [`MemoryClient`]s registered under their bare
//! address. Used by tests and demos in place of a real messaging server.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::client::{ClientEvent, ConnectionConfig, TransportClient};
use crate::error::TransportError;
use crate::messages::InboundMessage;

#[derive(Default)]
struct NetworkState {
    /// bare address -> event channel of the connected client
    online: HashMap<String, mpsc::Sender<ClientEvent>>,
    tls_failures: HashSet<String>,
    connect_attempts: Vec<String>,
}

/// Shared loopback "server".
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client attached to this network, plus the event channel the
    /// transport session should listen on.
    pub fn client(&self) -> (MemoryClient, mpsc::Receiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let client = MemoryClient {
            network: self.clone(),
            events_tx,
            jid: None,
        };
        (client, events_rx)
    }

    /// Make every connection to `host` fail certificate validation.
    pub fn fail_tls_for(&self, host: &str) {
        self.lock().tls_failures.insert(host.to_string());
    }

    pub fn is_connected(&self, jid: &str) -> bool {
        self.lock().online.contains_key(bare(jid))
    }

    /// Addresses that attempted to connect, in order.
    pub fn connect_attempts(&self) -> Vec<String> {
        self.lock().connect_attempts.clone()
    }

    /// Deliver an arbitrary event to the client connected as `jid`.
    /// Returns `false` when nobody is connected under that address.
    pub async fn inject(&self, jid: &str, event: ClientEvent) -> bool {
        let target = self.lock().online.get(bare(jid)).cloned();
        match target {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // The state is plain data; a panic elsewhere cannot leave it torn.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Strip the resource part of an address.
fn bare(jid: &str) -> &str {
    jid.split('/').next().unwrap_or(jid)
}

/// A [`TransportClient`] connected to a [`MemoryNetwork`].
pub struct MemoryClient {
    network: MemoryNetwork,
    events_tx: mpsc::Sender<ClientEvent>,
    jid: Option<String>,
}

impl MemoryClient {
    /// The receiver is drained by the same task that drives this client, so
    /// emitting must never wait for room.
    fn emit(&self, event: ClientEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = ?event, "Client event queue full, event dropped");
            }
            Err(TrySendError::Closed(_)) => debug!("Client event receiver dropped"),
        }
    }
}

#[async_trait]
impl TransportClient for MemoryClient {
    async fn connect_to_server(&mut self, config: ConnectionConfig) -> Result<(), TransportError> {
        let jid = bare(&config.jid).to_string();
        let tls_failure = {
            let mut state = self.network.lock();
            state.connect_attempts.push(jid.clone());
            state.tls_failures.contains(&config.host)
        };

        self.emit(ClientEvent::Log(format!("connecting {jid} to {}:{}", config.host, config.port)));

        if tls_failure {
            self.emit(ClientEvent::SslErrors(vec![format!(
                "certificate for {} is not trusted",
                config.host
            )]));
            return Ok(());
        }

        if config.password.is_empty() {
            self.emit(ClientEvent::Error("not authorized".into()));
            return Ok(());
        }

        self.network
            .lock()
            .online
            .insert(jid.clone(), self.events_tx.clone());
        self.jid = Some(jid);
        self.emit(ClientEvent::Connected);
        Ok(())
    }

    async fn disconnect_from_server(&mut self) {
        let Some(jid) = self.jid.take() else {
            return;
        };
        self.network.lock().online.remove(&jid);
        self.emit(ClientEvent::Disconnected);
    }

    async fn send_message(&mut self, to: &str, body: &str) -> Result<(), TransportError> {
        let Some(from) = self.jid.clone() else {
            return Err(TransportError::Send("not connected".into()));
        };

        let target = self.network.lock().online.get(bare(to)).cloned();
        let Some(target) = target else {
            // Offline storage is the server's business; the loopback drops it.
            warn!(to = %to, "Recipient offline, message dropped");
            return Ok(());
        };

        let message = InboundMessage {
            from,
            to: to.to_string(),
            body: body.to_string(),
        };
        target
            .try_send(ClientEvent::MessageReceived(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Send("recipient queue full".into()),
                TrySendError::Closed(_) => TransportError::Send("recipient gone".into()),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(user: &str) -> ConnectionConfig {
        ConnectionConfig {
            jid: format!("{user}@loopback/desktop"),
            host: "loopback".into(),
            port: 5222,
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn test_full_event_queue_does_not_block_client() {
        let network = MemoryNetwork::new();
        let (mut client, mut events) = network.client();

        // Nobody drains `events` while the client keeps reporting.
        let churn = async {
            for _ in 0..200 {
                client.connect_to_server(config("alice")).await.unwrap();
                client.disconnect_from_server().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), churn)
            .await
            .expect("client blocked on its own event queue");

        let mut queued = 0;
        while events.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 256);
        assert!(!network.is_connected("alice@loopback"));
    }

    #[tokio::test]
    async fn test_connect_registers_bare_address() {
        let network = MemoryNetwork::new();
        let (mut client, mut events) = network.client();

        client.connect_to_server(config("alice")).await.unwrap();
        assert!(network.is_connected("alice@loopback/phone"));
        assert_eq!(network.connect_attempts(), vec!["alice@loopback".to_string()]);

        assert!(matches!(events.recv().await, Some(ClientEvent::Log(_))));
        assert!(matches!(events.recv().await, Some(ClientEvent::Connected)));
    }
}
