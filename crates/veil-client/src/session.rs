//! Session Controller.
//!
//! The controller is a single tokio task that owns every piece of mutable
//! session state: the local store, the transport handle, the current login.
//! Callers talk to it through a cloneable [`SessionHandle`]; observers
//! subscribe to a broadcast channel of [`SessionEvent`]s.
//!
//! Blocking identity work runs on the [`BackgroundWorker`]. Each job posts a
//! [`Work`] result back into the controller's inbox, so store writes and
//! event emission only ever happen on the controller task.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use veil_net::{ConnectionConfig, InboundMessage, TransportEvent, TransportHandle};
use veil_shared::{
    ConnectionState, CredentialBlob, EndpointOverrides, Endpoints, Environment, UserIdentity,
};
use veil_store::{Contact, Database, Message, StoreError};

use crate::config::ClientConfig;
use crate::error::{ErrorClass, Result, SessionError};
use crate::events::SessionEvent;
use crate::identity::IdentityService;
use crate::pipeline;
use crate::state::{AuthState, Login, SessionState};
use crate::worker::BackgroundWorker;

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Commands and background results
// ---------------------------------------------------------------------------

enum Command {
    SignIn {
        raw_input: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SignUp {
        raw_input: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    AddContact {
        contact: UserIdentity,
        reply: oneshot::Sender<Result<()>>,
    },
    SendMessage {
        recipient: UserIdentity,
        body: String,
        reply: oneshot::Sender<Result<()>>,
    },
    CurrentUser(oneshot::Sender<Option<UserIdentity>>),
    UsersList(oneshot::Sender<Result<Vec<String>>>),
    Contacts(oneshot::Sender<Result<Vec<Contact>>>),
    Conversation {
        contact: UserIdentity,
        reply: oneshot::Sender<Result<Vec<Message>>>,
    },
    AuthState(oneshot::Sender<AuthState>),
    ConnectionState(oneshot::Sender<ConnectionState>),
    Shutdown,
}

/// Result of a background job, tagged with the login generation it ran under.
enum Work {
    SignedIn {
        generation: u64,
        outcome: Result<String>,
    },
    SignedUp {
        generation: u64,
        outcome: Result<(CredentialBlob, String)>,
    },
    ContactSearched {
        generation: u64,
        contact: UserIdentity,
        outcome: Result<()>,
    },
    Sealed {
        generation: u64,
        recipient: UserIdentity,
        outcome: Result<String>,
    },
    Opened {
        generation: u64,
        sender: UserIdentity,
        outcome: Result<String>,
    },
    /// The job panicked before producing its result.
    Failed {
        generation: u64,
        error: SessionError,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running session controller.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Start a login with stored credentials. Returns once the attempt is
    /// accepted; the outcome arrives as events.
    pub async fn sign_in(&self, raw_input: impl Into<String>) -> Result<()> {
        let raw_input = raw_input.into();
        self.request(|reply| Command::SignIn { raw_input, reply }).await?
    }

    /// Register a new identity and log in with it.
    pub async fn sign_up(&self, raw_input: impl Into<String>) -> Result<()> {
        let raw_input = raw_input.into();
        self.request(|reply| Command::SignUp { raw_input, reply }).await?
    }

    /// Disconnect and forget the current user. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        self.request(|reply| Command::Logout { reply }).await
    }

    /// Account deletion is not supported by the identity service; this
    /// only logs the user out.
    pub async fn delete_user(&self, user: &UserIdentity) -> Result<()> {
        info!(user = %user, "Delete requested, logging out");
        self.logout().await
    }

    /// Check that `contact` exists and add it. Reported via
    /// [`SessionEvent::ContactAdded`] or [`SessionEvent::ContactAddFailed`].
    pub async fn add_contact(&self, contact: impl Into<UserIdentity>) -> Result<()> {
        let contact = contact.into();
        self.request(|reply| Command::AddContact { contact, reply })
            .await?
    }

    /// Record `body` in the conversation with `recipient`, then encrypt and
    /// send it. Returns after the local record is written.
    pub async fn send_message(
        &self,
        recipient: impl Into<UserIdentity>,
        body: impl Into<String>,
    ) -> Result<()> {
        let recipient = recipient.into();
        let body = body.into();
        self.request(|reply| Command::SendMessage {
            recipient,
            body,
            reply,
        })
        .await?
    }

    pub async fn current_user(&self) -> Result<Option<UserIdentity>> {
        self.request(Command::CurrentUser).await
    }

    /// Known logins, most recent first, as they were typed.
    pub async fn users_list(&self) -> Result<Vec<String>> {
        self.request(Command::UsersList).await?
    }

    /// Contacts of the current user; empty when logged out.
    pub async fn contacts(&self) -> Result<Vec<Contact>> {
        self.request(Command::Contacts).await?
    }

    /// Full history with `contact`, oldest first.
    pub async fn conversation(&self, contact: impl Into<UserIdentity>) -> Result<Vec<Message>> {
        let contact = contact.into();
        self.request(|reply| Command::Conversation { contact, reply })
            .await?
    }

    pub async fn auth_state(&self) -> Result<AuthState> {
        self.request(Command::AuthState).await
    }

    pub async fn connection_state(&self) -> Result<ConnectionState> {
        self.request(Command::ConnectionState).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn current_version(&self) -> String {
        crate::current_version()
    }

    /// Log out and stop the controller and its transport session.
    pub async fn shutdown(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| SessionError::ControllerClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }
}

// ---------------------------------------------------------------------------
// Controller task
// ---------------------------------------------------------------------------

pub struct SessionController {
    db: Database,
    identity: Arc<dyn IdentityService>,
    transport: TransportHandle,
    worker: BackgroundWorker,
    default_environment: Environment,
    overrides: EndpointOverrides,
    state: SessionState,
    work_tx: mpsc::UnboundedSender<Work>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Open the local store described by `config` and start a controller on
    /// it. A store that cannot be opened is fatal and returned as an error.
    pub fn open(
        config: &ClientConfig,
        identity: Arc<dyn IdentityService>,
        transport: TransportHandle,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> Result<SessionHandle> {
        let db = config.open_store()?;
        Self::spawn(config, db, identity, transport, transport_events)
    }

    /// Start a controller over an already opened store. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        config: &ClientConfig,
        db: Database,
        identity: Arc<dyn IdentityService>,
        transport: TransportHandle,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> Result<SessionHandle> {
        let worker = BackgroundWorker::spawn()?;
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let controller = SessionController {
            db,
            identity,
            transport,
            worker,
            default_environment: config.default_environment,
            overrides: config.overrides.clone(),
            state: SessionState::new(),
            work_tx,
            events: events.clone(),
        };
        tokio::spawn(controller.run(cmd_rx, work_rx, transport_events));

        Ok(SessionHandle { cmd_tx, events })
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut work_rx: mpsc::UnboundedReceiver<Work>,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) => {
                            info!("Session shutdown requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("All session handles dropped, shutting down");
                            break;
                        }
                    }
                }

                Some(work) = work_rx.recv() => {
                    self.handle_work(work).await;
                }

                Some(event) = transport_rx.recv() => {
                    self.handle_transport_event(event).await;
                }
            }
        }

        self.logout().await;
        if self.transport.shutdown().await.is_err() {
            debug!("Transport session already stopped");
        }
        info!("Session controller terminated");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SignIn { raw_input, reply } => {
                let _ = reply.send(self.sign_in(raw_input).await);
            }
            Command::SignUp { raw_input, reply } => {
                let _ = reply.send(self.sign_up(raw_input).await);
            }
            Command::Logout { reply } => {
                self.logout().await;
                let _ = reply.send(());
            }
            Command::AddContact { contact, reply } => {
                let _ = reply.send(self.add_contact(contact));
            }
            Command::SendMessage {
                recipient,
                body,
                reply,
            } => {
                let _ = reply.send(self.send_message(recipient, body));
            }
            Command::CurrentUser(reply) => {
                let _ = reply.send(self.state.current_user().cloned());
            }
            Command::UsersList(reply) => {
                let _ = reply.send(self.db.list_users().map_err(SessionError::from));
            }
            Command::Contacts(reply) => {
                let contacts = match self.state.current_user() {
                    Some(owner) => self.db.list_contacts(owner).map_err(SessionError::from),
                    None => Ok(Vec::new()),
                };
                let _ = reply.send(contacts);
            }
            Command::Conversation { contact, reply } => {
                let history = match self.state.current_user() {
                    Some(owner) => self
                        .db
                        .get_conversation(owner, &contact, u32::MAX, 0)
                        .map_err(SessionError::from),
                    None => Ok(Vec::new()),
                };
                let _ = reply.send(history);
            }
            Command::AuthState(reply) => {
                let _ = reply.send(self.state.auth);
            }
            Command::ConnectionState(reply) => {
                let _ = reply.send(self.state.connection());
            }
            Command::Shutdown => {}
        }
    }

    // -- Authentication ------------------------------------------------------

    /// Common start of sign-in and sign-up. Returns the generation of the
    /// new attempt.
    async fn begin_login(&mut self, raw_input: String) -> Result<(u64, Login)> {
        match self.state.auth {
            AuthState::LoggingIn => {
                warn!(input = %raw_input, "Login already in progress, rejecting");
                return Err(SessionError::AuthenticationInProgress);
            }
            AuthState::LoggedIn => {
                info!("Replacing current session");
                self.logout().await;
            }
            AuthState::LoggedOut => {}
        }

        let (environment, user) = Environment::resolve(&raw_input, self.default_environment);
        info!(user = %user, env = %environment, "Login started");

        let login = Login {
            user: user.clone(),
            raw_input,
            endpoints: Endpoints::new(environment, self.overrides.clone()),
        };
        let generation = self.state.begin_login(login.clone());
        self.emit(SessionEvent::CurrentUserChanged { user: Some(user) });
        Ok((generation, login))
    }

    async fn sign_in(&mut self, raw_input: String) -> Result<()> {
        let (generation, login) = self.begin_login(raw_input).await?;

        let loaded = self.db.load_credentials(&login.user);
        let credentials = match loaded {
            Ok(blob) => blob,
            Err(StoreError::NotFound) => {
                self.handle_error(SessionError::MissingCredentials(login.user)).await;
                return Ok(());
            }
            Err(e) => {
                self.handle_error(e.into()).await;
                return Ok(());
            }
        };

        let endpoints = login.endpoints;
        self.submit(generation, move |identity| Work::SignedIn {
            generation,
            outcome: authenticate(identity, &endpoints, &credentials),
        })
        .await;
        Ok(())
    }

    async fn sign_up(&mut self, raw_input: String) -> Result<()> {
        let (generation, login) = self.begin_login(raw_input).await?;

        let Login {
            user, endpoints, ..
        } = login;
        self.submit(generation, move |identity| Work::SignedUp {
            generation,
            outcome: register(identity, &endpoints, &user),
        })
        .await;
        Ok(())
    }

    /// Identity is established; open the transport session.
    async fn connect(&mut self, password: String) {
        let Some(login) = self.state.login.clone() else {
            return;
        };
        self.state.mark_logged_in();

        // Recorded before the connection outcome is known.
        let recorded = self.db.record_user(&login.raw_input);
        if let Err(e) = recorded {
            self.handle_error(e.into()).await;
            return;
        }

        let host = login.endpoints.transport_host();
        let config = ConnectionConfig {
            jid: login.user.to_address(&host),
            port: login.endpoints.transport_port(),
            host,
            password,
        };
        info!(user = %login.user, config = ?config, "Connecting to messaging network");
        if let Err(e) = self.transport.connect(config).await {
            self.handle_error(e.into()).await;
        }
    }

    async fn logout(&mut self) {
        let previous = self.state.reset();

        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "Transport already stopped");
        }

        let identity = Arc::clone(&self.identity);
        if self.worker.submit(move || identity.sign_out()).is_err() {
            warn!("Background worker gone, skipping identity sign-out");
        }

        if let Some(user) = previous {
            info!(user = %user, "Logged out");
            self.emit(SessionEvent::CurrentUserChanged { user: None });
            self.emit(SessionEvent::LoggedOut);
        }
    }

    // -- Contacts and messages -----------------------------------------------

    fn add_contact(&mut self, contact: UserIdentity) -> Result<()> {
        if self.state.current_user().is_none() {
            return Err(SessionError::NotLoggedIn);
        }
        let generation = self.state.generation();
        self.submit_now(generation, move |identity| {
            let outcome = match identity.search(&contact) {
                Ok(true) => Ok(()),
                Ok(false) => Err(SessionError::ContactNotFound(contact.clone())),
                Err(source) => Err(SessionError::ContactSearch {
                    contact: contact.clone(),
                    source,
                }),
            };
            Work::ContactSearched {
                generation,
                contact,
                outcome,
            }
        })
    }

    fn send_message(&mut self, recipient: UserIdentity, body: String) -> Result<()> {
        let owner = self
            .state
            .current_user()
            .cloned()
            .ok_or(SessionError::NotLoggedIn)?;

        pipeline::record_outgoing(&self.db, &owner, &recipient, &body)?;

        let generation = self.state.generation();
        self.submit_now(generation, move |identity| {
            let outcome = pipeline::seal(identity, &recipient, &body);
            Work::Sealed {
                generation,
                recipient,
                outcome,
            }
        })
    }

    fn receive(&mut self, message: InboundMessage) -> Result<()> {
        if self.state.current_user().is_none() {
            debug!(from = %message.from, "Message received while logged out, dropping");
            return Ok(());
        }
        let sender = pipeline::sender_of(&message)?;
        let generation = self.state.generation();
        let ciphertext = message.body;
        self.submit_now(generation, move |identity| {
            let outcome = pipeline::open(identity, &sender, &ciphertext);
            Work::Opened {
                generation,
                sender,
                outcome,
            }
        })
    }

    // -- Background results --------------------------------------------------

    async fn handle_work(&mut self, work: Work) {
        let generation = match &work {
            Work::SignedIn { generation, .. }
            | Work::SignedUp { generation, .. }
            | Work::ContactSearched { generation, .. }
            | Work::Sealed { generation, .. }
            | Work::Opened { generation, .. }
            | Work::Failed { generation, .. } => *generation,
        };
        if !self.state.is_current(generation) {
            debug!(generation, "Dropping result of a superseded session");
            return;
        }

        match work {
            Work::SignedIn { outcome, .. } => match outcome {
                Ok(password) => self.connect(password).await,
                Err(e) => self.handle_error(e).await,
            },
            Work::SignedUp { outcome, .. } => match outcome {
                Ok((credentials, password)) => {
                    let Some(user) = self.state.current_user().cloned() else {
                        return;
                    };
                    let saved = self.db.save_credentials(&user, &credentials);
                    if let Err(e) = saved {
                        self.handle_error(e.into()).await;
                        return;
                    }
                    self.connect(password).await;
                }
                Err(e) => self.handle_error(e).await,
            },
            Work::ContactSearched {
                contact, outcome, ..
            } => self.finish_add_contact(contact, outcome).await,
            Work::Sealed {
                recipient, outcome, ..
            } => match outcome {
                Ok(ciphertext) => self.transmit(recipient, ciphertext).await,
                Err(e) => self.handle_error(e).await,
            },
            Work::Opened {
                sender, outcome, ..
            } => match outcome {
                Ok(body) => self.deliver(sender, body).await,
                Err(e) => self.handle_error(e).await,
            },
            Work::Failed { error, .. } => self.handle_error(error).await,
        }
    }

    async fn finish_add_contact(&mut self, contact: UserIdentity, outcome: Result<()>) {
        let Some(owner) = self.state.current_user().cloned() else {
            return;
        };
        match outcome {
            Ok(()) => {
                let added = self.db.add_contact(&owner, &contact);
                match added {
                    Ok(created) => {
                        info!(contact = %contact, created, "Contact added");
                        self.emit(SessionEvent::ContactAdded { contact });
                    }
                    Err(e) => self.handle_error(e.into()).await,
                }
            }
            Err(e) => {
                info!(contact = %contact, error = %e, "Contact not added");
                self.emit(SessionEvent::ContactAddFailed {
                    contact,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn transmit(&mut self, recipient: UserIdentity, ciphertext: String) {
        let Some(login) = &self.state.login else {
            return;
        };
        let to = recipient.to_address(&login.endpoints.transport_host());
        debug!(to = %to, len = ciphertext.len(), "Sending encrypted message");
        if let Err(e) = self.transport.send_message(to, ciphertext).await {
            self.handle_error(e.into()).await;
        }
    }

    async fn deliver(&mut self, sender: UserIdentity, body: String) {
        let Some(owner) = self.state.current_user().cloned() else {
            return;
        };
        let delivered = pipeline::deliver(&self.db, &owner, &sender, body);
        match delivered {
            Ok(delivered) => {
                if delivered.new_contact {
                    self.emit(SessionEvent::ContactAdded {
                        contact: sender.clone(),
                    });
                }
                self.emit(SessionEvent::NewMessage {
                    sender,
                    body: delivered.message.body,
                });
            }
            Err(e) => self.handle_error(e).await,
        }
    }

    // -- Transport events ----------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                self.state.connection = Some(state);
                if state == ConnectionState::Connecting {
                    self.emit(SessionEvent::ConnectingStarted);
                }
            }
            TransportEvent::Connected => {
                info!(user = ?self.state.current_user(), "Connected");
                self.emit(SessionEvent::Connected);
            }
            TransportEvent::Disconnected => {
                info!("Disconnected");
                self.emit(SessionEvent::Disconnected);
            }
            TransportEvent::Error(e) => {
                if self.state.login.is_some() {
                    self.handle_error(e.into()).await;
                } else {
                    debug!(error = %e, "Transport error with no active session");
                }
            }
            TransportEvent::MessageReceived(message) => {
                if let Err(e) = self.receive(message) {
                    self.handle_error(e).await;
                }
            }
            TransportEvent::PresenceReceived { from } => {
                debug!(from = %from, "Presence ignored");
            }
            TransportEvent::IqReceived { id, from } => {
                debug!(id = %id, from = %from, "IQ ignored");
            }
        }
    }

    // -- Plumbing ------------------------------------------------------------

    /// The single error slot: every failure lands here and is resolved
    /// according to its class.
    async fn handle_error(&mut self, err: SessionError) {
        match err.classify() {
            ErrorClass::Fatal => {
                error!(error = %err, "Local store failure");
                self.emit(SessionEvent::Error {
                    message: err.to_string(),
                });
                self.logout().await;
            }
            ErrorClass::RecoverableLogout => {
                warn!(error = %err, "Session failure, logging out");
                self.emit(SessionEvent::Error {
                    message: err.to_string(),
                });
                self.logout().await;
            }
            ErrorClass::SilentDiscard => {
                warn!(error = %err, "Discarding inbound message");
            }
            ErrorClass::Informational => {
                info!(error = %err, "Operation failed");
                self.emit(SessionEvent::Error {
                    message: err.to_string(),
                });
            }
            ErrorClass::Rejected => {
                debug!(error = %err, "Request rejected");
            }
        }
    }

    /// Queue a job whose failure to submit ends the session.
    async fn submit<F>(&mut self, generation: u64, job: F)
    where
        F: FnOnce(&dyn IdentityService) -> Work + Send + 'static,
    {
        if let Err(e) = self.submit_now(generation, job) {
            self.handle_error(e).await;
        }
    }

    /// Queue `job` for the session attempt `generation`. A job that panics
    /// still reports back, as [`Work::Failed`].
    fn submit_now<F>(&self, generation: u64, job: F) -> Result<()>
    where
        F: FnOnce(&dyn IdentityService) -> Work + Send + 'static,
    {
        let identity = Arc::clone(&self.identity);
        let results = self.work_tx.clone();
        self.worker.submit(move || {
            let work = catch_unwind(AssertUnwindSafe(|| job(identity.as_ref()))).unwrap_or_else(
                |payload| {
                    let reason = panic_message(payload.as_ref());
                    error!(generation, reason = %reason, "Background job panicked");
                    Work::Failed {
                        generation,
                        error: SessionError::BackgroundPanic(reason),
                    }
                },
            );
            if results.send(work).is_err() {
                debug!("Session controller gone, dropping background result");
            }
        })
    }

    fn emit(&self, event: SessionEvent) {
        debug!(event = event.name(), "Session event");
        if self.events.send(event).is_err() {
            debug!("No session event subscribers");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn init_identity(identity: &dyn IdentityService, endpoints: &Endpoints) -> Result<()> {
    let url = endpoints.identity_service_url();
    let ca_bundle = endpoints.ca_bundle();
    identity
        .init(&url, ca_bundle.as_deref())
        .map_err(SessionError::IdentityInit)
}

/// Sign in with stored credentials and fetch the transport password.
fn authenticate(
    identity: &dyn IdentityService,
    endpoints: &Endpoints,
    credentials: &CredentialBlob,
) -> Result<String> {
    init_identity(identity, endpoints)?;
    identity.sign_in(credentials).map_err(SessionError::SignIn)?;
    identity
        .transport_password()
        .map_err(SessionError::TransportPassword)
}

/// Register `user`; returns its new credentials and transport password.
fn register(
    identity: &dyn IdentityService,
    endpoints: &Endpoints,
    user: &UserIdentity,
) -> Result<(CredentialBlob, String)> {
    init_identity(identity, endpoints)?;
    let credentials = identity.sign_up(user).map_err(SessionError::SignUp)?;
    let password = identity
        .transport_password()
        .map_err(SessionError::TransportPassword)?;
    Ok((credentials, password))
}
