//! Single-room connection manager.
//!
//! [`RoomConnectionManager`] owns at most one live channel to one chat
//! room. Commands (`connect`, `disconnect`, `send`) are synchronous and
//! never block: they update the state machine and hand I/O to a spawned
//! task, one per channel generation. That task reports lifecycle events
//! back into the manager, where they are applied under a single lock and
//! discarded if their generation is no longer current.
//!
//! Inbound traffic and failures are delivered through three single-slot
//! listeners: [`on_message`](RoomConnectionManager::on_message),
//! [`on_error`](RoomConnectionManager::on_error) and
//! [`on_close`](RoomConnectionManager::on_close). The manager never
//! retries on its own; see [`crate::reconnect`] for a caller-side policy.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use roomlink_core::room::RoomId;
use roomlink_core::types::Generation;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::endpoint::{self, redacted, EndpointError};
use crate::events::{CloseReason, ConnectionState, ErrorKind, StatusSnapshot};
use crate::messages::{encode_outbound, parse_inbound, InboundMessage, OutboundMessage};
use crate::transport::{Channel, Connector, TransportError};

type MessageListener = Arc<dyn Fn(InboundMessage) + Send + Sync>;
type ErrorListener = Arc<dyn Fn(ErrorKind) + Send + Sync>;
type CloseListener = Arc<dyn Fn(CloseReason) + Send + Sync>;

/// Manages the lifecycle of one real-time channel bound to one room.
///
/// Cheap to clone; clones share the same channel and state. Dropping the
/// last handle cancels the active channel. `connect` spawns onto the
/// current tokio runtime and must be called from within one.
#[derive(Clone)]
pub struct RoomConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    listeners: Mutex<Listeners>,
    state_tx: watch::Sender<ConnectionState>,
    /// Parent of every channel task's token; cancelled when the manager drops.
    shutdown: CancellationToken,
}

/// State guarded by the manager lock.
struct Inner {
    state: ConnectionState,
    room: Option<RoomId>,
    generation: Generation,
    active: Option<ActiveChannel>,
}

/// Handles to the task driving the current channel.
struct ActiveChannel {
    generation: Generation,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Listeners {
    message: Option<MessageListener>,
    error: Option<ErrorListener>,
    close: Option<CloseListener>,
}

/// Lifecycle reports sent from a channel task to the manager.
#[derive(Debug)]
enum ChannelEvent {
    Opened,
    Frame(String),
    Failed(TransportError),
    Closed(CloseReason),
}

/// Listener invocations collected under the lock and run after it is released.
enum Dispatch {
    Message(InboundMessage),
    Error(ErrorKind),
    Close(CloseReason),
}

impl RoomConnectionManager {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                credentials,
                connector,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    room: None,
                    generation: 0,
                    active: None,
                }),
                listeners: Mutex::new(Listeners::default()),
                state_tx,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Join `room`.
    ///
    /// * Already open to `room`: no-op.
    /// * Already connecting to `room`: [`ManagerError::ConnectionInProgress`].
    /// * Any other active channel (including an in-flight connect to a
    ///   different room) is cancelled and replaced; its late events are
    ///   ignored.
    ///
    /// The credential is read from the provider on every call; without one
    /// the call fails with [`ManagerError::MissingCredential`] and nothing
    /// changes.
    pub fn connect(&self, room: RoomId) -> Result<(), ManagerError> {
        let mut inner = self.shared.lock_inner();

        if inner.room.as_ref() == Some(&room) {
            match inner.state {
                ConnectionState::Open => {
                    tracing::debug!(room = %room, "Already connected, ignoring connect");
                    return Ok(());
                }
                ConnectionState::Connecting => return Err(ManagerError::ConnectionInProgress),
                _ => {}
            }
        }

        let token = self
            .shared
            .credentials
            .token()
            .ok_or(ManagerError::MissingCredential)?;
        let url = endpoint::channel_url(&self.shared.config, &room, &token)?;

        if let Some(previous) = inner.active.take() {
            tracing::info!(
                room = ?inner.room,
                generation = previous.generation,
                "Closing channel superseded by new connect",
            );
            previous.cancel.cancel();
            self.shared.transition(&mut inner, ConnectionState::Closing);
            self.shared.transition(&mut inner, ConnectionState::Idle);
        }

        inner.generation += 1;
        let generation = inner.generation;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = self.shared.shutdown.child_token();

        inner.active = Some(ActiveChannel {
            generation,
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });
        inner.room = Some(room.clone());
        self.shared.transition(&mut inner, ConnectionState::Connecting);
        drop(inner);

        tracing::info!(
            room = %room,
            generation,
            endpoint = %redacted(&url),
            "Connecting to room",
        );

        let task = ChannelTask {
            shared: Arc::downgrade(&self.shared),
            connector: Arc::clone(&self.shared.connector),
            generation,
            room,
            url,
            connect_timeout: self.shared.config.connect_timeout,
            outbound_rx,
            cancel,
        };
        tokio::spawn(task.run());

        Ok(())
    }

    /// Leave the current room.
    ///
    /// No-op when idle or already closing. Otherwise moves to `Closing`;
    /// the manager reaches `Idle` (via `Closed(Requested)`) once the
    /// channel task has finished closing.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock_inner();
        match inner.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                if let Some(active) = &inner.active {
                    active.cancel.cancel();
                }
                tracing::info!(room = ?inner.room, generation = inner.generation, "Disconnecting");
                self.shared.transition(&mut inner, ConnectionState::Closing);
            }
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed(_) => {
                tracing::debug!(state = %inner.state, "Disconnect ignored");
            }
        }
    }

    /// Queue `message` for the current room.
    ///
    /// Fails with [`ManagerError::NotConnected`] unless the channel is
    /// open. Delivery is best effort: there is no acknowledgement.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), ManagerError> {
        let inner = self.shared.lock_inner();
        if inner.state != ConnectionState::Open {
            return Err(ManagerError::NotConnected);
        }
        let active = inner.active.as_ref().ok_or(ManagerError::NotConnected)?;

        let text = encode_outbound(message)?;
        active
            .outbound
            .send(text)
            .map_err(|_| ManagerError::NotConnected)?;

        tracing::debug!(
            room = ?inner.room,
            generation = active.generation,
            "Queued outbound message",
        );
        Ok(())
    }

    /// Register the message listener, replacing any previous one.
    pub fn on_message<F>(&self, listener: F)
    where
        F: Fn(InboundMessage) + Send + Sync + 'static,
    {
        self.shared.lock_listeners().message = Some(Arc::new(listener));
    }

    /// Register the error listener, replacing any previous one.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(ErrorKind) + Send + Sync + 'static,
    {
        self.shared.lock_listeners().error = Some(Arc::new(listener));
    }

    /// Register the close listener, replacing any previous one.
    pub fn on_close<F>(&self, listener: F)
    where
        F: Fn(CloseReason) + Send + Sync + 'static,
    {
        self.shared.lock_listeners().close = Some(Arc::new(listener));
    }

    /// Drop all registered listeners.
    pub fn clear_listeners(&self) {
        *self.shared.lock_listeners() = Listeners::default();
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock_inner().state.clone()
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.shared.lock_inner().room.clone()
    }

    /// Generation of the most recently started channel (0 before the first).
    pub fn generation(&self) -> Generation {
        self.shared.lock_inner().generation
    }

    pub fn status(&self) -> StatusSnapshot {
        let inner = self.shared.lock_inner();
        StatusSnapshot {
            state: inner.state.clone(),
            room: inner.room.clone(),
            generation: inner.generation,
        }
    }

    /// Subscribe to state changes.
    ///
    /// The receiver always holds the latest state; intermediate states
    /// may be skipped by slow readers.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }
}

impl std::fmt::Debug for RoomConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock_inner();
        f.debug_struct("RoomConnectionManager")
            .field("state", &inner.state)
            .field("room", &inner.room)
            .field("generation", &inner.generation)
            .finish()
    }
}

impl Shared {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`, keeping `room` consistent and publishing the change.
    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if !next.has_room() {
            inner.room = None;
        }
        tracing::debug!(
            from = %inner.state,
            to = %next,
            generation = inner.generation,
            "State transition",
        );
        inner.state = next.clone();
        self.state_tx.send_replace(next);
    }

    /// Apply a report from the task driving `generation`.
    ///
    /// Returns `false` when the generation is stale, telling the task to
    /// shut down.
    fn apply(&self, generation: Generation, event: ChannelEvent) -> bool {
        let mut dispatch = Vec::new();
        {
            let mut inner = self.lock_inner();
            let current = inner.active.as_ref().map(|a| a.generation) == Some(generation);
            if !current {
                tracing::debug!(
                    generation,
                    current = inner.generation,
                    ?event,
                    "Discarding stale channel event",
                );
                return false;
            }

            match event {
                ChannelEvent::Opened => {
                    if inner.state == ConnectionState::Connecting {
                        tracing::info!(room = ?inner.room, generation, "Room channel open");
                        self.transition(&mut inner, ConnectionState::Open);
                    }
                }
                ChannelEvent::Frame(text) => {
                    if inner.state != ConnectionState::Open {
                        tracing::debug!(
                            generation,
                            state = %inner.state,
                            "Dropping frame received while not open",
                        );
                        return true;
                    }
                    match parse_inbound(&text) {
                        Ok(message) => {
                            tracing::debug!(
                                generation,
                                sender = %message.sender_name,
                                "Inbound message",
                            );
                            dispatch.push(Dispatch::Message(message));
                        }
                        Err(e) => {
                            tracing::warn!(
                                generation,
                                error = %e,
                                raw_message = %text,
                                "Failed to parse inbound payload",
                            );
                            dispatch.push(Dispatch::Error(ErrorKind::PayloadParse {
                                error: e.to_string(),
                                raw: text,
                            }));
                        }
                    }
                }
                ChannelEvent::Failed(e) => {
                    tracing::warn!(
                        room = ?inner.room,
                        generation,
                        error = %e,
                        "Room channel failed",
                    );
                    let reason = e.to_string();
                    self.finish(&mut inner, CloseReason::Error(reason.clone()));
                    dispatch.push(Dispatch::Error(ErrorKind::Transport(reason.clone())));
                    dispatch.push(Dispatch::Close(CloseReason::Error(reason)));
                }
                ChannelEvent::Closed(reason) => {
                    tracing::info!(room = ?inner.room, generation, %reason, "Room channel closed");
                    self.finish(&mut inner, reason.clone());
                    dispatch.push(Dispatch::Close(reason));
                }
            }
        }

        self.dispatch(dispatch);
        true
    }

    /// End the current channel: `Closed(reason)` then `Idle`.
    fn finish(&self, inner: &mut Inner, reason: CloseReason) {
        inner.active = None;
        self.transition(inner, ConnectionState::Closed(reason));
        self.transition(inner, ConnectionState::Idle);
    }

    fn dispatch(&self, items: Vec<Dispatch>) {
        for item in items {
            let listeners = self.lock_listeners();
            match item {
                Dispatch::Message(message) => {
                    if let Some(listener) = listeners.message.clone() {
                        drop(listeners);
                        listener(message);
                    }
                }
                Dispatch::Error(error) => {
                    if let Some(listener) = listeners.error.clone() {
                        drop(listeners);
                        listener(error);
                    }
                }
                Dispatch::Close(reason) => {
                    if let Some(listener) = listeners.close.clone() {
                        drop(listeners);
                        listener(reason);
                    }
                }
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Drives one channel generation: open, pump traffic, close.
struct ChannelTask {
    shared: Weak<Shared>,
    connector: Arc<dyn Connector>,
    generation: Generation,
    room: RoomId,
    url: Url,
    connect_timeout: std::time::Duration,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl ChannelTask {
    /// Forward `event` to the manager if it still exists and this
    /// generation is current.
    fn report(&self, event: ChannelEvent) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.apply(self.generation, event),
            None => false,
        }
    }

    async fn run(mut self) {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(
                self.connect_timeout,
                self.connector.open(&self.url),
            ) => Some(result),
        };

        let mut channel = match opened {
            None => {
                tracing::debug!(
                    room = %self.room,
                    generation = self.generation,
                    "Connect cancelled",
                );
                self.report(ChannelEvent::Closed(CloseReason::Requested));
                return;
            }
            Some(Err(_elapsed)) => {
                self.report(ChannelEvent::Failed(TransportError::Connect(format!(
                    "Timed out after {}s",
                    self.connect_timeout.as_secs_f32()
                ))));
                return;
            }
            Some(Ok(Err(e))) => {
                self.report(ChannelEvent::Failed(e));
                return;
            }
            Some(Ok(Ok(channel))) => channel,
        };

        if !self.report(ChannelEvent::Opened) {
            close_quietly(channel.as_mut(), self.generation).await;
            return;
        }

        let reason = self.pump(channel.as_mut()).await;
        match reason {
            Some(reason) => {
                self.report(ChannelEvent::Closed(reason));
            }
            None => {
                tracing::debug!(
                    room = %self.room,
                    generation = self.generation,
                    "Channel task exited",
                );
            }
        }
    }

    /// Pump traffic until the channel ends.
    ///
    /// Returns the close reason still to be reported, or `None` when the
    /// outcome has already been reported (or is no longer wanted).
    async fn pump(&mut self, channel: &mut dyn Channel) -> Option<CloseReason> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    close_quietly(channel, self.generation).await;
                    return Some(CloseReason::Requested);
                }

                Some(text) = self.outbound_rx.recv() => {
                    if let Err(e) = channel.send(text).await {
                        close_quietly(channel, self.generation).await;
                        self.report(ChannelEvent::Failed(e));
                        return None;
                    }
                }

                incoming = channel.recv() => match incoming {
                    Ok(Some(text)) => {
                        if !self.report(ChannelEvent::Frame(text)) {
                            close_quietly(channel, self.generation).await;
                            return None;
                        }
                    }
                    Ok(None) => return Some(CloseReason::Remote),
                    Err(e) => {
                        close_quietly(channel, self.generation).await;
                        self.report(ChannelEvent::Failed(e));
                        return None;
                    }
                },
            }
        }
    }
}

async fn close_quietly(channel: &mut dyn Channel, generation: Generation) {
    if let Err(e) = channel.close().await {
        tracing::debug!(generation, error = %e, "Error while closing channel");
    }
}

/// Errors returned synchronously by manager commands.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The credential provider has no token.
    #[error("No credential available; cannot connect")]
    MissingCredential,

    /// A connect to the same room is already in flight.
    #[error("A connection to this room is already in progress")]
    ConnectionInProgress,

    /// `send` was called while the channel is not open.
    #[error("Not connected to a room")]
    NotConnected,

    /// The channel URL could not be built from configuration.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The outbound message could not be serialized.
    #[error("Failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}
