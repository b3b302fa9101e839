//! Shared fixtures for manager integration tests.
//!
//! [`MockConnector`] stands in for the WebSocket transport. Every `open`
//! call hands the test a [`RemoteHandle`] through which it can release
//! (or fail) the pending open, push inbound frames, close the channel
//! from the "server" side, and inspect what the client wrote.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use roomlink_client::config::ClientConfig;
use roomlink_client::credentials::StaticCredential;
use roomlink_client::events::{CloseReason, ConnectionState, ErrorKind};
use roomlink_client::manager::RoomConnectionManager;
use roomlink_client::messages::InboundMessage;
use roomlink_client::transport::{Channel, Connector, TransportError};
use roomlink_core::room::RoomId;
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(2);

pub const TEST_TOKEN: &str = "test-token";

pub fn room(name: &str) -> RoomId {
    RoomId::new(name).expect("valid room name")
}

/// What the scripted server pushes to the client.
#[derive(Debug)]
pub enum Incoming {
    Frame(String),
    Close,
    Error(TransportError),
}

/// Test-side view of one opened channel.
pub struct RemoteHandle {
    pub url: String,
    gate: Option<oneshot::Sender<Result<(), TransportError>>>,
    incoming: mpsc::UnboundedSender<Incoming>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl RemoteHandle {
    /// Complete a pending open (manual mode only).
    pub fn release(&mut self, result: Result<(), TransportError>) {
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(result);
        }
    }

    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.incoming.send(Incoming::Frame(text.into()));
    }

    pub fn push_chat(&self, username: &str, message: &str) {
        self.push_frame(
            serde_json::json!({ "username": username, "message": message }).to_string(),
        );
    }

    pub fn close_remote(&self) {
        let _ = self.incoming.send(Incoming::Close);
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.incoming.send(Incoming::Error(error));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Scripted connector recording every open.
pub struct MockConnector {
    opens: AtomicUsize,
    /// When set, `open` waits for [`RemoteHandle::release`].
    manual_open: AtomicBool,
    /// When set, every sent chat message is echoed back as inbound.
    echo: bool,
    handles_tx: mpsc::UnboundedSender<RemoteHandle>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteHandle>) {
        Self::build(false)
    }

    pub fn echo() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteHandle>) {
        Self::build(true)
    }

    fn build(echo: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteHandle>) {
        let (handles_tx, handles_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            opens: AtomicUsize::new(0),
            manual_open: AtomicBool::new(false),
            echo,
            handles_tx,
        });
        (connector, handles_rx)
    }

    pub fn set_manual_open(&self, manual: bool) {
        self.manual_open.store(manual, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Channel>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let (gate, gate_rx) = if self.manual_open.load(Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let _ = self.handles_tx.send(RemoteHandle {
            url: url.to_string(),
            gate,
            incoming: incoming_tx.clone(),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });

        if let Some(gate_rx) = gate_rx {
            match gate_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(TransportError::Connect("handle dropped".into())),
            }
        }

        Ok(Box::new(MockChannel {
            incoming: incoming_rx,
            echo: self.echo.then_some(incoming_tx),
            sent,
            closed,
        }))
    }
}

struct MockChannel {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    echo: Option<mpsc::UnboundedSender<Incoming>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if let Some(echo) = &self.echo {
            let outbound: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| TransportError::Send(e.to_string()))?;
            let reply = serde_json::json!({ "username": "echo", "message": outbound["message"] });
            let _ = echo.send(Incoming::Frame(reply.to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.incoming.recv().await {
            Some(Incoming::Frame(text)) => Ok(Some(text)),
            Some(Incoming::Close) => Ok(None),
            Some(Incoming::Error(e)) => Err(e),
            // The test dropped its handle; stay open until told otherwise.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Everything the manager told its listeners, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Message(InboundMessage),
    Error(ErrorKind),
    Close(CloseReason),
}

/// Register recording listeners on `manager`.
pub fn record(manager: &RoomConnectionManager) -> mpsc::UnboundedReceiver<Recorded> {
    let (tx, rx) = mpsc::unbounded_channel();

    let message_tx = tx.clone();
    manager.on_message(move |msg| {
        let _ = message_tx.send(Recorded::Message(msg));
    });
    let error_tx = tx.clone();
    manager.on_error(move |err| {
        let _ = error_tx.send(Recorded::Error(err));
    });
    manager.on_close(move |reason| {
        let _ = tx.send(Recorded::Close(reason));
    });

    rx
}

pub fn manager_with(connector: Arc<MockConnector>) -> RoomConnectionManager {
    RoomConnectionManager::new(
        ClientConfig::default(),
        Arc::new(StaticCredential::new(TEST_TOKEN)),
        connector,
    )
}

pub async fn next_handle(handles: &mut mpsc::UnboundedReceiver<RemoteHandle>) -> RemoteHandle {
    tokio::time::timeout(WAIT, handles.recv())
        .await
        .expect("timed out waiting for an open")
        .expect("connector dropped")
}

pub async fn next_recorded(events: &mut mpsc::UnboundedReceiver<Recorded>) -> Recorded {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a listener call")
        .expect("listeners dropped")
}

/// Assert that no further listener calls arrive within a short grace period.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<Recorded>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(extra) = events.try_recv() {
        panic!("unexpected listener call: {extra:?}");
    }
}

pub async fn wait_for_state(manager: &RoomConnectionManager, expected: ConnectionState) {
    let mut rx = manager.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {expected}"))
        .expect("state channel closed");
}
