//! WebSocket connection to a Hydra node.
//!
//! One transport task per connection owns the socket. Callers talk to it over
//! a command queue; inbound frames come back out through the [`EventBus`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use hydra_core::{ConnectionStatus, HeadCommand, HydraError, ProtocolMessage, Result};
use serde_json::Value as Json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::events::EventBus;

/// Close code sent on a client-initiated disconnect.
pub const CLIENT_CLOSE_CODE: u16 = 1007;

const COMMAND_QUEUE_DEPTH: usize = 64;
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

enum Command {
    Send {
        tag: &'static str,
        frame: String,
        ack: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// State shared between the manager and its transport task.
struct Shared {
    events: Arc<EventBus>,
    status: watch::Sender<ConnectionStatus>,
    ready: watch::Sender<bool>,
    /// Bumped on every connect and disconnect; a transport task only acts
    /// while its own generation is current.
    generation: AtomicU64,
    link: Mutex<Option<mpsc::Sender<Command>>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn link(&self) -> MutexGuard<'_, Option<mpsc::Sender<Command>>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the status and publish if it changed.
    fn set_status(&self, next: ConnectionStatus) {
        self.apply_status(next, || true);
    }

    /// Like [`Shared::set_status`], but only for the current transport.
    fn set_status_from(&self, generation: u64, next: ConnectionStatus) {
        self.apply_status(next, || self.is_current(generation));
    }

    fn apply_status(&self, next: ConnectionStatus, allowed: impl Fn() -> bool) {
        let mut previous = next;
        let changed = self.status.send_if_modified(|current| {
            if *current == next || !allowed() {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });
        if changed {
            debug!(from = %previous, to = %next, "Connection status changed");
            self.events.status.publish(&next);
        }
    }

    fn set_ready_from(&self, generation: u64, ready: bool) {
        self.ready.send_if_modified(|current| {
            if *current == ready || !self.is_current(generation) {
                return false;
            }
            *current = ready;
            true
        });
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        let decoded = serde_json::from_str::<Json>(text)
            .map_err(HydraError::from)
            .and_then(|frame| {
                let status = ConnectionStatus::from_frame(&frame);
                ProtocolMessage::from_json(frame).map(|message| (message, status))
            });
        let (message, status) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable frame");
                return;
            }
        };
        if !self.is_current(generation) {
            return;
        }
        debug!(tag = message.tag(), "Received message from Hydra");
        self.events.messages.publish(&message);
        if let Some(status) = status {
            self.set_status_from(generation, status);
        }
    }
}

/// Owns the status state machine and the transport task.
pub struct ConnectionManager {
    url: String,
    send_timeout: Duration,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: &ClientConfig, events: Arc<EventBus>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        let (ready, _) = watch::channel(false);
        Self {
            url: config.websocket_url(),
            send_timeout: config.send_timeout,
            shared: Arc::new(Shared {
                events,
                status,
                ready,
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    /// Start the transport task. A no-op unless idle or disconnected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HydraError::Internal(format!("connect outside a tokio runtime: {e}")))?;

        let mut starting = false;
        self.shared.status.send_if_modified(|current| {
            if !matches!(current, ConnectionStatus::Idle | ConnectionStatus::Disconnected) {
                return false;
            }
            *current = ConnectionStatus::Connecting;
            starting = true;
            true
        });
        if !starting {
            debug!(status = %self.status(), "Connect ignored, connection already active");
            return Ok(());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (commands, queue) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        *self.shared.link() = Some(commands);
        self.shared.events.status.publish(&ConnectionStatus::Connecting);

        info!(url = %self.url, "Connecting to Hydra node");
        runtime.spawn(run_transport(self.shared.clone(), self.url.clone(), generation, queue));
        Ok(())
    }

    /// Close the transport and return to idle. A no-op when already idle.
    pub fn disconnect(&self) {
        if self.status() == ConnectionStatus::Idle {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.ready.send_replace(false);
        if let Some(link) = self.shared.link().take() {
            // A full queue still closes once the sender is dropped.
            let _ = link.try_send(Command::Close);
        }
        self.shared.set_status(ConnectionStatus::Idle);
        info!(url = %self.url, "Disconnected from Hydra node");
    }

    /// Deliver a command, waiting up to the send timeout for the transport.
    pub async fn send(&self, command: &HeadCommand) -> Result<()> {
        let tag = command.tag();
        let frame = command.to_json()?;
        let started = Instant::now();

        let mut ready = self.shared.ready.subscribe();
        let became_ready = timeout(self.send_timeout, ready.wait_for(|ready| *ready))
            .await
            .map(|waited| waited.is_ok())
            .unwrap_or(false);
        if !became_ready {
            let waited = started.elapsed();
            warn!(tag, waited_ms = waited.as_millis() as u64, "Websocket failed to send command");
            return Err(HydraError::ConnectionDeliveryFailure {
                tag: tag.to_string(),
                waited,
            });
        }

        let link = self.shared.link().clone();
        let lost = || HydraError::ConnectionLost {
            status: self.status(),
        };
        let link = link.ok_or_else(lost)?;
        let (ack, acked) = oneshot::channel();
        link.send(Command::Send { tag, frame, ack })
            .await
            .map_err(|_| lost())?;
        acked.await.map_err(|_| lost())?
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Dropping the last sender ends the transport task.
        self.shared.link().take();
    }
}

async fn run_transport(
    shared: Arc<Shared>,
    url: String,
    generation: u64,
    mut queue: mpsc::Receiver<Command>,
) {
    let mut socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to connect to Hydra node");
            shared.set_status_from(generation, ConnectionStatus::Disconnected);
            return;
        }
    };
    info!(url = %url, "WebSocket connected");
    shared.set_status_from(generation, ConnectionStatus::Connected);
    shared.set_ready_from(generation, true);

    loop {
        tokio::select! {
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.handle_frame(generation, &text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => shared.handle_frame(generation, &text),
                    Err(e) => warn!(error = %e, "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Hydra node closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                None => break,
            },
            command = queue.recv() => match command {
                Some(Command::Send { tag, frame, ack }) => {
                    debug!(tag, "Sending command");
                    let written = socket.send(Message::Text(frame)).await.map_err(|e| {
                        warn!(tag, error = %e, "WebSocket write failed");
                        HydraError::ConnectionDeliveryFailure {
                            tag: tag.to_string(),
                            waited: Duration::ZERO,
                        }
                    });
                    let failed = written.is_err();
                    let _ = ack.send(written);
                    if failed {
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::from(CLIENT_CLOSE_CODE),
                        reason: "client disconnect".into(),
                    };
                    if let Err(e) = socket.close(Some(frame)).await {
                        debug!(error = %e, "Close handshake failed");
                    }
                    // Wait briefly for the peer to acknowledge the close.
                    let _ = timeout(CLOSE_DRAIN_TIMEOUT, async {
                        while let Some(Ok(_)) = socket.next().await {}
                    })
                    .await;
                    break;
                }
            },
        }
    }

    shared.set_ready_from(generation, false);
    shared.set_status_from(generation, ConnectionStatus::Disconnected);
}
