//! Message dispatcher and command correlator
//!
//! A single task owns the transport and the frame parser. Outbound
//! commands reach it over an mpsc queue; inbound bytes are drained into
//! frames and routed either to the one pending request (responses) or to
//! the per-class broadcast bus (events).
//!
//! The module processes exactly one command at a time, a protocol-level
//! constraint: the command queue is only polled while no request is
//! pending, so concurrent callers line up in the queue instead of racing
//! each other for the next matching response.

use tokio::sync::{broadcast, mpsc, oneshot};

use bgapi_core::frame::{FrameParser, Message, MessageClass, MessageKind, Payload};

use crate::config::HostConfig;
use crate::messenger::attclient::AttClientEvent;
use crate::messenger::connection::ConnectionEvent;
use crate::messenger::gap::GapEvent;
use crate::messenger::system::SystemEvent;
use crate::messenger::EventDecode;
use crate::transport::Transport;
use crate::{HostError, Result};

// ----------------------------------------------------------------------------
// Event Bus
// ----------------------------------------------------------------------------

/// Per-class broadcast channels for decoded events.
///
/// Events are decoded once, at routing time, and fanned out to however
/// many subscribers currently hold a receiver. Send failures (no
/// subscribers) are normal and ignored.
#[derive(Clone)]
pub struct EventBus {
    system: broadcast::Sender<SystemEvent>,
    connection: broadcast::Sender<ConnectionEvent>,
    attclient: broadcast::Sender<AttClientEvent>,
    gap: broadcast::Sender<GapEvent>,
}

impl EventBus {
    fn new(capacity: usize) -> Self {
        Self {
            system: broadcast::channel(capacity).0,
            connection: broadcast::channel(capacity).0,
            attclient: broadcast::channel(capacity).0,
            gap: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_system(&self) -> broadcast::Receiver<SystemEvent> {
        self.system.subscribe()
    }

    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    pub fn subscribe_attclient(&self) -> broadcast::Receiver<AttClientEvent> {
        self.attclient.subscribe()
    }

    pub fn subscribe_gap(&self) -> broadcast::Receiver<GapEvent> {
        self.gap.subscribe()
    }

    /// Decode and publish one event frame.
    fn dispatch(&self, message: &Message) {
        let Some(class) = MessageClass::from_u8(message.class) else {
            tracing::debug!(class = message.class, id = message.id, "event for unknown class dropped");
            return;
        };
        match class {
            MessageClass::System => publish(&self.system, message),
            MessageClass::Connection => publish(&self.connection, message),
            MessageClass::AttributeClient => publish(&self.attclient, message),
            MessageClass::Gap => publish(&self.gap, message),
            other => {
                tracing::debug!(class = ?other, id = message.id, "event class has no subscribers, dropped");
            }
        }
    }
}

fn publish<E: EventDecode>(sender: &broadcast::Sender<E>, message: &Message) {
    match E::decode(message.id, &message.payload) {
        Ok(Some(event)) => {
            // No receivers is fine; broadcast just reports it.
            let _ = sender.send(event);
        }
        Ok(None) => {
            tracing::debug!(class = message.class, id = message.id, "unknown event id dropped");
        }
        Err(err) => {
            // Observability point only: a malformed event must not take
            // down the dispatch loop or any unrelated operation.
            tracing::warn!(
                class = message.class,
                id = message.id,
                payload = %hex::encode(&message.payload),
                %err,
                "event payload failed to decode"
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatcher Handle
// ----------------------------------------------------------------------------

enum Command {
    Request {
        message: Message,
        reply: oneshot::Sender<Result<Payload>>,
    },
    Send {
        message: Message,
    },
}

/// Cloneable handle to the dispatcher task.
#[derive(Clone)]
pub struct Dispatcher {
    cmd_tx: mpsc::Sender<Command>,
    events: EventBus,
    config: HostConfig,
}

impl Dispatcher {
    /// Spawn the dispatch loop over a transport.
    ///
    /// The loop runs until the transport closes or every handle is
    /// dropped; either way any pending and queued requests fail with
    /// [`HostError::TransportClosed`].
    pub fn spawn<T: Transport>(transport: T, config: HostConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let events = EventBus::new(config.event_channel_capacity);
        tokio::spawn(run_loop(transport, cmd_rx, events.clone()));
        Self { cmd_tx, events, config }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Issue a command and await its correlated response payload.
    pub async fn request(&self, class: MessageClass, id: u8, payload: Payload) -> Result<Payload> {
        let message = command_frame(class, id, payload)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request { message, reply: reply_tx })
            .await
            .map_err(|_| HostError::TransportClosed)?;

        match tokio::time::timeout(self.config.command_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // Loop dropped the reply slot without answering.
            Ok(Err(_)) => Err(HostError::TransportClosed),
            Err(_) => Err(HostError::Timeout {
                operation: "command response",
                after_ms: self.config.command_timeout.as_millis() as u64,
            }),
        }
    }

    /// Issue a command with no completion tracking.
    ///
    /// Still serialized behind any pending request so the module never
    /// sees two commands in flight.
    pub async fn send(&self, class: MessageClass, id: u8, payload: Payload) -> Result<()> {
        let message = command_frame(class, id, payload)?;
        self.cmd_tx
            .send(Command::Send { message })
            .await
            .map_err(|_| HostError::TransportClosed)
    }
}

fn command_frame(class: MessageClass, id: u8, payload: Payload) -> Result<Message> {
    Message::command(class, id, payload).map_err(|err| match err {
        bgapi_core::frame::FrameError::PayloadTooLarge { len } => HostError::PayloadTooLarge {
            len,
            max: bgapi_core::frame::MAX_MESSAGE_PAYLOAD,
        },
    })
}

// ----------------------------------------------------------------------------
// Dispatch Loop
// ----------------------------------------------------------------------------

struct Pending {
    key: (u8, u8),
    reply: oneshot::Sender<Result<Payload>>,
}

enum LoopEvent {
    Command(Option<Command>),
    Chunk(Option<Vec<u8>>),
    RequestAbandoned,
}

async fn run_loop<T: Transport>(
    mut transport: T,
    mut cmd_rx: mpsc::Receiver<Command>,
    events: EventBus,
) {
    let mut parser = FrameParser::new();
    let mut pending: Option<Pending> = None;

    loop {
        let busy = pending.is_some();
        let event = tokio::select! {
            cmd = cmd_rx.recv(), if !busy => LoopEvent::Command(cmd),
            _ = request_abandoned(&mut pending) => LoopEvent::RequestAbandoned,
            chunk = transport.recv() => LoopEvent::Chunk(chunk),
        };

        match event {
            LoopEvent::Command(None) => {
                tracing::debug!("all dispatcher handles dropped, shutting down");
                break;
            }
            LoopEvent::Command(Some(Command::Request { message, reply })) => {
                let key = message.key();
                tracing::trace!(class = key.0, id = key.1, "issuing command");
                match transport.send(&message.encode()).await {
                    Ok(()) => pending = Some(Pending { key, reply }),
                    Err(err) => {
                        let _ = reply.send(Err(HostError::Transport(err.to_string())));
                    }
                }
            }
            LoopEvent::Command(Some(Command::Send { message })) => {
                if let Err(err) = transport.send(&message.encode()).await {
                    tracing::warn!(%err, "fire-and-forget command failed to send");
                }
            }
            LoopEvent::RequestAbandoned => {
                // The caller timed out or dropped its future; free the
                // slot so queued commands can proceed.
                tracing::debug!("pending request abandoned by caller");
                pending = None;
            }
            LoopEvent::Chunk(Some(bytes)) => {
                for message in parser.feed(&bytes) {
                    route(&events, &mut pending, message);
                }
            }
            LoopEvent::Chunk(None) => {
                tracing::info!("transport closed");
                break;
            }
        }
    }

    if let Some(p) = pending.take() {
        let _ = p.reply.send(Err(HostError::TransportClosed));
    }
    cmd_rx.close();
    while let Ok(cmd) = cmd_rx.try_recv() {
        if let Command::Request { reply, .. } = cmd {
            let _ = reply.send(Err(HostError::TransportClosed));
        }
    }
}

async fn request_abandoned(pending: &mut Option<Pending>) {
    match pending.as_mut() {
        Some(p) => p.reply.closed().await,
        None => std::future::pending().await,
    }
}

fn route(events: &EventBus, pending: &mut Option<Pending>, message: Message) {
    match message.kind {
        MessageKind::CommandOrResponse => match pending.take() {
            Some(p) if p.key == message.key() => {
                let _ = p.reply.send(Ok(message.payload));
            }
            Some(p) => {
                tracing::warn!(
                    expected = ?p.key,
                    got = ?message.key(),
                    "response does not match the pending request, dropped"
                );
                *pending = Some(p);
            }
            None => {
                tracing::debug!(key = ?message.key(), "unsolicited response dropped");
            }
        },
        MessageKind::Event => events.dispatch(&message),
    }
}
