//! Async runner that drives a [`ChatCore`] from a live socket.
//!
//! The loop owns the core. The UI talks to it through a command channel
//! and reads state from a `watch` snapshot; dashboard pushes arriving on
//! the same socket are forwarded to whoever listens for them.

use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::state::{ChatCore, ConnectionStatus, ThinkingIndicator};
use super::types::{ChatMessage, OutboundMessage, OutgoingTurn, QuickAction, QuickActionOutcome};
use super::ChatError;
use crate::socket::{DashboardPush, Frame, SocketConnection, SocketEvent, SEND_MESSAGE};

#[derive(Debug)]
pub enum ChatCommand {
    Send(OutgoingTurn),
    Quick(QuickAction),
    Close,
}

/// Everything the panel renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub is_typing: bool,
    pub indicator: Option<ThinkingIndicator>,
    pub connection: ConnectionStatus,
    /// Route requested by the last redirect quick action.
    pub redirect: Option<String>,
}

impl ChatSnapshot {
    fn capture(core: &ChatCore, now: Instant, redirect: Option<String>) -> Self {
        Self {
            messages: core.messages().to_vec(),
            is_loading: core.is_loading(),
            is_typing: core.is_typing(),
            indicator: core.indicator(now),
            connection: core.connection(),
            redirect,
        }
    }
}

pub struct ChatSessionHandle {
    commands: mpsc::UnboundedSender<ChatCommand>,
    pub snapshots: watch::Receiver<ChatSnapshot>,
    pub dashboard: mpsc::UnboundedReceiver<DashboardPush>,
    task: JoinHandle<ChatCore>,
}

impl ChatSessionHandle {
    pub fn send(&self, turn: OutgoingTurn) -> Result<(), ChatError> {
        self.commands
            .send(ChatCommand::Send(turn))
            .map_err(|_| ChatError::Closed)
    }

    pub fn quick(&self, action: QuickAction) -> Result<(), ChatError> {
        self.commands
            .send(ChatCommand::Quick(action))
            .map_err(|_| ChatError::Closed)
    }

    /// Tear the session down and hand back the final core.
    pub async fn close(self) -> Result<ChatCore, ChatError> {
        let _ = self.commands.send(ChatCommand::Close);
        self.task.await.map_err(|_| ChatError::Closed)
    }
}

/// Spawn the runner over an open socket.
pub fn spawn_session(core: ChatCore, connection: SocketConnection) -> ChatSessionHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshots) = watch::channel(ChatSnapshot::capture(&core, Instant::now(), None));
    let (dashboard_tx, dashboard) = mpsc::unbounded_channel();

    let SocketConnection {
        outbound,
        events,
        task: socket_task,
    } = connection;

    let task = tokio::spawn(async move {
        let core = run_session(core, events, outbound, command_rx, snapshot_tx, dashboard_tx).await;
        if let Some(socket_task) = socket_task {
            let _ = socket_task.await;
        }
        core
    });

    ChatSessionHandle {
        commands,
        snapshots,
        dashboard,
        task,
    }
}

/// The event loop. Returns the core after `Close` (or when every command
/// sender is gone); dropping `outbound` on return closes the socket.
pub async fn run_session(
    mut core: ChatCore,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    outbound: mpsc::UnboundedSender<Frame>,
    mut commands: mpsc::UnboundedReceiver<ChatCommand>,
    snapshots: watch::Sender<ChatSnapshot>,
    dashboard: mpsc::UnboundedSender<DashboardPush>,
) -> ChatCore {
    let tick_interval = core_tick_interval(&core);
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;
    let mut redirect = None;

    loop {
        tokio::select! {
            event = events.recv(), if events_open => {
                match event {
                    Some(SocketEvent::DashboardEvent(push)) => {
                        let _ = dashboard.send(push);
                    }
                    Some(event) => core.handle(event, Instant::now()),
                    None => {
                        // Transport gone without a disconnect frame.
                        events_open = false;
                        core.handle(
                            SocketEvent::Disconnect { reason: "transport closed".to_string() },
                            Instant::now(),
                        );
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(ChatCommand::Send(turn)) => {
                        match core.submit(turn, Instant::now()) {
                            Ok(message) => emit(&outbound, &mut core, message),
                            Err(e) => tracing::debug!(error = %e, "Chat submit ignored"),
                        }
                    }
                    Some(ChatCommand::Quick(action)) => {
                        match core.trigger(&action, Instant::now()) {
                            Ok(QuickActionOutcome::Sent(message)) => emit(&outbound, &mut core, message),
                            Ok(QuickActionOutcome::Redirect(route)) => redirect = Some(route),
                            Err(e) => tracing::debug!(error = %e, "Quick action ignored"),
                        }
                    }
                    Some(ChatCommand::Close) | None => break,
                }
            }
            _ = ticker.tick() => {
                core.tick(Instant::now());
            }
        }

        snapshots.send_replace(ChatSnapshot::capture(&core, Instant::now(), redirect.clone()));
    }

    core.teardown();
    snapshots.send_replace(ChatSnapshot::capture(&core, Instant::now(), None));
    tracing::info!("Chat session closed");
    core
}

fn core_tick_interval(core: &ChatCore) -> std::time::Duration {
    let interval = core.config().tick_interval;
    if interval.is_zero() {
        std::time::Duration::from_millis(250)
    } else {
        interval
    }
}

/// Put the payload on the wire. A dead socket fails the turn right away
/// instead of waiting for the watchdog.
fn emit(outbound: &mpsc::UnboundedSender<Frame>, core: &mut ChatCore, message: OutboundMessage) {
    let sent = Frame::new(SEND_MESSAGE, &message)
        .map_err(|e| e.to_string())
        .and_then(|frame| outbound.send(frame).map_err(|_| "socket closed".to_string()));
    if let Err(reason) = sent {
        core.handle(SocketEvent::ConnectError { message: reason }, Instant::now());
    }
}
