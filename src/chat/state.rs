//! Turn state machine of the chat panel.
//!
//! One outbound turn at a time. Every timing decision (watchdog, thinking
//! indicator) is computed from the instant the turn started, so the caller
//! only has to feed `tick(now)`.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::types::{ChatMessage, OutboundMessage, OutgoingTurn, QuickAction, QuickActionOutcome};
use super::ChatError;
use crate::config::ChatConfig;
use crate::socket::SocketEvent;

pub const FALLBACK_MESSAGE: &str =
    "Sorry, I'm having trouble connecting right now. Please try again in a moment.";
pub const TIMEOUT_MESSAGE: &str =
    "Sorry, this is taking longer than expected. Please try asking again.";

const THINKING_LABELS: [&str; 4] = ["Thinking", "Analyzing", "Processing", "Almost done"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// Turn sent, no reply yet.
    Sending { started: Instant },
    /// Fragments arriving into `messages[message_index]`.
    Streaming { started: Instant, message_index: usize },
}

impl TurnState {
    fn started(&self) -> Option<Instant> {
        match *self {
            TurnState::Idle => None,
            TurnState::Sending { started } | TurnState::Streaming { started, .. } => Some(started),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// What the panel shows while waiting for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum ThinkingIndicator {
    Dots,
    Label(&'static str),
}

pub struct ChatCore {
    config: ChatConfig,
    user_id: String,
    session_id: String,
    messages: Vec<ChatMessage>,
    state: TurnState,
    connection: ConnectionStatus,
}

impl ChatCore {
    pub fn new(config: ChatConfig, user_id: &str, session_id: &str) -> Self {
        Self {
            config,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            messages: Vec::new(),
            state: TurnState::Idle,
            connection: ConnectionStatus::Connecting,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn is_loading(&self) -> bool {
        !matches!(self.state, TurnState::Idle)
    }

    /// The bot is composing a reply. Same window as `is_loading`: the send
    /// control stays disabled until the turn settles.
    pub fn is_typing(&self) -> bool {
        self.is_loading()
    }

    /// Start a turn. Returns the `send-message` payload.
    pub fn submit(&mut self, turn: OutgoingTurn, now: Instant) -> Result<OutboundMessage, ChatError> {
        if self.is_loading() {
            return Err(ChatError::TurnInFlight);
        }
        let text = turn.text.trim().to_string();
        if text.is_empty() && turn.attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let attachment_name = turn.attachment.as_ref().map(|a| a.file_name.clone());
        self.messages.push(ChatMessage::user(&text, attachment_name));
        self.state = TurnState::Sending { started: now };
        tracing::debug!(
            has_attachment = turn.attachment.is_some(),
            "Chat turn sent"
        );

        Ok(OutboundMessage {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            text,
            panel_type: self.config.panel_type.clone(),
            attachment: turn.attachment,
        })
    }

    pub fn trigger(&mut self, action: &QuickAction, now: Instant) -> Result<QuickActionOutcome, ChatError> {
        match action {
            QuickAction::Message { text, .. } => {
                self.submit(OutgoingTurn::text(text.as_str()), now).map(QuickActionOutcome::Sent)
            }
            QuickAction::Redirect { route, .. } => Ok(QuickActionOutcome::Redirect(route.clone())),
        }
    }

    /// Apply one socket event. Events that are not about chat are ignored.
    pub fn handle(&mut self, event: SocketEvent, _now: Instant) {
        match event {
            SocketEvent::Connect => {
                self.connection = ConnectionStatus::Connected;
            }
            SocketEvent::AgentStream { chunk } => match self.state {
                TurnState::Sending { started } => {
                    self.messages.push(ChatMessage::bot(&chunk));
                    self.state = TurnState::Streaming {
                        started,
                        message_index: self.messages.len() - 1,
                    };
                }
                TurnState::Streaming { message_index, .. } => {
                    if let Some(message) = self.messages.get_mut(message_index) {
                        message.text.push_str(&chunk);
                    }
                }
                TurnState::Idle => discard_late("agent-stream"),
            },
            SocketEvent::AgentStreamEnd { text } => self.settle(text),
            SocketEvent::AgentResponse { text } => self.settle(Some(text)),
            SocketEvent::AgentStreamError { message } => {
                tracing::warn!(error = %message, "Chat stream failed");
                self.fail(FALLBACK_MESSAGE);
            }
            SocketEvent::ConnectError { message } => {
                tracing::warn!(error = %message, "Chat socket connection error");
                self.connection = ConnectionStatus::Disconnected;
                self.fail(FALLBACK_MESSAGE);
            }
            SocketEvent::Disconnect { reason } => {
                tracing::info!(reason = %reason, "Chat socket disconnected");
                self.connection = ConnectionStatus::Disconnected;
                self.fail(FALLBACK_MESSAGE);
            }
            SocketEvent::DashboardEvent(_) | SocketEvent::Unknown { .. } => {}
        }
    }

    /// Watchdog. Returns true when the turn timed out on this tick.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(started) = self.state.started() else {
            return false;
        };
        if now.saturating_duration_since(started) < self.config.response_timeout {
            return false;
        }
        tracing::warn!(
            timeout_secs = self.config.response_timeout.as_secs(),
            "Chat reply timed out"
        );
        self.fail(TIMEOUT_MESSAGE);
        true
    }

    /// Dots first, then labels advancing at a fixed interval and holding on
    /// the last one. `None` when no turn is in flight.
    pub fn indicator(&self, now: Instant) -> Option<ThinkingIndicator> {
        let elapsed = now.saturating_duration_since(self.state.started()?);
        Some(thinking_indicator(
            elapsed,
            self.config.dots_window,
            self.config.label_interval,
        ))
    }

    /// Panel closed: drop the in-flight turn and any half-streamed reply.
    pub fn teardown(&mut self) {
        if let TurnState::Streaming { message_index, .. } = self.state {
            if message_index < self.messages.len() {
                self.messages.truncate(message_index);
            }
        }
        self.state = TurnState::Idle;
        self.connection = ConnectionStatus::Disconnected;
    }

    fn settle(&mut self, text: Option<String>) {
        let text = text.filter(|t| !t.is_empty());
        match self.state {
            TurnState::Sending { .. } => {
                if let Some(text) = text {
                    self.messages.push(ChatMessage::bot(&text));
                }
            }
            TurnState::Streaming { message_index, .. } => {
                // A final text supersedes the buffered fragments.
                if let (Some(text), Some(message)) = (text, self.messages.get_mut(message_index)) {
                    message.text = text;
                }
            }
            TurnState::Idle => {
                discard_late("agent-response");
                return;
            }
        }
        self.state = TurnState::Idle;
    }

    /// Close the turn with a fallback bot message. No-op when idle.
    fn fail(&mut self, text: &str) {
        if matches!(self.state, TurnState::Idle) {
            return;
        }
        self.messages.push(ChatMessage::fallback(text));
        self.state = TurnState::Idle;
    }
}

fn discard_late(event: &str) {
    tracing::debug!(event, "Discarding chat reply with no turn in flight");
}

/// Pure indicator function of the time since the turn started.
pub fn thinking_indicator(elapsed: Duration, dots_window: Duration, label_interval: Duration) -> ThinkingIndicator {
    if elapsed < dots_window {
        return ThinkingIndicator::Dots;
    }
    let since_labels = elapsed - dots_window;
    let step = if label_interval.is_zero() {
        THINKING_LABELS.len() - 1
    } else {
        (since_labels.as_millis() / label_interval.as_millis()) as usize
    };
    ThinkingIndicator::Label(THINKING_LABELS[step.min(THINKING_LABELS.len() - 1)])
}
