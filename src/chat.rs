//! Support chat panel.
//!
//! `state` holds the turn state machine, `session` runs it against a live
//! socket, `types` has the transcript and wire shapes.

pub mod session;
pub mod state;
pub mod types;

pub use session::{spawn_session, ChatCommand, ChatSessionHandle, ChatSnapshot};
pub use state::{ChatCore, ConnectionStatus, ThinkingIndicator, TurnState};
pub use types::{
    default_quick_actions, Attachment, ChatMessage, MessageKind, OutboundMessage, OutgoingTurn,
    QuickAction, QuickActionOutcome, Sender,
};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("A reply is still in progress")]
    TurnInFlight,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Chat session is closed")]
    Closed,
}
