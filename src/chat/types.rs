use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Normal,
    /// Synthetic reply after a socket error or watchdog expiry.
    Fallback,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(text: &str, attachment_name: Option<String>) -> Self {
        Self::build(Sender::User, text, MessageKind::Normal, attachment_name)
    }

    pub fn bot(text: &str) -> Self {
        Self::build(Sender::Bot, text, MessageKind::Normal, None)
    }

    pub fn fallback(text: &str) -> Self {
        Self::build(Sender::Bot, text, MessageKind::Fallback, None)
    }

    fn build(sender: Sender, text: &str, kind: MessageKind, attachment_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.to_string(),
            kind,
            attachment_name,
            created_at: Utc::now(),
        }
    }
}

/// A file sent inline with a chat turn, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime_type: mime_guess::from_path(file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// What the user typed, plus at most one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingTurn {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl OutgoingTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Payload of the `send-message` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub user_id: String,
    pub session_id: String,
    pub text: String,
    pub panel_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// Canned button under the chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickAction {
    /// Sent exactly like a typed message.
    Message { label: String, text: String },
    /// Navigates elsewhere; nothing is sent.
    Redirect { label: String, route: String },
}

impl QuickAction {
    pub fn label(&self) -> &str {
        match self {
            QuickAction::Message { label, .. } | QuickAction::Redirect { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuickActionOutcome {
    Sent(OutboundMessage),
    Redirect(String),
}

pub fn default_quick_actions() -> Vec<QuickAction> {
    let message = |label: &str, text: &str| QuickAction::Message {
        label: label.to_string(),
        text: text.to_string(),
    };
    vec![
        message("Explain my bill", "Can you explain the charges on my latest bill?"),
        message("Find billing errors", "Are there any billing errors or duplicate charges on my bill?"),
        message("How does negotiation work?", "How does the bill negotiation process work?"),
        QuickAction::Redirect {
            label: "Upload a bill".to_string(),
            route: "/upload".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attachment_is_base64_with_guessed_mime() {
        let attachment = Attachment::from_bytes("statement.png", b"abc");
        assert_eq!(attachment.data, "YWJj");
        assert_eq!(attachment.mime_type, "image/png");
    }

    #[test]
    fn outbound_payload_shape() {
        let msg = OutboundMessage {
            user_id: "u1".into(),
            session_id: "s1".into(),
            text: "hello".into(),
            panel_type: "support".into(),
            attachment: None,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"userId": "u1", "sessionId": "s1", "text": "hello", "panelType": "support"})
        );
    }

    #[test]
    fn quick_actions_include_redirect() {
        let actions = default_quick_actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, QuickAction::Redirect { route, .. } if route == "/upload")));
        assert_eq!(actions[0].label(), "Explain my bill");
    }
}
