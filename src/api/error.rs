//! REST gateway errors.

use serde_json::Value;

/// Errors raised by the REST gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Cannot reach server at {0}")]
    Connection(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Server rejected the request: {0}")]
    Rejected(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Text shown in banners and chat bubbles. Never leaks response bodies
    /// for server-side failures.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Connection(_) | ApiError::Transport(_) => {
                "We couldn't reach BillPilot. Check your connection and try again.".to_string()
            }
            ApiError::Timeout(_) => "The server took too long to respond. Please try again.".to_string(),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ApiError::Status { status, message } if (400..500).contains(status) && !message.is_empty() => {
                message.clone()
            }
            ApiError::Rejected(message) if !message.is_empty() => message.clone(),
            ApiError::Status { .. } | ApiError::Rejected(_) | ApiError::Decode(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }

    /// Build a status error from a response body, preferring its `message`
    /// or `error` field.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::Unauthorized;
        }
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                ["message", "error"]
                    .iter()
                    .find_map(|k| v.get(k).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| body.chars().take(200).collect());
        ApiError::Status { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_prefers_message_field() {
        let err = ApiError::from_status(422, r#"{"message":"Email already registered"}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 422,
                message: "Email already registered".into()
            }
        );
        assert_eq!(err.user_message(), "Email already registered");
    }

    #[test]
    fn unauthorized_maps_from_401() {
        assert_eq!(ApiError::from_status(401, "nope"), ApiError::Unauthorized);
    }

    #[test]
    fn server_errors_get_generic_message() {
        let err = ApiError::from_status(500, r#"{"error":"stack trace here"}"#);
        assert!(!err.user_message().contains("stack trace"));
    }

    #[test]
    fn plain_text_body_is_truncated() {
        let body = "x".repeat(500);
        match ApiError::from_status(502, &body) {
            ApiError::Status { message, .. } => assert_eq!(message.len(), 200),
            other => panic!("unexpected {other:?}"),
        }
    }
}
