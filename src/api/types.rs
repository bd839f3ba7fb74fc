//! Request and response shapes of the REST gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A file picked by the user, ready to send as a multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// MIME type is guessed from the extension.
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Self {
        let mime_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name: file_name.to_string(),
            mime_type,
            bytes,
        }
    }

    pub fn with_mime(file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }
}

/// `{success, data}` envelope returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of a negotiation create/update.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationPayload {
    /// Plain JSON patch.
    Json(Map<String, Value>),
    /// Changed fields plus a file (POA or supporting document).
    Multipart {
        fields: Map<String, Value>,
        file: UploadFile,
    },
}

impl NegotiationPayload {
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            NegotiationPayload::Json(fields) | NegotiationPayload::Multipart { fields, .. } => fields,
        }
    }

    pub fn file(&self) -> Option<&UploadFile> {
        match self {
            NegotiationPayload::Json(_) => None,
            NegotiationPayload::Multipart { file, .. } => Some(file),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub password: String,
}

/// Session payload returned by login and register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(alias = "user_id")]
    pub user_id: String,
    #[serde(default)]
    pub is_existing_user: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Unwrap an optional `{data: ...}` envelope.
pub(crate) fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut obj) if obj.contains_key("data") => obj.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// Text form of a multipart field: strings verbatim, everything else as JSON.
pub(crate) fn multipart_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
