//! Blocking HTTP implementation of the gateway traits.

use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::Url;
use serde_json::{json, Map, Value};

use super::error::ApiError;
use super::types::{
    multipart_text, unwrap_data, AuthPayload, Credentials, NegotiationPayload, Registration,
    UploadFile, UploadResponse,
};
use super::{AuthApi, BillingApi};
use crate::config::ClientConfig;
use crate::models::entity::entity_id;

/// REST client for the BillPilot backend.
pub struct HttpBillingApi {
    base_url: String,
    client: Client,
    timeout_secs: u64,
    access_token: Option<String>,
}

impl HttpBillingApi {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            access_token: None,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.request_timeout_secs)
    }

    /// Attach the bearer token read from session storage.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::Transport(format!("Invalid base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("Base URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the JSON body.
    fn send(&self, builder: RequestBuilder) -> Result<Value, ApiError> {
        let response = self.authorized(builder).send().map_err(|e| {
            if e.is_connect() {
                ApiError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                ApiError::Timeout(self.timeout_secs)
            } else {
                ApiError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Backend request failed");
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn list(&self, url: Url) -> Result<Vec<Value>, ApiError> {
        match unwrap_data(self.send(self.client.get(url))?) {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ApiError::Decode(format!("expected a list, got {}", kind(&other)))),
        }
    }

    fn negotiation_request(&self, builder: RequestBuilder, payload: NegotiationPayload) -> Result<RequestBuilder, ApiError> {
        match payload {
            NegotiationPayload::Json(fields) => Ok(builder.json(&fields)),
            NegotiationPayload::Multipart { fields, file } => {
                Ok(builder.multipart(multipart_form(&fields, &file)?))
            }
        }
    }
}

fn multipart_form(fields: &Map<String, Value>, file: &UploadFile) -> Result<multipart::Form, ApiError> {
    let mut form = multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), multipart_text(value));
    }
    let part = multipart::Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(&file.mime_type)
        .map_err(|e| ApiError::Transport(format!("Invalid MIME type {}: {e}", file.mime_type)))?;
    Ok(form.part("file", part))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl BillingApi for HttpBillingApi {
    fn fetch_bills(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.list(self.endpoint(&["bills", "user", user_id])?)
    }

    fn fetch_negotiation_cases(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.list(self.endpoint(&["negotiations", "user", user_id])?)
    }

    fn submit_negotiation(&self, payload: NegotiationPayload) -> Result<Value, ApiError> {
        let builder = self.client.post(self.url("/negotiations"));
        let request = self.negotiation_request(builder, payload)?;
        Ok(unwrap_data(self.send(request)?))
    }

    fn update_negotiation(&self, id: &str, payload: NegotiationPayload) -> Result<Value, ApiError> {
        let builder = self.client.patch(self.endpoint(&["negotiations", id])?);
        let request = self.negotiation_request(builder, payload)?;
        Ok(unwrap_data(self.send(request)?))
    }

    fn delete_negotiation(&self, id: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["negotiations", id])?;
        let body = unwrap_data(self.send(self.client.delete(url))?);
        Ok(entity_id(&body).unwrap_or_else(|| id.to_string()))
    }

    fn upload_bill(&self, file: &UploadFile, user_id: &str) -> Result<UploadResponse, ApiError> {
        let mut fields = Map::new();
        fields.insert("userId".to_string(), Value::String(user_id.to_string()));
        let form = multipart_form(&fields, file)?;
        let body = self.send(self.client.post(self.url("/upload-image")).multipart(form))?;
        let response: UploadResponse =
            serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        if !response.success {
            return Err(ApiError::Rejected(response.message.unwrap_or_default()));
        }
        tracing::info!(file_size = file.bytes.len(), "Bill uploaded");
        Ok(response)
    }

    fn retry_bill_parse(&self, bill_id: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(&["bills", bill_id, "retry"])?;
        let body = self.send(self.client.post(url))?;
        Ok(unwrap_data(body))
    }
}

impl AuthApi for HttpBillingApi {
    fn login(&self, credentials: &Credentials) -> Result<AuthPayload, ApiError> {
        let body = self.send(self.client.post(self.url("/auth/login")).json(credentials))?;
        serde_json::from_value(unwrap_data(body)).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError> {
        let body = self.send(self.client.post(self.url("/auth/register")).json(registration))?;
        serde_json::from_value(unwrap_data(body)).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        self.send(
            self.client
                .post(self.url("/auth/forgot-password"))
                .json(&json!({ "email": email })),
        )?;
        Ok(())
    }

    fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<(), ApiError> {
        self.send(
            self.client
                .post(self.url("/auth/reset-password"))
                .json(&json!({ "token": reset_token, "password": new_password })),
        )?;
        Ok(())
    }

    fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), ApiError> {
        self.send(self.client.put(self.url("/auth/change-password")).json(&json!({
            "currentPassword": current_password,
            "newPassword": new_password,
        })))?;
        Ok(())
    }
}
