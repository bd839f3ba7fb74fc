//! REST gateway to the BillPilot backend.
//!
//! The traits are the seam the rest of the client programs against; tests
//! implement them with in-memory mocks, production uses [`HttpBillingApi`].

pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use error::ApiError;
pub use http::HttpBillingApi;
pub use mock::MockBillingApi;
pub use types::{
    AuthPayload, Credentials, NegotiationPayload, Registration, UploadFile, UploadResponse,
};

use serde_json::Value;

/// Bill and negotiation endpoints.
pub trait BillingApi {
    /// All bills of a user, raw as the server sent them.
    fn fetch_bills(&self, user_id: &str) -> Result<Vec<Value>, ApiError>;

    fn fetch_negotiation_cases(&self, user_id: &str) -> Result<Vec<Value>, ApiError>;

    /// Create a negotiation case. Returns the stored case.
    fn submit_negotiation(&self, payload: NegotiationPayload) -> Result<Value, ApiError>;

    /// Partial update carrying only changed fields. Returns the stored case.
    fn update_negotiation(&self, id: &str, payload: NegotiationPayload) -> Result<Value, ApiError>;

    /// Returns the id of the deleted case.
    fn delete_negotiation(&self, id: &str) -> Result<String, ApiError>;

    fn upload_bill(&self, file: &UploadFile, user_id: &str) -> Result<UploadResponse, ApiError>;

    /// Re-queue a bill whose parse failed.
    fn retry_bill_parse(&self, bill_id: &str) -> Result<Value, ApiError>;
}

/// Account endpoints.
pub trait AuthApi {
    fn login(&self, credentials: &Credentials) -> Result<AuthPayload, ApiError>;

    fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError>;

    /// Sends a reset link to `email`.
    fn request_password_reset(&self, email: &str) -> Result<(), ApiError>;

    fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<(), ApiError>;

    fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), ApiError>;
}
