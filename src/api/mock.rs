//! In-memory backend for tests and offline demos.

use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Map, Value};

use super::error::ApiError;
use super::types::{NegotiationPayload, UploadFile, UploadResponse};
use super::BillingApi;
use crate::models::entity::entity_id;

/// Records every call and serves canned bills and negotiation cases.
///
/// Use `failing()` to make every call return the same error.
#[derive(Default)]
pub struct MockBillingApi {
    bills: Mutex<Vec<Value>>,
    negotiations: Mutex<Vec<Value>>,
    failure: Mutex<Option<ApiError>>,
    calls: Mutex<Vec<String>>,
    payloads: Mutex<Vec<NegotiationPayload>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBillingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bills(self, bills: Vec<Value>) -> Self {
        *guard(&self.bills) = bills;
        self
    }

    pub fn with_negotiations(self, cases: Vec<Value>) -> Self {
        *guard(&self.negotiations) = cases;
        self
    }

    pub fn failing(self, error: ApiError) -> Self {
        self.set_failure(Some(error));
        self
    }

    pub fn set_failure(&self, error: Option<ApiError>) {
        *guard(&self.failure) = error;
    }

    /// Method names in call order.
    pub fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        guard(&self.calls).iter().filter(|c| *c == method).count()
    }

    pub fn last_payload(&self) -> Option<NegotiationPayload> {
        guard(&self.payloads).last().cloned()
    }

    fn record(&self, method: &str) -> Result<(), ApiError> {
        guard(&self.calls).push(method.to_string());
        match guard(&self.failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl BillingApi for MockBillingApi {
    fn fetch_bills(&self, _user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.record("fetch_bills")?;
        Ok(guard(&self.bills).clone())
    }

    fn fetch_negotiation_cases(&self, _user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.record("fetch_negotiation_cases")?;
        Ok(guard(&self.negotiations).clone())
    }

    fn submit_negotiation(&self, payload: NegotiationPayload) -> Result<Value, ApiError> {
        self.record("submit_negotiation")?;
        let mut cases = guard(&self.negotiations);
        let mut stored = payload.fields().clone();
        stored.insert("id".into(), json!(format!("case-{}", cases.len() + 1)));
        stored.insert("status".into(), json!("Pending"));
        let stored = Value::Object(stored);
        cases.push(stored.clone());
        guard(&self.payloads).push(payload);
        Ok(stored)
    }

    fn update_negotiation(&self, id: &str, payload: NegotiationPayload) -> Result<Value, ApiError> {
        self.record("update_negotiation")?;
        let mut cases = guard(&self.negotiations);
        let stored = match cases
            .iter_mut()
            .find(|case| entity_id(case).as_deref() == Some(id))
        {
            Some(Value::Object(existing)) => {
                for (key, value) in payload.fields() {
                    existing.insert(key.clone(), value.clone());
                }
                Value::Object(existing.clone())
            }
            _ => {
                let mut fresh = Map::new();
                fresh.insert("id".into(), json!(id));
                fresh.extend(payload.fields().clone());
                Value::Object(fresh)
            }
        };
        guard(&self.payloads).push(payload);
        Ok(stored)
    }

    fn delete_negotiation(&self, id: &str) -> Result<String, ApiError> {
        self.record("delete_negotiation")?;
        guard(&self.negotiations).retain(|case| entity_id(case).as_deref() != Some(id));
        Ok(id.to_string())
    }

    fn upload_bill(&self, file: &UploadFile, user_id: &str) -> Result<UploadResponse, ApiError> {
        self.record("upload_bill")?;
        let mut bills = guard(&self.bills);
        let bill = json!({
            "id": format!("bill-{}", bills.len() + 1),
            "userId": user_id,
            "fileName": file.file_name,
            "status": "uploaded",
        });
        bills.push(bill.clone());
        Ok(UploadResponse {
            success: true,
            data: bill,
            message: None,
        })
    }

    fn retry_bill_parse(&self, bill_id: &str) -> Result<Value, ApiError> {
        self.record("retry_bill_parse")?;
        let mut bills = guard(&self.bills);
        match bills
            .iter_mut()
            .find(|bill| entity_id(bill).as_deref() == Some(bill_id))
        {
            Some(bill) => {
                bill["status"] = json!("parsing");
                Ok(bill.clone())
            }
            None => Err(ApiError::Status {
                status: 404,
                message: format!("Bill {bill_id} not found"),
            }),
        }
    }
}
