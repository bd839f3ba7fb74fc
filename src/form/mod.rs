//! Negotiation case editor.
//!
//! Keeps a baseline snapshot of the stored case and a working copy the
//! user edits. Only the fields that differ from the baseline are sent on
//! submit, and an unchanged form never reaches the network.

pub mod format;

pub use format::{format_for, format_phone, FieldFormat};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::{ApiError, BillingApi, NegotiationPayload, UploadFile};
use crate::models::entity::{entity_id, EntityId};
use crate::validation::{field_text, negotiation_case_schema, ValidationErrors};

/// Fields carried as multipart attachments, never in the JSON patch.
const FILE_FIELDS: &[&str] = &["poaDocument", "supportingDocument", "file", "attachment"];

/// Optional fields outside the validated set that still get normalized.
const EXTRA_KNOWN_FIELDS: &[&str] = &["billId", "insurancePolicyNumber"];

#[derive(Debug, Error)]
pub enum FormError {
    #[error("Please fix the highlighted fields")]
    Validation(#[from] ValidationErrors),

    #[error("No changes detected")]
    NoChanges,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Keys whose values differ between `baseline` and `working`, with the
/// working value. File fields are skipped.
pub fn diff(baseline: &Map<String, Value>, working: &Map<String, Value>) -> Map<String, Value> {
    working
        .iter()
        .filter(|(key, _)| !FILE_FIELDS.contains(&key.as_str()))
        .filter(|(key, value)| baseline.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn normalize(mut record: Map<String, Value>) -> Map<String, Value> {
    let known = negotiation_case_schema()
        .field_names()
        .chain(EXTRA_KNOWN_FIELDS.iter().copied());
    for field in known {
        match record.get(field) {
            None | Some(Value::Null) => {
                record.insert(field.to_string(), Value::String(String::new()));
            }
            Some(_) => {}
        }
    }
    record
}

#[derive(Debug, Default)]
pub struct NegotiationForm {
    case_id: Option<EntityId>,
    baseline: Map<String, Value>,
    working: Map<String, Value>,
    attachment: Option<UploadFile>,
    dirty: bool,
}

impl NegotiationForm {
    /// Empty form for a new case.
    pub fn new() -> Self {
        Self::from_record(&Value::Object(Map::new()))
    }

    /// Form editing an existing case.
    pub fn from_record(record: &Value) -> Self {
        let mut form = Self::default();
        form.load_baseline(record);
        form
    }

    /// Replace baseline and working copy with a snapshot of `record`.
    /// Non-object records load as empty.
    pub fn load_baseline(&mut self, record: &Value) {
        let fields = match record {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        self.case_id = entity_id(record);
        self.baseline = normalize(fields);
        self.working = self.baseline.clone();
        self.attachment = None;
        self.dirty = false;
    }

    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }

    pub fn is_new(&self) -> bool {
        self.case_id.is_none()
    }

    pub fn baseline(&self) -> &Map<String, Value> {
        &self.baseline
    }

    pub fn working(&self) -> &Map<String, Value> {
        &self.working
    }

    /// Current text of a field.
    pub fn value(&self, field: &str) -> String {
        field_text(&self.working, field)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn attachment(&self) -> Option<&UploadFile> {
        self.attachment.as_ref()
    }

    /// Store a keystroke after running the field's formatter. Returns the
    /// stored value.
    pub fn apply_field_change(&mut self, field: &str, raw: &str) -> String {
        let formatted = format_for(field).apply(raw);
        self.set(field, formatted.clone());
        formatted
    }

    /// Final formatting pass when the field loses focus.
    pub fn blur(&mut self, field: &str) -> String {
        let formatted = format_for(field).on_blur(&self.value(field));
        self.set(field, formatted.clone());
        formatted
    }

    /// Inline message for one field, if its current value is invalid.
    pub fn field_error(&self, field: &str) -> Option<&'static str> {
        negotiation_case_schema().validate_field(field, &self.value(field))
    }

    pub fn attach_file(&mut self, file: UploadFile) {
        tracing::debug!(mime = %file.mime_type, size = file.bytes.len(), "Attachment added");
        self.attachment = Some(file);
        self.recompute_dirty();
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
        self.recompute_dirty();
    }

    /// Drop every edit.
    pub fn reset(&mut self) {
        self.working = self.baseline.clone();
        self.attachment = None;
        self.dirty = false;
    }

    /// Fields that would be sent right now.
    pub fn patch(&self) -> Map<String, Value> {
        if self.is_new() {
            // A new case has nothing stored yet; every filled field counts.
            return self
                .working
                .iter()
                .filter(|(key, _)| !FILE_FIELDS.contains(&key.as_str()))
                .filter(|(_, value)| !is_blank(value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
        }
        diff(&self.baseline, &self.working)
    }

    /// Validate, then create or update the case. The baseline is reloaded
    /// from the stored case on success.
    pub fn submit<A: BillingApi + ?Sized>(&mut self, api: &A) -> Result<Value, FormError> {
        negotiation_case_schema().validate(&self.working)?;

        let fields = self.patch();
        if fields.is_empty() && self.attachment.is_none() {
            tracing::debug!("Negotiation form unchanged, nothing to submit");
            return Err(FormError::NoChanges);
        }

        let changed = fields.len();
        let payload = match &self.attachment {
            Some(file) => NegotiationPayload::Multipart {
                fields,
                file: file.clone(),
            },
            None => NegotiationPayload::Json(fields),
        };

        let stored = match self.case_id.clone() {
            Some(id) => {
                let stored = api.update_negotiation(&id, payload)?;
                tracing::info!(case_id = %id, changed, "Negotiation case updated");
                stored
            }
            None => {
                let stored = api.submit_negotiation(payload)?;
                tracing::info!(changed, "Negotiation case created");
                stored
            }
        };

        // Responses may omit fields the server did not touch.
        let mut next = self.working.clone();
        if let Value::Object(fields) = &stored {
            next.extend(fields.clone());
        }
        self.load_baseline(&Value::Object(next));
        Ok(stored)
    }

    fn set(&mut self, field: &str, value: String) {
        self.working.insert(field.to_string(), Value::String(value));
        self.recompute_dirty();
    }

    fn recompute_dirty(&mut self) {
        self.dirty = self.attachment.is_some() || !self.patch().is_empty();
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBillingApi;
    use serde_json::json;

    fn stored_case() -> Value {
        json!({
            "_id": "case-9",
            "status": "Pending",
            "patientName": "Jane Doe",
            "patientPhone": "(555) 000-1111",
            "patientEmail": null,
            "hospitalProviderName": "St. Mary Hospital",
            "billId": "b1",
            "createdAt": "2024-03-01T10:00:00Z"
        })
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn diff_returns_only_changed_keys() {
        let baseline = as_map(json!({"a": "x", "b": "y"}));
        let working = as_map(json!({"a": "x", "b": "z"}));
        assert_eq!(diff(&baseline, &working), as_map(json!({"b": "z"})));
    }

    #[test]
    fn diff_is_strict_and_skips_files() {
        let baseline = as_map(json!({"n": 1, "poaDocument": ""}));
        let working = as_map(json!({"n": "1", "poaDocument": "blob"}));
        assert_eq!(diff(&baseline, &working), as_map(json!({"n": "1"})));
    }

    #[test]
    fn baseline_normalizes_nulls() {
        let form = NegotiationForm::from_record(&stored_case());
        assert_eq!(form.baseline()["patientEmail"], json!(""));
        assert_eq!(form.baseline()["hospitalTaxId"], json!(""));
        assert_eq!(form.case_id(), Some("case-9"));
        assert!(!form.is_dirty());
    }

    #[test]
    fn typing_formats_and_tracks_dirty() {
        let mut form = NegotiationForm::from_record(&stored_case());
        assert_eq!(form.apply_field_change("hospitalPhone", "555-987-6543"), "(555) 987-6543");
        assert!(form.is_dirty());
        form.apply_field_change("hospitalPhone", "");
        assert!(!form.is_dirty(), "back to baseline");
    }

    #[test]
    fn blur_trims_free_text() {
        let mut form = NegotiationForm::from_record(&stored_case());
        form.apply_field_change("notes", "  call   back  ");
        assert_eq!(form.value("notes"), " call back ");
        assert_eq!(form.blur("notes"), "call back");
    }

    #[test]
    fn unchanged_submit_never_calls_network() {
        let api = MockBillingApi::new();
        let mut form = NegotiationForm::from_record(&stored_case());
        let err = form.submit(&api).unwrap_err();
        assert!(matches!(err, FormError::NoChanges));
        assert_eq!(err.to_string(), "No changes detected");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn invalid_field_blocks_submission() {
        let api = MockBillingApi::new();
        let mut form = NegotiationForm::from_record(&stored_case());
        form.apply_field_change("patientEmail", "not-an-email");
        form.apply_field_change("notes", "valid note");
        match form.submit(&api) {
            Err(FormError::Validation(errors)) => {
                assert!(errors.get("patientEmail").is_some());
                assert!(errors.get("notes").is_none());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(api.calls().is_empty());
    }

    #[test]
    fn update_sends_json_patch_and_rebaselines() {
        let api = MockBillingApi::new().with_negotiations(vec![stored_case()]);
        let mut form = NegotiationForm::from_record(&stored_case());
        form.apply_field_change("hospitalTaxId", "123456789");

        form.submit(&api).unwrap();
        assert_eq!(api.calls(), vec!["update_negotiation"]);
        assert_eq!(
            api.last_payload(),
            Some(NegotiationPayload::Json(as_map(json!({"hospitalTaxId": "12-3456789"}))))
        );
        assert!(!form.is_dirty());
        assert_eq!(form.baseline()["hospitalTaxId"], json!("12-3456789"));
        assert!(matches!(form.submit(&api), Err(FormError::NoChanges)));
    }

    #[test]
    fn attachment_alone_sends_multipart() {
        let api = MockBillingApi::new().with_negotiations(vec![stored_case()]);
        let mut form = NegotiationForm::from_record(&stored_case());
        form.attach_file(UploadFile::new("poa.pdf", b"%PDF".to_vec()));
        assert!(form.is_dirty());

        form.submit(&api).unwrap();
        match api.last_payload() {
            Some(NegotiationPayload::Multipart { fields, file }) => {
                assert!(fields.is_empty());
                assert_eq!(file.file_name, "poa.pdf");
            }
            other => panic!("expected multipart, got {other:?}"),
        }
        assert!(form.attachment().is_none());
    }

    #[test]
    fn new_case_is_created_with_filled_fields() {
        let api = MockBillingApi::new();
        let mut form = NegotiationForm::new();
        assert!(form.is_new());
        form.apply_field_change("billId", "b1");
        form.apply_field_change("patientName", "Jane  Doe");
        form.apply_field_change("hospitalProviderName", "St. Mary Hospital");

        let stored = form.submit(&api).unwrap();
        assert_eq!(api.calls(), vec!["submit_negotiation"]);
        let sent = api.last_payload().unwrap();
        assert_eq!(
            sent.fields(),
            &as_map(json!({
                "billId": "b1",
                "patientName": "Jane Doe",
                "hospitalProviderName": "St. Mary Hospital"
            }))
        );
        assert_eq!(form.case_id(), entity_id(&stored).as_deref());
        assert!(!form.is_new());
    }

    #[test]
    fn api_failure_keeps_edits() {
        let api = MockBillingApi::new().failing(ApiError::Timeout(30));
        let mut form = NegotiationForm::from_record(&stored_case());
        form.apply_field_change("accountNumber", "ACC-100");
        assert!(matches!(form.submit(&api), Err(FormError::Api(ApiError::Timeout(30)))));
        assert!(form.is_dirty());
        assert_eq!(form.value("accountNumber"), "ACC-100");
    }
}
