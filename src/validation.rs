//! Schema-based field validation for every form the client submits.
//!
//! A schema is an ordered list of per-field rules plus cross-field checks.
//! Validation is all-or-nothing: the caller gets every failing field's
//! message at once, and nothing is submitted until the map is empty.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

// ═══════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════

static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static PERSON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{L}[\p{L}\p{M} .'\-]*$").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(\d{3}\) \d{3}-\d{4}$").unwrap());
static SSN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap());
static TAX_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}-\d{7}$").unwrap());
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static ACCOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-]{3,30}$").unwrap());
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").unwrap());
static DISCOUNT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(percentage|fixed_amount)$").unwrap());

// ═══════════════════════════════════════════
// Types
// ═══════════════════════════════════════════

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{} field(s) failed validation", .0.len())]
pub struct ValidationErrors(pub BTreeMap<String, String>);

impl ValidationErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn insert_first(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }
}

/// Rule set for one field.
///
/// Optional fields accept the empty string; every other check only runs on
/// non-empty values.
pub struct FieldRule {
    pub required: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub pattern: Option<&'static LazyLock<Regex>>,
    pub predicate: Option<fn(&str) -> bool>,
    pub message: &'static str,
}

impl FieldRule {
    fn required(message: &'static str) -> Self {
        Self {
            required: true,
            min_len: None,
            max_len: None,
            pattern: None,
            predicate: None,
            message,
        }
    }

    fn optional(message: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(message)
        }
    }

    fn len(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    fn max(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    fn pattern(mut self, pattern: &'static LazyLock<Regex>) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn predicate(mut self, predicate: fn(&str) -> bool) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Check one value. Returns the rule's message on failure.
    pub fn check(&self, value: &str) -> Result<(), &'static str> {
        let value = value.trim();
        if value.is_empty() {
            return if self.required {
                Err(self.message)
            } else {
                Ok(())
            };
        }
        let chars = value.chars().count();
        if self.min_len.is_some_and(|min| chars < min) || self.max_len.is_some_and(|max| chars > max) {
            return Err(self.message);
        }
        if let Some(pattern) = self.pattern {
            if !pattern.is_match(value) {
                return Err(self.message);
            }
        }
        if let Some(predicate) = self.predicate {
            if !predicate(value) {
                return Err(self.message);
            }
        }
        Ok(())
    }
}

/// A check spanning several fields; the message is attached to `field`.
pub struct CrossCheck {
    pub field: &'static str,
    pub check: fn(&Map<String, Value>) -> bool,
    pub message: &'static str,
}

/// Ordered field rules plus cross-field checks.
pub struct Schema {
    pub fields: Vec<(&'static str, FieldRule)>,
    pub cross_checks: Vec<CrossCheck>,
}

impl Schema {
    /// Validate every field. Cross-field checks only run for fields that
    /// passed their own rule.
    pub fn validate(&self, values: &Map<String, Value>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        for (field, rule) in &self.fields {
            if let Err(message) = rule.check(&field_text(values, field)) {
                errors.insert_first(field, message);
            }
        }
        for cross in &self.cross_checks {
            if errors.get(cross.field).is_none() && !(cross.check)(values) {
                errors.insert_first(cross.field, cross.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Inline validation of a single field while the user types.
    pub fn validate_field(&self, field: &str, value: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .and_then(|(_, rule)| rule.check(value).err())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }
}

/// Text form of a field: strings as-is, numbers/bools rendered, null/missing empty.
pub fn field_text(values: &Map<String, Value>, field: &str) -> String {
    match values.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

// ═══════════════════════════════════════════
// Predicates
// ═══════════════════════════════════════════

fn strong_password(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_uppercase())
        && value.chars().any(|c| c.is_ascii_lowercase())
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| !c.is_alphanumeric())
}

fn past_date(value: &str) -> bool {
    ISO_DATE.is_match(value)
        && NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .is_ok_and(|d| d <= Local::now().date_naive())
}

fn calendar_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn same_text(values: &Map<String, Value>, a: &str, b: &str) -> bool {
    field_text(values, a) == field_text(values, b)
}

fn percentage_within_bounds(values: &Map<String, Value>) -> bool {
    if field_text(values, "requestedDiscountType") != "percentage" {
        return true;
    }
    let raw = field_text(values, "requestedDiscountValue");
    raw.is_empty() || raw.parse::<f64>().is_ok_and(|v| v > 0.0 && v <= 100.0)
}

fn signature_matches_principal(values: &Map<String, Value>) -> bool {
    let normalize = |s: String| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    normalize(field_text(values, "signature")) == normalize(field_text(values, "principalName"))
}

// ═══════════════════════════════════════════
// Schemas
// ═══════════════════════════════════════════

const EMAIL_MSG: &str = "Enter a valid email address";
const PASSWORD_MSG: &str =
    "Password must be 8-64 characters with upper and lower case letters, a number and a symbol";
const NAME_MSG: &str = "Enter a name using letters, spaces, apostrophes or hyphens";
const PHONE_MSG: &str = "Enter a phone number as (555) 123-4567";

static LOGIN: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![
        ("email", FieldRule::required(EMAIL_MSG).max(254).pattern(&EMAIL)),
        ("password", FieldRule::required("Password is required")),
    ],
    cross_checks: vec![],
});

static REGISTER: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![
        ("firstName", FieldRule::required(NAME_MSG).len(2, 50).pattern(&PERSON_NAME)),
        ("lastName", FieldRule::required(NAME_MSG).len(2, 50).pattern(&PERSON_NAME)),
        ("email", FieldRule::required(EMAIL_MSG).max(254).pattern(&EMAIL)),
        ("phone", FieldRule::optional(PHONE_MSG).pattern(&PHONE)),
        ("password", FieldRule::required(PASSWORD_MSG).len(8, 64).predicate(strong_password)),
        ("confirmPassword", FieldRule::required("Please confirm your password")),
    ],
    cross_checks: vec![CrossCheck {
        field: "confirmPassword",
        check: |v| same_text(v, "password", "confirmPassword"),
        message: "Passwords do not match",
    }],
});

static FORGOT_PASSWORD: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![("email", FieldRule::required(EMAIL_MSG).max(254).pattern(&EMAIL))],
    cross_checks: vec![],
});

static RESET_PASSWORD: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![
        ("password", FieldRule::required(PASSWORD_MSG).len(8, 64).predicate(strong_password)),
        ("confirmPassword", FieldRule::required("Please confirm your password")),
    ],
    cross_checks: vec![CrossCheck {
        field: "confirmPassword",
        check: |v| same_text(v, "password", "confirmPassword"),
        message: "Passwords do not match",
    }],
});

static CHANGE_PASSWORD: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![
        ("currentPassword", FieldRule::required("Current password is required")),
        ("newPassword", FieldRule::required(PASSWORD_MSG).len(8, 64).predicate(strong_password)),
        ("confirmNewPassword", FieldRule::required("Please confirm your new password")),
    ],
    cross_checks: vec![
        CrossCheck {
            field: "confirmNewPassword",
            check: |v| same_text(v, "newPassword", "confirmNewPassword"),
            message: "Passwords do not match",
        },
        CrossCheck {
            field: "newPassword",
            check: |v| !same_text(v, "currentPassword", "newPassword"),
            message: "New password must differ from the current one",
        },
    ],
});

static NEGOTIATION_CASE: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![
        ("patientName", FieldRule::required(NAME_MSG).len(2, 100).pattern(&PERSON_NAME)),
        ("patientEmail", FieldRule::optional(EMAIL_MSG).max(254).pattern(&EMAIL)),
        ("patientPhone", FieldRule::optional(PHONE_MSG).pattern(&PHONE)),
        ("patientSsn", FieldRule::optional("Enter an SSN as 123-45-6789").pattern(&SSN)),
        (
            "patientDateOfBirth",
            FieldRule::optional("Enter a past date as YYYY-MM-DD").predicate(past_date),
        ),
        ("patientAddress", FieldRule::optional("Address is too long").max(200)),
        (
            "hospitalProviderName",
            FieldRule::required("Hospital or provider name is required (2-150 characters)").len(2, 150),
        ),
        ("hospitalPhone", FieldRule::optional(PHONE_MSG).pattern(&PHONE)),
        ("hospitalTaxId", FieldRule::optional("Enter a tax id as 12-3456789").pattern(&TAX_ID)),
        ("hospitalAddress", FieldRule::optional("Address is too long").max(200)),
        ("insuranceProviderName", FieldRule::optional("Insurance name is too long").max(150)),
        (
            "insuranceMemberId",
            FieldRule::optional("Member id must be 3-30 letters, digits or dashes").pattern(&ACCOUNT),
        ),
        (
            "accountNumber",
            FieldRule::optional("Account number must be 3-30 letters, digits or dashes").pattern(&ACCOUNT),
        ),
        (
            "requestedDiscountType",
            FieldRule::optional("Choose percentage or fixed amount").pattern(&DISCOUNT_TYPE),
        ),
        (
            "requestedDiscountValue",
            FieldRule::optional("Enter an amount with at most two decimals").pattern(&AMOUNT),
        ),
        ("notes", FieldRule::optional("Notes are limited to 1000 characters").max(1000)),
    ],
    cross_checks: vec![CrossCheck {
        field: "requestedDiscountValue",
        check: percentage_within_bounds,
        message: "A percentage discount must be between 0 and 100",
    }],
});

static POA: LazyLock<Schema> = LazyLock::new(|| Schema {
    fields: vec![
        ("principalName", FieldRule::required(NAME_MSG).len(2, 100).pattern(&PERSON_NAME)),
        ("principalAddress", FieldRule::required("Enter your full address").len(5, 200)),
        (
            "principalDateOfBirth",
            FieldRule::required("Enter a past date as YYYY-MM-DD").predicate(past_date),
        ),
        ("agentName", FieldRule::required("Agent name is required").len(2, 150)),
        ("providerName", FieldRule::required("Provider name is required").len(2, 150)),
        (
            "accountNumber",
            FieldRule::optional("Account number must be 3-30 letters, digits or dashes").pattern(&ACCOUNT),
        ),
        ("signature", FieldRule::required("Type your full name to sign").len(2, 100)),
        (
            "signedDate",
            FieldRule::required("Enter the date as YYYY-MM-DD")
                .pattern(&ISO_DATE)
                .predicate(calendar_date),
        ),
    ],
    cross_checks: vec![CrossCheck {
        field: "signature",
        check: signature_matches_principal,
        message: "Signature must match your full name",
    }],
});

pub fn login_schema() -> &'static Schema {
    &LOGIN
}

pub fn register_schema() -> &'static Schema {
    &REGISTER
}

pub fn forgot_password_schema() -> &'static Schema {
    &FORGOT_PASSWORD
}

pub fn reset_password_schema() -> &'static Schema {
    &RESET_PASSWORD
}

pub fn change_password_schema() -> &'static Schema {
    &CHANGE_PASSWORD
}

pub fn negotiation_case_schema() -> &'static Schema {
    &NEGOTIATION_CASE
}

pub fn poa_schema() -> &'static Schema {
    &POA
}
