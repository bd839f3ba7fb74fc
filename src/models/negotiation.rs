use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::bill::{lenient_amount, LineItem};
use super::enums::{DiscountType, NegotiationStatus};

/// A tracked dispute of a bill's charges with a provider or insurer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationCase {
    pub id: String,
    pub status: NegotiationStatus,
    #[serde(default)]
    pub bill_id: Option<String>,

    // Patient
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default)]
    pub patient_date_of_birth: Option<String>,
    #[serde(default)]
    pub patient_address: Option<String>,

    // Providers
    #[serde(default)]
    pub hospital_provider_name: Option<String>,
    #[serde(default)]
    pub hospital_phone: Option<String>,
    #[serde(default)]
    pub hospital_address: Option<String>,
    #[serde(default)]
    pub insurance_provider_name: Option<String>,

    // Billing
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default, deserialize_with = "blank_discount_type")]
    pub requested_discount_type: Option<DiscountType>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub requested_discount_value: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// SSN, tax id and anything else the backend returns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NegotiationCase {
    /// Amount the patient asks to have removed from the bill.
    pub fn requested_reduction(&self, bill_total: f64) -> Option<f64> {
        let value = self.requested_discount_value?;
        match self.requested_discount_type? {
            DiscountType::Percentage => Some(bill_total * value.clamp(0.0, 100.0) / 100.0),
            DiscountType::FixedAmount => Some(value.min(bill_total).max(0.0)),
        }
    }
}

/// Forms send `""` for "not chosen yet".
fn blank_discount_type<'de, D>(deserializer: D) -> Result<Option<DiscountType>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw.parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
