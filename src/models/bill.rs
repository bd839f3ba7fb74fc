use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::entity::parse_timestamp_str;
use super::enums::BillStatus;

/// One billed service row within a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub description: Option<String>,
    /// CPT / HCPCS code when the parser found one.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub service_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub charge: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub adjustment: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub payment: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LineItem {
    /// What is still owed on this row.
    pub fn balance(&self) -> f64 {
        self.charge.unwrap_or(0.0) - self.adjustment.unwrap_or(0.0) - self.payment.unwrap_or(0.0)
    }
}

/// A parsed medical bill, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    pub id: String,
    #[serde(default)]
    pub file_name: String,
    pub status: BillStatus,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BillRecord {
    /// Sum of line item balances; used when the parser found no total.
    pub fn line_item_total(&self) -> f64 {
        self.line_items.iter().map(LineItem::balance).sum()
    }

    /// Total shown to the patient.
    pub fn display_total(&self) -> Option<f64> {
        self.total_amount.or_else(|| {
            if self.line_items.is_empty() {
                None
            } else {
                Some(self.line_item_total())
            }
        })
    }

    pub fn last_activity(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.updated_at
            .as_deref()
            .or(self.created_at.as_deref())
            .and_then(parse_timestamp_str)
    }
}

/// Accept numbers, numeric strings (`"1,234.50"`, `"$80"`) and null.
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(amount_from_value))
}

pub(crate) fn amount_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_server_payload() {
        let bill: BillRecord = serde_json::from_value(json!({
            "id": "b1",
            "fileName": "er-visit.pdf",
            "status": "ready_for_negotiation",
            "totalAmount": "1,250.00",
            "lineItems": [
                {"description": "ER visit", "code": "99284", "charge": 1500, "adjustment": 200, "payment": 50}
            ],
            "createdAt": "2024-01-01T00:00:00Z",
            "hospital": "General"
        }))
        .unwrap();
        assert_eq!(bill.status, BillStatus::ReadyForNegotiation);
        assert_eq!(bill.total_amount, Some(1250.0));
        assert_eq!(bill.line_items[0].balance(), 1250.0);
        assert_eq!(bill.extra["hospital"], "General");
    }

    #[test]
    fn display_total_falls_back_to_line_items() {
        let bill: BillRecord = serde_json::from_value(json!({
            "id": "b2",
            "status": "parsing",
            "totalAmount": null,
            "lineItems": [{"charge": 100}, {"charge": 50, "payment": 25}]
        }))
        .unwrap();
        assert_eq!(bill.display_total(), Some(125.0));
    }

    #[test]
    fn no_total_and_no_items_is_unknown() {
        let bill: BillRecord =
            serde_json::from_value(json!({"id": "b3", "status": "uploaded"})).unwrap();
        assert_eq!(bill.display_total(), None);
        assert!(bill.last_activity().is_none());
    }

    #[test]
    fn unparseable_amount_is_none() {
        assert_eq!(amount_from_value(&json!("n/a")), None);
        assert_eq!(amount_from_value(&json!("$80")), Some(80.0));
        assert_eq!(amount_from_value(&json!(true)), None);
    }
}
