//! Identity and recency of server entities.
//!
//! Every place that needs to know "which record is this" or "how recent is
//! this" goes through these two functions, so bills, negotiation cases, row
//! selection and deletion all agree on the same key.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Identity key of a server entity (`id`, falling back to `_id`).
pub type EntityId = String;

/// Extract the identity key of an entity.
///
/// `id` wins over `_id`. Numeric ids are rendered as strings so that
/// `1` and `"1"` key the same record. Empty strings and nulls are no id.
pub fn entity_id(entity: &Value) -> Option<EntityId> {
    ["id", "_id"]
        .iter()
        .filter_map(|key| entity.get(key))
        .find_map(id_from_value)
}

fn id_from_value(value: &Value) -> Option<EntityId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy `_id` into `id` when only the former is present, so the entity
/// deserializes into the typed models.
pub fn with_canonical_id(mut entity: Value) -> Value {
    if let Some(id) = entity_id(&entity) {
        if let Some(obj) = entity.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id));
        }
    }
    entity
}

/// Effective timestamp in epoch milliseconds: `updatedAt ?? createdAt ?? 0`.
///
/// The first non-null field decides; a present but unparseable value counts
/// as epoch 0 rather than falling through to the next field.
pub fn effective_timestamp(entity: &Value) -> i64 {
    ["updatedAt", "createdAt"]
        .iter()
        .filter_map(|key| entity.get(key))
        .find(|v| !v.is_null())
        .and_then(parse_timestamp)
        .unwrap_or(0)
}

/// Parse a JSON timestamp: RFC 3339, naive datetime, plain date, or epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_timestamp_str(s).map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_wins_over_underscore_id() {
        assert_eq!(entity_id(&json!({"id": "a", "_id": "b"})), Some("a".into()));
        assert_eq!(entity_id(&json!({"_id": "b"})), Some("b".into()));
    }

    #[test]
    fn empty_or_null_id_falls_back() {
        assert_eq!(entity_id(&json!({"id": "", "_id": "b"})), Some("b".into()));
        assert_eq!(entity_id(&json!({"id": null, "_id": "b"})), Some("b".into()));
        assert_eq!(entity_id(&json!({"name": "x"})), None);
        assert_eq!(entity_id(&json!("not an object")), None);
    }

    #[test]
    fn numeric_id_keys_like_string() {
        assert_eq!(entity_id(&json!({"id": 1})), entity_id(&json!({"id": "1"})));
    }

    #[test]
    fn canonical_id_copies_underscore_id() {
        let v = with_canonical_id(json!({"_id": "m1", "status": "parsing"}));
        assert_eq!(v["id"], "m1");
        assert_eq!(v["_id"], "m1");
    }

    #[test]
    fn updated_at_preferred_over_created_at() {
        let v = json!({"createdAt": "2024-01-01", "updatedAt": "2024-06-01"});
        let june = parse_timestamp(&json!("2024-06-01")).unwrap();
        assert_eq!(effective_timestamp(&v), june);
    }

    #[test]
    fn null_updated_at_falls_back_to_created_at() {
        let v = json!({"createdAt": "2024-01-01T10:00:00Z", "updatedAt": null});
        assert!(effective_timestamp(&v) > 0);
    }

    #[test]
    fn missing_timestamps_are_epoch() {
        assert_eq!(effective_timestamp(&json!({"id": "x"})), 0);
        assert_eq!(effective_timestamp(&json!({"updatedAt": "yesterday"})), 0);
    }

    #[test]
    fn parses_supported_formats() {
        assert!(parse_timestamp(&json!("2024-03-05T12:30:00.000Z")).is_some());
        assert!(parse_timestamp(&json!("2024-03-05T12:30:00")).is_some());
        assert!(parse_timestamp(&json!("2024-03-05")).is_some());
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
    }
}
