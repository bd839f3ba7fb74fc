//! List reconciliation of REST-fetched entities with socket-pushed overlays.
//!
//! Push events can arrive before, during or after a REST refresh and may
//! reference records the base list has never seen (a file uploaded a second
//! ago). `merge` folds both sources into one list without losing either:
//! overlay fields win, base-only records stay, and the result is sorted by
//! recency.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::entity::{effective_timestamp, entity_id, with_canonical_id};

/// Merge `overlay` onto `base` and sort by recency (newest first).
///
/// - Non-array inputs are treated as empty.
/// - Overlay entries are applied in array order; a later entry with the same
///   key wins over an earlier one.
/// - Overlay objects are shallow-merged onto the matching base entry.
/// - Base entities without an identity key are kept as-is. An id-less
///   overlay entity is added only when no equal entity is already present.
/// - Ties in recency keep first-seen order (stable sort), so re-merging the
///   same overlay is a no-op.
pub fn merge(base: &Value, overlay: &Value) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entity in as_slice(base) {
        upsert(&mut merged, &mut index, entity, false);
    }
    for entity in as_slice(overlay) {
        upsert(&mut merged, &mut index, entity, true);
    }

    merged.sort_by_key(|entity| std::cmp::Reverse(effective_timestamp(entity)));
    merged
}

/// `merge` for callers that already hold vectors.
pub fn merge_lists(base: &[Value], overlay: &[Value]) -> Vec<Value> {
    merge(&Value::Array(base.to_vec()), &Value::Array(overlay.to_vec()))
}

/// Merge and deserialize into typed entities.
///
/// Entries that do not match the typed model are skipped and logged; they
/// stay in the raw lists and reappear once a later push fixes them.
pub fn merge_as<T: DeserializeOwned>(base: &[Value], overlay: &[Value]) -> Vec<T> {
    merge_lists(base, overlay)
        .into_iter()
        .filter_map(|entity| {
            let id = entity_id(&entity);
            match serde_json::from_value(with_canonical_id(entity)) {
                Ok(typed) => Some(typed),
                Err(e) => {
                    tracing::warn!(entity_id = ?id, error = %e, "Skipping malformed entity");
                    None
                }
            }
        })
        .collect()
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        _ => &[],
    }
}

fn upsert(
    merged: &mut Vec<Value>,
    index: &mut HashMap<String, usize>,
    entity: &Value,
    from_overlay: bool,
) {
    let Some(key) = entity_id(entity) else {
        if from_overlay && merged.contains(entity) {
            tracing::debug!("Id-less overlay entity already present, skipping");
            return;
        }
        merged.push(entity.clone());
        return;
    };

    match index.get(&key) {
        Some(&pos) => shallow_merge(&mut merged[pos], entity),
        None => {
            index.insert(key, merged.len());
            merged.push(entity.clone());
        }
    }
}

/// Overlay wins per top-level field. A non-object overlay replaces the entry.
fn shallow_merge(target: &mut Value, overlay: &Value) {
    match (target.as_object_mut(), overlay.as_object()) {
        (Some(target), Some(fields)) => {
            for (field, value) in fields {
                target.insert(field.clone(), value.clone());
            }
        }
        _ => *target = overlay.clone(),
    }
}
