//! JSON merge, field update and query evaluation shared by all backends.

use std::cmp::Ordering;

use serde_json::{Map, Value as JsonValue};

use super::document::{DbError, DbResult, Direction, Document, Filter, FilterOp, Query};

/// Recursively merge `patch` into `target`. Objects merge key by key; any other
/// value replaces what was there.
pub fn deep_merge(target: &mut JsonValue, patch: JsonValue) {
    match (target, patch) {
        (JsonValue::Object(target), JsonValue::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Apply an update whose keys may be dotted paths. Each addressed field is replaced
/// wholesale; intermediate objects are created as needed.
pub fn apply_update(target: &mut JsonValue, fields: JsonValue) -> DbResult<()> {
    let JsonValue::Object(fields) = fields else {
        return Err(DbError::InvalidDocument(
            "update fields must be a JSON object".to_string(),
        ));
    };
    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }

    for (path, value) in fields {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(DbError::InvalidDocument(format!("invalid field path '{}'", path)));
        }
        let (leaf, parents) = match segments.split_last() {
            Some(split) => split,
            None => continue,
        };

        let mut cursor = &mut *target;
        for segment in parents {
            let JsonValue::Object(map) = cursor else {
                return Err(DbError::InvalidDocument(format!(
                    "field path '{}' crosses a non-object value",
                    path
                )));
            };
            let entry = map
                .entry(segment.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !entry.is_object() {
                *entry = JsonValue::Object(Map::new());
            }
            cursor = entry;
        }

        match cursor {
            JsonValue::Object(map) => {
                map.insert(leaf.to_string(), value);
            }
            _ => {
                return Err(DbError::InvalidDocument(format!(
                    "field path '{}' crosses a non-object value",
                    path
                )))
            }
        }
    }
    Ok(())
}

/// Resolve a dotted field path.
pub fn get_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Compare two values of the same JSON type; mixed types are unordered.
fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

pub fn matches_filter(data: &JsonValue, filter: &Filter) -> bool {
    let Some(field) = get_path(data, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => values_equal(field, &filter.value),
        FilterOp::NotEq => !values_equal(field, &filter.value),
        FilterOp::Lt => compare(field, &filter.value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare(field, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare(field, &filter.value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare(field, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// Filter, order and limit an unordered set of documents.
pub fn apply_query(documents: impl IntoIterator<Item = Document>, query: &Query) -> Vec<Document> {
    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|doc| query.filters.iter().all(|f| matches_filter(&doc.data, f)))
        .collect();

    match &query.order_by {
        Some((field, direction)) => {
            // Documents missing the field sort last, ties fall back to id.
            matched.sort_by(|a, b| {
                let ordering = match (get_path(&a.data, field), get_path(&b.data, field)) {
                    (Some(x), Some(y)) => {
                        let ordering = compare(x, y).unwrap_or(Ordering::Equal);
                        match direction {
                            Direction::Ascending => ordering,
                            Direction::Descending => ordering.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                ordering.then_with(|| a.id.cmp(&b.id))
            });
        }
        None => matched.sort_by(|a, b| a.id.cmp(&b.id)),
    }

    if let Some(limit) = query.limit {
        matched.truncate(limit);
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_keeps_untouched_fields() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "d": [1, 2]});
        deep_merge(&mut doc, json!({"a": {"b": 10}, "d": [3]}));
        assert_eq!(doc, json!({"a": {"b": 10, "c": 2}, "d": [3]}));
    }

    #[test]
    fn dotted_update_replaces_leaf() {
        let mut doc = json!({
            "paths": {"original": {"storagePath": "k"}, "derivatives": {"old": {}}},
            "processed": false
        });
        apply_update(
            &mut doc,
            json!({"paths.derivatives": {"webp_thumb": {"sizeBytes": 3}}, "processed": true}),
        )
        .unwrap();
        assert_eq!(doc["paths"]["original"]["storagePath"], "k");
        assert_eq!(doc["paths"]["derivatives"], json!({"webp_thumb": {"sizeBytes": 3}}));
        assert_eq!(doc["processed"], true);
    }

    #[test]
    fn update_rejects_non_object() {
        let mut doc = json!({});
        assert!(apply_update(&mut doc, json!([1])).is_err());
        assert!(apply_update(&mut doc, json!({"a..b": 1})).is_err());
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let docs = vec![
            Document { id: "a".into(), data: json!({"n": 3, "s": "x"}) },
            Document { id: "b".into(), data: json!({"n": 1, "s": "x"}) },
            Document { id: "c".into(), data: json!({"n": 2, "s": "y"}) },
            Document { id: "d".into(), data: json!({"s": "x"}) },
        ];
        let query = Query::new()
            .filter("s", FilterOp::Eq, "x")
            .order_by("n", Direction::Descending)
            .limit(2);
        let ids: Vec<String> = apply_query(docs.clone(), &query).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let ascending = Query::new().order_by("n", Direction::Ascending);
        let ids: Vec<String> = apply_query(docs.clone(), &ascending).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "c", "a", "d"]);

        let gte = Query::new().filter("n", FilterOp::Gte, 2);
        let ids: Vec<String> = apply_query(docs, &gte).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn numbers_compare_across_representations() {
        let doc = json!({"n": 1.0});
        let filter = Filter { field: "n".into(), op: FilterOp::Eq, value: json!(1) };
        assert!(matches_filter(&doc, &filter));
    }
}
