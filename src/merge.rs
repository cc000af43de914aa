// merge.rs
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::completeness::{calculate_completeness, is_non_empty, pick_primary};
use crate::config::MergePolicy;
use crate::models::{ContentRecord, FieldConflict, MergedRecord};

/// Merges `source` into `target` with the default policy. Pure: neither input
/// is modified, and the same pair in the same order always gives the same result.
pub fn deep_merge(target: &Value, source: &Value) -> Value {
    MergeResolver::new(&MergePolicy::default()).merge(target, source)
}

pub struct MergeResolver<'p> {
    policy: &'p MergePolicy,
}

impl<'p> MergeResolver<'p> {
    pub fn new(policy: &'p MergePolicy) -> Self {
        MergeResolver { policy }
    }

    pub fn merge(&self, target: &Value, source: &Value) -> Value {
        self.merge_with_conflicts(target, source).0
    }

    /// Like [`merge`](Self::merge), also returning the places where both
    /// sides held different non-empty values and one had to be dropped.
    pub fn merge_with_conflicts(&self, target: &Value, source: &Value) -> (Value, Vec<FieldConflict>) {
        let mut conflicts = Vec::new();
        let merged = self.merge_at("", None, target, source, &mut conflicts);
        (merged, conflicts)
    }

    fn merge_at(
        &self,
        path: &str,
        key: Option<&str>,
        target: &Value,
        source: &Value,
        conflicts: &mut Vec<FieldConflict>,
    ) -> Value {
        match (target, source) {
            (Value::Array(t), Value::Array(s)) => self.union_arrays(path, t, s, conflicts),
            (Value::Object(t), Value::Object(s)) => Value::Object(self.merge_objects(path, t, s, conflicts)),
            (t, s) if !is_non_empty(t) => {
                if is_non_empty(s) {
                    s.clone()
                } else {
                    t.clone()
                }
            }
            (t, s) if !is_non_empty(s) => t.clone(),
            (Value::String(t), Value::String(s)) if key.map(|k| self.prefers_longer(k)).unwrap_or(false) => {
                if s.chars().count() > t.chars().count() {
                    conflicts.push(conflict(path, source, target));
                    source.clone()
                } else {
                    if t != s {
                        conflicts.push(conflict(path, target, source));
                    }
                    target.clone()
                }
            }
            (t, s) => {
                if t != s {
                    conflicts.push(conflict(path, t, s));
                }
                t.clone()
            }
        }
    }

    fn merge_objects(
        &self,
        path: &str,
        target: &Map<String, Value>,
        source: &Map<String, Value>,
        conflicts: &mut Vec<FieldConflict>,
    ) -> Map<String, Value> {
        let mut merged = Map::new();
        for (k, t) in target {
            let value = match source.get(k) {
                Some(s) => self.merge_at(&child_path(path, k), Some(k), t, s, conflicts),
                None => t.clone(),
            };
            merged.insert(k.clone(), value);
        }
        for (k, s) in source {
            if !target.contains_key(k) {
                merged.insert(k.clone(), s.clone());
            }
        }
        merged
    }

    /// Target entries first, then source entries not already present. Entries
    /// sharing a derived key are the same entry; when both are objects they
    /// are merged.
    fn union_arrays(&self, path: &str, target: &[Value], source: &[Value], conflicts: &mut Vec<FieldConflict>) -> Value {
        let mut result: Vec<Value> = Vec::with_capacity(target.len() + source.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for item in target.iter().chain(source.iter()) {
            let key = self.item_key(item);
            match positions.get(&key) {
                Some(&pos) => {
                    if result[pos].is_object() && item.is_object() && result[pos] != *item {
                        let item_path = format!("{}[{}]", path, key);
                        let merged = self.merge_at(&item_path, None, &result[pos], item, conflicts);
                        result[pos] = merged;
                    }
                }
                None => {
                    positions.insert(key, result.len());
                    result.push(item.clone());
                }
            }
        }
        Value::Array(result)
    }

    fn item_key(&self, item: &Value) -> String {
        if let Value::Object(map) = item {
            for k in &self.policy.array_item_keys {
                match map.get(k) {
                    Some(Value::String(s)) if !s.trim().is_empty() => return format!("{}={}", k, s.trim()),
                    Some(Value::Number(n)) => return format!("{}={}", k, n),
                    _ => {}
                }
            }
        }
        item.to_string()
    }

    fn prefers_longer(&self, key: &str) -> bool {
        self.policy.prefer_longer_fields.iter().any(|f| f == key)
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn conflict(path: &str, kept: &Value, discarded: &Value) -> FieldConflict {
    FieldConflict { path: path.to_string(), kept: kept.clone(), discarded: discarded.clone() }
}

/// Merges a group of duplicates into one record.
///
/// The most complete record is the primary; the others are merged into it in
/// descending completeness. Identity fields are restored from the primary so
/// the merged id always equals the primary's id.
pub fn merge_cluster(records: &[&ContentRecord], policy: &MergePolicy) -> Option<MergedRecord> {
    let primary_pos = pick_primary(records)?;
    let primary = records[primary_pos];

    let mut others: Vec<(usize, f64)> = records
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != primary_pos)
        .map(|(i, r)| (i, calculate_completeness(r)))
        .collect();
    // stable: equal scores keep input order
    others.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let resolver = MergeResolver::new(policy);
    let mut merged = primary.to_value();
    let mut conflicts = Vec::new();
    for (i, _) in &others {
        let (next, found) = resolver.merge_with_conflicts(&merged, &records[*i].to_value());
        merged = next;
        conflicts.extend(found);
    }

    let Value::Object(mut fields) = merged else {
        warn!("Merge of {} produced a non-object, keeping primary", primary.label());
        return None;
    };
    for identity in &policy.identity_fields {
        if let Some(value) = primary.fields.get(identity) {
            if is_non_empty(value) {
                fields.insert(identity.clone(), value.clone());
            }
        }
    }
    conflicts.retain(|c| !policy.identity_fields.iter().any(|f| *f == c.path));

    let merged_ids: Vec<String> = others
        .iter()
        .filter_map(|(i, _)| records[*i].id())
        .filter(|id| Some(id) != primary.id().as_ref())
        .collect();

    let mut sources = vec![primary.source.clone()];
    for (i, _) in &others {
        if !sources.contains(&records[*i].source) {
            sources.push(records[*i].source.clone());
        }
    }

    if !conflicts.is_empty() {
        debug!("Merging into '{}' dropped {} conflicting values", primary.label(), conflicts.len());
    }
    info!(
        "Merged {} {} records into '{}'",
        records.len(),
        primary.content_type,
        primary.label()
    );

    Some(MergedRecord {
        record: ContentRecord::new(primary.content_type, fields, primary.source.clone(), primary.source_index),
        primary_id: primary.id(),
        merged_ids,
        sources,
        conflicts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use serde_json::json;
    use std::path::PathBuf;

    fn record(value: Value, source: &str) -> ContentRecord {
        ContentRecord::from_value(ContentType::Cols, value, PathBuf::from(source), 0).unwrap()
    }

    #[test]
    fn test_scalars_keep_target_unless_empty() {
        let merged = deep_merge(
            &json!({"a": 1, "b": "", "c": null, "d": "keep"}),
            &json!({"a": 2, "b": "filled", "c": [1], "d": "other", "e": true}),
        );
        assert_eq!(merged, json!({"a": 1, "b": "filled", "c": [1], "d": "keep", "e": true}));
    }

    #[test]
    fn test_nested_objects_merge_recursively() {
        let merged = deep_merge(
            &json!({"location": {"region": "Lombardy", "country": ""}}),
            &json!({"location": {"country": "Italy", "lat": 46.5}}),
        );
        assert_eq!(merged, json!({"location": {"region": "Lombardy", "country": "Italy", "lat": 46.5}}));
    }

    #[test]
    fn test_arrays_union_without_duplicates() {
        let merged = deep_merge(
            &json!({"tags": ["alps", "italy", "alps"], "images": [{"url": "a.jpg"}, {"src": "b.jpg"}]}),
            &json!({"tags": ["italy", "giro"], "images": [{"url": "a.jpg", "caption": "Top"}, {"url": "c.jpg"}]}),
        );
        assert_eq!(
            merged,
            json!({
                "tags": ["alps", "italy", "giro"],
                "images": [{"url": "a.jpg", "caption": "Top"}, {"src": "b.jpg"}, {"url": "c.jpg"}]
            })
        );
    }

    #[test]
    fn test_description_prefers_longer() {
        let merged = deep_merge(
            &json!({"description": "Short.", "name": "Stelvio"}),
            &json!({"description": "A much longer description.", "name": "Passo dello Stelvio"}),
        );
        assert_eq!(merged["description"], json!("A much longer description."));
        assert_eq!(merged["name"], json!("Stelvio"));
    }

    #[test]
    fn test_merge_is_pure() {
        let a = json!({"images": ["a.jpg"], "x": {"y": 1}});
        let b = json!({"images": ["b.jpg"], "x": {"z": 2}});
        let (a_before, b_before) = (a.clone(), b.clone());
        let _ = deep_merge(&a, &b);
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let cases = [
            (json!({"a": 1}), json!({"a": 2, "b": [1, 2]})),
            (
                json!({"description": "short", "images": [{"url": "a"}], "n": {"m": ""}}),
                json!({"description": "much longer", "images": [{"url": "a", "alt": "x"}, {"url": "b"}], "n": {"m": "v"}}),
            ),
            (json!({"list": [1, 1, {"k": 1}]}), json!({"list": [{"k": 1}, 2, null]})),
            (json!({"v": ""}), json!({"v": {"deep": [1]}})),
        ];
        for (a, b) in cases {
            let once = deep_merge(&a, &b);
            let twice = deep_merge(&once, &b);
            assert_eq!(once, twice, "not idempotent for {} / {}", a, b);
        }
    }

    #[test]
    fn test_conflicts_are_reported() {
        let policy = MergePolicy::default();
        let (_, conflicts) = MergeResolver::new(&policy)
            .merge_with_conflicts(&json!({"altitude": 2758, "x": {"y": "a"}}), &json!({"altitude": 2757, "x": {"y": "b"}}));
        let paths: Vec<&str> = conflicts.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["altitude", "x.y"]);
        assert_eq!(conflicts[0].kept, json!(2758));
        assert_eq!(conflicts[0].discarded, json!(2757));
    }

    #[test]
    fn test_stelvio_merge_keeps_most_complete_identity() {
        let a = record(
            json!({"id": "stelvio-pass", "name": "Stelvio Pass", "altitude": 2758, "coordinates": {"lat": 46.5286, "lng": 10.4531}}),
            "cols.json",
        );
        let b = record(
            json!({"id": "passo-dello-stelvio", "name": "Passo dello Stelvio", "altitude": 2758,
                   "images": ["x.jpg"], "coordinates": {"lat": 46.5287, "lng": 10.4532}}),
            "colsData.js",
        );
        let merged = merge_cluster(&[&a, &b], &MergePolicy::default()).unwrap();
        let fields = &merged.record.fields;
        assert_eq!(fields["id"], json!("passo-dello-stelvio"));
        assert_eq!(fields["name"], json!("Passo dello Stelvio"));
        assert_eq!(fields["altitude"], json!(2758));
        assert_eq!(fields["images"], json!(["x.jpg"]));
        assert_eq!(merged.primary_id.as_deref(), Some("passo-dello-stelvio"));
        assert_eq!(merged.merged_ids, vec!["stelvio-pass".to_string()]);
        assert_eq!(merged.sources, vec![PathBuf::from("colsData.js"), PathBuf::from("cols.json")]);
        assert!(merged.conflicts.iter().all(|c| c.path != "id" && c.path != "name"));
    }

    #[test]
    fn test_merged_id_equals_primary_id() {
        let mut policy = MergePolicy::default();
        policy.prefer_longer_fields.push("id".to_string());
        let a = record(json!({"id": "a", "images": ["1.jpg"], "slug": "a"}), "one.json");
        let b = record(json!({"id": "a-much-longer-id"}), "two.json");
        let merged = merge_cluster(&[&b, &a], &policy).unwrap();
        assert_eq!(merged.record.id().as_deref(), Some("a"));
    }

    #[test]
    fn test_primary_without_slug_takes_duplicate_slug() {
        let a = record(json!({"id": "a", "name": "A", "images": ["1.jpg"], "altitude": 1}), "one.json");
        let b = record(json!({"id": "b", "slug": "b-slug"}), "two.json");
        let merged = merge_cluster(&[&a, &b], &MergePolicy::default()).unwrap();
        assert_eq!(merged.record.slug(), Some("b-slug"));
        assert_eq!(merged.record.id().as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_cluster() {
        assert!(merge_cluster(&[], &MergePolicy::default()).is_none());
    }
}
