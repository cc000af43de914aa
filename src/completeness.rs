// completeness.rs
use serde_json::Value;

use crate::models::{ContentRecord, ContentType};

/// An expected field and the paths (dot-separated) that may hold it.
pub struct ExpectedField {
    pub label: &'static str,
    pub paths: &'static [&'static str],
}

const fn field(label: &'static str, paths: &'static [&'static str]) -> ExpectedField {
    ExpectedField { label, paths }
}

const COMMON_COORDINATES: &[&str] = &[
    "coordinates",
    "location.coordinates",
    "location.lat",
    "location.latitude",
    "lat",
    "latitude",
];

pub static COL_FIELDS: [ExpectedField; 12] = [
    field("id", &["id"]),
    field("name", &["name", "title"]),
    field("slug", &["slug"]),
    field("coordinates", COMMON_COORDINATES),
    field("altitude", &["altitude", "elevation", "height"]),
    field("description", &["description", "summary"]),
    field("images", &["images", "image", "photos"]),
    field("length", &["length", "distance", "climbs.length"]),
    field("gradient", &["avgGradient", "averageGradient", "gradient", "climbs.avgGradient"]),
    field("maxGradient", &["maxGradient", "climbs.maxGradient"]),
    field("region", &["region", "location.region", "country", "location.country"]),
    field("difficulty", &["difficulty", "category"]),
];

pub static RECIPE_FIELDS: [ExpectedField; 10] = [
    field("id", &["id"]),
    field("name", &["name", "title"]),
    field("slug", &["slug"]),
    field("description", &["description", "summary"]),
    field("ingredients", &["ingredients"]),
    field("instructions", &["instructions", "steps", "preparation"]),
    field("nutrition", &["nutrition", "nutritionalInfo", "macros"]),
    field("prepTime", &["prepTime", "preparationTime", "duration"]),
    field("images", &["images", "image"]),
    field("category", &["category", "type", "mealType"]),
];

pub static TRAINING_FIELDS: [ExpectedField; 9] = [
    field("id", &["id"]),
    field("name", &["name", "title"]),
    field("slug", &["slug"]),
    field("description", &["description", "summary"]),
    field("duration", &["duration", "weeks", "durationWeeks"]),
    field("level", &["level", "difficulty"]),
    field("schedule", &["schedule", "sessions", "workouts", "weeklySchedule"]),
    field("goal", &["goal", "goals", "objective", "target"]),
    field("images", &["images", "image"]),
];

pub fn expected_fields(content_type: ContentType) -> &'static [ExpectedField] {
    match content_type {
        ContentType::Cols => &COL_FIELDS,
        ContentType::Nutrition => &RECIPE_FIELDS,
        ContentType::Training => &TRAINING_FIELDS,
    }
}

/// Non-empty means: not null, not a blank string, not an empty array/object.
pub fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn lookup<'v>(root: &'v serde_json::Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

pub fn field_present(record: &ContentRecord, expected: &ExpectedField) -> bool {
    expected
        .paths
        .iter()
        .any(|path| lookup(&record.fields, path).map(is_non_empty).unwrap_or(false))
}

/// Labels of the expected fields the record lacks.
pub fn missing_fields(record: &ContentRecord) -> Vec<&'static str> {
    expected_fields(record.content_type)
        .iter()
        .filter(|f| !field_present(record, f))
        .map(|f| f.label)
        .collect()
}

/// Percentage (0-100) of the type's expected fields that are present and non-empty.
pub fn calculate_completeness(record: &ContentRecord) -> f64 {
    let fields = expected_fields(record.content_type);
    if fields.is_empty() {
        return 0.0;
    }
    let present = fields.iter().filter(|f| field_present(record, f)).count();
    present as f64 * 100.0 / fields.len() as f64
}

/// One line of the completeness listing in the reports.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessRow {
    pub content_type: ContentType,
    pub label: String,
    pub id: Option<String>,
    pub source: String,
    pub score: f64,
    pub missing: Vec<&'static str>,
}

pub fn completeness_rows(records: &[ContentRecord]) -> Vec<CompletenessRow> {
    records
        .iter()
        .map(|record| CompletenessRow {
            content_type: record.content_type,
            label: record.label(),
            id: record.id(),
            source: record.source.display().to_string(),
            score: calculate_completeness(record),
            missing: missing_fields(record),
        })
        .collect()
}

/// Index of the most complete record; ties go to the earliest.
pub fn pick_primary(records: &[&ContentRecord]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, record) in records.iter().enumerate() {
        let score = calculate_completeness(record);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
