// models.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Content kinds handled by the pipeline. The serialized names match the
/// keys used in the sources table and the output directory names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Cols,
    Nutrition,
    Training,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Cols, ContentType::Nutrition, ContentType::Training];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Cols => "cols",
            ContentType::Nutrition => "nutrition",
            ContentType::Training => "training",
        }
    }

    /// Human label used in reports ("Col", "Recipe", "Training plan").
    pub fn record_label(&self) -> &'static str {
        match self {
            ContentType::Cols => "Col",
            ContentType::Nutrition => "Recipe",
            ContentType::Training => "Training plan",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Option<GeoPoint> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if valid {
            Some(GeoPoint { lat, lng })
        } else {
            None
        }
    }
}

/// A record pulled out of a source file. The body is kept as loose JSON;
/// the accessors below are the only way the rest of the pipeline reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub content_type: ContentType,
    pub fields: Map<String, Value>,
    pub source: PathBuf,
    pub source_index: usize,
}

impl ContentRecord {
    pub fn new(content_type: ContentType, fields: Map<String, Value>, source: PathBuf, source_index: usize) -> Self {
        ContentRecord { content_type, fields, source, source_index }
    }

    /// Validates an ingested JSON value. Only objects are records.
    pub fn from_value(content_type: ContentType, value: Value, source: PathBuf, source_index: usize) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(ContentRecord::new(content_type, fields, source, source_index)),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<String> {
        match self.fields.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        ["name", "title"]
            .iter()
            .find_map(|key| self.str_field(key))
    }

    pub fn slug(&self) -> Option<&str> {
        self.str_field("slug")
    }

    /// Altitude in metres, accepting the `altitude`, `elevation` and
    /// `height` spellings found across the col sources.
    pub fn altitude(&self) -> Option<f64> {
        ["altitude", "elevation", "height"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(number_like))
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        if let Some(point) = self.fields.get("coordinates").and_then(point_from_value) {
            return Some(point);
        }
        if let Some(location) = self.fields.get("location") {
            if let Some(point) = point_from_value(location) {
                return Some(point);
            }
            if let Some(point) = location.get("coordinates").and_then(point_from_value) {
                return Some(point);
            }
        }
        point_from_map(&self.fields)
    }

    /// Display label: name, falling back to id, then source position.
    pub fn label(&self) -> String {
        self.name()
            .map(str::to_string)
            .or_else(|| self.id())
            .unwrap_or_else(|| format!("{}#{}", self.source.display(), self.source_index))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('m').trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Reads a point from `{lat,lng}`, `{latitude,longitude}`, `{lat,lon}` or `[lat, lng]`.
pub fn point_from_value(value: &Value) -> Option<GeoPoint> {
    match value {
        Value::Array(items) if items.len() >= 2 => {
            GeoPoint::new(number_like(&items[0])?, number_like(&items[1])?)
        }
        Value::Object(map) => point_from_map(map),
        _ => None,
    }
}

fn point_from_map(map: &Map<String, Value>) -> Option<GeoPoint> {
    let lat = ["lat", "latitude"].iter().find_map(|k| map.get(*k).and_then(number_like))?;
    let lng = ["lng", "lon", "longitude"].iter().find_map(|k| map.get(*k).and_then(number_like))?;
    GeoPoint::new(lat, lng)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    SameId,
    Name,
    NameAndLocation,
    /// Names matched but the col positions were too far apart (or missing).
    NameOnlyRejected,
    NotSimilar,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MatchReason::SameId => "identical id",
            MatchReason::Name => "similar name",
            MatchReason::NameAndLocation => "similar name and location",
            MatchReason::NameOnlyRejected => "similar name, location mismatch",
            MatchReason::NotSimilar => "not similar",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub is_duplicate: bool,
    pub reason: MatchReason,
    pub similarity: f64,
}

/// Two records flagged as duplicates. Indexes point into the record list
/// the matcher was run over.
#[derive(Debug, Clone)]
pub struct DuplicateCandidatePair {
    pub content_type: ContentType,
    pub first_index: usize,
    pub second_index: usize,
    pub first: ContentRecord,
    pub second: ContentRecord,
    pub similarity: f64,
    pub reason: MatchReason,
}

#[derive(Debug, Clone)]
pub struct DuplicateCluster {
    pub label: String,
    pub content_type: ContentType,
    pub member_indexes: Vec<usize>,
}

/// A scalar disagreement the merge had to settle heuristically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub path: String,
    pub kept: Value,
    pub discarded: Value,
}

#[derive(Debug, Clone)]
pub struct MergedRecord {
    pub record: ContentRecord,
    pub primary_id: Option<String>,
    pub merged_ids: Vec<String>,
    pub sources: Vec<PathBuf>,
    pub conflicts: Vec<FieldConflict>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardizationAction {
    pub record: String,
    pub field: String,
    pub description: String,
}
