// standardize.rs
use log::debug;
use serde_json::{json, Value};

use crate::models::{ContentRecord, StandardizationAction};

/// Folds common Latin accents to ASCII so slugs stay URL-safe.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}

/// Kebab-case ASCII slug: "Col de l'Iséran" -> "col-de-l-iseran".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        let piece = if c.is_ascii_alphanumeric() {
            Some(c.to_string())
        } else {
            fold_char(c).map(str::to_string)
        };
        match piece {
            Some(p) => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push_str(&p);
            }
            None => pending_dash = true,
        }
    }
    slug
}

/// Fills derivable identity fields in place and returns what was changed.
pub fn standardize(record: &mut ContentRecord) -> Vec<StandardizationAction> {
    let mut actions = Vec::new();
    let label = record.label();

    let trimmed_name = match record.fields.get("name") {
        Some(Value::String(name)) if name.trim() != name.as_str() => Some(name.trim().to_string()),
        _ => None,
    };
    if let Some(trimmed) = trimmed_name {
        record.fields.insert("name".to_string(), Value::String(trimmed));
        actions.push(action(&label, "name", "trimmed surrounding whitespace"));
    }

    if record.slug().is_none() {
        if let Some(slug) = record.name().map(slugify).filter(|s| !s.is_empty()) {
            actions.push(action(&label, "slug", &format!("generated '{}' from name", slug)));
            record.fields.insert("slug".to_string(), Value::String(slug));
        }
    }

    if record.id().is_none() {
        if let Some(slug) = record.slug().map(str::to_string) {
            actions.push(action(&label, "id", &format!("set to slug '{}'", slug)));
            record.fields.insert("id".to_string(), Value::String(slug));
        }
    }

    let has_canonical = record
        .fields
        .get("coordinates")
        .map(|c| c.is_object() && c.get("lat").is_some() && c.get("lng").is_some())
        .unwrap_or(false);
    if !has_canonical {
        if let Some(point) = record.coordinates() {
            record
                .fields
                .insert("coordinates".to_string(), json!({"lat": point.lat, "lng": point.lng}));
            actions.push(action(&label, "coordinates", "normalized to {lat, lng}"));
        }
    }

    if !actions.is_empty() {
        debug!("Standardized '{}': {} actions", label, actions.len());
    }
    actions
}

fn action(record: &str, field: &str, description: &str) -> StandardizationAction {
    StandardizationAction {
        record: record.to_string(),
        field: field.to_string(),
        description: description.to_string(),
    }
}
