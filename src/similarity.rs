// similarity.rs
use strsim::levenshtein;

use crate::models::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;
/// At or under this distance two positions count as the same place.
pub const SAME_PLACE_KM: f64 = 1.0;
/// Beyond this distance location similarity is zero.
pub const MAX_PLACE_KM: f64 = 10.0;

/// Words that name the kind of climb rather than the climb itself, across the
/// languages col names show up in.
pub const COL_STOP_WORDS: [&str; 34] = [
    "col", "colle", "collado", "coll", "pass", "passo", "paso", "pas", "port", "puerto", "portet",
    "alto", "alpe", "cime", "cima", "monte", "mont", "mount", "joch", "sella", "forcella", "giogo",
    "de", "du", "des", "la", "le", "les", "del", "della", "dello", "di", "the", "of",
];

pub const RECIPE_STOP_WORDS: [&str; 8] = ["recipe", "the", "a", "with", "and", "de", "la", "of"];

pub const TRAINING_STOP_WORDS: [&str; 7] = ["plan", "training", "programme", "program", "the", "for", "a"];

/// Normalized edit-distance similarity in `[0, 1]`, case-insensitive.
/// An empty side (after trimming) yields 0, including `("", "")`.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Lower-cases, folds apostrophes/hyphens/punctuation to spaces and collapses whitespace.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The name with stop-words removed and the remaining tokens sorted, so
/// word order ("Stelvio Pass" / "Passo dello Stelvio") does not matter.
pub fn core_name(name: &str, stop_words: &[&str]) -> String {
    let normalized = normalize_name(name);
    let mut tokens: Vec<&str> = normalized
        .split(' ')
        .filter(|t| !t.is_empty() && !stop_words.contains(t))
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Best of the full-name and core-name similarities.
pub fn name_similarity(a: &str, b: &str, stop_words: &[&str]) -> f64 {
    let full = string_similarity(&normalize_name(a), &normalize_name(b));
    let core = string_similarity(&core_name(a, stop_words), &core_name(b, stop_words));
    full.max(core)
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// 1.0 within [`SAME_PLACE_KM`], decaying linearly to 0.0 at [`MAX_PLACE_KM`].
/// Missing coordinates on either side yield 0.
pub fn location_similarity(a: Option<GeoPoint>, b: Option<GeoPoint>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let distance = haversine_km(a, b);
    if distance <= SAME_PLACE_KM {
        1.0
    } else if distance >= MAX_PLACE_KM {
        0.0
    } else {
        1.0 - (distance - SAME_PLACE_KM) / (MAX_PLACE_KM - SAME_PLACE_KM)
    }
}
