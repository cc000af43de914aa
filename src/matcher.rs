// matcher.rs
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::config::MatchingConfig;
use crate::models::{ContentRecord, ContentType, DuplicateCandidatePair, MatchOutcome, MatchReason};
use crate::similarity::{
    location_similarity, name_similarity, COL_STOP_WORDS, RECIPE_STOP_WORDS, TRAINING_STOP_WORDS,
};

fn stop_words_for<'a>(content_type: ContentType, config: &'a MatchingConfig) -> Vec<&'a str> {
    let base: &[&str] = match content_type {
        ContentType::Cols => &COL_STOP_WORDS,
        ContentType::Nutrition => &RECIPE_STOP_WORDS,
        ContentType::Training => &TRAINING_STOP_WORDS,
    };
    base.iter()
        .copied()
        .chain(config.extra_stop_words.iter().map(String::as_str))
        .collect()
}

/// Decides whether two records describe the same thing.
///
/// Rules, in order: an identical non-empty id is a duplicate with similarity
/// 1.0; otherwise the name similarity must reach the type's threshold, and for
/// types with a location threshold (cols) the positions must agree as well.
pub fn are_duplicates(
    first: &ContentRecord,
    second: &ContentRecord,
    content_type: ContentType,
    config: &MatchingConfig,
) -> MatchOutcome {
    if let (Some(a), Some(b)) = (first.id(), second.id()) {
        if a == b {
            return MatchOutcome { is_duplicate: true, reason: MatchReason::SameId, similarity: 1.0 };
        }
    }

    let thresholds = config.thresholds_for(content_type);
    let stop_words = stop_words_for(content_type, config);
    let name_score = match (first.name(), second.name()) {
        (Some(a), Some(b)) => name_similarity(a, b, &stop_words),
        _ => 0.0,
    };

    if name_score < thresholds.name {
        return MatchOutcome { is_duplicate: false, reason: MatchReason::NotSimilar, similarity: name_score };
    }

    match thresholds.location {
        None => MatchOutcome { is_duplicate: true, reason: MatchReason::Name, similarity: name_score },
        Some(location_threshold) => {
            let location_score = location_similarity(first.coordinates(), second.coordinates());
            if location_score >= location_threshold {
                MatchOutcome {
                    is_duplicate: true,
                    reason: MatchReason::NameAndLocation,
                    similarity: name_score,
                }
            } else {
                debug!(
                    "Names '{}' and '{}' match ({:.2}) but location similarity is {:.2}",
                    first.label(),
                    second.label(),
                    name_score,
                    location_score
                );
                MatchOutcome {
                    is_duplicate: false,
                    reason: MatchReason::NameOnlyRejected,
                    similarity: name_score,
                }
            }
        }
    }
}

/// Compares every pair of records of one content type.
pub fn find_duplicates(
    records: &[ContentRecord],
    content_type: ContentType,
    config: &MatchingConfig,
) -> Vec<DuplicateCandidatePair> {
    let total_pairs = records.len().saturating_sub(1) * records.len() / 2;
    info!("Comparing {} {} records ({} pairs)...", records.len(), content_type, total_pairs);

    let progress = if config.show_progress && total_pairs > 0 {
        let bar = ProgressBar::new(total_pairs as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(format!("Matching {}", content_type));
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut pairs = Vec::new();
    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            let outcome = are_duplicates(&records[i], &records[j], content_type, config);
            if outcome.is_duplicate {
                debug!(
                    "Duplicate {}: '{}' ~ '{}' ({}, {:.3})",
                    content_type,
                    records[i].label(),
                    records[j].label(),
                    outcome.reason,
                    outcome.similarity
                );
                pairs.push(DuplicateCandidatePair {
                    content_type,
                    first_index: i,
                    second_index: j,
                    first: records[i].clone(),
                    second: records[j].clone(),
                    similarity: outcome.similarity,
                    reason: outcome.reason,
                });
            }
        }
        progress.inc((records.len() - i - 1) as u64);
    }
    progress.finish_and_clear();

    info!("Found {} duplicate {} pairs.", pairs.len(), content_type);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    fn record(content_type: ContentType, value: Value) -> ContentRecord {
        ContentRecord::from_value(content_type, value, PathBuf::from("test.json"), 0).unwrap()
    }

    fn quiet() -> MatchingConfig {
        MatchingConfig { show_progress: false, ..MatchingConfig::default() }
    }

    #[test]
    fn test_same_id_is_duplicate() {
        let a = record(ContentType::Nutrition, json!({"id": "r-1", "name": "Banana bread"}));
        let b = record(ContentType::Nutrition, json!({"id": "r-1", "name": "Quinoa salad"}));
        let outcome = are_duplicates(&a, &b, ContentType::Nutrition, &quiet());
        assert!(outcome.is_duplicate);
        assert_eq!(outcome.similarity, 1.0);
        assert_eq!(outcome.reason, MatchReason::SameId);
    }

    #[test]
    fn test_empty_ids_are_not_matched() {
        let a = record(ContentType::Training, json!({"id": "", "name": "Base"}));
        let b = record(ContentType::Training, json!({"id": "", "name": "Sweet spot"}));
        assert!(!are_duplicates(&a, &b, ContentType::Training, &quiet()).is_duplicate);
    }

    #[test]
    fn test_stelvio_cols_match_on_name_and_location() {
        let a = record(
            ContentType::Cols,
            json!({"id": "stelvio-pass", "name": "Stelvio Pass", "altitude": 2758, "coordinates": {"lat": 46.5286, "lng": 10.4531}}),
        );
        let b = record(
            ContentType::Cols,
            json!({"id": "passo-dello-stelvio", "name": "Passo dello Stelvio", "altitude": 2758,
                   "images": ["x.jpg"], "coordinates": {"lat": 46.5287, "lng": 10.4532}}),
        );
        let outcome = are_duplicates(&a, &b, ContentType::Cols, &quiet());
        assert!(outcome.is_duplicate);
        assert_eq!(outcome.reason, MatchReason::NameAndLocation);
    }

    #[test]
    fn test_col_name_match_without_location_is_rejected() {
        let a = record(ContentType::Cols, json!({"id": "a", "name": "Col du Galibier"}));
        let b = record(ContentType::Cols, json!({"id": "b", "name": "Col du Galibier", "coordinates": [45.06, 6.41]}));
        let outcome = are_duplicates(&a, &b, ContentType::Cols, &quiet());
        assert!(!outcome.is_duplicate);
        assert_eq!(outcome.reason, MatchReason::NameOnlyRejected);
    }

    #[test]
    fn test_col_name_match_far_apart_is_rejected() {
        // two different "Col de la Croix" climbs
        let a = record(ContentType::Cols, json!({"id": "a", "name": "Col de la Croix", "coordinates": [46.33, 7.12]}));
        let b = record(ContentType::Cols, json!({"id": "b", "name": "Col de la Croix", "coordinates": [45.99, 6.60]}));
        assert!(!are_duplicates(&a, &b, ContentType::Cols, &quiet()).is_duplicate);
    }

    #[test]
    fn test_low_name_similarity_ignores_shared_fields() {
        let a = record(
            ContentType::Cols,
            json!({"id": "a", "name": "Col du Tourmalet", "altitude": 2115, "coordinates": [42.9086, 0.1456], "region": "Pyrenees"}),
        );
        let b = record(
            ContentType::Cols,
            json!({"id": "b", "name": "Col d'Aubisque", "altitude": 2115, "coordinates": [42.9086, 0.1456], "region": "Pyrenees"}),
        );
        let outcome = are_duplicates(&a, &b, ContentType::Cols, &quiet());
        assert!(!outcome.is_duplicate);
        assert!(outcome.similarity < 0.8);
    }

    #[test]
    fn test_recipes_half_similar_are_not_duplicates() {
        let a = record(ContentType::Nutrition, json!({"id": "1", "name": "Rice cakes"}));
        let b = record(ContentType::Nutrition, json!({"id": "2", "name": "Rice pudding"}));
        let outcome = are_duplicates(&a, &b, ContentType::Nutrition, &quiet());
        assert!(!outcome.is_duplicate);
        assert!(outcome.similarity > 0.3 && outcome.similarity < 0.8, "got {}", outcome.similarity);
    }

    #[test]
    fn test_recipes_match_on_name_alone() {
        let a = record(ContentType::Nutrition, json!({"id": "1", "name": "Banana Oat Bars"}));
        let b = record(ContentType::Nutrition, json!({"id": "2", "name": "Banana oat bar"}));
        let outcome = are_duplicates(&a, &b, ContentType::Nutrition, &quiet());
        assert!(outcome.is_duplicate);
        assert_eq!(outcome.reason, MatchReason::Name);
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let a = record(ContentType::Nutrition, json!({"id": "1", "name": "Rice cakes"}));
        let b = record(ContentType::Nutrition, json!({"id": "2", "name": "Rice pudding"}));
        let mut config = quiet();
        config.thresholds.get_mut(&ContentType::Nutrition).unwrap().name = 0.3;
        assert!(are_duplicates(&a, &b, ContentType::Nutrition, &config).is_duplicate);
    }

    #[test]
    fn test_find_duplicates_reports_indexes() {
        let records = vec![
            record(ContentType::Training, json!({"id": "a", "name": "Sweet Spot Base"})),
            record(ContentType::Training, json!({"id": "b", "name": "Gran Fondo Prep"})),
            record(ContentType::Training, json!({"id": "c", "name": "Sweet spot base plan"})),
        ];
        let pairs = find_duplicates(&records, ContentType::Training, &quiet());
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].first_index, pairs[0].second_index), (0, 2));
        assert!(find_duplicates(&[], ContentType::Training, &quiet()).is_empty());
    }
}
