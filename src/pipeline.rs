// pipeline.rs
use anyhow::Result;
use chrono::Local;
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use uuid::Uuid;

use crate::clustering::cluster_duplicates;
use crate::completeness::{completeness_rows, CompletenessRow};
use crate::config::{MergePolicy, PipelineConfig};
use crate::dataset_writer::write_dataset;
use crate::excel_writer::write_duplicates_workbook;
use crate::extractor::load_sources;
use crate::matcher::find_duplicates;
use crate::merge::merge_cluster;
use crate::models::{ContentRecord, ContentType, DuplicateCandidatePair, MergedRecord, StandardizationAction};
use crate::report::{render_report, write_report, ReportInput};
use crate::standardize::standardize;

/// Records loaded for one run and the duplicate pairs found among them.
pub struct DetectionRun {
    pub run_id: String,
    pub records: BTreeMap<ContentType, Vec<ContentRecord>>,
    pub pairs: Vec<DuplicateCandidatePair>,
}

impl DetectionRun {
    pub fn record_counts(&self) -> BTreeMap<ContentType, usize> {
        self.records.iter().map(|(t, r)| (*t, r.len())).collect()
    }

    pub fn all_records(&self) -> Vec<ContentRecord> {
        self.records.values().flatten().cloned().collect()
    }
}

pub struct MergeOutcome {
    pub canonical: BTreeMap<ContentType, Vec<ContentRecord>>,
    pub merges: Vec<MergedRecord>,
    pub standardization: Vec<StandardizationAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub records: usize,
    pub duplicate_pairs: usize,
    pub merged_clusters: usize,
    pub report_path: PathBuf,
}

/// Matches already-loaded records; every content type is compared separately.
pub fn detect_in(records: BTreeMap<ContentType, Vec<ContentRecord>>, config: &PipelineConfig) -> DetectionRun {
    let run_id = Uuid::new_v4().to_string();
    let mut pairs = Vec::new();
    for (content_type, items) in &records {
        pairs.extend(find_duplicates(items, *content_type, &config.matching));
    }
    DetectionRun { run_id, records, pairs }
}

pub async fn detect(config: &PipelineConfig) -> DetectionRun {
    let records = load_sources(config).await;
    detect_in(records, config)
}

/// Collapses every duplicate cluster into one merged record, keeping the
/// position of the cluster's first member, then standardizes the result.
pub fn merge_duplicates(run: &DetectionRun, policy: &MergePolicy) -> MergeOutcome {
    let mut canonical = BTreeMap::new();
    let mut merges = Vec::new();
    let mut standardization = Vec::new();

    for (content_type, records) in &run.records {
        let type_pairs: Vec<DuplicateCandidatePair> = run
            .pairs
            .iter()
            .filter(|p| p.content_type == *content_type)
            .cloned()
            .collect();
        let clusters = cluster_duplicates(records.len(), *content_type, &type_pairs);

        // first member index -> merged record; other members are dropped
        let mut merged_at: HashMap<usize, ContentRecord> = HashMap::new();
        let mut absorbed: HashMap<usize, usize> = HashMap::new();
        for cluster in &clusters {
            let members: Vec<&ContentRecord> = cluster.member_indexes.iter().map(|i| &records[*i]).collect();
            let Some(merged) = merge_cluster(&members, policy) else {
                warn!("Cluster {} could not be merged, keeping its records", cluster.label);
                continue;
            };
            let first = cluster.member_indexes[0];
            for index in &cluster.member_indexes[1..] {
                absorbed.insert(*index, first);
            }
            merged_at.insert(first, merged.record.clone());
            merges.push(merged);
        }

        let mut output = Vec::with_capacity(records.len() - absorbed.len());
        for (index, record) in records.iter().enumerate() {
            if absorbed.contains_key(&index) {
                continue;
            }
            let mut record = merged_at.remove(&index).unwrap_or_else(|| record.clone());
            standardization.extend(standardize(&mut record));
            output.push(record);
        }
        info!(
            "{}: {} records -> {} canonical records ({} clusters merged)",
            content_type,
            records.len(),
            output.len(),
            clusters.len()
        );
        canonical.insert(*content_type, output);
    }

    MergeOutcome { canonical, merges, standardization }
}

async fn publish_report(
    config: &PipelineConfig,
    run: &DetectionRun,
    merges: &[MergedRecord],
    standardization: &[StandardizationAction],
    completeness: &[CompletenessRow],
) -> Result<()> {
    let record_counts = run.record_counts();
    let markdown = render_report(&ReportInput {
        run_id: &run.run_id,
        generated_at: Local::now(),
        record_counts: &record_counts,
        pairs: &run.pairs,
        merges,
        standardization,
        completeness,
    })?;
    write_report(&config.report_path, &markdown).await?;

    if let Some(xlsx_path) = &config.xlsx_path {
        write_duplicates_workbook(xlsx_path, &run.pairs, completeness).await?;
    }
    Ok(())
}

/// load -> extract -> match -> report
pub async fn run_detect(config: &PipelineConfig) -> Result<RunSummary> {
    info!("Starting duplicate detection...");
    let run = detect(config).await;
    let completeness = completeness_rows(&run.all_records());
    publish_report(config, &run, &[], &[], &completeness).await?;

    Ok(RunSummary {
        run_id: run.run_id.clone(),
        records: run.record_counts().values().sum(),
        duplicate_pairs: run.pairs.len(),
        merged_clusters: 0,
        report_path: config.report_path.clone(),
    })
}

/// load -> extract -> match -> cluster -> merge -> standardize -> write -> report
pub async fn run_merge(config: &PipelineConfig) -> Result<RunSummary> {
    info!("Starting duplicate merge...");
    let run = detect(config).await;
    let outcome = merge_duplicates(&run, &config.merge);

    let output_dir = config.resolve(&config.output_dir);
    for (content_type, records) in &outcome.canonical {
        if records.is_empty() {
            info!("No {} records loaded, leaving {} output untouched", content_type, content_type);
            continue;
        }
        write_dataset(&output_dir, *content_type, records).await?;
    }

    let canonical: Vec<ContentRecord> = outcome.canonical.values().flatten().cloned().collect();
    let completeness = completeness_rows(&canonical);
    publish_report(config, &run, &outcome.merges, &outcome.standardization, &completeness).await?;

    Ok(RunSummary {
        run_id: run.run_id.clone(),
        records: run.record_counts().values().sum(),
        duplicate_pairs: run.pairs.len(),
        merged_clusters: outcome.merges.len(),
        report_path: config.report_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use serde_json::{json, Value};

    fn record(content_type: ContentType, value: Value, index: usize) -> ContentRecord {
        ContentRecord::from_value(content_type, value, PathBuf::from("mem.json"), index).unwrap()
    }

    fn quiet_config() -> PipelineConfig {
        PipelineConfig {
            matching: MatchingConfig { show_progress: false, ..MatchingConfig::default() },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_merge_collapses_chain_at_first_position() {
        let mut records = BTreeMap::new();
        records.insert(
            ContentType::Nutrition,
            vec![
                record(ContentType::Nutrition, json!({"id": "a", "name": "Banana Oat Bars"}), 0),
                record(ContentType::Nutrition, json!({"id": "b", "name": "Quinoa salad"}), 1),
                record(ContentType::Nutrition, json!({"id": "c", "name": "Banana oat bar", "images": ["bar.jpg"]}), 2),
                record(ContentType::Nutrition, json!({"id": "c", "name": "Banana-oat bar", "ingredients": ["oats"]}), 3),
            ],
        );
        let run = detect_in(records, &quiet_config());
        assert_eq!(run.pairs.len(), 3);

        let outcome = merge_duplicates(&run, &MergePolicy::default());
        let canonical = &outcome.canonical[&ContentType::Nutrition];
        assert_eq!(canonical.len(), 2);
        assert_eq!(outcome.merges.len(), 1);
        // most complete member (c, with images) is primary; placed where "a" was
        assert_eq!(canonical[0].id().as_deref(), Some("c"));
        assert_eq!(canonical[0].fields["images"], json!(["bar.jpg"]));
        assert_eq!(canonical[0].fields["ingredients"], json!(["oats"]));
        assert_eq!(canonical[1].id().as_deref(), Some("b"));
        assert_eq!(outcome.merges[0].merged_ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_merge_standardizes_output() {
        let mut records = BTreeMap::new();
        records.insert(
            ContentType::Training,
            vec![record(ContentType::Training, json!({"name": "Winter Base"}), 0)],
        );
        let run = detect_in(records, &quiet_config());
        let outcome = merge_duplicates(&run, &MergePolicy::default());
        let only = &outcome.canonical[&ContentType::Training][0];
        assert_eq!(only.slug(), Some("winter-base"));
        assert_eq!(only.id().as_deref(), Some("winter-base"));
        assert_eq!(outcome.standardization.len(), 2);
    }
}
