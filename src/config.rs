// config.rs
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::ContentType;

pub const DEFAULT_NAME_THRESHOLD: f64 = 0.8;
pub const DEFAULT_LOCATION_THRESHOLD: f64 = 0.95;

/// Per content type matching thresholds. `location` is only consulted when
/// set; cols carry one by default, recipes and training plans do not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeThresholds {
    pub name: f64,
    pub location: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub thresholds: BTreeMap<ContentType, TypeThresholds>,
    /// Extra words stripped before the "core name" comparison.
    pub extra_stop_words: Vec<String>,
    pub show_progress: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            ContentType::Cols,
            TypeThresholds { name: DEFAULT_NAME_THRESHOLD, location: Some(DEFAULT_LOCATION_THRESHOLD) },
        );
        thresholds.insert(ContentType::Nutrition, TypeThresholds { name: DEFAULT_NAME_THRESHOLD, location: None });
        thresholds.insert(ContentType::Training, TypeThresholds { name: DEFAULT_NAME_THRESHOLD, location: None });
        MatchingConfig { thresholds, extra_stop_words: Vec::new(), show_progress: true }
    }
}

impl MatchingConfig {
    pub fn thresholds_for(&self, content_type: ContentType) -> TypeThresholds {
        self.thresholds
            .get(&content_type)
            .copied()
            .unwrap_or(TypeThresholds { name: DEFAULT_NAME_THRESHOLD, location: None })
    }
}

/// Knobs of the deep merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePolicy {
    /// Fields always taken from the primary record.
    pub identity_fields: Vec<String>,
    /// String fields where the longer non-empty value wins.
    pub prefer_longer_fields: Vec<String>,
    /// Keys tried in order to identify an object inside an array.
    pub array_item_keys: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            identity_fields: to_strings(&["id", "slug", "name"]),
            prefer_longer_fields: to_strings(&["description", "summary", "history", "content", "instructions", "notes"]),
            array_item_keys: to_strings(&["url", "src", "id", "slug", "name"]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Files to read for each content type, relative to `base_dir` unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable(pub BTreeMap<ContentType, Vec<PathBuf>>);

impl Default for SourceTable {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            ContentType::Cols,
            vec![
                PathBuf::from("src/data/cols.json"),
                PathBuf::from("src/data/colsData.js"),
                PathBuf::from("server/data/cols-enriched.json"),
            ],
        );
        table.insert(
            ContentType::Nutrition,
            vec![
                PathBuf::from("src/data/nutritionRecipes.js"),
                PathBuf::from("server/data/recipes.json"),
            ],
        );
        table.insert(
            ContentType::Training,
            vec![
                PathBuf::from("src/data/trainingPlans.js"),
                PathBuf::from("server/data/training-plans.json"),
            ],
        );
        SourceTable(table)
    }
}

impl SourceTable {
    pub fn paths_for(&self, content_type: ContentType) -> &[PathBuf] {
        self.0.get(&content_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn load(path: &Path) -> Result<SourceTable> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sources table {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse sources table {:?}", path))
    }
}

/// Everything one run needs, passed explicitly into each stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub output_dir: PathBuf,
    pub report_path: PathBuf,
    pub xlsx_path: Option<PathBuf>,
    pub sources: SourceTable,
    pub matching: MatchingConfig,
    pub merge: MergePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            base_dir: PathBuf::from("."),
            output_dir: PathBuf::from("data/canonical"),
            report_path: PathBuf::from("duplicate-content-report.md"),
            xlsx_path: None,
            sources: SourceTable::default(),
            matching: MatchingConfig::default(),
            merge: MergePolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Builds the configuration from `DEDUP_*` environment variables.
    /// Bad values are logged and the default is kept.
    pub fn from_env() -> Result<PipelineConfig> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<PipelineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = PipelineConfig::default();

        if let Some(dir) = lookup("DEDUP_BASE_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DEDUP_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("DEDUP_REPORT_PATH") {
            config.report_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("DEDUP_XLSX_PATH") {
            config.xlsx_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("DEDUP_SOURCES_FILE") {
            config.sources = SourceTable::load(Path::new(&path))?;
            info!("Loaded sources table from {}", path);
        }

        if let Some(value) = parse_threshold(&lookup, "DEDUP_NAME_THRESHOLD") {
            for thresholds in config.matching.thresholds.values_mut() {
                thresholds.name = value;
            }
        }
        for content_type in ContentType::ALL {
            let key = format!("DEDUP_{}_NAME_THRESHOLD", content_type.as_str().to_uppercase());
            if let Some(value) = parse_threshold(&lookup, &key) {
                config.matching.thresholds.entry(content_type).or_insert(TypeThresholds {
                    name: DEFAULT_NAME_THRESHOLD,
                    location: None,
                }).name = value;
            }
        }
        if let Some(value) = parse_threshold(&lookup, "DEDUP_LOCATION_THRESHOLD") {
            if let Some(cols) = config.matching.thresholds.get_mut(&ContentType::Cols) {
                cols.location = Some(value);
            }
        }
        if let Some(words) = lookup("DEDUP_STOP_WORDS") {
            config.matching.extra_stop_words = words
                .split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect();
        }
        if let Some(flag) = lookup("DEDUP_PROGRESS") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => config.matching.show_progress = false,
                "1" | "true" | "yes" | "on" => config.matching.show_progress = true,
                other => warn!("Ignoring DEDUP_PROGRESS={}, expected true/false", other),
            }
        }

        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn parse_threshold<F>(lookup: &F, key: &str) -> Option<f64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if (0.0..=1.0).contains(&value) => Some(value),
        _ => {
            warn!("Ignoring {}={}, expected a number between 0 and 1", key, raw);
            None
        }
    }
}
