// dataset_writer.rs
use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::{ContentRecord, ContentType};
use crate::standardize::slugify;

#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub directory: PathBuf,
    pub files_written: usize,
    pub index_path: PathBuf,
}

/// File stem for a record: its slug, else its id, else its name, made
/// filesystem-safe. Falls back to the source position.
fn file_stem(record: &ContentRecord) -> String {
    let candidate = record
        .slug()
        .map(str::to_string)
        .or_else(|| record.id())
        .or_else(|| record.name().map(str::to_string))
        .map(|s| slugify(&s))
        .unwrap_or_default();
    if candidate.is_empty() {
        format!("record-{}", record.source_index)
    } else {
        candidate
    }
}

fn unique_stem(stem: String, used: &mut HashSet<String>) -> String {
    if used.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let next = format!("{}-{}", stem, n);
        if used.insert(next.clone()) {
            return next;
        }
        n += 1;
    }
}

/// Removes the `.json` files a previous run left in `directory`. Other
/// files are not touched.
async fn remove_stale_files(directory: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .with_context(|| format!("Failed to read output directory {:?}", directory))?;
    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to list output directory {:?}", directory))?
    {
        let path = entry.path();
        let is_json = path.extension().map_or(false, |ext| ext == "json");
        if is_json && entry.file_type().await.map_or(false, |t| t.is_file()) {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove stale file {:?}", path))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Writes `<output_dir>/<type>/<slug>.json` for every record plus an
/// `index.json` array with all of them. Directory creation failures are
/// returned to the caller; a run cannot continue without its output.
pub async fn write_dataset(output_dir: &Path, content_type: ContentType, records: &[ContentRecord]) -> Result<WriteSummary> {
    let directory = output_dir.join(content_type.as_str());
    tokio::fs::create_dir_all(&directory)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", directory))?;
    let removed = remove_stale_files(&directory).await?;
    if removed > 0 {
        debug!("Removed {} files from a previous run in {:?}", removed, directory);
    }

    let mut used: HashSet<String> = HashSet::new();
    // index.json is reserved
    used.insert("index".to_string());

    let mut files_written = 0;
    for record in records {
        let stem = unique_stem(file_stem(record), &mut used);
        let path = directory.join(format!("{}.json", stem));
        let body = serde_json::to_string_pretty(&record.to_value())
            .with_context(|| format!("Failed to serialize record '{}'", record.label()))?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        files_written += 1;
    }

    let index: Vec<Value> = records.iter().map(ContentRecord::to_value).collect();
    let index_path = directory.join("index.json");
    let body = serde_json::to_string_pretty(&index).context("Failed to serialize index")?;
    tokio::fs::write(&index_path, body)
        .await
        .with_context(|| format!("Failed to write {:?}", index_path))?;

    info!("Wrote {} {} records and index to {:?}", files_written, content_type, directory);
    Ok(WriteSummary { directory, files_written, index_path })
}
