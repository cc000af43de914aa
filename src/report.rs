// report.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::info;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use crate::completeness::CompletenessRow;
use crate::models::{ContentRecord, ContentType, DuplicateCandidatePair, MergedRecord, StandardizationAction};
use crate::similarity::haversine_km;

const LOWEST_COMPLETENESS_LISTED: usize = 10;

/// Everything the Markdown report can show. Sections with no data are omitted,
/// except the duplicate listing which always appears.
pub struct ReportInput<'a> {
    pub run_id: &'a str,
    pub generated_at: DateTime<Local>,
    pub record_counts: &'a BTreeMap<ContentType, usize>,
    pub pairs: &'a [DuplicateCandidatePair],
    pub merges: &'a [MergedRecord],
    pub standardization: &'a [StandardizationAction],
    pub completeness: &'a [CompletenessRow],
}

/// Pairs sorted by content type, then by descending similarity.
pub fn sorted_pairs(pairs: &[DuplicateCandidatePair]) -> Vec<&DuplicateCandidatePair> {
    let mut sorted: Vec<&DuplicateCandidatePair> = pairs.iter().collect();
    sorted.sort_by(|a, b| {
        a.content_type
            .cmp(&b.content_type)
            .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal))
    });
    sorted
}

pub fn render_report(input: &ReportInput) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "# Duplicate Content Report")?;
    writeln!(out)?;
    writeln!(out, "- Generated: {}", input.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "- Run: `{}`", input.run_id)?;
    writeln!(out)?;

    render_summary(&mut out, input)?;
    render_pairs(&mut out, input.pairs)?;
    if !input.merges.is_empty() {
        render_merges(&mut out, input.merges)?;
    }
    if !input.standardization.is_empty() {
        render_standardization(&mut out, input.standardization)?;
    }
    if !input.completeness.is_empty() {
        render_completeness(&mut out, input.completeness)?;
    }
    Ok(out)
}

fn render_summary(out: &mut String, input: &ReportInput) -> Result<()> {
    let mut pair_counts: BTreeMap<ContentType, usize> = BTreeMap::new();
    for pair in input.pairs {
        *pair_counts.entry(pair.content_type).or_default() += 1;
    }
    let mut merge_counts: BTreeMap<ContentType, usize> = BTreeMap::new();
    for merged in input.merges {
        *merge_counts.entry(merged.record.content_type).or_default() += 1;
    }

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "| Content type | Records | Duplicate pairs | Merged clusters |")?;
    writeln!(out, "|---|---:|---:|---:|")?;
    for content_type in ContentType::ALL {
        writeln!(
            out,
            "| {} | {} | {} | {} |",
            content_type,
            input.record_counts.get(&content_type).copied().unwrap_or(0),
            pair_counts.get(&content_type).copied().unwrap_or(0),
            merge_counts.get(&content_type).copied().unwrap_or(0),
        )?;
    }
    writeln!(
        out,
        "| **total** | {} | {} | {} |",
        input.record_counts.values().sum::<usize>(),
        input.pairs.len(),
        input.merges.len()
    )?;
    writeln!(out)?;
    Ok(())
}

fn render_pairs(out: &mut String, pairs: &[DuplicateCandidatePair]) -> Result<()> {
    writeln!(out, "## Duplicates")?;
    writeln!(out)?;
    if pairs.is_empty() {
        writeln!(out, "No duplicates found.")?;
        writeln!(out)?;
        return Ok(());
    }

    let mut current: Option<ContentType> = None;
    let mut number = 0;
    for pair in sorted_pairs(pairs) {
        if current != Some(pair.content_type) {
            current = Some(pair.content_type);
            number = 0;
            writeln!(out, "### {}", pair.content_type)?;
            writeln!(out)?;
        }
        number += 1;
        writeln!(
            out,
            "#### {}. {} / {} ({:.1}%)",
            number,
            pair.first.label(),
            pair.second.label(),
            pair.similarity * 100.0
        )?;
        writeln!(out)?;
        writeln!(out, "- Reason: {}", pair.reason)?;
        writeln!(out, "- First: {}", describe(&pair.first))?;
        writeln!(out, "- Second: {}", describe(&pair.second))?;
        if pair.content_type == ContentType::Cols {
            render_col_deltas(out, &pair.first, &pair.second)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn describe(record: &ContentRecord) -> String {
    format!(
        "`{}` from `{}` (entry {})",
        record.id().unwrap_or_else(|| "-".to_string()),
        record.source.display(),
        record.source_index
    )
}

fn render_col_deltas(out: &mut String, first: &ContentRecord, second: &ContentRecord) -> Result<()> {
    match (first.altitude(), second.altitude()) {
        (Some(a), Some(b)) => writeln!(out, "- Altitude: {} m vs {} m (difference {} m)", a, b, (a - b).abs())?,
        (a, b) => writeln!(out, "- Altitude: {} vs {}", fmt_opt_altitude(a), fmt_opt_altitude(b))?,
    }
    match (first.coordinates(), second.coordinates()) {
        (Some(a), Some(b)) => writeln!(
            out,
            "- Coordinates: {:.5}, {:.5} vs {:.5}, {:.5} ({:.2} km apart)",
            a.lat,
            a.lng,
            b.lat,
            b.lng,
            haversine_km(a, b)
        )?,
        (a, b) => writeln!(
            out,
            "- Coordinates: {} vs {}",
            a.map(|p| format!("{:.5}, {:.5}", p.lat, p.lng)).unwrap_or_else(|| "missing".to_string()),
            b.map(|p| format!("{:.5}, {:.5}", p.lat, p.lng)).unwrap_or_else(|| "missing".to_string())
        )?,
    }
    Ok(())
}

fn fmt_opt_altitude(value: Option<f64>) -> String {
    value.map(|v| format!("{} m", v)).unwrap_or_else(|| "missing".to_string())
}

fn render_merges(out: &mut String, merges: &[MergedRecord]) -> Result<()> {
    writeln!(out, "## Merge results")?;
    writeln!(out)?;
    writeln!(
        out,
        "Conflicting values are settled heuristically (primary value kept, longer text preferred). \
         Review the flagged conflicts below."
    )?;
    writeln!(out)?;
    for merged in merges {
        writeln!(
            out,
            "### {} `{}`",
            merged.record.content_type.record_label(),
            merged.primary_id.as_deref().unwrap_or("-")
        )?;
        writeln!(out)?;
        writeln!(out, "- Name: {}", merged.record.label())?;
        writeln!(
            out,
            "- Merged ids: {}",
            if merged.merged_ids.is_empty() { "-".to_string() } else { merged.merged_ids.join(", ") }
        )?;
        let sources: Vec<String> = merged.sources.iter().map(|s| format!("`{}`", s.display())).collect();
        writeln!(out, "- Sources: {}", sources.join(", "))?;
        if merged.conflicts.is_empty() {
            writeln!(out, "- Conflicts: none")?;
        } else {
            writeln!(out, "- Conflicts: {}", merged.conflicts.len())?;
            writeln!(out)?;
            writeln!(out, "| Field | Kept | Discarded |")?;
            writeln!(out, "|---|---|---|")?;
            for conflict in &merged.conflicts {
                writeln!(
                    out,
                    "| `{}` | {} | {} |",
                    conflict.path,
                    table_cell(&conflict.kept.to_string()),
                    table_cell(&conflict.discarded.to_string())
                )?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn render_standardization(out: &mut String, actions: &[StandardizationAction]) -> Result<()> {
    writeln!(out, "## Standardization")?;
    writeln!(out)?;
    writeln!(out, "| Record | Field | Action |")?;
    writeln!(out, "|---|---|---|")?;
    for action in actions {
        writeln!(out, "| {} | `{}` | {} |", table_cell(&action.record), action.field, table_cell(&action.description))?;
    }
    writeln!(out)?;
    Ok(())
}

fn render_completeness(out: &mut String, rows: &[CompletenessRow]) -> Result<()> {
    writeln!(out, "## Completeness")?;
    writeln!(out)?;
    writeln!(out, "| Content type | Records | Average completeness |")?;
    writeln!(out, "|---|---:|---:|")?;
    for content_type in ContentType::ALL {
        let scores: Vec<f64> = rows.iter().filter(|r| r.content_type == content_type).map(|r| r.score).collect();
        if scores.is_empty() {
            continue;
        }
        let average = scores.iter().sum::<f64>() / scores.len() as f64;
        writeln!(out, "| {} | {} | {:.1}% |", content_type, scores.len(), average)?;
    }
    writeln!(out)?;

    let mut lowest: Vec<&CompletenessRow> = rows.iter().collect();
    lowest.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
    writeln!(out, "### Least complete records")?;
    writeln!(out)?;
    writeln!(out, "| Record | Type | Completeness | Missing |")?;
    writeln!(out, "|---|---|---:|---|")?;
    for row in lowest.into_iter().take(LOWEST_COMPLETENESS_LISTED) {
        writeln!(
            out,
            "| {} | {} | {:.1}% | {} |",
            table_cell(&row.label),
            row.content_type,
            row.score,
            row.missing.join(", ")
        )?;
    }
    writeln!(out)?;
    Ok(())
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub async fn write_report(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create report directory {:?}", parent))?;
    }
    tokio::fs::write(path, markdown)
        .await
        .with_context(|| format!("Failed to write report {:?}", path))?;
    info!("Report written to {:?}", path);
    Ok(())
}
