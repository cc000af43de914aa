use anyhow::Result;
use log::info;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

use crate::completeness::CompletenessRow;
use crate::models::DuplicateCandidatePair;
use crate::report::sorted_pairs;

/// Writes the duplicate pairs and per-record completeness to an Excel file
/// with one sheet each.
pub async fn write_duplicates_workbook(
    file_path: &Path,
    pairs: &[DuplicateCandidatePair],
    completeness: &[CompletenessRow],
) -> Result<()> {
    info!("Initializing Excel workbook for file: {:?}", file_path);
    let mut workbook = Workbook::new();

    let pairs_sheet = workbook.add_worksheet();
    write_duplicates_sheet(pairs_sheet, pairs)?;

    let completeness_sheet = workbook.add_worksheet();
    write_completeness_sheet(completeness_sheet, completeness)?;

    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    info!("Saving Excel workbook...");
    workbook.save(file_path)?;
    info!("Excel file saved successfully to {:?}", file_path);
    Ok(())
}

/// Helper function to write the "Duplicates" sheet.
fn write_duplicates_sheet(sheet: &mut Worksheet, pairs: &[DuplicateCandidatePair]) -> Result<()> {
    sheet.set_name("Duplicates")?;
    sheet.set_column_width(1, 30)?;
    sheet.set_column_width(4, 30)?;

    let headers = [
        "content_type",
        "first_name",
        "first_id",
        "first_source",
        "second_name",
        "second_id",
        "second_source",
        "similarity",
        "reason",
        "altitude_delta_m",
    ];
    for (col_num, header) in headers.iter().enumerate() {
        sheet.write_string(0, col_num as u16, *header)?;
    }

    let percentage_format = Format::new().set_num_format("0.0%");
    for (row_num, pair) in sorted_pairs(pairs).into_iter().enumerate() {
        let current_row = (row_num + 1) as u32; // +1 for header row
        sheet.write_string(current_row, 0, pair.content_type.as_str())?;
        sheet.write_string(current_row, 1, pair.first.label())?;
        sheet.write_string(current_row, 2, pair.first.id().unwrap_or_default())?;
        sheet.write_string(current_row, 3, pair.first.source.display().to_string())?;
        sheet.write_string(current_row, 4, pair.second.label())?;
        sheet.write_string(current_row, 5, pair.second.id().unwrap_or_default())?;
        sheet.write_string(current_row, 6, pair.second.source.display().to_string())?;
        sheet.write_number_with_format(current_row, 7, pair.similarity, &percentage_format)?;
        sheet.write_string(current_row, 8, pair.reason.to_string())?;
        if let (Some(a), Some(b)) = (pair.first.altitude(), pair.second.altitude()) {
            sheet.write_number(current_row, 9, (a - b).abs())?;
        }
    }
    info!("'Duplicates' sheet written with {} rows.", pairs.len());
    Ok(())
}

/// Helper function to write the "Completeness" sheet.
fn write_completeness_sheet(sheet: &mut Worksheet, rows: &[CompletenessRow]) -> Result<()> {
    sheet.set_name("Completeness")?;
    sheet.set_column_width(0, 30)?;
    sheet.set_column_width(5, 50)?;

    let headers = ["record", "content_type", "id", "source", "completeness", "missing_fields"];
    for (col_num, header) in headers.iter().enumerate() {
        sheet.write_string(0, col_num as u16, *header)?;
    }

    let score_format = Format::new().set_num_format("0.0");
    for (row_num, row) in rows.iter().enumerate() {
        let current_row = (row_num + 1) as u32;
        sheet.write_string(current_row, 0, &row.label)?;
        sheet.write_string(current_row, 1, row.content_type.as_str())?;
        sheet.write_string(current_row, 2, row.id.as_deref().unwrap_or(""))?;
        sheet.write_string(current_row, 3, &row.source)?;
        sheet.write_number_with_format(current_row, 4, row.score, &score_format)?;
        sheet.write_string(current_row, 5, row.missing.join(", "))?;
    }
    info!("'Completeness' sheet written with {} rows.", rows.len());
    Ok(())
}
