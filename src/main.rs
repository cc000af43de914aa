use anyhow::Result;
use log::info;
use std::path::PathBuf;

use col_dedup::config::PipelineConfig;
use col_dedup::env_loader;
use col_dedup::pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    info!("Starting duplicate content detection.");

    let mut config = PipelineConfig::from_env()?;
    // Optional positional argument overrides the report path
    if let Some(report_path) = std::env::args().nth(1) {
        config.report_path = PathBuf::from(report_path);
    }
    info!(
        "Base dir: {:?}, report: {:?}, spreadsheet: {:?}",
        config.base_dir, config.report_path, config.xlsx_path
    );

    let summary = pipeline::run_detect(&config).await?;

    info!("Detection run {} completed.", summary.run_id);
    println!("\n🔍 Scanned {} records", summary.records);
    println!("📋 Found {} duplicate pairs", summary.duplicate_pairs);
    println!("📝 Report written to {:?}", summary.report_path);

    Ok(())
}
