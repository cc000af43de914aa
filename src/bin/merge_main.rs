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

    info!("Starting duplicate merge and dataset regeneration.");

    let mut config = PipelineConfig::from_env()?;
    if let Some(report_path) = std::env::args().nth(1) {
        config.report_path = PathBuf::from(report_path);
    }
    info!(
        "Base dir: {:?}, output dir: {:?}, report: {:?}",
        config.base_dir, config.output_dir, config.report_path
    );

    // Output directory failures abort the run with a non-zero exit
    let summary = pipeline::run_merge(&config).await?;

    info!("Merge run {} completed.", summary.run_id);
    println!("\n🔍 Scanned {} records", summary.records);
    println!("🔗 Merged {} duplicate clusters ({} pairs)", summary.merged_clusters, summary.duplicate_pairs);
    println!("📁 Canonical dataset written to {:?}", config.resolve(&config.output_dir));
    println!("📝 Report written to {:?}", summary.report_path);

    Ok(())
}
