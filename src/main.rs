use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use photo_crop::{extract_photos, Cli, SquareDetector};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let detector = SquareDetector::default();
    let report = extract_photos(&cli.input, &detector, &cli.options())
        .with_context(|| format!("Failed to crop photos from {:?}", cli.input))?;

    if !report.skipped.is_empty() {
        tracing::warn!(skipped = ?report.skipped, "Some candidates were skipped");
    }
    tracing::info!(saved = report.saved.len(), "Done");

    Ok(())
}
