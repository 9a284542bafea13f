use clap::Parser;
use std::path::PathBuf;

use crate::photos::CropOptions;

#[derive(Parser, Debug)]
#[command(name = "photo-crop")]
#[command(version, about = "Crop out individual photos from a scan")]
pub struct Cli {
    /// Scanned image containing one or more photos
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Output compression quality (JPEG only)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Overwrite existing output files
    #[arg(long)]
    pub force: bool,

    /// Log every pipeline stage
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    pub fn options(&self) -> CropOptions {
        CropOptions {
            quality: self.quality,
            force: self.force,
            ..Default::default()
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
