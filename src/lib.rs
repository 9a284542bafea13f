pub mod candidates;
pub mod cli;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod photos;
pub mod transform;

pub use candidates::{find_photos, BorderMargins};
pub use cli::Cli;
pub use detection::{CandidateDetector, DetectorConfig, SquareDetector};
pub use error::{CropError, Result};
pub use geometry::{Point, Quad};
pub use photos::{extract_photos, output_path, CropOptions, CropReport};
pub use transform::{Correction, CropBox};
