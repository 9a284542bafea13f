use std::path::PathBuf;

use thiserror::Error;

use crate::transform::CropBox;

/// Errors raised while extracting photos from a scan
#[derive(Debug, Error)]
pub enum CropError {
    #[error("could not read {path:?}: {source}")]
    InputDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A candidate reached tilt estimation without exactly four corners
    #[error("expected a quadrilateral with 4 corners, got {0}")]
    CornerCount(usize),

    #[error("file exists already: {0:?}")]
    OutputExists(PathBuf),

    #[error("crop box {0:?} lies outside the rotated image")]
    EmptyCrop(CropBox),

    #[error("failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CropError {
    /// Errors that only invalidate one candidate rather than the whole scan
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, CropError::CornerCount(_) | CropError::EmptyCrop(_))
    }
}

pub type Result<T> = std::result::Result<T, CropError>;
