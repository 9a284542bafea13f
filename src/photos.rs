use std::fs::{File, OpenOptions};
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use tracing::{debug, info, warn};

use crate::candidates::{find_photos, BorderMargins};
use crate::detection::CandidateDetector;
use crate::error::{CropError, Result};
use crate::transform::Correction;

/// Settings for one extraction run
#[derive(Debug, Clone, Default)]
pub struct CropOptions {
    pub margins: BorderMargins,
    /// JPEG quality (1-100); other formats ignore it
    pub quality: Option<u8>,
    /// Overwrite existing output files
    pub force: bool,
}

/// What happened to the candidates of one scan
#[derive(Debug, Default)]
pub struct CropReport {
    pub saved: Vec<PathBuf>,
    /// Pipeline indices of candidates that could not be straightened
    pub skipped: Vec<usize>,
}

/// `<input without extension>.<index><extension>`, e.g. `scan.jpg` -> `scan.0.jpg`
pub fn output_path(input: &Path, index: usize) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

pub fn open_scan(path: &Path) -> Result<DynamicImage> {
    let decode_error = |source| CropError::InputDecode {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .map_err(|err| decode_error(image::ImageError::IoError(err)))?
        .with_guessed_format()
        .map_err(|err| decode_error(image::ImageError::IoError(err)))?;
    let img = reader.decode().map_err(decode_error)?;

    info!(width = img.width(), height = img.height(), "Image loaded");
    Ok(img)
}

/// Find every photo on the scan at `input` and write each one straightened
/// next to it.
///
/// Candidates that cannot be straightened are skipped with a warning. An
/// existing output file (without `force`) or a write failure aborts the run.
pub fn extract_photos<D>(input: &Path, detector: &D, options: &CropOptions) -> Result<CropReport>
where
    D: CandidateDetector + ?Sized,
{
    let scan = open_scan(input)?;
    let size = (scan.width(), scan.height());
    let keep_alpha = scan.color().has_alpha();

    debug!("Searching squares");
    let candidates = detector.detect(&scan);
    let photos = find_photos(candidates, size, options.margins);

    let rgba = scan.to_rgba8();
    drop(scan);

    let mut report = CropReport::default();
    for (index, polygon) in photos.iter().enumerate() {
        let output = output_path(input, index);

        let photo = match Correction::plan(polygon, size).and_then(|c| c.apply(&rgba)) {
            Ok(photo) => photo,
            Err(err) if err.is_candidate_local() => {
                warn!(index, error = %err, "Skipping candidate");
                report.skipped.push(index);
                continue;
            }
            Err(err) => return Err(err),
        };

        save_photo(photo, &output, keep_alpha, options)?;
        info!(path = %output.display(), "Saved photo");
        report.saved.push(output);
    }

    Ok(report)
}

/// Create `path` for writing, refusing to replace an existing file unless `force`
fn create_output(path: &Path, force: bool) -> Result<File> {
    let mut open = OpenOptions::new();
    open.write(true);
    if force {
        open.create(true).truncate(true);
    } else {
        open.create_new(true);
    }

    open.open(path).map_err(|err| match err.kind() {
        ErrorKind::AlreadyExists => CropError::OutputExists(path.to_path_buf()),
        _ => CropError::Io(err),
    })
}

/// Pixel layout each encoder accepts; alpha survives only where the scan had it
fn encodable(photo: RgbaImage, format: ImageFormat, keep_alpha: bool) -> DynamicImage {
    let photo = DynamicImage::ImageRgba8(photo);
    match format {
        ImageFormat::Hdr => DynamicImage::ImageRgb32F(photo.to_rgb32f()),
        ImageFormat::OpenExr if keep_alpha => DynamicImage::ImageRgba32F(photo.to_rgba32f()),
        ImageFormat::OpenExr => DynamicImage::ImageRgb32F(photo.to_rgb32f()),
        ImageFormat::Farbfeld => DynamicImage::ImageRgba16(photo.to_rgba16()),
        ImageFormat::Png | ImageFormat::Tiff | ImageFormat::WebP if keep_alpha => photo,
        _ => DynamicImage::ImageRgb8(photo.to_rgb8()),
    }
}

/// Encode `photo` in the format implied by the extension of `path`.
///
/// The file is only created once encoding succeeded, so a failed encode
/// leaves nothing behind.
pub fn save_photo(photo: RgbaImage, path: &Path, keep_alpha: bool, options: &CropOptions) -> Result<()> {
    let encode_error = |source| CropError::Encode {
        path: path.to_path_buf(),
        source,
    };

    let format = ImageFormat::from_path(path).map_err(encode_error)?;
    let photo = encodable(photo, format, keep_alpha);

    let mut encoded = Cursor::new(Vec::new());
    match (format, options.quality) {
        (ImageFormat::Jpeg, Some(quality)) => {
            let quality = quality.clamp(1, 100);
            photo
                .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, quality))
                .map_err(encode_error)?;
        }
        (_, quality) => {
            if quality.is_some() {
                debug!(?format, "Quality only applies to JPEG output; ignoring");
            }
            photo.write_to(&mut encoded, format).map_err(encode_error)?;
        }
    }

    let mut file = create_output(path, options.force)?;
    file.write_all(encoded.get_ref())?;
    file.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_output_path_inserts_index() {
        assert_eq!(
            output_path(Path::new("/scans/album.jpg"), 0),
            PathBuf::from("/scans/album.0.jpg")
        );
        assert_eq!(
            output_path(Path::new("page.2024.png"), 12),
            PathBuf::from("page.2024.12.png")
        );
        assert_eq!(output_path(Path::new("raw"), 3), PathBuf::from("raw.3"));
    }

    #[test]
    fn test_save_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        let photo = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let options = CropOptions::default();

        save_photo(photo.clone(), &path, false, &options).unwrap();
        let err = save_photo(photo.clone(), &path, false, &options).unwrap_err();
        assert!(matches!(err, CropError::OutputExists(ref p) if p == &path));

        let forced = CropOptions { force: true, ..Default::default() };
        save_photo(photo, &path, false, &forced).unwrap();
        assert_eq!(image::open(&path).unwrap().width(), 4);
    }

    #[test]
    fn test_save_jpeg_with_quality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let photo = RgbaImage::from_pixel(16, 8, Rgba([200, 100, 50, 255]));
        let options = CropOptions { quality: Some(80), ..Default::default() };

        save_photo(photo, &path, true, &options).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (16, 8));
        assert!(!reloaded.color().has_alpha());
    }

    #[test]
    fn test_save_hdr_uses_float_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.0.hdr");
        let photo = RgbaImage::from_pixel(6, 5, Rgba([255, 128, 0, 255]));

        save_photo(photo, &path, false, &CropOptions::default()).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (6, 5));
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        // DDS can be decoded but not encoded
        let path = dir.path().join("scan.0.dds");
        let photo = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));

        let err = save_photo(photo.clone(), &path, false, &CropOptions::default()).unwrap_err();
        assert!(matches!(err, CropError::Encode { .. }));
        assert!(!path.exists());

        // A retry is not blocked by a leftover file
        let err = save_photo(photo, &path, false, &CropOptions::default()).unwrap_err();
        assert!(matches!(err, CropError::Encode { .. }));
    }

    #[test]
    fn test_open_scan_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(open_scan(&path), Err(CropError::InputDecode { .. })));
        assert!(matches!(
            open_scan(&dir.path().join("missing.png")),
            Err(CropError::InputDecode { .. })
        ));
    }
}
