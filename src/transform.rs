use image::{imageops, Rgba, RgbaImage};
use nalgebra::Matrix3;
use tracing::debug;

use crate::error::{CropError, Result};
use crate::geometry::{rotation_about, tilt, transform_point, translation, Point, Quad};

/// Integer crop rectangle, half-open: [left, right) x [top, bottom)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl CropBox {
    /// Round each bound of a polygon to the nearest integer
    pub fn around(polygon: &Quad) -> Option<Self> {
        let b = polygon.bounds()?;
        Some(Self {
            left: b.min_x.round() as i64,
            top: b.min_y.round() as i64,
            right: b.max_x.round() as i64,
            bottom: b.max_y.round() as i64,
        })
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

/// Per-candidate working state of the straighten-and-crop step.
///
/// The polygon lives in the scan's frame; the raster is rotated separately
/// and its canvas grows, so [`Correction::reconcile`] shifts the polygon by
/// half the growth before the crop box is taken.
#[derive(Debug, Clone)]
pub struct Correction {
    pub image_size: (u32, u32),
    /// Best-fit rotation of the candidate, radians
    pub tilt: f64,
    /// Rotation that makes the candidate axis-aligned, degrees
    pub angle_degrees: f64,
    pub polygon: Quad,
    /// `polygon` rotated about the scan center, still in the scan's frame
    pub rotated: Quad,
}

/// A [`Correction`] matched to a rotated raster
#[derive(Debug, Clone)]
pub struct ReconciledFrame {
    pub size_before: (u32, u32),
    pub size_after: (u32, u32),
    pub offset: (f64, f64),
    pub polygon: Quad,
    pub crop_box: CropBox,
}

impl Correction {
    /// Fails with [`CropError::CornerCount`] unless the candidate has four corners
    pub fn plan(polygon: &Quad, image_size: (u32, u32)) -> Result<Self> {
        let tilt = tilt(polygon)?;
        let angle_degrees = 90.0 - tilt.to_degrees();

        debug!(angle = angle_degrees, "Rotating polygon");
        let rotated = polygon.rotated(angle_degrees, image_center(image_size));

        Ok(Self {
            image_size,
            tilt,
            angle_degrees,
            polygon: polygon.clone(),
            rotated,
        })
    }

    /// Move the rotated polygon onto a raster whose canvas grew to `size_after`
    pub fn reconcile(&self, size_after: (u32, u32)) -> ReconciledFrame {
        let size_before = self.image_size;
        let offset = canvas_offset(size_before, size_after);

        debug!(dx = offset.0, dy = offset.1, "Moving polygon");
        let polygon = self.rotated.translated(offset.0, offset.1);
        // An empty polygon yields an empty box, which `crop` rejects
        let crop_box = CropBox::around(&polygon).unwrap_or_default();

        ReconciledFrame {
            size_before,
            size_after,
            offset,
            polygon,
            crop_box,
        }
    }

    /// Rotate `image` (the full scan) and cut out the straightened photo
    pub fn apply(&self, image: &RgbaImage) -> Result<RgbaImage> {
        debug!("Rotating image");
        let rotated = rotate_expanded(image, self.angle_degrees);

        let frame = self.reconcile(rotated.dimensions());
        debug!(
            before = ?frame.size_before,
            after = ?frame.size_after,
            "Cropping image"
        );

        crop(&rotated, frame.crop_box)
    }
}

fn image_center((width, height): (u32, u32)) -> Point {
    Point::new(width as f64 / 2.0, height as f64 / 2.0)
}

/// Origin shift between a canvas and its re-centered, resized successor
fn canvas_offset(before: (u32, u32), after: (u32, u32)) -> (f64, f64) {
    (
        (after.0 as f64 - before.0 as f64) / 2.0,
        (after.1 as f64 - before.1 as f64) / 2.0,
    )
}

/// Canvas size that holds `width` x `height` rotated by `degrees`
pub fn rotated_canvas_size(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let matrix = rotation_about(degrees, Point::origin());
    let corners = [
        Point::new(0.0, 0.0),
        Point::new(width as f64, 0.0),
        Point::new(0.0, height as f64),
        Point::new(width as f64, height as f64),
    ];

    let transformed: Vec<Point> = corners.iter().map(|&p| transform_point(&matrix, p)).collect();

    let min_x = transformed.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = transformed.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = transformed.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = transformed.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    // Trim float noise so exact quarter turns do not gain a pixel
    let new_width = (max_x - min_x - 1e-6).ceil().max(1.0) as u32;
    let new_height = (max_y - min_y - 1e-6).ceil().max(1.0) as u32;

    (new_width, new_height)
}

/// Premultiply alpha: RGB values are multiplied by alpha
fn premultiply_alpha(img: &RgbaImage) -> Vec<[f32; 4]> {
    img.pixels()
        .map(|pixel| {
            let alpha = pixel[3] as f32 / 255.0;
            [
                pixel[0] as f32 * alpha,
                pixel[1] as f32 * alpha,
                pixel[2] as f32 * alpha,
                pixel[3] as f32,
            ]
        })
        .collect()
}

/// Unpremultiply alpha: divide RGB by alpha
fn unpremultiply_alpha(premultiplied: [f32; 4]) -> Rgba<u8> {
    let alpha = premultiplied[3];
    if alpha < 1.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let alpha_norm = alpha / 255.0;
    let r = (premultiplied[0] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let g = (premultiplied[1] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let b = (premultiplied[2] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let a = alpha.round().clamp(0.0, 255.0) as u8;

    Rgba([r, g, b, a])
}

/// Cubic interpolation kernel (Catmull-Rom)
fn cubic_weight(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;

    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Bicubic interpolation at a given position
fn bicubic_interpolate(premultiplied: &[[f32; 4]], width: u32, height: u32, x: f64, y: f64) -> [f32; 4] {
    let x_floor = x.floor() as i32;
    let y_floor = y.floor() as i32;
    let wx = cubic_weight((x - x.floor()) as f32);
    let wy = cubic_weight((y - y.floor()) as f32);

    let mut result = [0.0; 4];

    for j in 0..4 {
        for i in 0..4 {
            let px = (x_floor + i as i32 - 1).clamp(0, width as i32 - 1) as u32;
            let py = (y_floor + j as i32 - 1).clamp(0, height as i32 - 1) as u32;
            let idx = (py * width + px) as usize;

            let weight = wx[i] * wy[j];
            for c in 0..4 {
                result[c] += premultiplied[idx][c] * weight;
            }
        }
    }

    result
}

/// Rotate about the image center, growing the canvas to fit.
///
/// Content stays centered on the new canvas, so a point moves by the
/// rotation plus half the canvas growth. Uncovered pixels are transparent.
pub fn rotate_expanded(img: &RgbaImage, degrees: f64) -> RgbaImage {
    if degrees.abs() < 1e-9 {
        return img.clone();
    }

    let (src_width, src_height) = img.dimensions();
    let (new_width, new_height) = rotated_canvas_size(src_width, src_height, degrees);

    let (dx, dy) = canvas_offset((src_width, src_height), (new_width, new_height));
    let forward: Matrix3<f64> =
        translation(dx, dy) * rotation_about(degrees, image_center((src_width, src_height)));

    debug!(
        from = ?(src_width, src_height),
        to = ?(new_width, new_height),
        degrees,
        "Rotating raster"
    );

    // Rotation plus translation is always invertible
    let inverse = forward.try_inverse().unwrap_or_else(Matrix3::identity);

    let premultiplied = premultiply_alpha(img);
    let mut output = RgbaImage::new(new_width, new_height);

    for (out_x, out_y, pixel) in output.enumerate_pixels_mut() {
        // Sample at pixel centers
        let dst = Point::new(out_x as f64 + 0.5, out_y as f64 + 0.5);
        let src = transform_point(&inverse, dst);
        let (src_x, src_y) = (src.x - 0.5, src.y - 0.5);

        if src_x >= -0.5
            && src_x <= src_width as f64 - 0.5
            && src_y >= -0.5
            && src_y <= src_height as f64 - 0.5
        {
            let interpolated = bicubic_interpolate(&premultiplied, src_width, src_height, src_x, src_y);
            *pixel = unpremultiply_alpha(interpolated);
        }
    }

    output
}

/// Cut `crop_box` out of `img`, clamped to the image
pub fn crop(img: &RgbaImage, crop_box: CropBox) -> Result<RgbaImage> {
    let (width, height) = (img.width() as i64, img.height() as i64);
    let clamped = CropBox {
        left: crop_box.left.clamp(0, width),
        top: crop_box.top.clamp(0, height),
        right: crop_box.right.clamp(0, width),
        bottom: crop_box.bottom.clamp(0, height),
    };

    if clamped.width() <= 0 || clamped.height() <= 0 {
        return Err(CropError::EmptyCrop(crop_box));
    }

    Ok(imageops::crop_imm(
        img,
        clamped.left as u32,
        clamped.top as u32,
        clamped.width() as u32,
        clamped.height() as u32,
    )
    .to_image())
}
