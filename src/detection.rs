use std::f64::consts::FRAC_PI_2;

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::dilate;
use imageproc::point::Point as PixelPoint;
use tracing::debug;

use crate::geometry::{angle_between, wrap_angle, Point, Quad};

/// Source of candidate quadrilaterals for a scan.
///
/// Any implementation works as long as it returns corner rings in a
/// consistent winding order; the filtering pipeline treats it as opaque.
pub trait CandidateDetector {
    fn detect(&self, image: &DynamicImage) -> Vec<Quad>;
}

impl<F> CandidateDetector for F
where
    F: Fn(&DynamicImage) -> Vec<Quad>,
{
    fn detect(&self, image: &DynamicImage) -> Vec<Quad> {
        self(image)
    }
}

/// Tuning for [`SquareDetector`]
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Gaussian blur applied before edge/threshold passes
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Binary threshold levels run from this step up to 255
    pub threshold_step: u8,
    /// Douglas-Peucker tolerance as a fraction of contour perimeter
    pub approx_epsilon: f64,
    /// Minimum polygon area in square pixels
    pub min_area: f64,
    /// Largest |cos| allowed at any corner
    pub max_corner_deviation: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            canny_low: 10.0,
            canny_high: 50.0,
            threshold_step: 26,
            approx_epsilon: 0.02,
            min_area: 1000.0,
            max_corner_deviation: 0.1,
        }
    }
}

/// Contour-based square finder.
///
/// Every color channel is binarized several ways (dilated Canny edges plus a
/// ladder of fixed thresholds); each closed contour is simplified and kept
/// when it is a large, convex, nearly-rectangular quadrilateral.
#[derive(Debug, Clone, Default)]
pub struct SquareDetector {
    pub config: DetectorConfig,
}

impl SquareDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    fn binary_images(&self, channel: &GrayImage) -> Vec<GrayImage> {
        let cfg = &self.config;
        let edges = dilate(&canny(channel, cfg.canny_low, cfg.canny_high), Norm::LInf, 1);

        let mut images = vec![edges];
        let step = cfg.threshold_step.max(1) as usize;
        for level in (step..255).step_by(step) {
            let level = level as u8;
            let mut binary = channel.clone();
            for pixel in binary.pixels_mut() {
                pixel[0] = if pixel[0] > level { 255 } else { 0 };
            }
            images.push(binary);
        }
        images
    }

    fn squares_in(&self, binary: &GrayImage, out: &mut Vec<Quad>) {
        for contour in find_contours::<i32>(binary) {
            let Some(polygon) = approximate_closed(&contour.points, self.config.approx_epsilon) else {
                continue;
            };
            if polygon.len() != 4 {
                continue;
            }

            let quad = Quad::new(
                polygon
                    .iter()
                    .map(|p| Point::new(p.x as f64, p.y as f64))
                    .collect(),
            );

            if quad.signed_area().abs() > self.config.min_area
                && is_convex(&quad)
                && quad.max_corner_deviation() < self.config.max_corner_deviation
            {
                out.push(canonical_winding(&quad));
            }
        }
    }
}

impl CandidateDetector for SquareDetector {
    fn detect(&self, image: &DynamicImage) -> Vec<Quad> {
        let rgb = gaussian_blur_f32(&image.to_rgb8(), self.config.blur_sigma);

        let mut squares = Vec::new();
        for c in 0..3 {
            let channel = split_channel(&rgb, c);
            for binary in self.binary_images(&channel) {
                self.squares_in(&binary, &mut squares);
            }
        }

        debug!(count = squares.len(), "Found candidate squares");
        squares
    }
}

fn split_channel(rgb: &RgbImage, c: usize) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| Luma([rgb.get_pixel(x, y)[c]]))
}

/// Douglas-Peucker on a closed contour: split at the point farthest from the
/// start and simplify both open halves
fn approximate_closed(points: &[PixelPoint<i32>], epsilon_ratio: f64) -> Option<Vec<PixelPoint<i32>>> {
    if points.len() < 4 {
        return None;
    }

    let epsilon = epsilon_ratio * arc_length(points, true);
    if epsilon <= 0.0 {
        return None;
    }

    let first = points[0];
    let dist2 = |p: &PixelPoint<i32>| {
        let (dx, dy) = ((p.x - first.x) as i64, (p.y - first.y) as i64);
        dx * dx + dy * dy
    };
    let (far, _) = points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| dist2(*p))?;
    if far == 0 {
        return None;
    }

    let mut back_half = points[far..].to_vec();
    back_half.push(first);

    let mut polygon = approximate_polygon_dp(&points[..=far], epsilon, false);
    let back = approximate_polygon_dp(&back_half, epsilon, false);
    // Both halves carry the shared endpoints; keep one copy of each
    if back.len() > 2 {
        polygon.extend_from_slice(&back[1..back.len() - 1]);
    }
    Some(polygon)
}

fn is_convex(quad: &Quad) -> bool {
    let n = quad.len();
    let mut sign = 0.0;
    for i in 0..n {
        let (a, b, c) = (quad.corners[i], quad.corners[(i + 1) % n], quad.corners[(i + 2) % n]);
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 || (sign != 0.0 && cross.signum() != sign) {
            return false;
        }
        sign = cross.signum();
    }
    true
}

/// Wind clockwise on screen and start at the corner whose outgoing edge
/// points most nearly straight down, so an upright photo has a tilt of π/2.
pub fn canonical_winding(quad: &Quad) -> Quad {
    let mut corners = quad.corners.clone();
    if quad.signed_area() < 0.0 {
        corners.reverse();
    }

    let n = corners.len();
    let start = (0..n)
        .min_by(|&i, &j| {
            let di = wrap_angle(angle_between(corners[i], corners[(i + 1) % n]) - FRAC_PI_2).abs();
            let dj = wrap_angle(angle_between(corners[j], corners[(j + 1) % n]) - FRAC_PI_2).abs();
            di.total_cmp(&dj)
        })
        .unwrap_or(0);

    corners.rotate_left(start);
    Quad::new(corners)
}
