use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::{Matrix3, Point2, Vector3};

use crate::error::{CropError, Result};

/// A corner position in pixel coordinates (x right, y down)
pub type Point = Point2<f64>;

/// An ordered ring of corner points describing one detected region.
///
/// Detectors emit exactly four corners in a consistent winding order. Point
/// deduplication may shorten the ring, so nothing here assumes a length of
/// four except [`tilt`].
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    pub corners: Vec<Point>,
}

/// Axis-aligned bounds of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Quad {
    pub fn new(corners: Vec<Point>) -> Self {
        Self { corners }
    }

    pub fn from_xy(corners: &[(f64, f64)]) -> Self {
        Self::new(corners.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    /// Closed edge list: (c0, c1), (c1, c2), ..., (cn, c0)
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.corners.len();
        (0..n).map(move |i| (self.corners[i], self.corners[(i + 1) % n]))
    }

    /// Shoelace area; positive when the ring turns clockwise on screen
    pub fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
            / 2.0
    }

    pub fn bounds(&self) -> Option<Bounds> {
        if self.corners.is_empty() {
            return None;
        }

        let min_x = self.corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = self.corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = self.corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = self.corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        Some(Bounds { min_x, min_y, max_x, max_y })
    }

    /// The worst corner of the ring: max |cos| over every corner.
    /// 0 for a perfect rectangle.
    pub fn max_corner_deviation(&self) -> f64 {
        let n = self.corners.len();
        (0..n)
            .map(|i| {
                corner_deviation(
                    self.corners[i],
                    self.corners[(i + 1) % n],
                    self.corners[(i + 2) % n],
                )
                .abs()
            })
            .fold(0.0, f64::max)
    }

    /// Apply an affine matrix to every corner
    pub fn transformed(&self, matrix: &Matrix3<f64>) -> Self {
        Self::new(
            self.corners
                .iter()
                .map(|p| transform_point(matrix, *p))
                .collect(),
        )
    }

    /// Rotate by `degrees` about `center`, clockwise on screen for positive angles
    pub fn rotated(&self, degrees: f64, center: Point) -> Self {
        self.transformed(&rotation_about(degrees, center))
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        self.transformed(&translation(dx, dy))
    }

    /// Even-odd ray casting. Points exactly on the boundary may fall
    /// either way; [`Quad::intersects`] covers them through the edge tests.
    pub fn contains(&self, point: Point) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True when the two polygon regions share at least one interior or boundary point
    pub fn intersects(&self, other: &Quad) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }

        for (a0, a1) in self.edges() {
            for (b0, b1) in other.edges() {
                if segments_intersect(a0, a1, b0, b1) {
                    return true;
                }
            }
        }

        // No edge crossings: either disjoint or one nested inside the other
        self.contains(other.corners[0]) || other.contains(self.corners[0])
    }
}

/// Directional angle of the vector p1 -> p2, in (-π, π]
pub fn angle_between(p1: Point, p2: Point) -> f64 {
    (p2.y - p1.y).atan2(p2.x - p1.x)
}

/// Cosine of the angle at `vertex` between the edges to `prev` and `next`.
///
/// 0 means a right angle; magnitudes near 1 mean a very acute or obtuse
/// corner. Edges are normalized first, so the value does not depend on scale.
/// A zero-length edge scores 1.0.
pub fn corner_deviation(prev: Point, vertex: Point, next: Point) -> f64 {
    let d1 = prev - vertex;
    let d2 = next - vertex;
    let (n1, n2) = (d1.norm(), d2.norm());
    if n1 == 0.0 || n2 == 0.0 {
        return 1.0;
    }
    (d1 / n1).dot(&(d2 / n2))
}

/// Best-fit rotation of a quadrilateral relative to the horizontal axis.
///
/// Each edge's direction is shifted by a per-edge offset so that the four
/// values coincide for a rectangle wound clockwise on screen; the result is
/// their mean. An upright rectangle starting at its top-right corner has a
/// tilt of π/2.
pub fn tilt(quad: &Quad) -> Result<f64> {
    if quad.len() != 4 {
        return Err(CropError::CornerCount(quad.len()));
    }

    const OFFSETS: [f64; 4] = [0.0, -FRAC_PI_2, PI, FRAC_PI_2];

    let c = &quad.corners;
    let adjusted: Vec<f64> = (0..4)
        .map(|i| OFFSETS[i] + angle_between(c[i], c[(i + 1) % 4]))
        .collect();

    // Unwrap around the first edge so a branch-cut crossing does not skew the mean
    let reference = adjusted[0];
    let sum: f64 = adjusted
        .iter()
        .map(|&a| reference + wrap_angle(a - reference))
        .sum();

    Ok(sum / 4.0)
}

/// Normalize an angle into (-π, π]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Homogeneous translation matrix
pub fn translation(dx: f64, dy: f64) -> Matrix3<f64> {
    Matrix3::new(
        1.0, 0.0, dx,
        0.0, 1.0, dy,
        0.0, 0.0, 1.0,
    )
}

/// Rotation by `degrees` about `center`.
///
/// In pixel coordinates (y down) a positive angle turns clockwise on screen,
/// which is the convention the raster rotation uses as well.
pub fn rotation_about(degrees: f64, center: Point) -> Matrix3<f64> {
    let (sin, cos) = degrees.to_radians().sin_cos();

    let rotation = Matrix3::new(
        cos, -sin, 0.0,
        sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );

    // Translate to origin, rotate, translate back
    translation(center.x, center.y) * rotation * translation(-center.x, -center.y)
}

/// Transform a point using the affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, p: Point) -> Point {
    let v = matrix * Vector3::new(p.x, p.y, 1.0);
    Point::new(v.x / v.z, v.y / v.z)
}

/// Sign of the turn a -> b -> c: 1 counter-clockwise, -1 clockwise, 0 collinear
fn orientation(a: Point, b: Point, c: Point) -> i8 {
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if cross > 0.0 {
        1
    } else if cross < 0.0 {
        -1
    } else {
        0
    }
}

/// `q` lies within the bounding box of segment p-r (caller ensures collinearity)
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Closed-segment intersection, including touching endpoints and collinear overlap
fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && on_segment(p1, q1, p2))
        || (o2 == 0 && on_segment(p1, q2, p2))
        || (o3 == 0 && on_segment(q1, p1, q2))
        || (o4 == 0 && on_segment(q1, p2, q2))
}
