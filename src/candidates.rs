use tracing::debug;

use crate::geometry::{Point, Quad};

/// Margins along the scan edges, as fractions of width and height.
/// Candidates with a corner inside a margin are platen artifacts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderMargins {
    pub x: f64,
    pub y: f64,
}

impl BorderMargins {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn admits(&self, p: &Point, (width, height): (f64, f64)) -> bool {
        !(p.x < self.x * width
            || p.x > (1.0 - self.x) * width
            || p.y < self.y * height
            || p.y > (1.0 - self.y) * height)
    }
}

impl Default for BorderMargins {
    fn default() -> Self {
        Self::new(0.02, 0.02)
    }
}

/// Drop candidates with any corner inside the border margins.
/// Lazy; survivors keep their relative order.
pub fn remove_touching_border<I>(
    candidates: I,
    size: (u32, u32),
    margins: BorderMargins,
) -> impl Iterator<Item = Quad>
where
    I: IntoIterator<Item = Quad>,
{
    let size = (size.0 as f64, size.1 as f64);
    candidates
        .into_iter()
        .filter(move |quad| quad.corners.iter().all(|p| margins.admits(p, size)))
}

/// The candidate whose worst corner is closest to 90°.
/// Ties go to the earlier candidate.
fn squarest<'a>(quads: impl IntoIterator<Item = &'a Quad>) -> Option<&'a Quad> {
    let mut best: Option<(&'a Quad, f64)> = None;
    for quad in quads {
        let deviation = quad.max_corner_deviation();
        if best.map_or(true, |(_, d)| deviation < d) {
            best = Some((quad, deviation));
        }
    }
    best.map(|(quad, _)| quad)
}

/// Keep one candidate per group of intersecting candidates.
///
/// Builds the intersection graph explicitly and walks its connected
/// components, so overlapping-but-distinct clusters never yield two picks
/// for the same physical photo. Each component contributes its squarest
/// member; components are emitted in order of their first member.
pub fn remove_overlapping(candidates: &[Quad]) -> Vec<Quad> {
    let n = candidates.len();
    let adjacency: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && candidates[i].intersects(&candidates[j]))
                .collect()
        })
        .collect();

    let mut component = vec![usize::MAX; n];
    let mut best = Vec::new();

    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }

        let id = best.len();
        let mut members = vec![start];
        let mut stack = vec![start];
        component[start] = id;

        while let Some(node) = stack.pop() {
            for &next in &adjacency[node] {
                if component[next] == usize::MAX {
                    component[next] = id;
                    members.push(next);
                    stack.push(next);
                }
            }
        }

        members.sort_unstable();
        if let Some(pick) = squarest(members.iter().map(|&i| &candidates[i])) {
            debug!(
                component = id,
                members = members.len(),
                deviation = pick.max_corner_deviation(),
                "Picked squarest candidate"
            );
            best.push(pick.clone());
        }
    }

    best
}

/// Remove exact duplicate corners, keeping first occurrences in order.
/// Does not check that four corners remain.
pub fn remove_duplicate_points(quad: &Quad) -> Quad {
    let mut unique: Vec<Point> = Vec::with_capacity(quad.len());
    for p in &quad.corners {
        if !unique.contains(p) {
            unique.push(*p);
        }
    }
    Quad::new(unique)
}

/// Reduce raw detector output to one candidate per photo.
///
/// Border filtering runs before overlap resolution, and deduplication runs
/// last so clustering compares the polygons exactly as detected.
pub fn find_photos(candidates: Vec<Quad>, size: (u32, u32), margins: BorderMargins) -> Vec<Quad> {
    debug!(count = candidates.len(), "Removing squares too close to the border");
    let inside: Vec<Quad> = remove_touching_border(candidates, size, margins).collect();

    debug!(count = inside.len(), "Removing overlapping squares");
    let separate = remove_overlapping(&inside);

    debug!(count = separate.len(), "Removing duplicate points");
    separate.iter().map(remove_duplicate_points).collect()
}
