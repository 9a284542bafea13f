use image::{Rgb, RgbImage};
use photo_crop::{Point, Quad};

/// Rectangle of `width` x `height` centered on (cx, cy), turned `degrees`
/// clockwise on screen. Corners start top-right and run clockwise.
pub fn tilted_rect(cx: f64, cy: f64, width: f64, height: f64, degrees: f64) -> Quad {
    let (hw, hh) = (width / 2.0, height / 2.0);
    Quad::from_xy(&[
        (cx + hw, cy - hh),
        (cx + hw, cy + hh),
        (cx - hw, cy + hh),
        (cx - hw, cy - hh),
    ])
    .rotated(degrees, Point::new(cx, cy))
}

/// Black scan bed with every photo painted white
pub fn scan_with_photos(width: u32, height: u32, photos: &[Quad]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
        if photos.iter().any(|q| q.contains(center)) {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}
