mod common;

use std::path::Path;

use common::synthetic_image::{scan_with_photos, tilted_rect};
use image::{DynamicImage, GenericImageView};
use photo_crop::{extract_photos, CropError, CropOptions, Quad};

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[test]
fn tilted_photo_is_straightened_and_cropped() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");

    let photo = tilted_rect(120.0, 100.0, 100.0, 60.0, 10.0);
    scan_with_photos(240, 200, &[photo.clone()]).save(&input).unwrap();

    let detector = move |_: &DynamicImage| vec![photo.clone()];
    let report = extract_photos(&input, &detector, &CropOptions::default()).unwrap();

    assert_eq!(report.saved, vec![dir.path().join("scan.0.png")]);
    assert!(report.skipped.is_empty());

    let cropped = image::open(&report.saved[0]).unwrap();
    let (w, h) = cropped.dimensions();
    assert!((99..=101).contains(&w), "width {w}");
    assert!((59..=61).contains(&h), "height {h}");

    let center = cropped.get_pixel(w / 2, h / 2);
    assert!(center[0] > 200 && center[1] > 200 && center[2] > 200, "{center:?}");
}

#[test]
fn off_centre_photo_lands_inside_the_crop() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");

    // Away from the scan centre, so the rotation and the canvas offset both move it
    let photo = tilted_rect(90.0, 70.0, 100.0, 60.0, 10.0);
    scan_with_photos(400, 300, &[photo.clone()]).save(&input).unwrap();

    let detector = move |_: &DynamicImage| vec![photo.clone()];
    let report = extract_photos(&input, &detector, &CropOptions::default()).unwrap();
    assert_eq!(report.saved.len(), 1);

    let cropped = image::open(&report.saved[0]).unwrap().to_rgb8();
    let (w, h) = cropped.dimensions();
    assert!((99..=101).contains(&w), "width {w}");
    assert!((59..=61).contains(&h), "height {h}");

    let edge = 2;
    let dark: Vec<(u32, u32)> = (edge..h - edge)
        .flat_map(|y| (edge..w - edge).map(move |x| (x, y)))
        .filter(|&(x, y)| cropped.get_pixel(x, y).0.iter().any(|&c| c < 200))
        .collect();
    assert!(dark.is_empty(), "{} dark pixels inside the crop, first {:?}", dark.len(), dark.first());
}

#[test]
fn second_run_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");

    let photos = vec![
        tilted_rect(80.0, 100.0, 70.0, 50.0, -5.0),
        tilted_rect(220.0, 100.0, 70.0, 50.0, 8.0),
    ];
    scan_with_photos(300, 200, &photos).save(&input).unwrap();

    let detector = move |_: &DynamicImage| photos.clone();
    let first = extract_photos(&input, &detector, &CropOptions::default()).unwrap();
    assert_eq!(first.saved.len(), 2);
    assert_eq!(files_in(dir.path()), 3);

    let err = extract_photos(&input, &detector, &CropOptions::default()).unwrap_err();
    assert!(matches!(err, CropError::OutputExists(ref p) if p == &dir.path().join("scan.0.png")));
    assert_eq!(files_in(dir.path()), 3);

    let forced = CropOptions { force: true, ..Default::default() };
    let again = extract_photos(&input, &detector, &forced).unwrap();
    assert_eq!(again.saved, first.saved);
}

#[test]
fn degenerate_candidate_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");

    let good = tilted_rect(90.0, 100.0, 80.0, 50.0, 10.0);
    let repeated_corner = Quad::from_xy(&[(250.0, 70.0), (250.0, 70.0), (250.0, 140.0), (200.0, 140.0)]);
    scan_with_photos(300, 200, &[good.clone()]).save(&input).unwrap();

    let detector = move |_: &DynamicImage| vec![repeated_corner.clone(), good.clone()];
    let report = extract_photos(&input, &detector, &CropOptions::default()).unwrap();

    assert_eq!(report.skipped, vec![0]);
    assert_eq!(report.saved, vec![dir.path().join("scan.1.png")]);
}

#[test]
fn border_candidates_produce_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    scan_with_photos(200, 150, &[]).save(&input).unwrap();

    let platen = Quad::from_xy(&[(199.0, 0.0), (199.0, 149.0), (0.0, 149.0), (0.0, 0.0)]);
    let detector = move |_: &DynamicImage| vec![platen.clone()];
    let report = extract_photos(&input, &detector, &CropOptions::default()).unwrap();

    assert!(report.saved.is_empty());
    assert_eq!(files_in(dir.path()), 1);
}

#[test]
fn undecodable_input_fails_before_detection() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.jpg");
    std::fs::write(&input, b"definitely not a jpeg").unwrap();

    let detector = |_: &DynamicImage| -> Vec<Quad> { panic!("detector must not run") };
    let err = extract_photos(&input, &detector, &CropOptions::default()).unwrap_err();
    assert!(matches!(err, CropError::InputDecode { .. }));
}
