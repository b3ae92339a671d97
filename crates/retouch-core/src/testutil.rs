//! Synthetic faces and rasters for tests. Deterministic, no fixture files.

use crate::regions;
use crate::types::{LandmarkSet, Point};
use image::{Rgb, RgbImage};
use std::f32::consts::PI;

/// A geometrically plausible 468-point landmark set for a face centered in a
/// `width` x `height` frame. Passes the validator; all points are in-bounds
/// with a comfortable border margin.
pub fn synthetic_face(width: u32, height: u32) -> LandmarkSet {
    let (w, h) = (width as f32, height as f32);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (rx, ry) = (w * 0.30, h * 0.35);

    // Deterministic scatter inside the face for indices no region pins down.
    let mut points: Vec<Point> = (0..regions::LANDMARK_COUNT)
        .map(|i| {
            let jx = ((i * 37) % 101) as f32 / 101.0 - 0.5;
            let jy = ((i * 53) % 97) as f32 / 97.0 - 0.5;
            Point::new(cx + jx * rx, cy + jy * ry)
        })
        .collect();

    place_ring(&mut points, regions::FACE_OVAL, cx, cy, rx, ry);

    let eye_r = rx * 0.12;
    let eye_cy = cy - ry * 0.25;
    place_ring(&mut points, regions::LEFT_EYE, cx - rx * 0.45, eye_cy, eye_r, eye_r * 0.6);
    place_ring(&mut points, regions::RIGHT_EYE, cx + rx * 0.45, eye_cy, eye_r, eye_r * 0.6);

    let cheek_y = cy + ry * 0.05;
    place_ring(&mut points, regions::LEFT_CHEEKBONE, cx - rx * 0.55, cheek_y, rx * 0.06, rx * 0.06);
    place_ring(&mut points, regions::RIGHT_CHEEKBONE, cx + rx * 0.55, cheek_y, rx * 0.06, rx * 0.06);

    let mouth_cy = cy + ry * 0.55;
    let (mrx, mry) = (rx * 0.28, ry * 0.10);
    place_ring(&mut points, regions::LIPS_OUTER, cx, mouth_cy, mrx, mry);
    place_ring(&mut points, regions::LIPS_INNER, cx, mouth_cy, mrx * 0.55, mry * 0.55);

    // Slight slant keeps the bridge off an exactly-vertical line, like a
    // real detector would produce.
    for (i, &idx) in regions::NOSE_BRIDGE.iter().enumerate() {
        let t = i as f32 / (regions::NOSE_BRIDGE.len() - 1) as f32;
        points[idx] = Point::new(cx + (t - 0.5) * rx * 0.02, cy - ry * 0.25 + t * ry * 0.35);
    }

    // Pin the anchors the validator and makeup stages read directly.
    points[regions::MOUTH_LEFT_CORNER] = Point::new(cx - mrx, mouth_cy);
    points[regions::MOUTH_RIGHT_CORNER] = Point::new(cx + mrx, mouth_cy);
    points[regions::MOUTH_TOP] = Point::new(cx, mouth_cy - mry * 0.5);
    points[regions::MOUTH_BOTTOM] = Point::new(cx, mouth_cy + mry * 0.5);
    points[199] = Point::new(cx, cy + ry * 0.8);
    points[regions::LEFT_NOSE_WING] = Point::new(cx - rx * 0.12, cy + ry * 0.12);
    points[regions::RIGHT_NOSE_WING] = Point::new(cx + rx * 0.12, cy + ry * 0.12);

    LandmarkSet::new(points)
}

/// Place a region's points on an axis-aligned ellipse, starting at the top
/// and proceeding clockwise in image coordinates.
fn place_ring(points: &mut [Point], indices: &[usize], cx: f32, cy: f32, rx: f32, ry: f32) {
    let n = indices.len() as f32;
    for (i, &idx) in indices.iter().enumerate() {
        let ang = -PI / 2.0 + (i as f32 / n) * 2.0 * PI;
        points[idx] = Point::new(cx + rx * ang.cos(), cy + ry * ang.sin());
    }
}

/// A smooth two-axis gradient with a superimposed checker so warps and
/// smoothing produce measurable pixel differences.
pub fn synthetic_portrait(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let checker = if (x / 8 + y / 8) % 2 == 0 { 90u8 } else { 170u8 };
        Rgb([r, g, checker])
    })
}

/// Mean absolute per-channel difference between two same-size images.
pub fn mean_abs_diff(a: &RgbImage, b: &RgbImage) -> f64 {
    assert_eq!(a.dimensions(), b.dimensions());
    let mut total = 0u64;
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        for c in 0..3 {
            total += (pa[c] as i64 - pb[c] as i64).unsigned_abs();
        }
    }
    total as f64 / (a.width() as f64 * a.height() as f64 * 3.0)
}
