//! Makeup color overlays: lip color, blush, highlight.
//!
//! Each overlay builds a landmark-anchored soft mask, feathers it, and
//! alpha-blends a flat color layer at `mask * alpha`. The three
//! sub-operations are independently fail-soft: a failed mask leaves the
//! image unmodified for that overlay only.

use crate::mask::SoftMask;
use crate::regions;
use crate::types::{centroid, LandmarkSet, Point, Rect, StageError};
use image::RgbImage;

// --- Overlay geometry constants ---
const LIP_FEATHER_FRACTION: f32 = 0.05;
const BLUSH_DROP_FRACTION: f32 = 0.08;
const BLUSH_RADIUS_FRACTION: f32 = 0.16;
const BLUSH_ASPECT: f32 = 0.7;
const BLUSH_FEATHER_FRACTION: f32 = 0.5;
const BRIDGE_HALF_WIDTH_FRACTION: f32 = 0.02;
const NOSE_SIDE_OFFSET_FRACTION: f32 = 0.03;
const NOSE_SIDE_RADIUS_FRACTION: f32 = 0.015;
const CHEEK_LIFT_FRACTION: f32 = 0.05;
const CHEEK_RADIUS_FRACTION: f32 = 0.02;
const HIGHLIGHT_FEATHER_FRACTION: f32 = 0.015;

/// One flat color layer blended at `mask * alpha`.
#[derive(Debug, Clone, Copy)]
pub struct ColorOverlay {
    pub color: [u8; 3],
    pub alpha: f32,
}

/// Per-overlay configuration; `None` disables that overlay.
#[derive(Debug, Clone, Copy)]
pub struct MakeupParams {
    pub lip: Option<ColorOverlay>,
    pub blush: Option<ColorOverlay>,
    pub highlight: Option<ColorOverlay>,
}

impl Default for MakeupParams {
    fn default() -> Self {
        Self {
            lip: Some(ColorOverlay { color: [176, 58, 76], alpha: 0.25 }),
            blush: Some(ColorOverlay { color: [229, 112, 122], alpha: 0.18 }),
            highlight: Some(ColorOverlay { color: [255, 244, 229], alpha: 0.20 }),
        }
    }
}

/// Apply the enabled overlays in order: lip, blush, highlight.
pub fn apply_makeup(img: &RgbImage, landmarks: &LandmarkSet, params: &MakeupParams) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut out = img.clone();

    if let Some(overlay) = &params.lip {
        match lip_mask(landmarks, w, h) {
            Ok(m) => out = blend_color(&out, &m, overlay),
            Err(e) => tracing::warn!(overlay = "lip", error = %e, "makeup overlay skipped"),
        }
    }
    if let Some(overlay) = &params.blush {
        match blush_mask(landmarks, w, h) {
            Ok(m) => out = blend_color(&out, &m, overlay),
            Err(e) => tracing::warn!(overlay = "blush", error = %e, "makeup overlay skipped"),
        }
    }
    if let Some(overlay) = &params.highlight {
        match highlight_mask(landmarks, w, h) {
            Ok(m) => out = blend_color(&out, &m, overlay),
            Err(e) => tracing::warn!(overlay = "highlight", error = %e, "makeup overlay skipped"),
        }
    }
    out
}

/// Lip band: outer-lip fill minus inner-lip fill, so the mouth interior and
/// teeth stay uncolored.
fn lip_mask(landmarks: &LandmarkSet, width: u32, height: u32) -> Result<SoftMask, StageError> {
    let outer = landmarks.select(regions::LIPS_OUTER);
    let inner = landmarks.select(regions::LIPS_INNER);
    if outer.len() < 3 {
        return Err(StageError::EmptyRegion { region: "lips" });
    }
    let bbox = Rect::from_points(&outer).ok_or(StageError::EmptyRegion { region: "lips" })?;

    let mut band = SoftMask::new(width, height);
    band.fill_polygon(&outer, 1.0);
    let mut interior = SoftMask::new(width, height);
    interior.fill_polygon(&inner, 1.0);
    band.subtract(&interior);
    band.feather(bbox.width().max(bbox.height()) as f32 * LIP_FEATHER_FRACTION);
    band.clamp();
    Ok(band)
}

/// Blush: one ellipse per cheekbone, offset downward by a fraction of the
/// face height and sized by the inter-cheek distance.
fn blush_mask(landmarks: &LandmarkSet, width: u32, height: u32) -> Result<SoftMask, StageError> {
    let left = centroid(&landmarks.select(regions::LEFT_CHEEKBONE))
        .ok_or(StageError::EmptyRegion { region: "left cheekbone" })?;
    let right = centroid(&landmarks.select(regions::RIGHT_CHEEKBONE))
        .ok_or(StageError::EmptyRegion { region: "right cheekbone" })?;
    let face = Rect::from_points(&landmarks.select(regions::FACE_OVAL))
        .ok_or(StageError::EmptyRegion { region: "face oval" })?;

    let spread = (right.x - left.x).hypot(right.y - left.y);
    let drop = face.height() as f32 * BLUSH_DROP_FRACTION;
    let rx = spread * BLUSH_RADIUS_FRACTION;
    let ry = rx * BLUSH_ASPECT;

    let mut m = SoftMask::new(width, height);
    for c in [left, right] {
        m.fill_ellipse(Point::new(c.x, c.y + drop), rx, ry, 1.0);
    }
    m.feather(rx * BLUSH_FEATHER_FRACTION);
    m.clamp();
    Ok(m)
}

/// Highlight: a thin strip along the nose bridge plus small ellipses beside
/// the nostrils and above the cheekbones.
fn highlight_mask(landmarks: &LandmarkSet, width: u32, height: u32) -> Result<SoftMask, StageError> {
    let bridge = landmarks.select(regions::NOSE_BRIDGE);
    if bridge.len() < 2 {
        return Err(StageError::EmptyRegion { region: "nose bridge" });
    }
    let face = Rect::from_points(&landmarks.select(regions::FACE_OVAL))
        .ok_or(StageError::EmptyRegion { region: "face oval" })?;
    let face_w = face.width() as f32;
    let face_h = face.height() as f32;

    let mut m = SoftMask::new(width, height);

    // Bridge strip: offset the bridge polyline sideways and close the loop.
    let half_w = face_w * BRIDGE_HALF_WIDTH_FRACTION;
    let mut strip: Vec<Point> = bridge.iter().map(|p| Point::new(p.x - half_w, p.y)).collect();
    strip.extend(bridge.iter().rev().map(|p| Point::new(p.x + half_w, p.y)));
    m.fill_polygon(&strip, 1.0);

    let side_r = face_w * NOSE_SIDE_RADIUS_FRACTION;
    let side_off = face_w * NOSE_SIDE_OFFSET_FRACTION;
    if let Some(p) = landmarks.get(regions::LEFT_NOSE_WING) {
        m.fill_ellipse(Point::new(p.x - side_off, p.y), side_r, side_r, 1.0);
    }
    if let Some(p) = landmarks.get(regions::RIGHT_NOSE_WING) {
        m.fill_ellipse(Point::new(p.x + side_off, p.y), side_r, side_r, 1.0);
    }

    let cheek_r = face_w * CHEEK_RADIUS_FRACTION;
    for region in [regions::LEFT_CHEEKBONE, regions::RIGHT_CHEEKBONE] {
        if let Some(c) = centroid(&landmarks.select(region)) {
            m.fill_ellipse(
                Point::new(c.x, c.y - face_h * CHEEK_LIFT_FRACTION),
                cheek_r,
                cheek_r * 0.6,
                1.0,
            );
        }
    }

    m.feather(face_w * HIGHLIGHT_FEATHER_FRACTION);
    m.clamp();
    Ok(m)
}

fn blend_color(img: &RgbImage, mask: &SoftMask, overlay: &ColorOverlay) -> RgbImage {
    let alpha = overlay.alpha.clamp(0.0, 1.0);
    let mut out = img.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let a = mask.at(x as i32, y as i32) * alpha;
        if a <= 0.0 {
            continue;
        }
        for c in 0..3 {
            let v = px[c] as f32 * (1.0 - a) + overlay.color[c] as f32 * a;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
