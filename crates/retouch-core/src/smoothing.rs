//! Region-limited, edge-preserving skin smoothing.
//!
//! The blend weight is a multi-part soft mask: face-oval interior (cross-
//! checked against a coarse stable-anchor polygon, eroded), minus partial
//! eye and mouth exclusions, feathered. The bilateral filter itself runs
//! only inside the mask's bounding box.

use crate::mask::{self, SoftMask};
use crate::regions;
use crate::types::{centroid, LandmarkSet, Point, Rect, StageError};
use image::RgbImage;

// --- Mask geometry constants ---
const MIN_REGION_EXTENT_PX: i32 = 4;
const ANCHOR_EXPAND: f32 = 1.8;
const CHIN_MARGIN_FRACTION: f32 = 0.03;
const ERODE_FRACTION: f32 = 0.005;
const EYE_PAD_FRACTION: f32 = 0.5;
const EYE_FEATHER_FRACTION: f32 = 0.02;
const MOUTH_PAD_FRACTION: f32 = 0.4;
const MOUTH_FEATHER_FRACTION: f32 = 0.015;
const FINAL_FEATHER_FRACTION: f32 = 0.01;
/// Eyes keep 30% of the smoothing, the mouth 50%, rather than a hard cutout.
const EYE_EXCLUSION_STRENGTH: f32 = 0.7;
const MOUTH_EXCLUSION_STRENGTH: f32 = 0.5;
/// Below these the stage is near-zero-effect work and skips itself.
const MIN_MASK_PIXELS: usize = 100;
const MIN_MASK_PEAK: f32 = 0.2;

/// Skin smoothing parameters.
#[derive(Debug, Clone, Copy)]
pub struct SmoothingParams {
    /// Global blend bound in [0, 1]; caps the effect even where the mask is 1.
    pub strength: f32,
    /// Bilateral filter window diameter in pixels.
    pub diameter: u32,
    /// Bilateral color-space standard deviation.
    pub sigma_color: f32,
    /// Bilateral coordinate-space standard deviation.
    pub sigma_space: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            strength: 0.5,
            diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

/// Smooth facial skin inside a feathered, region-limited mask.
///
/// Degenerate face geometry or an undersized mask skips the stage and
/// returns the input unchanged.
pub fn smooth_skin(
    img: &RgbImage,
    landmarks: &LandmarkSet,
    params: &SmoothingParams,
) -> Result<RgbImage, StageError> {
    let (w, h) = img.dimensions();
    let oval = landmarks.select(regions::FACE_OVAL);
    let bbox = Rect::from_points(&oval).ok_or(StageError::EmptyRegion { region: "skin" })?;

    if bbox.width() < MIN_REGION_EXTENT_PX || bbox.height() < MIN_REGION_EXTENT_PX {
        tracing::debug!(width = bbox.width(), height = bbox.height(), "face oval degenerate; smoothing skipped");
        return Ok(img.clone());
    }

    let mut weight = SoftMask::new(w, h);
    weight.fill_polygon(&oval, 1.0);

    // Trim the jaw-to-neck transition below the chin row.
    let chin_margin = (bbox.height() as f32 * CHIN_MARGIN_FRACTION).round() as i32;
    weight.fill_rows_from(bbox.y1 - 1 - chin_margin, 0.0);

    // Cross-check against the coarse stable-anchor polygon so a distorted
    // oval cannot push smoothing onto hair or background.
    let anchors = landmarks.select(regions::STABLE_ANCHORS);
    if let Some(c) = centroid(&anchors) {
        let expanded: Vec<Point> = anchors
            .iter()
            .map(|p| p.scaled_about(c, ANCHOR_EXPAND, ANCHOR_EXPAND))
            .collect();
        let mut cross = SoftMask::new(w, h);
        cross.fill_polygon(&expanded, 1.0);
        weight.intersect(&cross);
    }

    let erode_radius = ((w.max(h) as f32) * ERODE_FRACTION).round().clamp(1.0, 255.0) as u8;
    weight.erode(erode_radius);

    let mut eyes = SoftMask::new(w, h);
    for eye in [regions::LEFT_EYE, regions::RIGHT_EYE] {
        if let Some(r) = Rect::from_points(&landmarks.select(eye)) {
            let pad = (r.width().max(r.height()) as f32 * EYE_PAD_FRACTION).round() as i32;
            eyes.fill_rect(r.padded(pad), 1.0);
        }
    }
    eyes.feather(w.max(h) as f32 * EYE_FEATHER_FRACTION);

    let mut mouth = SoftMask::new(w, h);
    if let Some(r) = Rect::from_points(&landmarks.select(regions::LIPS_OUTER)) {
        let pad = (r.width().max(r.height()) as f32 * MOUTH_PAD_FRACTION).round() as i32;
        mouth.fill_rect(r.padded(pad), 1.0);
    }
    mouth.feather(w.max(h) as f32 * MOUTH_FEATHER_FRACTION);

    weight.suppress(&eyes, EYE_EXCLUSION_STRENGTH);
    weight.suppress(&mouth, MOUTH_EXCLUSION_STRENGTH);
    weight.feather(w.max(h) as f32 * FINAL_FEATHER_FRACTION);
    weight.clamp();

    let coverage = weight.coverage(0.05);
    let peak = weight.peak();
    if coverage < MIN_MASK_PIXELS || peak < MIN_MASK_PEAK {
        tracing::debug!(coverage, peak, "smoothing mask undersized; skipped");
        return Ok(img.clone());
    }
    let Some(work_area) = weight.bounding_rect(0.01) else {
        return Ok(img.clone());
    };

    let smoothed = bilateral_region(
        img,
        &work_area,
        params.diameter,
        params.sigma_color,
        params.sigma_space,
    );
    let strength = params.strength.clamp(0.0, 1.0);
    let out = mask::composite(img, &smoothed, &weight, strength);
    tracing::debug!(coverage, peak, strength, "skin smoothing applied");
    Ok(out)
}

/// Edge-preserving bilateral filter over `rect` only; pixels outside are
/// copied through. Color weight is the product of per-channel Gaussian
/// lookups, which equals the joint Gaussian over the RGB distance.
fn bilateral_region(
    img: &RgbImage,
    rect: &Rect,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> RgbImage {
    let mut out = img.clone();
    if sigma_color <= 0.0 || sigma_space <= 0.0 {
        return out;
    }
    let (w, h) = img.dimensions();
    let rect = rect.clamped(w, h);
    if rect.is_empty() {
        return out;
    }
    let radius = (diameter.max(1) / 2) as i32;
    let side = (2 * radius + 1) as usize;

    let ss2 = 2.0 * sigma_space * sigma_space;
    let mut spatial = vec![0.0f32; side * side];
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let idx = (dy + radius) as usize * side + (dx + radius) as usize;
            spatial[idx] = (-((dx * dx + dy * dy) as f32) / ss2).exp();
        }
    }

    let sc2 = 2.0 * sigma_color * sigma_color;
    let mut color_lut = [0.0f32; 256];
    for (d, slot) in color_lut.iter_mut().enumerate() {
        *slot = (-((d * d) as f32) / sc2).exp();
    }

    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            let center = *img.get_pixel(x as u32, y as u32);
            let mut acc = [0.0f32; 3];
            let mut wsum = 0.0f32;
            for dy in -radius..=radius {
                let ny = y + dy;
                if ny < 0 || ny >= h as i32 {
                    continue;
                }
                for dx in -radius..=radius {
                    let nx = x + dx;
                    if nx < 0 || nx >= w as i32 {
                        continue;
                    }
                    let q = *img.get_pixel(nx as u32, ny as u32);
                    let wgt = spatial[(dy + radius) as usize * side + (dx + radius) as usize]
                        * color_lut[center[0].abs_diff(q[0]) as usize]
                        * color_lut[center[1].abs_diff(q[1]) as usize]
                        * color_lut[center[2].abs_diff(q[2]) as usize];
                    wsum += wgt;
                    for c in 0..3 {
                        acc[c] += q[c] as f32 * wgt;
                    }
                }
            }
            if wsum > 0.0 {
                let mut px = center;
                for c in 0..3 {
                    px[c] = (acc[c] / wsum).round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(x as u32, y as u32, px);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mean_abs_diff, synthetic_face, synthetic_portrait};
    use image::Rgb;

    #[test]
    fn test_smoothing_changes_face_but_not_border() {
        let img = synthetic_portrait(320, 400);
        let lm = synthetic_face(320, 400);
        let out = smooth_skin(&img, &lm, &SmoothingParams::default()).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        assert!(mean_abs_diff(&img, &out) > 0.01, "smoothing had no effect");

        let (w, h) = img.dimensions();
        for x in 0..w {
            assert_eq!(out.get_pixel(x, 0), img.get_pixel(x, 0));
            assert_eq!(out.get_pixel(x, h - 1), img.get_pixel(x, h - 1));
        }
    }

    #[test]
    fn test_zero_width_oval_returns_input_byte_identical() {
        let img = synthetic_portrait(320, 400);
        let lm = synthetic_face(320, 400);
        let mut points = lm.points().to_vec();
        for &i in regions::FACE_OVAL {
            points[i].x = 100.0;
        }
        let out = smooth_skin(&img, &LandmarkSet::new(points), &SmoothingParams::default()).unwrap();
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn test_tiny_face_skips_via_mask_guard() {
        let img = synthetic_portrait(320, 400);
        // A face collapsed to a 6px blob clears the extent check but leaves
        // an undersized mask after erosion.
        let points: Vec<Point> = (0..regions::LANDMARK_COUNT)
            .map(|i| Point::new(160.0 + (i % 3) as f32 * 2.0, 200.0 + (i % 2) as f32 * 3.0))
            .collect();
        let out = smooth_skin(&img, &LandmarkSet::new(points), &SmoothingParams::default()).unwrap();
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn test_zero_strength_is_byte_identical() {
        let img = synthetic_portrait(320, 400);
        let lm = synthetic_face(320, 400);
        let params = SmoothingParams {
            strength: 0.0,
            ..SmoothingParams::default()
        };
        let out = smooth_skin(&img, &lm, &params).unwrap();
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn test_bilateral_preserves_constant_image() {
        let img = RgbImage::from_pixel(32, 32, Rgb([120, 90, 60]));
        let out = bilateral_region(&img, &Rect::new(0, 0, 32, 32), 9, 75.0, 75.0);
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn test_bilateral_only_touches_rect() {
        let img = synthetic_portrait(64, 64);
        let out = bilateral_region(&img, &Rect::new(16, 16, 48, 48), 9, 75.0, 75.0);
        for (x, y, px) in out.enumerate_pixels() {
            let inside = (16..48).contains(&(x as i32)) && (16..48).contains(&(y as i32));
            if !inside {
                assert_eq!(px, img.get_pixel(x, y), "pixel ({x},{y}) outside rect changed");
            }
        }
    }

    #[test]
    fn test_bilateral_nonpositive_sigma_is_noop() {
        let img = synthetic_portrait(32, 32);
        let out = bilateral_region(&img, &Rect::new(0, 0, 32, 32), 9, 0.0, 75.0);
        assert_eq!(out.as_raw(), img.as_raw());
    }
}
