//! Region-local warps: patch-resize enlargement and directional slimming.
//!
//! Both warps operate on a clamped crop around the target region and blend
//! the warped patch back through a feathered soft mask, so a warp can never
//! write outside its crop or leave a hard seam.

use crate::mask::SoftMask;
use crate::regions;
use crate::types::{LandmarkSet, Point, Rect, StageError};
use image::imageops::{self, FilterType};
use image::RgbImage;

// --- Warp geometry constants ---
const REGION_PAD_FRACTION: f32 = 0.3;
const CIRCLE_FEATHER_FRACTION: f32 = 0.4;
const SLIM_FEATHER_FRACTION: f32 = 0.15;
/// Regions narrower or shorter than this are degenerate and skip the warp.
const MIN_REGION_EXTENT_PX: i32 = 4;

/// Parameters for the lower-face slim warp.
#[derive(Debug, Clone, Copy)]
pub struct SlimParams {
    /// Horizontal squeeze factor for the lower face (0.85 = 15% narrower).
    pub horizontal_scale: f32,
    /// Fraction of the crop height where the slim ramp starts.
    pub lower_start_fraction: f32,
    /// Extend the crop below the chin by this fraction of the oval height.
    pub bottom_extension_fraction: f32,
    /// Extend the crop sideways by this fraction of the oval width.
    pub side_margin_fraction: f32,
}

impl Default for SlimParams {
    fn default() -> Self {
        Self {
            horizontal_scale: 0.85,
            lower_start_fraction: 0.55,
            bottom_extension_fraction: 0.40,
            side_margin_fraction: 0.15,
        }
    }
}

/// Enlarge (or shrink) the patch around a landmark region by `scale`,
/// blending the resized patch back through a radius-feathered circular mask.
///
/// Degenerate or fully clamped-away crops skip the warp and return the image
/// unchanged.
pub fn enlarge_region(
    img: &RgbImage,
    landmarks: &LandmarkSet,
    indices: &[usize],
    scale: f32,
) -> Result<RgbImage, StageError> {
    let pts = landmarks.select(indices);
    let bbox = Rect::from_points(&pts).ok_or(StageError::EmptyRegion { region: "enlarge" })?;

    if bbox.width() < MIN_REGION_EXTENT_PX || bbox.height() < MIN_REGION_EXTENT_PX {
        tracing::debug!(width = bbox.width(), height = bbox.height(), "enlarge region degenerate; skipped");
        return Ok(img.clone());
    }

    let pad = (bbox.width().max(bbox.height()) as f32 * REGION_PAD_FRACTION).round() as i32;
    let crop = bbox.padded(pad).clamped(img.width(), img.height());
    if crop.width() < 2 || crop.height() < 2 {
        tracing::debug!("enlarge crop clamped away; skipped");
        return Ok(img.clone());
    }

    let patch = imageops::crop_imm(
        img,
        crop.x0 as u32,
        crop.y0 as u32,
        crop.width() as u32,
        crop.height() as u32,
    )
    .to_image();
    let (pw, ph) = (crop.width(), crop.height());

    let new_w = ((pw as f32 * scale).round() as i32).max(1);
    let new_h = ((ph as f32 * scale).round() as i32).max(1);
    let resized = imageops::resize(&patch, new_w as u32, new_h as u32, FilterType::CatmullRom);

    // Recenter the resized patch on the crop center and take the overlap,
    // which handles both enlargement and shrink without out-of-bounds writes.
    let nx1 = pw / 2 - new_w / 2;
    let ny1 = ph / 2 - new_h / 2;
    let overlap = Rect::new(nx1, ny1, nx1 + new_w, ny1 + new_h).intersect(&Rect::new(0, 0, pw, ph));
    if overlap.is_empty() {
        return Ok(img.clone());
    }
    let (ow, oh) = (overlap.width(), overlap.height());

    let radius = ow.min(oh) as f32 / 2.0;
    let mut mask = SoftMask::new(ow as u32, oh as u32);
    mask.fill_ellipse(Point::new(ow as f32 / 2.0, oh as f32 / 2.0), radius, radius, 1.0);
    mask.feather(radius * CIRCLE_FEATHER_FRACTION);

    let mut out = img.clone();
    for dy in 0..oh {
        for dx in 0..ow {
            let m = mask.at(dx, dy);
            if m <= 0.0 {
                continue;
            }
            let tx = (overlap.x0 + dx) as u32;
            let ty = (overlap.y0 + dy) as u32;
            let rxp = (overlap.x0 - nx1 + dx) as u32;
            let ryp = (overlap.y0 - ny1 + dy) as u32;
            let t = patch.get_pixel(tx, ty);
            let r = resized.get_pixel(rxp, ryp);
            let mut px = *t;
            for c in 0..3 {
                let v = t[c] as f32 * (1.0 - m) + r[c] as f32 * m;
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(crop.x0 as u32 + tx, crop.y0 as u32 + ty, px);
        }
    }
    Ok(out)
}

/// Enlarge both eyes independently. Typical `scale` is 1.10–1.20.
pub fn enlarge_eyes(
    img: &RgbImage,
    landmarks: &LandmarkSet,
    scale: f32,
) -> Result<RgbImage, StageError> {
    let out = enlarge_region(img, landmarks, regions::LEFT_EYE, scale)?;
    let out = enlarge_region(&out, landmarks, regions::RIGHT_EYE, scale)?;
    tracing::debug!(scale, "eye enlargement applied");
    Ok(out)
}

/// Horizontally squeeze the lower face.
///
/// The crop bounds the face oval extended downward (jaw-to-neck transition)
/// and sideways; the blend weight is the oval polygon (everything below the
/// chin row forced to 1) multiplied by a vertical ramp, then feathered, so
/// only the lower face visibly narrows and the transition row has no seam.
pub fn slim_region(
    img: &RgbImage,
    landmarks: &LandmarkSet,
    oval_indices: &[usize],
    params: &SlimParams,
) -> Result<RgbImage, StageError> {
    let oval = landmarks.select(oval_indices);
    let bbox = Rect::from_points(&oval).ok_or(StageError::EmptyRegion { region: "slim" })?;

    if bbox.width() < MIN_REGION_EXTENT_PX || bbox.height() < MIN_REGION_EXTENT_PX {
        tracing::debug!(width = bbox.width(), height = bbox.height(), "slim region degenerate; skipped");
        return Ok(img.clone());
    }

    let extra_bottom = (bbox.height() as f32 * params.bottom_extension_fraction).round() as i32;
    let side_margin = (bbox.width() as f32 * params.side_margin_fraction).round() as i32;
    let crop = Rect::new(
        bbox.x0 - side_margin,
        bbox.y0,
        bbox.x1 + side_margin,
        bbox.y1 + extra_bottom,
    )
    .clamped(img.width(), img.height());
    if crop.width() < 2 || crop.height() < 2 {
        tracing::debug!("slim crop clamped away; skipped");
        return Ok(img.clone());
    }

    let roi = imageops::crop_imm(
        img,
        crop.x0 as u32,
        crop.y0 as u32,
        crop.width() as u32,
        crop.height() as u32,
    )
    .to_image();
    let (fw, fh) = (crop.width(), crop.height());

    let local: Vec<Point> = oval
        .iter()
        .map(|p| Point::new(p.x - crop.x0 as f32, p.y - crop.y0 as f32))
        .collect();

    let mut weight = SoftMask::new(fw as u32, fh as u32);
    weight.fill_polygon(&local, 1.0);

    // Everything below the chin row slims with the jaw.
    let chin_row = local
        .iter()
        .map(|p| p.y)
        .fold(f32::MIN, f32::max)
        .round() as i32;
    if chin_row >= 0 && chin_row < fh {
        weight.fill_rows_from(chin_row, 1.0);
    }

    // Vertical ramp: 0 above the start row, linear to 1 at the crop bottom.
    let start = (fh as f32 * params.lower_start_fraction) as i32;
    for y in 0..fh {
        let a = if y <= start {
            0.0
        } else {
            ((y - start) as f32 / (fh - start).max(1) as f32).clamp(0.0, 1.0)
        };
        for x in 0..fw {
            let v = weight.at(x, y) * a;
            weight.put(x, y, v);
        }
    }
    weight.feather(fh as f32 * SLIM_FEATHER_FRACTION);
    weight.clamp();

    let new_w = ((fw as f32 * params.horizontal_scale).round() as u32).max(1);
    let squeezed = imageops::resize(&roi, new_w, fh as u32, FilterType::Triangle);

    // Center the squeezed strip and pad back to crop width by edge replication.
    let pad_left = (fw - new_w as i32) / 2;
    let squeezed_full = RgbImage::from_fn(fw as u32, fh as u32, |x, y| {
        let sx = (x as i32 - pad_left).clamp(0, new_w as i32 - 1) as u32;
        *squeezed.get_pixel(sx, y)
    });

    let mut out = img.clone();
    for y in 0..fh {
        for x in 0..fw {
            let m = weight.at(x, y);
            if m <= 0.0 {
                continue;
            }
            let a = roi.get_pixel(x as u32, y as u32);
            let b = squeezed_full.get_pixel(x as u32, y as u32);
            let mut px = *a;
            for c in 0..3 {
                let v = a[c] as f32 * (1.0 - m) + b[c] as f32 * m;
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel((crop.x0 + x) as u32, (crop.y0 + y) as u32, px);
        }
    }

    tracing::debug!(
        crop_width = fw,
        squeezed_width = new_w,
        "lower face slim applied"
    );
    Ok(out)
}
