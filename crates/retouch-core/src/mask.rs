//! Soft mask construction and algebra.
//!
//! A [`SoftMask`] is a single-channel f32 raster with values in [0, 1], built
//! from polygon/ellipse/rectangle fills and Gaussian feathering, then used to
//! composite two images without a hard edge. Masks are constructed fresh per
//! stage and never shared across stages.

use crate::types::{Point, Rect};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing;
use imageproc::point::Point as PolyPoint;

type MaskBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Binarization threshold when converting to u8 for morphology.
const MORPHOLOGY_THRESHOLD: f32 = 0.5;

/// Per-pixel floating blend weight raster.
pub struct SoftMask {
    buf: MaskBuffer,
}

impl SoftMask {
    /// An all-zero mask of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: MaskBuffer::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Mask value at (x, y); 0.0 outside the raster.
    pub fn at(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x >= self.buf.width() as i32 || y >= self.buf.height() as i32 {
            return 0.0;
        }
        self.buf.get_pixel(x as u32, y as u32)[0]
    }

    pub fn put(&mut self, x: i32, y: i32, value: f32) {
        if x < 0 || y < 0 || x >= self.buf.width() as i32 || y >= self.buf.height() as i32 {
            return;
        }
        self.buf.put_pixel(x as u32, y as u32, Luma([value]));
    }

    /// Fill the polygon spanned by `points` with `value`.
    ///
    /// Points are rounded to pixels; consecutive duplicates and a closing
    /// point equal to the first are dropped. Fewer than 3 distinct vertices
    /// is a degenerate polygon and leaves the mask untouched.
    pub fn fill_polygon(&mut self, points: &[Point], value: f32) {
        let mut poly: Vec<PolyPoint<i32>> = Vec::with_capacity(points.len());
        for p in points {
            let q = PolyPoint::new(p.x.round() as i32, p.y.round() as i32);
            if poly.last() != Some(&q) {
                poly.push(q);
            }
        }
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if poly.len() < 3 {
            return;
        }
        drawing::draw_polygon_mut(&mut self.buf, &poly, Luma([value]));
    }

    /// Fill an axis-aligned ellipse. Radii below one pixel leave the mask
    /// untouched.
    pub fn fill_ellipse(&mut self, center: Point, rx: f32, ry: f32, value: f32) {
        let rx = rx.round() as i32;
        let ry = ry.round() as i32;
        if rx < 1 || ry < 1 {
            return;
        }
        drawing::draw_filled_ellipse_mut(
            &mut self.buf,
            (center.x.round() as i32, center.y.round() as i32),
            rx,
            ry,
            Luma([value]),
        );
    }

    /// Fill a rectangle, clamped to the raster.
    pub fn fill_rect(&mut self, rect: Rect, value: f32) {
        let r = rect.clamped(self.buf.width(), self.buf.height());
        if r.is_empty() {
            return;
        }
        drawing::draw_filled_rect_mut(
            &mut self.buf,
            imageproc::rect::Rect::at(r.x0, r.y0).of_size(r.width() as u32, r.height() as u32),
            Luma([value]),
        );
    }

    /// Force every row at or below `row` to `value`.
    pub fn fill_rows_from(&mut self, row: i32, value: f32) {
        let start = row.max(0) as u32;
        for y in start..self.buf.height() {
            for x in 0..self.buf.width() {
                self.buf.put_pixel(x, y, Luma([value]));
            }
        }
    }

    /// Gaussian-feather the mask edges. A non-positive sigma is a no-op, so
    /// a feather radius of zero leaves the binary fill intact.
    pub fn feather(&mut self, sigma: f32) {
        if sigma <= 0.0 {
            return;
        }
        self.buf = imageproc::filter::gaussian_blur_f32(&self.buf, sigma);
        self.clamp();
    }

    /// Morphological erosion of the binarized mask (L∞ ball of `radius`).
    pub fn erode(&mut self, radius: u8) {
        self.morph(radius, false);
    }

    /// Morphological dilation of the binarized mask (L∞ ball of `radius`).
    pub fn dilate(&mut self, radius: u8) {
        self.morph(radius, true);
    }

    fn morph(&mut self, radius: u8, grow: bool) {
        if radius == 0 {
            return;
        }
        let mut gray = GrayImage::new(self.buf.width(), self.buf.height());
        for (x, y, px) in self.buf.enumerate_pixels() {
            let v = if px[0] > MORPHOLOGY_THRESHOLD { 255 } else { 0 };
            gray.put_pixel(x, y, Luma([v]));
        }
        let gray = if grow {
            imageproc::morphology::dilate(&gray, Norm::LInf, radius)
        } else {
            imageproc::morphology::erode(&gray, Norm::LInf, radius)
        };
        for (x, y, px) in gray.enumerate_pixels() {
            let v = if px[0] > 0 { 1.0 } else { 0.0 };
            self.buf.put_pixel(x, y, Luma([v]));
        }
    }

    /// Pointwise product with another mask of the same dimensions.
    pub fn intersect(&mut self, other: &SoftMask) {
        for (x, y, px) in self.buf.enumerate_pixels_mut() {
            px[0] *= other.at(x as i32, y as i32);
        }
    }

    /// Attenuate by another mask at partial strength:
    /// `self *= 1 - other * strength`.
    pub fn suppress(&mut self, other: &SoftMask, strength: f32) {
        for (x, y, px) in self.buf.enumerate_pixels_mut() {
            px[0] *= 1.0 - other.at(x as i32, y as i32) * strength;
        }
    }

    /// Pointwise subtraction, clamped at zero.
    pub fn subtract(&mut self, other: &SoftMask) {
        for (x, y, px) in self.buf.enumerate_pixels_mut() {
            px[0] = (px[0] - other.at(x as i32, y as i32)).max(0.0);
        }
    }

    /// Clamp every value to [0, 1].
    pub fn clamp(&mut self) {
        for px in self.buf.pixels_mut() {
            px[0] = px[0].clamp(0.0, 1.0);
        }
    }

    /// Largest mask value.
    pub fn peak(&self) -> f32 {
        self.buf.pixels().map(|p| p[0]).fold(0.0, f32::max)
    }

    /// Number of pixels strictly above `threshold`.
    pub fn coverage(&self, threshold: f32) -> usize {
        self.buf.pixels().filter(|p| p[0] > threshold).count()
    }

    /// Bounding rectangle of pixels strictly above `threshold`.
    pub fn bounding_rect(&self, threshold: f32) -> Option<Rect> {
        let mut found = false;
        let (mut x0, mut y0) = (i32::MAX, i32::MAX);
        let (mut x1, mut y1) = (0i32, 0i32);
        for (x, y, px) in self.buf.enumerate_pixels() {
            if px[0] > threshold {
                found = true;
                x0 = x0.min(x as i32);
                y0 = y0.min(y as i32);
                x1 = x1.max(x as i32 + 1);
                y1 = y1.max(y as i32 + 1);
            }
        }
        found.then(|| Rect::new(x0, y0, x1, y1))
    }
}

/// Per-pixel composite: `original * (1 - m*strength) + processed * m*strength`
/// where `m` is the mask value. `strength` bounds the blend even where the
/// mask saturates at 1.
pub fn composite(
    original: &RgbImage,
    processed: &RgbImage,
    mask: &SoftMask,
    strength: f32,
) -> RgbImage {
    let mut out = original.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let a = (mask.at(x as i32, y as i32) * strength).clamp(0.0, 1.0);
        if a <= 0.0 {
            continue;
        }
        let q = processed.get_pixel(x, y);
        for c in 0..3 {
            let v = px[c] as f32 * (1.0 - a) + q[c] as f32 * a;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(feather: f32) -> SoftMask {
        let mut m = SoftMask::new(40, 40);
        m.fill_polygon(
            &[
                Point::new(10.0, 10.0),
                Point::new(30.0, 10.0),
                Point::new(30.0, 30.0),
                Point::new(10.0, 30.0),
            ],
            1.0,
        );
        m.feather(feather);
        m
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        for sigma in [0.0, 1.5, 6.0] {
            let m = square_mask(sigma);
            for y in 0..40 {
                for x in 0..40 {
                    let v = m.at(x, y);
                    assert!((0.0..=1.0).contains(&v), "mask({x},{y}) = {v} at sigma {sigma}");
                }
            }
        }
    }

    #[test]
    fn test_zero_feather_equals_binary_fill() {
        let binary = square_mask(0.0);
        assert_eq!(binary.at(20, 20), 1.0);
        assert_eq!(binary.at(5, 5), 0.0);
        // Interior pixels are exactly 0 or 1, nothing in between.
        for y in 0..40 {
            for x in 0..40 {
                let v = binary.at(x, y);
                assert!(v == 0.0 || v == 1.0, "mask({x},{y}) = {v}");
            }
        }
    }

    #[test]
    fn test_feather_softens_edge() {
        let m = square_mask(3.0);
        // A pixel just outside the square picks up weight from the blur.
        assert!(m.at(8, 20) > 0.0);
        // The far corner sees at most negligible tail weight.
        assert!(m.at(0, 0) < 0.05);
    }

    #[test]
    fn test_degenerate_polygon_is_noop() {
        let mut m = SoftMask::new(20, 20);
        // All points collapse onto one pixel.
        m.fill_polygon(
            &[Point::new(5.0, 5.0), Point::new(5.2, 5.1), Point::new(4.9, 5.0)],
            1.0,
        );
        assert_eq!(m.coverage(0.0), 0);
    }

    #[test]
    fn test_subtract_clamps_at_zero() {
        let mut a = SoftMask::new(10, 10);
        a.fill_rect(Rect::new(0, 0, 5, 5), 0.5);
        let mut b = SoftMask::new(10, 10);
        b.fill_rect(Rect::new(0, 0, 10, 10), 1.0);
        a.subtract(&b);
        assert_eq!(a.peak(), 0.0);
    }

    #[test]
    fn test_suppress_partial_strength() {
        let mut a = SoftMask::new(4, 4);
        a.fill_rect(Rect::new(0, 0, 4, 4), 1.0);
        let mut b = SoftMask::new(4, 4);
        b.fill_rect(Rect::new(0, 0, 4, 4), 1.0);
        a.suppress(&b, 0.7);
        assert!((a.at(1, 1) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_erode_shrinks_coverage() {
        let mut m = square_mask(0.0);
        let before = m.coverage(0.5);
        m.erode(2);
        let after = m.coverage(0.5);
        assert!(after < before, "erode did not shrink: {before} -> {after}");
    }

    #[test]
    fn test_dilate_grows_coverage() {
        let mut m = square_mask(0.0);
        let before = m.coverage(0.5);
        m.dilate(2);
        assert!(m.coverage(0.5) > before);
    }

    #[test]
    fn test_bounding_rect() {
        let m = square_mask(0.0);
        let r = m.bounding_rect(0.5).unwrap();
        assert!(r.x0 >= 9 && r.x1 <= 32, "unexpected bbox {r:?}");
        assert!(!r.is_empty());
    }

    #[test]
    fn test_out_of_bounds_reads_are_zero() {
        let m = square_mask(0.0);
        assert_eq!(m.at(-1, 0), 0.0);
        assert_eq!(m.at(0, 400), 0.0);
    }

    #[test]
    fn test_composite_strength_bounds_blend() {
        let original = RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));
        let processed = RgbImage::from_pixel(8, 8, image::Rgb([200, 200, 200]));
        let mut m = SoftMask::new(8, 8);
        m.fill_rect(Rect::new(0, 0, 8, 8), 1.0);
        let out = composite(&original, &processed, &m, 0.5);
        assert_eq!(out.get_pixel(3, 3)[0], 100);
    }
}
