//! Global triangulated mesh warp.
//!
//! Builds a Delaunay triangulation of the source landmark set (plus eight
//! boundary-pinning points), derives a target set by scaling each region
//! about its own centroid, and warps every triangle through its unique
//! affine map into an accumulator. The final composite takes only the
//! dilated, feathered face-oval interior from the accumulator, so hair and
//! background are never touched.

use crate::mask::{self, SoftMask};
use crate::regions;
use crate::types::{centroid, LandmarkSet, Point, Rect, StageError};
use image::{Rgb, RgbImage};

// --- Mesh constants ---
const FACE_DILATE_FRACTION: f32 = 0.01;
const FACE_FEATHER_FRACTION: f32 = 0.02;
/// Source points closer than this collapse to one triangulation vertex.
const DEDUP_EPS: f32 = 0.5;
/// Triangles with |det| below this are degenerate and skipped.
const MIN_AFFINE_DET: f32 = 1e-3;

/// Warp the face through a piecewise-affine triangulated mesh.
///
/// `eye_scale` enlarges each eye about its own centroid; `oval_scale`
/// narrows the face-oval points horizontally about the face centroid.
/// One bad triangle (degenerate geometry, out-of-bounds vertex) is skipped
/// individually and never aborts the rest.
pub fn mesh_warp(
    img: &RgbImage,
    landmarks: &LandmarkSet,
    eye_scale: f32,
    oval_scale: f32,
) -> Result<RgbImage, StageError> {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 {
        return Err(StageError::NoTriangles);
    }
    let (src, dst) = derive_correspondences(landmarks, w, h, eye_scale, oval_scale);
    if src.len() < 3 {
        return Err(StageError::NoTriangles);
    }

    let triangles = triangulate(&src);
    if triangles.is_empty() {
        return Err(StageError::NoTriangles);
    }

    let mut acc = img.clone();
    let mut warped = 0usize;
    let mut skipped = 0usize;
    for t in &triangles {
        let s = [src[t[0]], src[t[1]], src[t[2]]];
        let d = [dst[t[0]], dst[t[1]], dst[t[2]]];
        if warp_triangle(img, &mut acc, &s, &d) {
            warped += 1;
        } else {
            skipped += 1;
        }
    }
    tracing::debug!(triangles = triangles.len(), warped, skipped, "mesh warp rasterized");

    // Only the face interior comes from the warped accumulator; everything
    // outside reverts to the original image.
    let oval = landmarks.select(regions::FACE_OVAL);
    let mut face = SoftMask::new(w, h);
    face.fill_polygon(&oval, 1.0);
    let dilate_radius = ((w.max(h) as f32) * FACE_DILATE_FRACTION).round().clamp(1.0, 255.0) as u8;
    face.dilate(dilate_radius);
    face.feather(w.max(h) as f32 * FACE_FEATHER_FRACTION);
    face.clamp();

    Ok(mask::composite(img, &acc, &face, 1.0))
}

/// Derive matched source/target point lists: region-scaled landmark targets,
/// in-bounds filtering, near-duplicate collapse, and the eight boundary pins
/// appended identically to both sides.
fn derive_correspondences(
    landmarks: &LandmarkSet,
    width: u32,
    height: u32,
    eye_scale: f32,
    oval_scale: f32,
) -> (Vec<Point>, Vec<Point>) {
    let mut targets: Vec<Point> = landmarks.points().to_vec();

    for eye in [regions::LEFT_EYE, regions::RIGHT_EYE] {
        if let Some(c) = centroid(&landmarks.select(eye)) {
            for &i in eye {
                if i < targets.len() {
                    targets[i] = targets[i].scaled_about(c, eye_scale, eye_scale);
                }
            }
        }
    }
    if let Some(c) = centroid(&landmarks.select(regions::FACE_OVAL)) {
        for &i in regions::FACE_OVAL {
            if i < targets.len() {
                targets[i] = targets[i].scaled_about(c, oval_scale, 1.0);
            }
        }
    }

    let in_bounds = |p: &Point| {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= (width - 1) as f32 && p.y <= (height - 1) as f32
    };

    let mut src: Vec<Point> = Vec::with_capacity(targets.len() + 8);
    let mut dst: Vec<Point> = Vec::with_capacity(targets.len() + 8);
    let push_pair = |s: Point, d: Point, src: &mut Vec<Point>, dst: &mut Vec<Point>| {
        if !in_bounds(&s) || !in_bounds(&d) {
            return;
        }
        let dup = src
            .iter()
            .any(|r| (r.x - s.x).abs() < DEDUP_EPS && (r.y - s.y).abs() < DEDUP_EPS);
        if !dup {
            src.push(s);
            dst.push(d);
        }
    };

    for (i, &p) in landmarks.points().iter().enumerate() {
        push_pair(p, targets[i], &mut src, &mut dst);
    }
    for b in boundary_points(width, height) {
        push_pair(b, b, &mut src, &mut dst);
    }
    (src, dst)
}

/// Eight frame-pinning points: corners plus edge midpoints.
fn boundary_points(width: u32, height: u32) -> [Point; 8] {
    let xe = (width - 1) as f32;
    let ye = (height - 1) as f32;
    let xm = xe / 2.0;
    let ym = ye / 2.0;
    [
        Point::new(0.0, 0.0),
        Point::new(xm, 0.0),
        Point::new(xe, 0.0),
        Point::new(0.0, ym),
        Point::new(xe, ym),
        Point::new(0.0, ye),
        Point::new(xm, ye),
        Point::new(xe, ye),
    ]
}

/// Bowyer–Watson incremental Delaunay triangulation.
///
/// Runs in f64: circumcircle tests on pixel-scale coordinates overflow f32
/// precision. Degenerate (near-zero-area) candidate triangles test as
/// "circumcircle contains everything" so they are always replaced rather
/// than kept.
fn triangulate(points: &[Point]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let mut all: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();

    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for &(x, y) in &all {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(1.0);
    let mid_x = (min_x + max_x) / 2.0;
    let mid_y = (min_y + max_y) / 2.0;

    // Super-triangle comfortably enclosing every point.
    all.push((mid_x - 20.0 * span, mid_y - span));
    all.push((mid_x + 20.0 * span, mid_y - span));
    all.push((mid_x, mid_y + 20.0 * span));
    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];

    for i in 0..n {
        let p = all[i];

        let bad: Vec<usize> = triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| circumcircle_contains(all[t[0]], all[t[1]], all[t[2]], p))
            .map(|(idx, _)| idx)
            .collect();

        // Edges of the cavity: triangle edges not shared by two bad triangles.
        let mut edges: Vec<(usize, usize, bool)> = Vec::new();
        for &ti in &bad {
            let t = triangles[ti];
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                let key = (a.min(b), a.max(b));
                match edges.iter_mut().find(|(ea, eb, _)| (*ea, *eb) == key) {
                    Some(e) => e.2 = true,
                    None => edges.push((key.0, key.1, false)),
                }
            }
        }

        // bad is ascending, so reverse order keeps swap_remove indices valid.
        for &ti in bad.iter().rev() {
            triangles.swap_remove(ti);
        }
        for (a, b, shared) in edges {
            if shared {
                continue;
            }
            // Never keep a zero-area triangle; a collinear cavity edge just
            // leaves that sliver untriangulated.
            let area2 = (all[b].0 - all[a].0) * (p.1 - all[a].1)
                - (all[b].1 - all[a].1) * (p.0 - all[a].0);
            if area2.abs() < 1e-9 {
                continue;
            }
            triangles.push([a, b, i]);
        }
    }

    triangles.retain(|t| t[0] < n && t[1] < n && t[2] < n);
    triangles
}

fn circumcircle_contains(a: (f64, f64), b: (f64, f64), c: (f64, f64), p: (f64, f64)) -> bool {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-9 {
        return true;
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let ux = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let uy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    let r2 = (a.0 - ux).powi(2) + (a.1 - uy).powi(2);
    let p2 = (p.0 - ux).powi(2) + (p.1 - uy).powi(2);
    // Inclusive at the circle itself so exactly-cocircular points still bust
    // the cavity instead of stranding the inserted point.
    p2 <= r2 + 1e-7
}

/// Warp one source triangle onto its destination triangle in `acc`.
///
/// Returns false when the triangle is skipped: any vertex outside the image,
/// a zero-area bounding rectangle, or a degenerate affine solve.
fn warp_triangle(img: &RgbImage, acc: &mut RgbImage, s: &[Point; 3], d: &[Point; 3]) -> bool {
    let (w, h) = img.dimensions();
    for p in s.iter().chain(d.iter()) {
        if p.x < 0.0 || p.y < 0.0 || p.x > (w - 1) as f32 || p.y > (h - 1) as f32 {
            return false;
        }
    }

    let sbox = match Rect::from_points(s) {
        Some(r) => r.clamped(w, h),
        None => return false,
    };
    let dbox = match Rect::from_points(d) {
        Some(r) => r.clamped(w, h),
        None => return false,
    };
    if sbox.is_empty() || dbox.is_empty() {
        return false;
    }

    // Inverse mapping: destination pixel -> source coordinates.
    let m = match affine_map(d, s) {
        Some(m) => m,
        None => return false,
    };

    // Mask to the exact destination triangle.
    let local: Vec<Point> = d
        .iter()
        .map(|p| Point::new(p.x - dbox.x0 as f32, p.y - dbox.y0 as f32))
        .collect();
    let mut tri = SoftMask::new(dbox.width() as u32, dbox.height() as u32);
    tri.fill_polygon(&local, 1.0);
    if tri.coverage(0.5) == 0 {
        return false;
    }

    for dy in 0..dbox.height() {
        for dx in 0..dbox.width() {
            if tri.at(dx, dy) < 0.5 {
                continue;
            }
            let gx = (dbox.x0 + dx) as f32;
            let gy = (dbox.y0 + dy) as f32;
            let sx = m[0] * gx + m[1] * gy + m[2];
            let sy = m[3] * gx + m[4] * gy + m[5];
            acc.put_pixel(
                (dbox.x0 + dx) as u32,
                (dbox.y0 + dy) as u32,
                sample_bilinear(img, sx, sy),
            );
        }
    }
    true
}

/// Solve the unique affine map taking the three `from` vertices to the three
/// `to` vertices. `None` when the source triangle is (near-)degenerate.
///
/// Solved in f64: Cramer numerators on pixel-scale coordinates lose enough
/// f32 precision to visibly perturb an identity warp.
fn affine_map(from: &[Point; 3], to: &[Point; 3]) -> Option<[f32; 6]> {
    let [p1, p2, p3] = from.map(|p| (p.x as f64, p.y as f64));
    let det = p1.0 * (p2.1 - p3.1) - p1.1 * (p2.0 - p3.0) + (p2.0 * p3.1 - p3.0 * p2.1);
    if det.abs() < MIN_AFFINE_DET as f64 {
        return None;
    }

    let solve = |t1: f64, t2: f64, t3: f64| -> (f64, f64, f64) {
        let a = (t1 * (p2.1 - p3.1) - p1.1 * (t2 - t3) + (t2 * p3.1 - t3 * p2.1)) / det;
        let b = (p1.0 * (t2 - t3) - t1 * (p2.0 - p3.0) + (p2.0 * t3 - p3.0 * t2)) / det;
        let c = (p1.0 * (p2.1 * t3 - p3.1 * t2) - p1.1 * (p2.0 * t3 - p3.0 * t2)
            + t1 * (p2.0 * p3.1 - p3.0 * p2.1))
            / det;
        (a, b, c)
    };

    let (a, b, c) = solve(to[0].x as f64, to[1].x as f64, to[2].x as f64);
    let (d, e, f) = solve(to[0].y as f64, to[1].y as f64, to[2].y as f64);
    Some([a as f32, b as f32, c as f32, d as f32, e as f32, f as f32])
}

/// Bilinear sample with clamped coordinates.
fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mean_abs_diff, synthetic_face, synthetic_portrait};

    #[test]
    fn test_triangulate_square() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let tris = triangulate(&pts);
        assert_eq!(tris.len(), 2, "square should split into two triangles");
        for t in &tris {
            assert!(t.iter().all(|&i| i < 4));
        }
    }

    #[test]
    fn test_triangulate_covers_all_vertices() {
        let lm = synthetic_face(320, 400);
        let (src, _) = derive_correspondences(&lm, 320, 400, 1.1, 0.9);
        let tris = triangulate(&src);
        assert!(tris.len() > 100, "only {} triangles", tris.len());

        let mut used = vec![false; src.len()];
        for t in &tris {
            for &i in t {
                used[i] = true;
            }
        }
        let unused = used.iter().filter(|&&u| !u).count();
        assert!(
            unused <= src.len() / 20,
            "{unused}/{} vertices missing from the triangulation",
            src.len()
        );
    }

    #[test]
    fn test_circumcircle() {
        let a = (0.0, 0.0);
        let b = (10.0, 0.0);
        let c = (0.0, 10.0);
        assert!(circumcircle_contains(a, b, c, (5.0, 5.0)));
        assert!(!circumcircle_contains(a, b, c, (100.0, 100.0)));
    }

    #[test]
    fn test_affine_identity() {
        let tri = [Point::new(0.0, 0.0), Point::new(8.0, 1.0), Point::new(2.0, 9.0)];
        let m = affine_map(&tri, &tri).unwrap();
        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4);
        assert!(m[2].abs() < 1e-3);
        assert!((m[4] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_affine_degenerate_is_none() {
        let collinear = [Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(10.0, 10.0)];
        let dst = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert!(affine_map(&collinear, &dst).is_none());
    }

    #[test]
    fn test_identity_scales_are_byte_identical() {
        let img = synthetic_portrait(320, 400);
        let lm = synthetic_face(320, 400);
        let out = mesh_warp(&img, &lm, 1.0, 1.0).unwrap();
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn test_border_pixels_unchanged() {
        let img = synthetic_portrait(320, 400);
        let lm = synthetic_face(320, 400);
        let out = mesh_warp(&img, &lm, 1.2, 0.88).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());

        let (w, h) = img.dimensions();
        for x in 0..w {
            assert_eq!(out.get_pixel(x, 0), img.get_pixel(x, 0), "top border at x={x}");
            assert_eq!(out.get_pixel(x, h - 1), img.get_pixel(x, h - 1), "bottom border at x={x}");
        }
        for y in 0..h {
            assert_eq!(out.get_pixel(0, y), img.get_pixel(0, y), "left border at y={y}");
            assert_eq!(out.get_pixel(w - 1, y), img.get_pixel(w - 1, y), "right border at y={y}");
        }
    }

    #[test]
    fn test_warp_changes_face_interior() {
        let img = synthetic_portrait(320, 400);
        let lm = synthetic_face(320, 400);
        let out = mesh_warp(&img, &lm, 1.2, 0.88).unwrap();
        assert!(mean_abs_diff(&img, &out) > 0.1, "mesh warp had no visible effect");
    }

    #[test]
    fn test_collinear_landmarks_do_not_panic() {
        let img = synthetic_portrait(128, 128);
        let points: Vec<Point> = (0..regions::LANDMARK_COUNT)
            .map(|i| Point::new(64.0, (i % 100) as f32 + 10.0))
            .collect();
        let lm = LandmarkSet::new(points);
        // Either no usable triangles or an unchanged image; both are fine.
        if let Ok(out) = mesh_warp(&img, &lm, 1.2, 0.9) {
            assert_eq!(out.dimensions(), img.dimensions());
        }
    }
}
