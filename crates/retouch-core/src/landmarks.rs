//! Landmark plausibility validation and outlier stabilization.
//!
//! The validator rejects geometrically implausible detector output before any
//! warp runs; the stabilizer pulls isolated outlier points back to their
//! group median so they cannot create seam artifacts in later stages.

use crate::regions;
use crate::types::{LandmarkSet, Point};
use thiserror::Error;

// --- Plausibility limits ---
const MAX_CHIN_BELOW_MOUTH_PX: f32 = 150.0;
const JAW_RANGE_TOLERANCE: f32 = 0.5;
const MOUTH_CORNER_TOLERANCE_PX: f32 = 25.0;

/// Point groups the stabilizer corrects independently.
const STABILIZER_GROUPS: &[&[usize]] = &[
    regions::JAW_LINE,
    regions::LEFT_CHEEKBONE,
    regions::RIGHT_CHEEKBONE,
    regions::FACE_OVAL,
];

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("landmark set has {got} points, expected at least {expected}")]
    TooFewLandmarks { got: usize, expected: usize },
    #[error("chin sits {offset:.1}px below mouth center, limit {limit:.1}px")]
    ChinTooFarBelowMouth { offset: f32, limit: f32 },
    #[error("cheekbones mirrored: left mean x {left:.1} >= right mean x {right:.1}")]
    CheekbonesMirrored { left: f32, right: f32 },
    #[error("jaw mean y {jaw:.1} outside expanded oval range [{lo:.1}, {hi:.1}]")]
    JawOutsideOval { jaw: f32, lo: f32, hi: f32 },
    #[error("mouth corner {offset:.1}px below mouth center, tolerance {tolerance:.1}px")]
    MouthCornersInverted { offset: f32, tolerance: f32 },
}

/// Sanity-check a raw landmark set. Any single failed check rejects the set;
/// the caller short-circuits the whole pipeline to the unmodified image.
pub fn validate(set: &LandmarkSet, min_count: usize) -> Result<(), ValidationError> {
    if set.len() < min_count {
        return Err(ValidationError::TooFewLandmarks {
            got: set.len(),
            expected: min_count,
        });
    }

    let mouth_center = mouth_center(set);

    // Chin far below the mouth means the lower-face points slid off the face.
    if let (Some(chin), Some(mouth)) = (set.get(regions::CHIN), mouth_center) {
        let offset = chin.y - mouth.y;
        if offset > MAX_CHIN_BELOW_MOUTH_PX {
            return Err(ValidationError::ChinTooFarBelowMouth {
                offset,
                limit: MAX_CHIN_BELOW_MOUTH_PX,
            });
        }
    }

    // Left/right mirroring swaps the cheekbone x order.
    let left_x = mean_x(&set.select(regions::LEFT_CHEEKBONE));
    let right_x = mean_x(&set.select(regions::RIGHT_CHEEKBONE));
    if let (Some(left), Some(right)) = (left_x, right_x) {
        if left >= right {
            return Err(ValidationError::CheekbonesMirrored { left, right });
        }
    }

    // Jaw points detected outside the face fall outside the oval's y-range.
    // The range comes from the non-jaw oval points, since the jaw arc is
    // itself part of the oval and would otherwise drag the range with it.
    let jaw_y = mean_y(&set.select(regions::JAW_LINE));
    let upper_oval: Vec<Point> = regions::FACE_OVAL
        .iter()
        .filter(|&&i| !regions::JAW_LINE.contains(&i))
        .filter_map(|&i| set.get(i))
        .collect();
    if let (Some(jaw), Some((oval_lo, oval_hi))) = (jaw_y, y_range(&upper_oval)) {
        let slack = (oval_hi - oval_lo) * JAW_RANGE_TOLERANCE;
        let (lo, hi) = (oval_lo - slack, oval_hi + slack);
        if jaw < lo || jaw > hi {
            return Err(ValidationError::JawOutsideOval { jaw, lo, hi });
        }
    }

    // Mouth corners below the mouth center mean inverted mouth geometry.
    if let Some(mouth) = mouth_center {
        for idx in [regions::MOUTH_LEFT_CORNER, regions::MOUTH_RIGHT_CORNER] {
            if let Some(corner) = set.get(idx) {
                let offset = corner.y - mouth.y;
                if offset > MOUTH_CORNER_TOLERANCE_PX {
                    return Err(ValidationError::MouthCornersInverted {
                        offset,
                        tolerance: MOUTH_CORNER_TOLERANCE_PX,
                    });
                }
            }
        }
    }

    Ok(())
}

/// Median-pull outlier correction on the designated point groups.
///
/// For each group, any coordinate deviating from the group mean by more than
/// `threshold_px` is replaced by the group median on that axis. Returns a
/// corrected copy; the input set is left untouched.
pub fn stabilize(set: &LandmarkSet, threshold_px: f32) -> LandmarkSet {
    let mut points: Vec<Point> = set.points().to_vec();

    for group in STABILIZER_GROUPS {
        let members: Vec<usize> = group.iter().copied().filter(|&i| i < points.len()).collect();
        if members.len() < 3 {
            continue;
        }
        let xs: Vec<f32> = members.iter().map(|&i| points[i].x).collect();
        let ys: Vec<f32> = members.iter().map(|&i| points[i].y).collect();
        let (mean_x, median_x) = (mean(&xs), median(&xs));
        let (mean_y, median_y) = (mean(&ys), median(&ys));

        let mut corrected = 0usize;
        for &i in &members {
            if (points[i].x - mean_x).abs() > threshold_px {
                points[i].x = median_x;
                corrected += 1;
            }
            if (points[i].y - mean_y).abs() > threshold_px {
                points[i].y = median_y;
                corrected += 1;
            }
        }
        if corrected > 0 {
            tracing::debug!(group_size = members.len(), corrected, "stabilized outlier landmarks");
        }
    }

    LandmarkSet::new(points)
}

/// Midpoint of the inner-lip top and bottom landmarks.
fn mouth_center(set: &LandmarkSet) -> Option<Point> {
    let top = set.get(regions::MOUTH_TOP)?;
    let bottom = set.get(regions::MOUTH_BOTTOM)?;
    Some(Point::new((top.x + bottom.x) / 2.0, (top.y + bottom.y) / 2.0))
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn mean_x(points: &[Point]) -> Option<f32> {
    if points.is_empty() {
        return None;
    }
    Some(points.iter().map(|p| p.x).sum::<f32>() / points.len() as f32)
}

fn mean_y(points: &[Point]) -> Option<f32> {
    if points.is_empty() {
        return None;
    }
    Some(points.iter().map(|p| p.y).sum::<f32>() / points.len() as f32)
}

fn y_range(points: &[Point]) -> Option<(f32, f32)> {
    let first = points.first()?;
    let mut lo = first.y;
    let mut hi = first.y;
    for p in points {
        lo = lo.min(p.y);
        hi = hi.max(p.y);
    }
    Some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions;
    use crate::testutil::synthetic_face;

    #[test]
    fn test_synthetic_face_passes() {
        let set = synthetic_face(320, 400);
        validate(&set, regions::LANDMARK_COUNT).expect("synthetic face should validate");
    }

    #[test]
    fn test_too_few_landmarks() {
        let set = LandmarkSet::new(vec![Point::new(0.0, 0.0); 10]);
        let err = validate(&set, regions::LANDMARK_COUNT).unwrap_err();
        assert!(matches!(err, ValidationError::TooFewLandmarks { got: 10, .. }));
    }

    #[test]
    fn test_mirrored_cheekbones_rejected_and_correction_passes() {
        let set = synthetic_face(320, 400);

        // Mirror every point horizontally about the face midline. That swaps
        // the cheekbone x order and must fail validation.
        let mirrored: Vec<Point> = set
            .points()
            .iter()
            .map(|p| Point::new(320.0 - p.x, p.y))
            .collect();
        let mirrored = LandmarkSet::new(mirrored);
        let err = validate(&mirrored, regions::LANDMARK_COUNT).unwrap_err();
        assert!(matches!(err, ValidationError::CheekbonesMirrored { .. }), "got {err}");

        // Mirroring back restores a valid set.
        let restored: Vec<Point> = mirrored
            .points()
            .iter()
            .map(|p| Point::new(320.0 - p.x, p.y))
            .collect();
        validate(&LandmarkSet::new(restored), regions::LANDMARK_COUNT)
            .expect("mirror-corrected set should pass");
    }

    #[test]
    fn test_chin_mislocalized_rejected() {
        let set = synthetic_face(320, 400);
        let mut points = set.points().to_vec();
        points[regions::CHIN].y += 400.0;
        let err = validate(&LandmarkSet::new(points), regions::LANDMARK_COUNT).unwrap_err();
        assert!(matches!(err, ValidationError::ChinTooFarBelowMouth { .. }), "got {err}");
    }

    #[test]
    fn test_jaw_outside_oval_rejected() {
        let set = synthetic_face(320, 400);
        let mut points = set.points().to_vec();
        // Push the whole jaw line far below the oval, but keep the chin
        // anchor where it was so only the jaw check can fire.
        for &i in regions::JAW_LINE {
            if i != regions::CHIN {
                points[i].y += 600.0;
            }
        }
        let err = validate(&LandmarkSet::new(points), regions::LANDMARK_COUNT).unwrap_err();
        assert!(matches!(err, ValidationError::JawOutsideOval { .. }), "got {err}");
    }

    #[test]
    fn test_inverted_mouth_rejected() {
        let set = synthetic_face(320, 400);
        let mut points = set.points().to_vec();
        points[regions::MOUTH_LEFT_CORNER].y += 60.0;
        let err = validate(&LandmarkSet::new(points), regions::LANDMARK_COUNT).unwrap_err();
        assert!(matches!(err, ValidationError::MouthCornersInverted { .. }), "got {err}");
    }

    #[test]
    fn test_stabilizer_replaces_single_outlier_with_median() {
        let set = synthetic_face(320, 400);
        let mut points = set.points().to_vec();

        // Drag one cheekbone point far off on the x axis only.
        let outlier_idx = regions::LEFT_CHEEKBONE[0];
        points[outlier_idx].x += 200.0;
        let noisy = LandmarkSet::new(points);

        let group: Vec<f32> = regions::LEFT_CHEEKBONE
            .iter()
            .map(|&i| noisy.get(i).unwrap().x)
            .collect();
        let expected_median = median(&group);

        let fixed = stabilize(&noisy, 150.0);
        let corrected = fixed.get(outlier_idx).unwrap();
        assert!(
            (corrected.x - expected_median).abs() < 1e-4,
            "outlier x {} != group median {expected_median}",
            corrected.x
        );

        // Every other point in the group is unchanged.
        for &i in &regions::LEFT_CHEEKBONE[1..] {
            assert_eq!(fixed.get(i), noisy.get(i), "index {i} moved");
        }
    }

    #[test]
    fn test_stabilizer_leaves_clean_set_unchanged() {
        let set = synthetic_face(320, 400);
        let fixed = stabilize(&set, 150.0);
        assert_eq!(fixed.points(), set.points());
    }

    #[test]
    fn test_stabilizer_does_not_mutate_input() {
        let set = synthetic_face(320, 400);
        let mut points = set.points().to_vec();
        points[regions::LEFT_CHEEKBONE[0]].x += 200.0;
        let noisy = LandmarkSet::new(points.clone());
        let _ = stabilize(&noisy, 150.0);
        assert_eq!(noisy.points(), &points[..]);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
