//! Pipeline orchestration.
//!
//! Sequences validate → stabilize → geometry → re-detect → smooth → makeup
//! under one contract: best-effort enhancement, never worse than a no-op.
//! Any stage failure is logged and that stage is skipped; any pipeline-level
//! failure returns the unmodified entry image.

use crate::detector::{ImageEnhancer, LandmarkDetector};
use crate::landmarks;
use crate::makeup::{self, MakeupParams};
use crate::mesh_warp;
use crate::region_warp::{self, SlimParams};
use crate::regions;
use crate::smoothing::{self, SmoothingParams};
use crate::types::{LandmarkSet, StageError};
use image::RgbImage;

/// Which geometry engine reshapes the face.
///
/// The three strategies are interchangeable implementations of one contract;
/// [`RetouchStrategy::LocalPatch`] is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetouchStrategy {
    /// Independent local patch warps: eye enlargement plus lower-face slim.
    LocalPatch,
    /// Global Delaunay-triangulated piecewise-affine warp.
    MeshWarp,
    /// External pre-enhancement pass, then the mesh warp.
    PreEnhancedMesh,
}

/// Per-call pipeline configuration. The core holds no persisted state; every
/// knob travels with the call.
#[derive(Debug, Clone, Copy)]
pub struct RetouchOptions {
    pub strategy: RetouchStrategy,
    /// Eye enlargement factor, typically 1.10–1.20.
    pub eye_scale: f32,
    pub slim: SlimParams,
    /// Horizontal face-oval scale for the mesh warp.
    pub mesh_oval_scale: f32,
    pub smoothing: SmoothingParams,
    pub makeup: MakeupParams,
    /// Re-run the detector on the warped raster so the color stages track
    /// the new geometry. Falls back to the pre-warp set on failure.
    pub redetect: bool,
    pub min_landmarks: usize,
    pub stabilize_threshold_px: f32,
}

impl Default for RetouchOptions {
    fn default() -> Self {
        Self {
            strategy: RetouchStrategy::LocalPatch,
            eye_scale: 1.20,
            slim: SlimParams::default(),
            mesh_oval_scale: 0.92,
            smoothing: SmoothingParams::default(),
            makeup: MakeupParams::default(),
            redetect: true,
            min_landmarks: regions::LANDMARK_COUNT,
            stabilize_threshold_px: 150.0,
        }
    }
}

/// Run the full retouch pipeline on one image.
///
/// Returns the retouched image, or the unmodified input when no face is
/// detected, validation rejects the landmarks, or anything downstream fails.
pub fn retouch<D>(
    image: &RgbImage,
    detector: &D,
    enhancer: Option<&dyn ImageEnhancer>,
    options: &RetouchOptions,
) -> RgbImage
where
    D: LandmarkDetector + ?Sized,
{
    let Some(raw) = detector.detect(image) else {
        tracing::info!("no face detected; returning original image");
        return image.clone();
    };

    if let Err(e) = landmarks::validate(&raw, options.min_landmarks) {
        tracing::warn!(error = %e, "landmark validation failed; returning original image");
        return image.clone();
    }
    let lm = landmarks::stabilize(&raw, options.stabilize_threshold_px);

    let mut buf = image.clone();
    match options.strategy {
        RetouchStrategy::LocalPatch => {
            buf = run_stage("eye enlargement", buf, |b| {
                region_warp::enlarge_eyes(b, &lm, options.eye_scale)
            });
            buf = run_stage("lower face slim", buf, |b| {
                region_warp::slim_region(b, &lm, regions::FACE_OVAL, &options.slim)
            });
        }
        RetouchStrategy::MeshWarp => {
            buf = run_stage("mesh warp", buf, |b| {
                mesh_warp::mesh_warp(b, &lm, options.eye_scale, options.mesh_oval_scale)
            });
        }
        RetouchStrategy::PreEnhancedMesh => {
            match enhancer {
                Some(enh) => match enh.enhance(&buf) {
                    Some(pre) if pre.dimensions() == buf.dimensions() => {
                        tracing::debug!("pre-enhancement applied");
                        buf = pre;
                    }
                    Some(_) => {
                        tracing::warn!("pre-enhancement changed dimensions; discarded");
                    }
                    None => {
                        tracing::warn!("pre-enhancement failed; continuing with raw image");
                    }
                },
                None => tracing::debug!("no enhancer supplied; continuing with raw image"),
            }
            buf = run_stage("mesh warp", buf, |b| {
                mesh_warp::mesh_warp(b, &lm, options.eye_scale, options.mesh_oval_scale)
            });
        }
    }

    let lm = if options.redetect {
        redetect(&buf, detector, &lm, options)
    } else {
        lm
    };

    buf = run_stage("skin smoothing", buf, |b| {
        smoothing::smooth_skin(b, &lm, &options.smoothing)
    });
    buf = makeup::apply_makeup(&buf, &lm, &options.makeup);

    if buf.dimensions() != image.dimensions() {
        tracing::warn!("pipeline produced a mismatched raster; returning original image");
        return image.clone();
    }
    buf
}

/// Second detector pass on the warped raster. Any failure — no face or an
/// implausible set — keeps the pre-warp landmarks.
fn redetect<D>(
    buf: &RgbImage,
    detector: &D,
    fallback: &LandmarkSet,
    options: &RetouchOptions,
) -> LandmarkSet
where
    D: LandmarkDetector + ?Sized,
{
    match detector.detect(buf) {
        Some(fresh) => match landmarks::validate(&fresh, options.min_landmarks) {
            Ok(()) => landmarks::stabilize(&fresh, options.stabilize_threshold_px),
            Err(e) => {
                tracing::debug!(error = %e, "re-detection implausible; keeping pre-warp landmarks");
                fallback.clone()
            }
        },
        None => {
            tracing::debug!("re-detection found no face; keeping pre-warp landmarks");
            fallback.clone()
        }
    }
}

/// Run one stage against the current buffer. A stage error, like a stage
/// that returns a mismatched raster, keeps the previous buffer.
fn run_stage<F>(name: &'static str, buf: RgbImage, stage: F) -> RgbImage
where
    F: FnOnce(&RgbImage) -> Result<RgbImage, StageError>,
{
    match stage(&buf) {
        Ok(next) if next.dimensions() == buf.dimensions() => next,
        Ok(_) => {
            tracing::warn!(stage = name, "stage changed raster dimensions; keeping previous buffer");
            buf
        }
        Err(e) => {
            tracing::warn!(stage = name, error = %e, "stage failed; keeping previous buffer");
            buf
        }
    }
}
