//! External detector and enhancer seams.
//!
//! The landmark detector and the pre-enhancement service live outside this
//! crate; the pipeline only sees these traits.

use crate::types::LandmarkSet;
use image::RgbImage;
use std::sync::OnceLock;

/// Black-box facial landmark detector.
pub trait LandmarkDetector {
    /// Detect the first face in `image` and return its ordered landmark set.
    ///
    /// `None` means "no face" — a defined result, not an error. The pipeline
    /// short-circuits to the unmodified image.
    fn detect(&self, image: &RgbImage) -> Option<LandmarkSet>;
}

/// External image pre-enhancement pass (e.g. a hosted super-resolution
/// service) run before the mesh warp.
pub trait ImageEnhancer {
    /// Enhance the image, preserving its dimensions. `None` (or a
    /// dimension-changing result) makes the pipeline continue with the raw
    /// image.
    fn enhance(&self, image: &RgbImage) -> Option<RgbImage>;
}

/// A detector constructed on first use.
///
/// Wraps an expensive detector (model load, session setup) behind an
/// explicitly-lifetimed cell instead of an ad hoc shared global. Construction
/// runs at most once; a failed construction is remembered and every
/// subsequent call reports "no face".
pub struct LazyDetector<D, F> {
    init: F,
    cell: OnceLock<Option<D>>,
}

impl<D, F> LazyDetector<D, F>
where
    F: Fn() -> Option<D>,
{
    pub fn new(init: F) -> Self {
        Self {
            init,
            cell: OnceLock::new(),
        }
    }

    /// Whether construction has been attempted yet.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<D, F> LandmarkDetector for LazyDetector<D, F>
where
    D: LandmarkDetector,
    F: Fn() -> Option<D>,
{
    fn detect(&self, image: &RgbImage) -> Option<LandmarkSet> {
        let inner = self.cell.get_or_init(|| {
            let built = (self.init)();
            if built.is_none() {
                tracing::warn!("landmark detector construction failed");
            }
            built
        });
        inner.as_ref().and_then(|d| d.detect(image))
    }
}
