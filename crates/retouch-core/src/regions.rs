//! Static facial region index tables.
//!
//! Indices follow the 468-point FaceMesh topology produced by the external
//! landmark detector. Every table is a constant, ordered index subset shared
//! read-only by all pipeline stages. "Left"/"right" are image-space, not
//! subject-space.

/// Expected landmark count from the external detector.
pub const LANDMARK_COUNT: usize = 468;

/// Image-left eye contour, 16 points.
pub const LEFT_EYE: &[usize] = &[
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];

/// Image-right eye contour, 16 points.
pub const RIGHT_EYE: &[usize] = &[
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];

/// Full face oval, 36 points, clockwise from the forehead.
pub const FACE_OVAL: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];

/// Lower jaw arc of the face oval, image-left to image-right through the chin.
pub const JAW_LINE: &[usize] = &[172, 136, 150, 149, 176, 148, 152, 377, 400, 378, 379, 365, 397];

/// Image-left malar (cheekbone) patch.
pub const LEFT_CHEEKBONE: &[usize] = &[116, 117, 118, 119, 100, 126];

/// Image-right malar (cheekbone) patch, mirror of [`LEFT_CHEEKBONE`].
pub const RIGHT_CHEEKBONE: &[usize] = &[345, 346, 347, 348, 329, 355];

/// Outer lip contour, 20 points, counterclockwise from the image-left corner.
pub const LIPS_OUTER: &[usize] = &[
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 409, 270, 269, 267, 0, 37, 39, 40, 185,
];

/// Inner lip contour, 20 points, same winding as [`LIPS_OUTER`].
pub const LIPS_INNER: &[usize] = &[
    78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308, 415, 310, 311, 312, 13, 82, 81, 80, 191,
];

/// Nose bridge, brow midpoint down to the tip.
pub const NOSE_BRIDGE: &[usize] = &[168, 6, 197, 195, 5];

/// Highly stable anchor points forming a coarse central-face polygon:
/// eye outer corners, mouth corners, below-lip chin point. Used as a
/// redundancy cross-check against a distorted face oval.
pub const STABLE_ANCHORS: &[usize] = &[33, 263, 291, 199, 61];

pub const CHIN: usize = 152;
pub const MOUTH_LEFT_CORNER: usize = 61;
pub const MOUTH_RIGHT_CORNER: usize = 291;
pub const MOUTH_TOP: usize = 13;
pub const MOUTH_BOTTOM: usize = 14;
pub const LEFT_NOSE_WING: usize = 64;
pub const RIGHT_NOSE_WING: usize = 294;
