use std::collections::HashMap;

use crate::inference::Detection;

/// Fraction of the remaining distance each render tick moves a stabilized
/// box toward its target.
pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.3;

// Head sub-region of the full bounding box. The detector returns the whole
// body; the overlay biases toward the face area and away from the horns.
const HEAD_HEIGHT_FRACTION: f32 = 0.45;
const HEAD_WIDTH_FRACTION: f32 = 0.85;
const HEAD_MIN_ASPECT: f32 = 1.1;
const HEAD_VERTICAL_SHIFT: f32 = 0.15;

/// Screen-space rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    /// Largest per-component offset to another rectangle; used by tests to
    /// assert convergence.
    pub fn offset_to(&self, other: &Rect) -> f32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.w - other.w).abs())
            .max((self.h - other.h).abs())
    }
}

/// Target rectangle for one detection: the head sub-region of the full
/// bounding box, rescaled from capture-frame space to display space.
///
/// `scale_x`/`scale_y` are independent because the sent-frame and display
/// resolutions generally differ in both size and aspect.
pub fn head_target(bbox: &[f32; 4], scale_x: f32, scale_y: f32) -> Rect {
    let [x1, y1, x2, y2] = *bbox;
    let full_w = (x2 - x1) * scale_x;
    let full_h = (y2 - y1) * scale_y;

    let head_h = full_h * HEAD_HEIGHT_FRACTION;
    let head_w = (full_w * HEAD_WIDTH_FRACTION).max(head_h * HEAD_MIN_ASPECT);

    Rect {
        x: x1 * scale_x + (full_w - head_w) / 2.0,
        y: y1 * scale_y + full_h * HEAD_VERTICAL_SHIFT,
        w: head_w,
        h: head_h,
    }
}

/// Per-slot box smoothing owned exclusively by the render loop.
///
/// Each render tick moves every stored rectangle a fixed fraction of the
/// remaining distance toward the target derived from the detection in the
/// same list slot. Slots at or beyond the current detection count are
/// stale and deleted.
///
/// Known limitation: smoothing is keyed by position in the detection list.
/// If the inference service reorders detections between frames the boxes
/// visibly swap targets. A stable track identifier from the service would
/// fix this; none is available today.
#[derive(Debug)]
pub struct BoxSmoother {
    boxes: HashMap<usize, Rect>,
    factor: f32,
}

impl BoxSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            boxes: HashMap::new(),
            factor: factor.clamp(0.0, 1.0),
        }
    }

    /// Advance one render tick: interpolate every slot toward its target
    /// and drop stale slots. Returns the stabilized rectangles in slot
    /// order, paired with their detections.
    pub fn update<'a>(
        &mut self,
        detections: &'a [Detection],
        scale_x: f32,
        scale_y: f32,
    ) -> Vec<(&'a Detection, Rect)> {
        let mut out = Vec::with_capacity(detections.len());

        for (slot, det) in detections.iter().enumerate() {
            let target = head_target(&det.bbox, scale_x, scale_y);
            let smoothed = self.boxes.entry(slot).or_insert(target);
            smoothed.x += (target.x - smoothed.x) * self.factor;
            smoothed.y += (target.y - smoothed.y) * self.factor;
            smoothed.w += (target.w - smoothed.w) * self.factor;
            smoothed.h += (target.h - smoothed.h) * self.factor;
            out.push((det, *smoothed));
        }

        // Stale slot cleanup: scheduled, not an error.
        self.boxes.retain(|slot, _| *slot < detections.len());

        out
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
