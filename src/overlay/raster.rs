//! Rasterization of overlay geometry onto an RGB frame.
//!
//! Geometry ops (dividers, brackets, label/banner backgrounds) are drawn
//! directly; glyph rendering stays with the embedding UI, which consumes
//! the structured text ops.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as PixelRect;

use super::{BannerKind, DrawOp, OverlayScene};

const DIVIDER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PANEL_COLOR: Rgb<u8> = Rgb([20, 20, 24]);
const DASH_LEN: f32 = 10.0;
const DASH_GAP: f32 = 10.0;
const BRACKET_THICKNESS: u32 = 3;

/// Draw every geometry op of `scene` onto `frame`.
pub fn rasterize(scene: &OverlayScene, frame: &mut RgbImage) {
    for op in &scene.ops {
        match op {
            DrawOp::ZoneDivider { x } => draw_dashed_vertical(frame, *x),
            DrawOp::Bracket {
                rect,
                corner,
                color,
            } => draw_bracket(frame, rect, *corner, Rgb(*color)),
            DrawOp::DetectionLabel {
                anchor_x,
                y,
                width,
                ..
            } => {
                fill_rect(frame, *anchor_x, *y, *width, 26.0, PANEL_COLOR);
            }
            DrawOp::ZoneLabel { .. } => {}
            DrawOp::Banner { kind, .. } => draw_banner(frame, *kind),
        }
    }
}

fn draw_dashed_vertical(frame: &mut RgbImage, x: f32) {
    let height = frame.height() as f32;
    let mut y = 0.0f32;
    while y < height {
        let end = (y + DASH_LEN).min(height - 1.0);
        draw_line_segment_mut(frame, (x, y), (x, end), DIVIDER_COLOR);
        y += DASH_LEN + DASH_GAP;
    }
}

fn draw_bracket(frame: &mut RgbImage, rect: &super::Rect, corner: f32, color: Rgb<u8>) {
    let (x1, y1) = (rect.x, rect.y);
    let (x2, y2) = (rect.x + rect.w, rect.y + rect.h);

    // Two short strokes per corner, thickened by offsetting parallel lines.
    let strokes: [((f32, f32), (f32, f32)); 8] = [
        ((x1, y1), (x1 + corner, y1)),
        ((x1, y1), (x1, y1 + corner)),
        ((x2 - corner, y1), (x2, y1)),
        ((x2, y1), (x2, y1 + corner)),
        ((x1, y2 - corner), (x1, y2)),
        ((x1, y2), (x1 + corner, y2)),
        ((x2, y2 - corner), (x2, y2)),
        ((x2 - corner, y2), (x2, y2)),
    ];

    for ((sx, sy), (ex, ey)) in strokes {
        for t in 0..BRACKET_THICKNESS {
            let offset = t as f32;
            if (sy - ey).abs() < f32::EPSILON {
                draw_line_segment_mut(frame, (sx, sy + offset), (ex, ey + offset), color);
            } else {
                draw_line_segment_mut(frame, (sx + offset, sy), (ex + offset, ey), color);
            }
        }
    }
}

fn draw_banner(frame: &mut RgbImage, kind: BannerKind) {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    match kind {
        // Centered panel for transient states.
        BannerKind::NoDetection | BannerKind::Offline => {
            let (w, h) = (fw * 0.4, 70.0f32.min(fh));
            fill_rect(frame, (fw - w) / 2.0, (fh - h) / 2.0, w, h, PANEL_COLOR);
        }
        // Blocking full-surface state.
        BannerKind::CameraError => {
            fill_rect(frame, 0.0, 0.0, fw, fh, PANEL_COLOR);
        }
    }
}

fn fill_rect(frame: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, color: Rgb<u8>) {
    let fw = frame.width() as i32;
    let fh = frame.height() as i32;
    let x0 = (x.floor() as i32).clamp(0, fw - 1);
    let y0 = (y.floor() as i32).clamp(0, fh - 1);
    let x1 = ((x + w).ceil() as i32).clamp(0, fw);
    let y1 = ((y + h).ceil() as i32).clamp(0, fh);
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let rect = PixelRect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(frame, rect, color);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stabilize::Rect;

    fn blank(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([0, 0, 0]))
    }

    fn any_nonblack_in(frame: &RgbImage, x0: u32, x1: u32, y0: u32, y1: u32) -> bool {
        (y0..y1).any(|y| (x0..x1).any(|x| frame.get_pixel(x, y).0 != [0, 0, 0]))
    }

    #[test]
    fn dashed_divider_paints_its_column_with_gaps() {
        let mut frame = blank(640, 480);
        let scene = OverlayScene {
            ops: vec![DrawOp::ZoneDivider { x: 211.0 }],
        };
        rasterize(&scene, &mut frame);

        // Dash present at the top, gap after it.
        assert_eq!(frame.get_pixel(211, 0).0, [255, 255, 255]);
        assert_eq!(frame.get_pixel(211, 15).0, [0, 0, 0]);
        assert_eq!(frame.get_pixel(211, 20).0, [255, 255, 255]);
    }

    #[test]
    fn bracket_marks_corners_but_not_edge_midpoints() {
        let mut frame = blank(640, 480);
        let rect = Rect {
            x: 100.0,
            y: 100.0,
            w: 200.0,
            h: 200.0,
        };
        let scene = OverlayScene {
            ops: vec![DrawOp::Bracket {
                rect,
                corner: 40.0,
                color: [0x22, 0xc5, 0x5e],
            }],
        };
        rasterize(&scene, &mut frame);

        assert!(any_nonblack_in(&frame, 100, 105, 100, 105));
        assert!(any_nonblack_in(&frame, 296, 301, 296, 301));
        // Middle of the top edge stays clear.
        assert!(!any_nonblack_in(&frame, 190, 210, 99, 104));
    }

    #[test]
    fn camera_error_banner_covers_the_whole_surface() {
        let mut frame = blank(64, 48);
        let scene = OverlayScene {
            ops: vec![DrawOp::Banner {
                kind: BannerKind::CameraError,
                title: "CAMERA UNAVAILABLE".to_string(),
                detail: None,
            }],
        };
        rasterize(&scene, &mut frame);
        assert_eq!(frame.get_pixel(0, 0).0, [20, 20, 24]);
        assert_eq!(frame.get_pixel(63, 47).0, [20, 20, 24]);
    }

    #[test]
    fn offscreen_label_background_is_clipped_not_panicked() {
        let mut frame = blank(64, 48);
        let scene = OverlayScene {
            ops: vec![DrawOp::DetectionLabel {
                text: "goat: 90% - Normal".to_string(),
                anchor_x: -30.0,
                y: -10.0,
                width: 220.0,
                color: [0x22, 0xc5, 0x5e],
            }],
        };
        rasterize(&scene, &mut frame);
        assert!(any_nonblack_in(&frame, 0, 10, 0, 10));
    }
}
