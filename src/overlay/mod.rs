//! Overlay scene composition.
//!
//! The compositor turns the latest stabilized state into an `OverlayScene`:
//! a typed list of draw operations (zone grid, corner brackets, labels,
//! status banners) that the render loop produces every tick. Geometry ops
//! can be rasterized onto an RGBA frame (`raster`); text ops stay
//! structured for the embedding UI's text renderer.
//!
//! The display surface is horizontally mirrored ("selfie" view). Box
//! geometry is emitted in unmirrored frame coordinates — the mirrored
//! surface aligns it with the mirrored video — while text anchors are
//! mirror-corrected so labels stay legible.

mod raster;

pub use raster::rasterize;

use crate::inference::{ConnectivityState, Detection};
use crate::stabilize::Rect;
use crate::zones::{parse_color, ZoneLayout};

/// Bracket color for a subject flagged as inactive ("Lying Down").
pub const ALERT_COLOR: [u8; 3] = [0xef, 0x44, 0x44];
/// Bracket color for a normally behaving subject.
pub const NORMAL_COLOR: [u8; 3] = [0x22, 0xc5, 0x5e];

const MAX_CORNER: f32 = 40.0;
const CORNER_FRACTION: f32 = 0.25;
const MAX_LABEL_WIDTH: f32 = 220.0;
const LABEL_HEIGHT: f32 = 24.0;

/// One overlay draw operation, in display-space pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    /// Dashed vertical zone-boundary line at `x`.
    ZoneDivider { x: f32 },
    /// Zone name, horizontally centered at `anchor_x` (mirror-corrected).
    ZoneLabel {
        text: String,
        anchor_x: f32,
        y: f32,
        color: [u8; 3],
    },
    /// Corner-bracket marker around a stabilized box.
    Bracket {
        rect: Rect,
        corner: f32,
        color: [u8; 3],
    },
    /// Detection caption; `anchor_x` is the left edge of the label box
    /// (mirror-corrected), `width` its background width.
    DetectionLabel {
        text: String,
        anchor_x: f32,
        y: f32,
        width: f32,
        color: [u8; 3],
    },
    /// Full-surface status banner.
    Banner {
        kind: BannerKind,
        title: String,
        detail: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerKind {
    /// Post-holdover empty state; never render a blank or stale overlay.
    NoDetection,
    /// Inference service unreachable; carries the diagnostic.
    Offline,
    /// Capture could not start; blocking, session-terminal.
    CameraError,
}

/// The full overlay for one render tick.
#[derive(Clone, Debug, Default)]
pub struct OverlayScene {
    pub ops: Vec<DrawOp>,
}

impl OverlayScene {
    pub fn banners(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Banner { .. }))
    }
}

/// Composes overlay scenes from stabilized state.
pub struct OverlayCompositor {
    display_width: f32,
    display_height: f32,
    mirrored: bool,
    layout: ZoneLayout,
}

impl OverlayCompositor {
    pub fn new(display_width: u32, display_height: u32, mirrored: bool, layout: ZoneLayout) -> Self {
        Self {
            display_width: display_width as f32,
            display_height: display_height as f32,
            mirrored,
            layout,
        }
    }

    /// Compose the scene for one render tick.
    ///
    /// `boxes` pairs each current detection with its stabilized rectangle;
    /// an empty slice past holdover yields the explicit "nothing detected"
    /// banner. A camera failure preempts everything else.
    pub fn compose(
        &self,
        boxes: &[(&Detection, Rect)],
        connectivity: ConnectivityState,
        diagnostic: Option<&str>,
        camera_failed: bool,
    ) -> OverlayScene {
        let mut scene = OverlayScene::default();

        if camera_failed {
            scene.ops.push(DrawOp::Banner {
                kind: BannerKind::CameraError,
                title: "CAMERA UNAVAILABLE".to_string(),
                detail: Some("camera access denied; re-grant and restart".to_string()),
            });
            return scene;
        }

        self.push_zone_grid(&mut scene);

        if boxes.is_empty() {
            scene.ops.push(DrawOp::Banner {
                kind: BannerKind::NoDetection,
                title: "NO GOAT DETECTED".to_string(),
                detail: Some("point camera at goat/sheep".to_string()),
            });
        } else {
            for (det, rect) in boxes {
                self.push_detection(&mut scene, det, *rect);
            }
        }

        if connectivity == ConnectivityState::Offline {
            scene.ops.push(DrawOp::Banner {
                kind: BannerKind::Offline,
                title: "API OFFLINE".to_string(),
                detail: diagnostic.map(str::to_string),
            });
        }

        scene
    }

    fn push_zone_grid(&self, scene: &mut OverlayScene) {
        for boundary in self.layout.dividers() {
            scene.ops.push(DrawOp::ZoneDivider {
                x: boundary * self.display_width,
            });
        }

        let mut left = 0.0f32;
        for band in &self.layout.bands {
            let center = (left + band.max_x) / 2.0 * self.display_width;
            scene.ops.push(DrawOp::ZoneLabel {
                text: band.label.clone(),
                anchor_x: self.mirror_center(center),
                y: 30.0,
                color: parse_color(&band.color).unwrap_or(NORMAL_COLOR),
            });
            left = band.max_x;
        }
    }

    fn push_detection(&self, scene: &mut OverlayScene, det: &Detection, rect: Rect) {
        let color = if det.behavior.as_deref() == Some("Lying Down") {
            ALERT_COLOR
        } else {
            NORMAL_COLOR
        };

        let corner = MAX_CORNER.min((rect.w.min(rect.h) * CORNER_FRACTION).floor());
        scene.ops.push(DrawOp::Bracket {
            rect,
            corner,
            color,
        });

        let behavior = det.behavior.as_deref().unwrap_or("Normal");
        let text = format!(
            "{}: {}% - {}",
            det.class_name,
            (det.confidence * 100.0).round() as u32,
            behavior
        );
        let width = MAX_LABEL_WIDTH.min(rect.w + 10.0);
        scene.ops.push(DrawOp::DetectionLabel {
            text,
            anchor_x: self.mirror_box(rect.x, width),
            y: rect.y - LABEL_HEIGHT - 2.0,
            width,
            color,
        });
    }

    /// Mirror-corrected anchor for text centered at `center_x`.
    fn mirror_center(&self, center_x: f32) -> f32 {
        if self.mirrored {
            self.display_width - center_x
        } else {
            center_x
        }
    }

    /// Mirror-corrected left edge for a label box of `width` that should
    /// appear alongside an element at unmirrored `x`.
    fn mirror_box(&self, x: f32, width: f32) -> f32 {
        if self.mirrored {
            self.display_width - x - width
        } else {
            x
        }
    }

    pub fn display_size(&self) -> (f32, f32) {
        (self.display_width, self.display_height)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneLayout;

    fn compositor(mirrored: bool) -> OverlayCompositor {
        OverlayCompositor::new(1280, 720, mirrored, ZoneLayout::default())
    }

    fn det(behavior: Option<&str>) -> Detection {
        Detection {
            bbox: [100.0, 100.0, 300.0, 500.0],
            class_name: "goat".to_string(),
            confidence: 0.87,
            behavior: behavior.map(str::to_string),
        }
    }

    fn rect() -> Rect {
        Rect {
            x: 100.0,
            y: 150.0,
            w: 200.0,
            h: 180.0,
        }
    }

    #[test]
    fn zone_grid_has_dividers_and_labels() {
        let scene = compositor(true).compose(&[], ConnectivityState::Connected, None, false);
        let dividers: Vec<f32> = scene
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::ZoneDivider { x } => Some(*x),
                _ => None,
            })
            .collect();
        assert_eq!(dividers, vec![0.33 * 1280.0, 0.66 * 1280.0]);

        let labels: Vec<&str> = scene
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::ZoneLabel { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["FEEDING", "FENCE", "KANDANG"]);
    }

    #[test]
    fn zone_labels_are_mirror_corrected() {
        let mirrored = compositor(true).compose(&[], ConnectivityState::Connected, None, false);
        let plain = compositor(false).compose(&[], ConnectivityState::Connected, None, false);

        let anchor = |scene: &OverlayScene, label: &str| -> f32 {
            scene
                .ops
                .iter()
                .find_map(|op| match op {
                    DrawOp::ZoneLabel { text, anchor_x, .. } if text == label => Some(*anchor_x),
                    _ => None,
                })
                .expect("zone label")
        };

        // FEEDING is the leftmost band in frame space; on a mirrored
        // surface its label lands on the right of the screen.
        let feeding_plain = anchor(&plain, "FEEDING");
        let feeding_mirrored = anchor(&mirrored, "FEEDING");
        assert!((feeding_mirrored - (1280.0 - feeding_plain)).abs() < 1e-3);
        assert!(feeding_mirrored > 640.0);
    }

    #[test]
    fn brackets_keep_unmirrored_geometry_labels_get_corrected_anchors() {
        let d = det(None);
        let boxes = [(&d, rect())];
        let scene = compositor(true).compose(&boxes, ConnectivityState::Connected, None, false);

        let bracket_rect = scene
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Bracket { rect, .. } => Some(*rect),
                _ => None,
            })
            .expect("bracket");
        assert_eq!(bracket_rect, rect());

        let (anchor_x, width) = scene
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::DetectionLabel { anchor_x, width, .. } => Some((*anchor_x, *width)),
                _ => None,
            })
            .expect("label");
        assert!((width - 210.0).abs() < 1e-3);
        assert!((anchor_x - (1280.0 - 100.0 - 210.0)).abs() < 1e-3);
    }

    #[test]
    fn bracket_corner_is_proportional_and_capped() {
        let d = det(None);
        let small = Rect {
            x: 0.0,
            y: 0.0,
            w: 80.0,
            h: 60.0,
        };
        let boxes = [(&d, small)];
        let scene = compositor(true).compose(&boxes, ConnectivityState::Connected, None, false);
        let corner = scene
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Bracket { corner, .. } => Some(*corner),
                _ => None,
            })
            .expect("bracket");
        assert_eq!(corner, 15.0); // floor(60 * 0.25)

        let boxes = [(&d, rect())];
        let scene = compositor(true).compose(&boxes, ConnectivityState::Connected, None, false);
        let corner = scene
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Bracket { corner, .. } => Some(*corner),
                _ => None,
            })
            .expect("bracket");
        assert_eq!(corner, 40.0); // capped
    }

    #[test]
    fn lying_down_recolors_the_bracket() {
        let d = det(Some("Lying Down"));
        let boxes = [(&d, rect())];
        let scene = compositor(true).compose(&boxes, ConnectivityState::Connected, None, false);
        let color = scene
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Bracket { color, .. } => Some(*color),
                _ => None,
            })
            .expect("bracket");
        assert_eq!(color, ALERT_COLOR);
    }

    #[test]
    fn empty_state_shows_nothing_detected_not_a_blank_overlay() {
        let scene = compositor(true).compose(&[], ConnectivityState::Connected, None, false);
        assert!(scene.banners().any(|op| matches!(
            op,
            DrawOp::Banner {
                kind: BannerKind::NoDetection,
                ..
            }
        )));
    }

    #[test]
    fn offline_banner_carries_the_diagnostic() {
        let scene = compositor(true).compose(
            &[],
            ConnectivityState::Offline,
            Some("inference request failed: connection refused"),
            false,
        );
        let detail = scene
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Banner {
                    kind: BannerKind::Offline,
                    detail,
                    ..
                } => detail.clone(),
                _ => None,
            })
            .expect("offline banner");
        assert!(detail.contains("connection refused"));
    }

    #[test]
    fn camera_failure_preempts_everything_else() {
        let d = det(None);
        let boxes = [(&d, rect())];
        let scene = compositor(true).compose(&boxes, ConnectivityState::Offline, None, true);
        assert_eq!(scene.ops.len(), 1);
        assert!(matches!(
            scene.ops[0],
            DrawOp::Banner {
                kind: BannerKind::CameraError,
                ..
            }
        ));
    }
}
