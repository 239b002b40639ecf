//! Zone classification and movement counting.
//!
//! The set of zones is a fixed ordered partition of the camera's field of
//! view (three vertical bands by default), each corresponding to a named
//! real-world area. Zone assignment is computed by the inference
//! collaborator; this module relays and aggregates it, validating the
//! relayed label against the known enumerated values. An unknown label is
//! ignored and the previous zone retained.
//!
//! Zone geometry is configuration data (`ZoneLayout`), not code, so the
//! bands can be redrawn without touching the tracking logic.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::OnceLock;

use crate::inference::ZoneReport;

/// Default movement threshold before the feeding trigger latches.
pub const DEFAULT_MOVEMENT_THRESHOLD: u32 = 10;

/// One of the fixed named zones within the camera's field of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone {
    /// Feeding area (wire label `FEEDING`).
    Feeding,
    /// Perimeter fence (wire label `FENCE`).
    Fence,
    /// Shelter pen (wire label `KANDANG`).
    Pen,
}

impl Zone {
    /// Parse a wire label into a known zone. Returns `None` for any label
    /// outside the enumerated set; callers must retain the previous zone.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "FEEDING" => Some(Zone::Feeding),
            "FENCE" => Some(Zone::Fence),
            "KANDANG" => Some(Zone::Pen),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Zone::Feeding => "FEEDING",
            Zone::Fence => "FENCE",
            Zone::Pen => "KANDANG",
        }
    }
}

/// Aggregate state describing where the monitored subject currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneInfo {
    pub zone: Zone,
    /// Zone-boundary crossings since the last reset. Monotonically
    /// non-decreasing within a counting window.
    pub movement_count: u32,
    /// One-way latch; true once `movement_count` reaches the threshold,
    /// until explicitly reset after the actuator acknowledges dispensing.
    pub feeding_triggered: bool,
}

/// Tracks the relayed zone, the movement count, and the feeding latch.
///
/// `movement_count` advances only when the service signals a new qualifying
/// movement (the relayed counter rose), never per tick. The trigger edge is
/// reported exactly once per threshold crossing even if callers poll
/// repeatedly.
#[derive(Debug)]
pub struct ZoneTracker {
    threshold: u32,
    zone: Option<Zone>,
    movement_count: u32,
    feeding_triggered: bool,
}

impl ZoneTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            zone: None,
            movement_count: 0,
            feeding_triggered: false,
        }
    }

    /// Fold one zone report into the tracker. Returns `true` exactly once,
    /// on the tick where the movement count first reaches the threshold.
    pub fn observe(&mut self, report: &ZoneReport) -> bool {
        match Zone::parse(&report.zone) {
            Some(zone) => self.zone = Some(zone),
            None => {
                // Collaborator contract drift: keep the previous zone.
                log::debug!("ignoring unknown zone label {:?}", report.zone);
            }
        }

        if report.movement_count > self.movement_count {
            self.movement_count = report.movement_count;
        }

        if self.movement_count >= self.threshold && !self.feeding_triggered {
            self.feeding_triggered = true;
            log::info!(
                "feeding trigger latched at {} movements",
                self.movement_count
            );
            return true;
        }
        false
    }

    /// Current aggregate state, `None` until a valid zone has been relayed.
    pub fn info(&self) -> Option<ZoneInfo> {
        self.zone.map(|zone| ZoneInfo {
            zone,
            movement_count: self.movement_count,
            feeding_triggered: self.feeding_triggered,
        })
    }

    pub fn feeding_triggered(&self) -> bool {
        self.feeding_triggered
    }

    /// Actuator collaborator acknowledged the dispense: zero the counting
    /// window and release the latch.
    pub fn acknowledge_feeding(&mut self) {
        self.movement_count = 0;
        self.feeding_triggered = false;
    }

    /// Fresh state for a new camera session.
    pub fn reset(&mut self) {
        self.zone = None;
        self.acknowledge_feeding();
    }
}

// ----------------------------------------------------------------------------
// Zone geometry (configuration data)
// ----------------------------------------------------------------------------

/// One vertical band of the field of view.
#[derive(Clone, Debug, Deserialize)]
pub struct ZoneBand {
    /// Wire label; must parse to a known `Zone`.
    pub label: String,
    /// Right edge of the band as a fraction of frame width, in (0, 1].
    pub max_x: f32,
    /// Display color as `#rrggbb`.
    pub color: String,
}

/// Ordered partition of the field of view into vertical bands.
///
/// The last band's `max_x` must be 1.0; interior boundaries are the divider
/// lines the overlay draws.
#[derive(Clone, Debug, Deserialize)]
pub struct ZoneLayout {
    pub bands: Vec<ZoneBand>,
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self {
            bands: vec![
                ZoneBand {
                    label: "FEEDING".to_string(),
                    max_x: 0.33,
                    color: "#22c55e".to_string(),
                },
                ZoneBand {
                    label: "FENCE".to_string(),
                    max_x: 0.66,
                    color: "#fbbf24".to_string(),
                },
                ZoneBand {
                    label: "KANDANG".to_string(),
                    max_x: 1.0,
                    color: "#3b82f6".to_string(),
                },
            ],
        }
    }
}

impl ZoneLayout {
    pub fn validate(&self) -> Result<()> {
        if self.bands.is_empty() {
            return Err(anyhow!("zone layout must contain at least one band"));
        }
        let mut prev = 0.0f32;
        for band in &self.bands {
            if Zone::parse(&band.label).is_none() {
                return Err(anyhow!("unknown zone label in layout: {:?}", band.label));
            }
            if band.max_x <= prev || band.max_x > 1.0 {
                return Err(anyhow!(
                    "zone band boundaries must be strictly increasing in (0, 1]"
                ));
            }
            validate_color(&band.color)?;
            prev = band.max_x;
        }
        let last = self.bands.last().expect("non-empty bands");
        if (last.max_x - 1.0).abs() > f32::EPSILON {
            return Err(anyhow!("last zone band must end at 1.0"));
        }
        Ok(())
    }

    /// Interior boundary fractions, i.e. where the overlay draws dividers.
    pub fn dividers(&self) -> Vec<f32> {
        self.bands
            .iter()
            .take(self.bands.len().saturating_sub(1))
            .map(|band| band.max_x)
            .collect()
    }

    /// The band containing a horizontal position given as a fraction of
    /// frame width.
    pub fn band_at(&self, x_ratio: f32) -> &ZoneBand {
        self.bands
            .iter()
            .find(|band| x_ratio < band.max_x)
            .unwrap_or_else(|| self.bands.last().expect("non-empty bands"))
    }
}

/// Parse a validated `#rrggbb` color into RGB components.
pub fn parse_color(color: &str) -> Result<[u8; 3]> {
    validate_color(color)?;
    let r = u8::from_str_radix(&color[1..3], 16)?;
    let g = u8::from_str_radix(&color[3..5], 16)?;
    let b = u8::from_str_radix(&color[5..7], 16)?;
    Ok([r, g, b])
}

fn validate_color(color: &str) -> Result<()> {
    // Compile once for hot paths.
    static COLOR_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = COLOR_RE.get_or_init(|| regex::Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap());
    if !re.is_match(color) {
        return Err(anyhow!("zone color must match #rrggbb, got {:?}", color));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
