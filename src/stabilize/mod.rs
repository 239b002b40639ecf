//! Detection stabilization.
//!
//! Raw inference results are jittery and intermittent. This module absorbs
//! both effects into a visually stable, slightly lagged state:
//!
//! - `DetectionLedger` applies the holdover policy: an empty result inside
//!   the grace window keeps the previous non-empty detections visible, so a
//!   single missed tick never makes the overlay flicker.
//! - `BoxSmoother` interpolates per-slot rectangles toward their targets a
//!   fixed fraction per render tick.
//! - `StateCell` is the single shared-state seam between the two timing
//!   loops: whole-value replacement, latest write wins, no partial reads.

mod smoother;

pub use smoother::{head_target, BoxSmoother, Rect, DEFAULT_SMOOTHING_FACTOR};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::inference::{ConnectivityState, Detection};
use crate::zones::ZoneInfo;

/// Grace period during which an empty result is treated as a transient
/// miss rather than the subject leaving the frame.
pub const DEFAULT_HOLDOVER: Duration = Duration::from_millis(1500);

/// Latest-write-wins snapshot cell shared between the inference and render
/// loops.
///
/// The writer publishes a complete replacement value; readers clone the
/// `Arc` under a short lock and observe either the previous or the newest
/// complete snapshot, never a partially updated one. Occasionally reading a
/// snapshot that is already superseded is acceptable: the data is
/// inherently approximate and real-time.
pub struct StateCell<T> {
    inner: Mutex<Arc<T>>,
}

impl<T> StateCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(Arc::new(initial)),
        }
    }

    /// Replace the published value atomically.
    pub fn publish(&self, value: T) {
        let mut guard = self.inner.lock().expect("state cell poisoned");
        *guard = Arc::new(value);
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<T> {
        self.inner.lock().expect("state cell poisoned").clone()
    }
}

/// The complete detection/zone state bundle published by the inference
/// loop. This is the only inter-task shared state.
#[derive(Clone, Debug, Default)]
pub struct TrackingSnapshot {
    pub detections: Vec<Detection>,
    pub zone: Option<ZoneInfo>,
    pub connectivity: ConnectivityState,
    pub diagnostic: Option<String>,
}

/// Holdover ledger: decides whether an empty result means "subject truly
/// left frame" or "transient miss".
#[derive(Debug)]
pub struct DetectionLedger {
    current: Vec<Detection>,
    last_nonempty_at: Option<Instant>,
    holdover: Duration,
}

impl DetectionLedger {
    pub fn new(holdover: Duration) -> Self {
        Self {
            current: Vec::new(),
            last_nonempty_at: None,
            holdover,
        }
    }

    /// Fold one successful inference result into the ledger.
    ///
    /// A non-empty list replaces the current detections and refreshes the
    /// holdover window. An empty list retains the previous detections
    /// until the grace period elapses, then clears.
    pub fn observe(&mut self, detections: Vec<Detection>, now: Instant) {
        if detections.is_empty() {
            self.expire_if_stale(now);
        } else {
            self.current = detections;
            self.last_nonempty_at = Some(now);
        }
    }

    /// A connectivity failure carries no detection information; the
    /// previous detections stay visible until the holdover window elapses,
    /// exactly as for an empty result.
    pub fn observe_failure(&mut self, now: Instant) {
        self.expire_if_stale(now);
    }

    fn expire_if_stale(&mut self, now: Instant) {
        let expired = match self.last_nonempty_at {
            Some(at) => now.duration_since(at) > self.holdover,
            None => true,
        };
        if expired {
            self.current.clear();
        }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.current
    }

    /// True when the current detections are being retained past their last
    /// sighting (inside the grace window).
    pub fn is_holding_over(&self, now: Instant) -> bool {
        match self.last_nonempty_at {
            Some(at) => !self.current.is_empty() && now > at,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.current.clear();
        self.last_nonempty_at = None;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32) -> Detection {
        Detection {
            bbox: [x1, 10.0, x1 + 100.0, 210.0],
            class_name: "goat".to_string(),
            confidence: 0.9,
            behavior: None,
        }
    }

    #[test]
    fn empty_result_inside_grace_window_retains_detections() {
        // Empty results for 500 ms after a prior detection.
        let mut ledger = DetectionLedger::new(Duration::from_millis(1500));
        let t0 = Instant::now();

        ledger.observe(vec![det(50.0)], t0);
        ledger.observe(vec![], t0 + Duration::from_millis(500));

        assert_eq!(ledger.detections().len(), 1);
        assert!(ledger.is_holding_over(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn empty_results_past_grace_window_clear_detections() {
        // Empty results for 3 s continuously.
        let mut ledger = DetectionLedger::new(Duration::from_millis(1500));
        let t0 = Instant::now();

        ledger.observe(vec![det(50.0)], t0);
        ledger.observe(vec![], t0 + Duration::from_millis(1000));
        assert_eq!(ledger.detections().len(), 1);

        ledger.observe(vec![], t0 + Duration::from_secs(3));
        assert!(ledger.detections().is_empty());
    }

    #[test]
    fn overlay_never_flickers_for_a_single_missed_tick() {
        let mut ledger = DetectionLedger::new(Duration::from_millis(1500));
        let t0 = Instant::now();
        let tick = Duration::from_millis(150);

        // Alternate hit/miss; the visible list must never be empty.
        for n in 0..20u32 {
            let now = t0 + tick * n;
            if n % 2 == 0 {
                ledger.observe(vec![det(n as f32)], now);
            } else {
                ledger.observe(vec![], now);
            }
            assert!(
                !ledger.detections().is_empty(),
                "flicker at tick {} despite recent detection",
                n
            );
        }
    }

    #[test]
    fn failures_respect_the_holdover_window() {
        // Failures carry no detection information; nothing clears early.
        let mut ledger = DetectionLedger::new(Duration::from_millis(1500));
        let t0 = Instant::now();

        ledger.observe(vec![det(50.0)], t0);
        ledger.observe_failure(t0 + Duration::from_millis(300));
        ledger.observe_failure(t0 + Duration::from_millis(600));
        assert_eq!(ledger.detections().len(), 1);

        ledger.observe_failure(t0 + Duration::from_millis(2000));
        assert!(ledger.detections().is_empty());
    }

    #[test]
    fn fresh_nonempty_result_resets_the_window() {
        let mut ledger = DetectionLedger::new(Duration::from_millis(1500));
        let t0 = Instant::now();

        ledger.observe(vec![det(50.0)], t0);
        ledger.observe(vec![det(60.0)], t0 + Duration::from_millis(1400));
        // Window restarts at the second sighting.
        ledger.observe(vec![], t0 + Duration::from_millis(2500));
        assert_eq!(ledger.detections().len(), 1);
    }

    #[test]
    fn state_cell_publishes_whole_replacements() {
        let cell = StateCell::new(TrackingSnapshot::default());
        let before = cell.snapshot();
        assert!(before.detections.is_empty());

        cell.publish(TrackingSnapshot {
            detections: vec![det(10.0)],
            zone: None,
            connectivity: ConnectivityState::Connected,
            diagnostic: None,
        });

        // The old snapshot is untouched; the new one is complete.
        assert!(before.detections.is_empty());
        let after = cell.snapshot();
        assert_eq!(after.detections.len(), 1);
        assert_eq!(after.connectivity, ConnectivityState::Connected);
    }
}
