//! herdsight — live animal-detection overlay and zone-tracking pipeline.
//!
//! This crate is the client-side core of a livestock monitoring product:
//! it samples frames from a camera, forwards them to an external inference
//! service, stabilizes the inherently noisy detection results for smooth
//! rendering, classifies the monitored subject into fixed spatial zones,
//! and latches an automated feeding trigger when a movement threshold is
//! crossed.
//!
//! # Architecture
//!
//! Two independently scheduled timing loops share one atomically-replaced
//! state snapshot:
//!
//! 1. The **inference tick** (fixed period) captures a still frame, posts
//!    it to the inference service, folds the outcome through the detection
//!    ledger and zone tracker, and publishes a fresh `TrackingSnapshot`.
//!    Overlapping ticks are skipped, never queued.
//! 2. The **render tick** (continuous) reads the latest snapshot, advances
//!    per-slot box smoothing, and composes the overlay scene. It performs
//!    no I/O and never blocks.
//!
//! Snapshots are published as whole-value replacements, so the render loop
//! always observes either the previous or the newest complete state, never
//! a partially updated one.
//!
//! # Module Structure
//!
//! - `capture`: camera sources and still-frame encoding
//! - `inference`: HTTP inference client and wire types
//! - `stabilize`: holdover ledger, box smoothing, snapshot cell
//! - `zones`: zone classification, movement counting, feeding latch
//! - `overlay`: overlay scene composition and rasterization
//! - `pipeline`: the two tick engines and session lifecycle

pub mod capture;
pub mod config;
pub mod inference;
pub mod overlay;
pub mod pipeline;
pub mod stabilize;
pub mod zones;

pub use capture::{CameraError, CameraSource, CaptureConfig};
pub use config::Settings;
pub use inference::{
    Analysis, ConnectivityState, Detection, InferenceClient, InferenceTransport, Outcome,
    ZoneReport,
};
pub use overlay::{BannerKind, DrawOp, OverlayCompositor, OverlayScene};
pub use pipeline::{InferenceEngine, RenderEngine, Session, StatusSnapshot};
pub use stabilize::{BoxSmoother, DetectionLedger, Rect, StateCell, TrackingSnapshot};
pub use zones::{Zone, ZoneInfo, ZoneLayout, ZoneTracker};
