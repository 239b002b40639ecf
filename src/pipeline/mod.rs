//! Pipeline engines and session lifecycle.
//!
//! Two engines, one per timing loop:
//!
//! - `InferenceEngine` runs on the fixed inference tick. It captures a
//!   still, posts it to the inference service, folds the outcome through
//!   the detection ledger and zone tracker, and publishes a fresh
//!   `TrackingSnapshot`. The loop schedules by deadline: if a round trip
//!   overruns the period, the missed deadlines are skipped, never queued.
//! - `RenderEngine` runs continuously. It reads the latest snapshot,
//!   advances box smoothing, composes the overlay scene, and publishes a
//!   `StatusSnapshot`. It performs no I/O and never blocks on the network.
//!
//! `Session` owns both loops. Starting a session requests the camera once;
//! a denied device leaves the session in a persistent camera-error state
//! with only the render loop running. A restarted session is a new
//! `Session` value, so zone state and connectivity begin zeroed by
//! construction.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::capture::{CameraError, CameraSource};
use crate::config::Settings;
use crate::inference::{
    ConnectivityState, HttpTransport, InferenceClient, InferenceTransport, Outcome,
};
use crate::overlay::{OverlayCompositor, OverlayScene};
use crate::stabilize::{BoxSmoother, DetectionLedger, StateCell, TrackingSnapshot};
use crate::zones::{ZoneInfo, ZoneTracker};

const RENDER_TICK: Duration = Duration::from_millis(33);
const FPS_EMA_WEIGHT: f32 = 0.2;

/// Render-loop health published for the embedding UI and the daemon's
/// periodic status log.
#[derive(Clone, Debug, Default)]
pub struct StatusSnapshot {
    pub connectivity: ConnectivityState,
    pub diagnostic: Option<String>,
    pub fps: f32,
    pub detection_count: usize,
    pub zone: Option<ZoneInfo>,
}

/// The inference-side engine: one `tick` per scheduling deadline.
pub struct InferenceEngine {
    client: InferenceClient,
    ledger: DetectionLedger,
    zones: ZoneTracker,
    cell: Arc<StateCell<TrackingSnapshot>>,
}

impl InferenceEngine {
    pub fn new(
        client: InferenceClient,
        ledger: DetectionLedger,
        zones: ZoneTracker,
        cell: Arc<StateCell<TrackingSnapshot>>,
    ) -> Self {
        Self {
            client,
            ledger,
            zones,
            cell,
        }
    }

    /// Run one inference tick against `camera` at time `now`.
    ///
    /// Returns `true` on the tick where the feeding trigger latches. A
    /// not-yet-ready camera publishes the current state unchanged; a
    /// connectivity failure becomes state, never an error.
    pub fn tick(&mut self, camera: &mut CameraSource, now: Instant) -> Result<bool> {
        let frame = camera
            .capture_still_frame()
            .context("capture still frame")?;
        let Some(jpeg) = frame else {
            self.publish();
            return Ok(false);
        };

        let mut edge = false;
        match self.client.analyze(&jpeg) {
            Outcome::Analysis(analysis) => {
                // Zone metadata describes the detected subject; without a
                // detection there is nothing for it to describe.
                if !analysis.detections.is_empty() {
                    if let Some(report) = &analysis.zone_info {
                        edge = self.zones.observe(report);
                    }
                }
                self.ledger.observe(analysis.detections, now);
            }
            Outcome::ConnectivityFailure { .. } => {
                self.ledger.observe_failure(now);
            }
        }

        self.publish();
        Ok(edge)
    }

    fn publish(&self) {
        let detections = self.ledger.detections().to_vec();
        // Zone state is only meaningful while a subject is (or is held
        // over as) present.
        let zone = if detections.is_empty() {
            None
        } else {
            self.zones.info()
        };
        self.cell.publish(TrackingSnapshot {
            detections,
            zone,
            connectivity: self.client.connectivity(),
            diagnostic: self.client.diagnostic().map(str::to_string),
        });
    }

    pub fn acknowledge_feeding(&mut self) {
        self.zones.acknowledge_feeding();
        self.publish();
    }
}

/// The render-side engine: one `tick` per frame.
pub struct RenderEngine {
    smoother: BoxSmoother,
    compositor: OverlayCompositor,
    cell: Arc<StateCell<TrackingSnapshot>>,
    status: Arc<StateCell<StatusSnapshot>>,
    scale_x: f32,
    scale_y: f32,
    camera_failed: Arc<AtomicBool>,
    last_tick: Option<Instant>,
    fps: f32,
}

impl RenderEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        smoother: BoxSmoother,
        compositor: OverlayCompositor,
        cell: Arc<StateCell<TrackingSnapshot>>,
        status: Arc<StateCell<StatusSnapshot>>,
        scale_x: f32,
        scale_y: f32,
        camera_failed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            smoother,
            compositor,
            cell,
            status,
            scale_x,
            scale_y,
            camera_failed,
            last_tick: None,
            fps: 0.0,
        }
    }

    /// Compose the overlay for one frame and publish render health.
    pub fn tick(&mut self, now: Instant) -> OverlayScene {
        let snapshot = self.cell.snapshot();
        let boxes = self
            .smoother
            .update(&snapshot.detections, self.scale_x, self.scale_y);

        let scene = self.compositor.compose(
            &boxes,
            snapshot.connectivity,
            snapshot.diagnostic.as_deref(),
            self.camera_failed.load(Ordering::Relaxed),
        );

        if let Some(last) = self.last_tick {
            let dt = now.duration_since(last).as_secs_f32();
            if dt > 0.0 {
                let instantaneous = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instantaneous
                } else {
                    self.fps * (1.0 - FPS_EMA_WEIGHT) + instantaneous * FPS_EMA_WEIGHT
                };
            }
        }
        self.last_tick = Some(now);

        self.status.publish(StatusSnapshot {
            connectivity: snapshot.connectivity,
            diagnostic: snapshot.diagnostic.clone(),
            fps: self.fps,
            detection_count: snapshot.detections.len(),
            zone: snapshot.zone,
        });

        scene
    }
}

/// A running camera session: inference and render loops plus the shared
/// snapshot cells.
pub struct Session {
    stop: Arc<AtomicBool>,
    ack_requested: Arc<AtomicBool>,
    feeding_pending: Arc<AtomicBool>,
    camera_failed: Arc<AtomicBool>,
    camera_healthy: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    tracking: Arc<StateCell<TrackingSnapshot>>,
    status: Arc<StateCell<StatusSnapshot>>,
    scene: Arc<StateCell<OverlayScene>>,
    inference_loop: Option<JoinHandle<CameraSource>>,
    render_loop: Option<JoinHandle<()>>,
    denied_camera: Option<CameraSource>,
}

impl Session {
    /// Start a session with the production HTTP transport.
    pub fn start(settings: &Settings) -> Result<Self> {
        let transport =
            HttpTransport::new(settings.inference.url.clone(), settings.inference.timeout);
        Self::start_with_transport(settings, Box::new(transport))
    }

    /// Start a session with an explicit transport (used by tests and
    /// alternative backends).
    pub fn start_with_transport(
        settings: &Settings,
        transport: Box<dyn InferenceTransport>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let ack_requested = Arc::new(AtomicBool::new(false));
        let feeding_pending = Arc::new(AtomicBool::new(false));
        let camera_failed = Arc::new(AtomicBool::new(false));
        let camera_healthy = Arc::new(AtomicBool::new(false));
        let frames_captured = Arc::new(AtomicU64::new(0));
        let tracking = Arc::new(StateCell::new(TrackingSnapshot::default()));
        let status = Arc::new(StateCell::new(StatusSnapshot::default()));
        let scene = Arc::new(StateCell::new(OverlayScene::default()));

        let mut camera = CameraSource::new(settings.capture_config())?;
        let (live_camera, denied_camera) = match camera.start_capture() {
            Ok(()) => (Some(camera), None),
            Err(e) if e.downcast_ref::<CameraError>().is_some() => {
                // Terminal for the session: never re-prompt. The render
                // loop keeps running to surface the blocking error state.
                log::error!("{:#}", e);
                camera_failed.store(true, Ordering::Relaxed);
                (None, Some(camera))
            }
            Err(e) => return Err(e).context("start camera capture"),
        };

        let inference_loop = if let Some(camera) = live_camera {
            let mut engine = InferenceEngine::new(
                InferenceClient::new(transport),
                DetectionLedger::new(settings.stabilizer.holdover),
                ZoneTracker::new(settings.zones.movement_threshold),
                tracking.clone(),
            );
            let tick = settings.inference.tick;
            let stop = stop.clone();
            let ack_requested = ack_requested.clone();
            let feeding_pending = feeding_pending.clone();
            let camera_healthy = camera_healthy.clone();
            let frames_captured = frames_captured.clone();
            camera_healthy.store(true, Ordering::Relaxed);
            Some(thread::spawn(move || {
                run_inference_loop(
                    &mut engine,
                    camera,
                    tick,
                    &stop,
                    &ack_requested,
                    &feeding_pending,
                    &camera_healthy,
                    &frames_captured,
                )
            }))
        } else {
            None
        };

        let render_loop = {
            let mut engine = RenderEngine::new(
                BoxSmoother::new(settings.stabilizer.smoothing),
                OverlayCompositor::new(
                    settings.display.width,
                    settings.display.height,
                    settings.display.mirrored,
                    settings.zones.layout.clone(),
                ),
                tracking.clone(),
                status.clone(),
                settings.display.width as f32 / settings.capture.send_width as f32,
                settings.display.height as f32 / settings.capture.send_height as f32,
                camera_failed.clone(),
            );
            let stop = stop.clone();
            let scene = scene.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    scene.publish(engine.tick(Instant::now()));
                    thread::sleep(RENDER_TICK);
                }
            })
        };

        Ok(Self {
            stop,
            ack_requested,
            feeding_pending,
            camera_failed,
            camera_healthy,
            frames_captured,
            tracking,
            status,
            scene,
            inference_loop,
            render_loop: Some(render_loop),
            denied_camera,
        })
    }

    pub fn tracking(&self) -> Arc<TrackingSnapshot> {
        self.tracking.snapshot()
    }

    pub fn status(&self) -> Arc<StatusSnapshot> {
        self.status.snapshot()
    }

    pub fn scene(&self) -> Arc<OverlayScene> {
        self.scene.snapshot()
    }

    pub fn camera_failed(&self) -> bool {
        self.camera_failed.load(Ordering::Relaxed)
    }

    pub fn camera_healthy(&self) -> bool {
        self.camera_healthy.load(Ordering::Relaxed)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// True exactly once per feeding-trigger edge.
    pub fn take_feeding_edge(&self) -> bool {
        self.feeding_pending.swap(false, Ordering::Relaxed)
    }

    /// Actuator acknowledged dispensing: release the latch and restart the
    /// counting window on the next inference tick.
    pub fn acknowledge_feeding(&self) {
        self.ack_requested.store(true, Ordering::Relaxed);
    }

    /// Stop both loops and release the camera device.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);

        let mut camera = None;
        if let Some(handle) = self.inference_loop.take() {
            camera = Some(
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("inference loop panicked"))?,
            );
        }
        if let Some(handle) = self.render_loop.take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("render loop panicked"))?;
        }

        if let Some(mut camera) = camera.or(self.denied_camera.take()) {
            camera.release();
        }
        log::info!("session shut down");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn run_inference_loop(
    engine: &mut InferenceEngine,
    mut camera: CameraSource,
    tick: Duration,
    stop: &AtomicBool,
    ack_requested: &AtomicBool,
    feeding_pending: &AtomicBool,
    camera_healthy: &AtomicBool,
    frames_captured: &AtomicU64,
) -> CameraSource {
    let mut next = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep((next - now).min(Duration::from_millis(20)));
            continue;
        }

        if ack_requested.swap(false, Ordering::Relaxed) {
            engine.acknowledge_feeding();
        }

        match engine.tick(&mut camera, now) {
            Ok(true) => {
                feeding_pending.store(true, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) => log::warn!("inference tick failed: {:#}", e),
        }
        camera_healthy.store(camera.is_healthy(), Ordering::Relaxed);
        frames_captured.store(camera.stats().frames_captured, Ordering::Relaxed);

        // Deadline scheduling: a slow round trip skips the missed ticks
        // instead of queueing catch-up requests.
        next += tick;
        let after = Instant::now();
        if next <= after {
            let mut skipped = 0u32;
            while next <= after {
                next += tick;
                skipped += 1;
            }
            log::debug!("inference tick overran; skipped {} deadline(s)", skipped);
        }
    }
    camera
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
