//! Inference client.
//!
//! This module delivers one captured frame per request to the external
//! inference service and translates the response into a structured result
//! or a typed failure.
//!
//! The client is responsible for:
//! - Posting a single still image per tick
//! - Decoding the detection list and optional zone metadata
//! - Tracking `ConnectivityState` and a human-readable diagnostic
//!
//! The client MUST NOT:
//! - Propagate transport errors as panics or `Err` into the scheduling loop
//! - Retry failed requests (each tick is independent, time-based retry only)
//! - Queue requests (an overlapping tick is skipped by the scheduler)
//!
//! This is the sole component, besides the HTTP camera backend, permitted
//! to perform network I/O.

mod http;

pub use http::HttpTransport;

use anyhow::Result;
use serde::Deserialize;

/// One recognized subject in a single inference response.
///
/// Coordinates are in the coordinate space of the frame that was sent to
/// inference, not the display resolution. Created fresh on every successful
/// response and superseded, never mutated, by the next one.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Detection {
    /// Bounding box as (x1, y1, x2, y2) in sent-frame pixels.
    pub bbox: [f32; 4],
    /// Subject category label.
    #[serde(rename = "class")]
    pub class_name: String,
    /// Probability in [0, 1].
    pub confidence: f32,
    /// Optional categorical label (e.g. "Lying Down") used to recolor the
    /// overlay.
    #[serde(default)]
    pub behavior: Option<String>,
}

/// Zone metadata relayed by the inference service alongside detections.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ZoneReport {
    pub zone: String,
    #[serde(default)]
    pub movement_count: u32,
    #[serde(default)]
    pub feeding_triggered: bool,
}

/// Decoded body of one successful inference round trip.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub zone_info: Option<ZoneReport>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    analysis: Option<Analysis>,
}

/// Outcome of one inference tick.
///
/// Network, HTTP, and decode failures are all folded into
/// `ConnectivityFailure`; they never surface as errors to the caller.
#[derive(Clone, Debug)]
pub enum Outcome {
    Analysis(Analysis),
    ConnectivityFailure { message: String },
}

/// Connectivity of the inference service, process-wide for the lifetime of
/// the active camera session. Reset to `Unknown` when the session restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectivityState {
    #[default]
    Unknown,
    Connected,
    Offline,
}

/// Transport seam for the inference request.
///
/// Production uses `HttpTransport`; tests script outcomes with a stub.
/// Implementations return the raw response body on success and an error on
/// any HTTP-level or network-level failure.
pub trait InferenceTransport: Send {
    fn post_frame(&mut self, jpeg: &[u8]) -> Result<String>;
}

/// Inference client: one request per `analyze` call, connectivity tracked
/// across calls.
pub struct InferenceClient {
    transport: Box<dyn InferenceTransport>,
    connectivity: ConnectivityState,
    diagnostic: Option<String>,
}

impl InferenceClient {
    pub fn new(transport: Box<dyn InferenceTransport>) -> Self {
        Self {
            transport,
            connectivity: ConnectivityState::Unknown,
            diagnostic: None,
        }
    }

    /// Issue a single inference request for one encoded frame.
    ///
    /// On success, sets `ConnectivityState::Connected` and clears the
    /// diagnostic. On any failure, sets `ConnectivityState::Offline`,
    /// records a diagnostic message, and returns `ConnectivityFailure`
    /// instead of an error.
    pub fn analyze(&mut self, jpeg: &[u8]) -> Outcome {
        let body = match self.transport.post_frame(jpeg) {
            Ok(body) => body,
            Err(e) => return self.fail(format!("inference request failed: {e:#}")),
        };

        let decoded: AnalyzeResponse = match serde_json::from_str(&body) {
            Ok(decoded) => decoded,
            Err(e) => return self.fail(format!("inference response invalid: {e}")),
        };

        self.connectivity = ConnectivityState::Connected;
        self.diagnostic = None;
        Outcome::Analysis(decoded.analysis.unwrap_or_default())
    }

    fn fail(&mut self, message: String) -> Outcome {
        log::warn!("{}", message);
        self.connectivity = ConnectivityState::Offline;
        self.diagnostic = Some(message.clone());
        Outcome::ConnectivityFailure { message }
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
