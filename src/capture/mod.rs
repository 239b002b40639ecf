//! Frame sampler and capture.
//!
//! This module acquires a live video stream from a camera device and, on
//! demand, produces a fixed-size JPEG still of the current frame for the
//! inference client.
//!
//! The capture layer is responsible for:
//! - Acquiring the device once per session (`start_capture`)
//! - Rasterizing the current frame to the bounded send size
//! - Encoding at a fixed JPEG quality
//!
//! The capture layer MUST NOT:
//! - Retain frames after encoding
//! - Treat a not-yet-ready source as an error (`Ok(None)` is the normal
//!   transient state)
//! - Retry a denied permission prompt

mod http;
mod synthetic;

use anyhow::Result;
use url::Url;

use http::HttpCamera;
use synthetic::SyntheticCamera;

/// Default bounded dimensions of the encoded still sent to inference.
pub const DEFAULT_SEND_WIDTH: u32 = 640;
pub const DEFAULT_SEND_HEIGHT: u32 = 480;
/// Fixed JPEG quality for encoded stills.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Camera acquisition errors.
///
/// `AccessDenied` is fatal for the session: no overlay can be produced
/// without a video source, and permission prompts are never retried
/// automatically.
#[derive(Clone, Debug)]
pub enum CameraError {
    AccessDenied { device: String },
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::AccessDenied { device } => {
                write!(f, "camera access denied for {}", device)
            }
        }
    }
}
impl std::error::Error for CameraError {}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Device URL. Supported schemes: `stub://` (synthetic, always
    /// available; `stub://denied` simulates a permission refusal) and
    /// `http(s)://` for MJPEG or single-JPEG snapshot cameras.
    pub url: String,
    /// Target frame rate; the HTTP backend decimates to this rate.
    pub target_fps: u32,
    /// Width of the encoded still sent to inference.
    pub send_width: u32,
    /// Height of the encoded still sent to inference.
    pub send_height: u32,
    /// JPEG quality of the encoded still.
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: "stub://pen_camera".to_string(),
            target_fps: 10,
            send_width: DEFAULT_SEND_WIDTH,
            send_height: DEFAULT_SEND_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Camera source with backend dispatch by URL scheme.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    Http(HttpCamera),
}

impl CameraSource {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let backend = if config.url.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(config))
        } else {
            let url = Url::parse(&config.url)?;
            match url.scheme() {
                "http" | "https" => CameraBackend::Http(HttpCamera::new(config)),
                other => {
                    anyhow::bail!("unsupported camera scheme '{}'; expected stub or http(s)", other)
                }
            }
        };
        Ok(Self { backend })
    }

    /// Request camera access. On grant the source becomes ready; on denial
    /// this fails with `CameraError::AccessDenied` and the session must
    /// surface a persistent camera-error state.
    pub fn start_capture(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.start_capture(),
            CameraBackend::Http(camera) => camera.start_capture(),
        }
    }

    /// Rasterize the current frame into the fixed send size and encode it
    /// as JPEG. Returns `Ok(None)` while the source is not yet ready; this
    /// is a normal transient state, not an error.
    pub fn capture_still_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.capture_still_frame(),
            CameraBackend::Http(camera) => camera.capture_still_frame(),
        }
    }

    pub fn is_ready(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.is_ready(),
            CameraBackend::Http(camera) => camera.is_ready(),
        }
    }

    /// Ready and, for streaming backends, still receiving frames within
    /// the grace window for the configured rate.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.is_healthy(),
            CameraBackend::Http(camera) => camera.is_healthy(),
        }
    }

    /// Release the camera device. The source is no longer ready afterwards.
    pub fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.release(),
            CameraBackend::Http(camera) => camera.release(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stats(),
            CameraBackend::Http(camera) => camera.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Encode an RGB frame as JPEG at the configured quality.
pub(crate) fn encode_jpeg(frame: &image::RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(bytes)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CaptureConfig {
        CaptureConfig {
            url: "stub://test".to_string(),
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn still_frame_is_none_until_started() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        assert!(!source.is_ready());
        assert!(source.capture_still_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn started_source_produces_bounded_jpeg_stills() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.start_capture()?;
        assert!(source.is_ready());

        let jpeg = source.capture_still_frame()?.expect("still frame");
        // JPEG magic and fixed output size.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg)?;
        assert_eq!(decoded.width(), DEFAULT_SEND_WIDTH);
        assert_eq!(decoded.height(), DEFAULT_SEND_HEIGHT);

        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn denied_device_fails_start_and_never_becomes_ready() -> Result<()> {
        // Permission denial is terminal for the session.
        let mut source = CameraSource::new(CaptureConfig {
            url: "stub://denied".to_string(),
            ..CaptureConfig::default()
        })?;

        let err = source.start_capture().expect_err("denied");
        assert!(err.downcast_ref::<CameraError>().is_some());
        assert!(!source.is_ready());
        assert!(!source.is_healthy());
        assert!(source.capture_still_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn started_synthetic_source_reports_healthy() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        assert!(!source.is_healthy());
        source.start_capture()?;
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn release_makes_the_source_not_ready() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.start_capture()?;
        source.release();
        assert!(!source.is_ready());
        assert!(source.capture_still_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let result = CameraSource::new(CaptureConfig {
            url: "rtsp://camera-1".to_string(),
            ..CaptureConfig::default()
        });
        assert!(result.is_err());
    }
}
