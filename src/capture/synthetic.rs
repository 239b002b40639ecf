use anyhow::Result;
use image::RgbImage;
use rand::Rng;

use super::{encode_jpeg, CameraError, CaptureConfig, CaptureStats};

/// Synthetic camera for `stub://` URLs.
///
/// Generates a drifting gradient scene with per-frame noise so consecutive
/// stills differ, which is enough to exercise the full pipeline without a
/// physical device. `stub://denied` simulates a permission refusal.
pub struct SyntheticCamera {
    config: CaptureConfig,
    ready: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            ready: false,
            frame_count: 0,
        }
    }

    pub fn start_capture(&mut self) -> Result<()> {
        if self.config.url == "stub://denied" {
            return Err(CameraError::AccessDenied {
                device: self.config.url.clone(),
            }
            .into());
        }
        self.ready = true;
        log::info!("CameraSource: acquired {} (synthetic)", self.config.url);
        Ok(())
    }

    pub fn capture_still_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.ready {
            return Ok(None);
        }
        self.frame_count += 1;

        let frame = self.generate_frame();
        let jpeg = encode_jpeg(&frame, self.config.jpeg_quality)?;
        Ok(Some(jpeg))
    }

    fn generate_frame(&self) -> RgbImage {
        let (w, h) = (self.config.send_width, self.config.send_height);
        let drift = (self.frame_count % 256) as u32;
        let mut rng = rand::thread_rng();

        RgbImage::from_fn(w, h, |x, y| {
            let noise: u8 = rng.gen_range(0..8);
            image::Rgb([
                (((x + drift) * 255 / w.max(1)) % 256) as u8,
                ((y * 255 / h.max(1)) % 256) as u8,
                noise,
            ])
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_healthy(&self) -> bool {
        self.ready
    }

    pub fn release(&mut self) {
        self.ready = false;
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
