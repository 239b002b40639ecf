use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use std::io::Read;
use std::time::{Duration, Instant};

use super::{encode_jpeg, CameraError, CaptureConfig, CaptureStats};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// HTTP camera for `http(s)://` URLs.
///
/// Supports MJPEG multipart streams and single-JPEG snapshot endpoints.
/// Each still is decoded, rasterized to the fixed send size, and re-encoded
/// at the configured JPEG quality; the decoded frame is not retained.
pub struct HttpCamera {
    config: CaptureConfig,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpCamera {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stream: None,
            last_frame_at: None,
            frame_count: 0,
        }
    }

    pub fn start_capture(&mut self) -> Result<()> {
        let response = match ureq::get(&self.config.url).call() {
            Ok(response) => response,
            // 401/403 from the device is the HTTP equivalent of a refused
            // permission prompt: terminal for the session.
            Err(ureq::Error::Status(code @ (401 | 403), _)) => {
                log::error!("camera {} refused access ({})", self.config.url, code);
                return Err(CameraError::AccessDenied {
                    device: self.config.url.clone(),
                }
                .into());
            }
            Err(e) => return Err(e).context("connect to http camera"),
        };

        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            let reader = response.into_reader();
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(reader)));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        log::info!("CameraSource: acquired {}", self.config.url);
        Ok(())
    }

    pub fn capture_still_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let min_interval = frame_interval(self.config.target_fps);
        loop {
            let jpeg_bytes = match stream {
                HttpStream::Mjpeg(stream) => stream.read_next_jpeg()?,
                HttpStream::SingleJpeg => fetch_single_jpeg(&self.config.url)?,
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let decoded = image::load_from_memory(&jpeg_bytes).context("decode camera jpeg")?;
            let resized = image::imageops::resize(
                &decoded.to_rgb8(),
                self.config.send_width,
                self.config.send_height,
                FilterType::Triangle,
            );

            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Some(encode_jpeg(&resized, self.config.jpeg_quality)?));
        }
    }

    pub fn is_ready(&self) -> bool {
        self.stream.is_some()
    }

    /// Healthy while frames keep arriving within the grace window derived
    /// from the target rate. A freshly started stream with no frame yet is
    /// still healthy.
    pub fn is_healthy(&self) -> bool {
        if self.stream.is_none() {
            return false;
        }
        match self.last_frame_at {
            None => true,
            Some(at) => at.elapsed() <= health_grace(self.config.target_fps),
        }
    }

    pub fn release(&mut self) {
        self.stream = None;
        self.last_frame_at = None;
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut start = None;
    let mut i = 0;
    while i + 1 < buffer.len() {
        if buffer[i] == 0xFF && buffer[i + 1] == 0xD8 {
            start = Some(i);
            break;
        }
        i += 1;
    }
    let start = start?;
    let mut j = start + 2;
    while j + 1 < buffer.len() {
        if buffer[j] == 0xFF && buffer[j + 1] == 0xD9 {
            return Some((start, j + 2));
        }
        j += 1;
    }
    None
}

fn health_grace(target_fps: u32) -> Duration {
    (frame_interval(target_fps) * 3).max(Duration::from_secs(2))
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_bounds_are_found_in_a_multipart_buffer() {
        let mut buffer = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        buffer.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        buffer.extend_from_slice(b"\r\n--boundary");

        let (start, end) = find_jpeg_bounds(&buffer).expect("bounds");
        assert_eq!(&buffer[start..start + 2], &[0xFF, 0xD8]);
        assert_eq!(&buffer[end - 2..end], &[0xFF, 0xD9]);
    }

    #[test]
    fn incomplete_jpeg_yields_no_bounds() {
        let buffer = [0xFF, 0xD8, 0x01, 0x02];
        assert!(find_jpeg_bounds(&buffer).is_none());
    }
}
