//! Runtime configuration.
//!
//! Settings are assembled from three layers, later layers winning:
//! built-in defaults, an optional JSON config file (path from the
//! `HERDSIGHT_CONFIG` environment variable or `--config`), and individual
//! `HERDSIGHT_*` environment overrides. The merged result is validated
//! before the session starts.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::capture::{
    CaptureConfig, DEFAULT_JPEG_QUALITY, DEFAULT_SEND_HEIGHT, DEFAULT_SEND_WIDTH,
};
use crate::stabilize::{DEFAULT_HOLDOVER, DEFAULT_SMOOTHING_FACTOR};
use crate::zones::{ZoneLayout, DEFAULT_MOVEMENT_THRESHOLD};

const DEFAULT_ANALYZE_URL: &str = "http://127.0.0.1:8000/api/cv/analyze";
const DEFAULT_TICK_MS: u64 = 150;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CAMERA_URL: &str = "stub://pen_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_DISPLAY_WIDTH: u32 = 1280;
const DEFAULT_DISPLAY_HEIGHT: u32 = 720;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    inference: Option<InferenceConfigFile>,
    capture: Option<CaptureConfigFile>,
    display: Option<DisplayConfigFile>,
    stabilizer: Option<StabilizerConfigFile>,
    zones: Option<ZoneConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    url: Option<String>,
    tick_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    send_width: Option<u32>,
    send_height: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    mirrored: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct StabilizerConfigFile {
    holdover_ms: Option<u64>,
    smoothing: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ZoneConfigFile {
    movement_threshold: Option<u32>,
    layout: Option<ZoneLayout>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub inference: InferenceSettings,
    pub capture: CaptureSettings,
    pub display: DisplaySettings,
    pub stabilizer: StabilizerSettings,
    pub zones: ZoneSettings,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// Analyze endpoint of the inference service.
    pub url: String,
    /// Fixed inference tick period.
    pub tick: Duration,
    /// Per-request transport timeout.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub url: String,
    pub target_fps: u32,
    pub send_width: u32,
    pub send_height: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,
    /// Horizontally mirrored "selfie" presentation.
    pub mirrored: bool,
}

#[derive(Debug, Clone)]
pub struct StabilizerSettings {
    pub holdover: Duration,
    pub smoothing: f32,
}

#[derive(Debug, Clone)]
pub struct ZoneSettings {
    pub movement_threshold: u32,
    pub layout: ZoneLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl Settings {
    /// Merge defaults, the optional config file, and environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("HERDSIGHT_CONFIG").ok();
        let path = config_path.or_else(|| env_path.as_deref().map(Path::new));
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let inference = InferenceSettings {
            url: file
                .inference
                .as_ref()
                .and_then(|inference| inference.url.clone())
                .unwrap_or_else(|| DEFAULT_ANALYZE_URL.to_string()),
            tick: Duration::from_millis(
                file.inference
                    .as_ref()
                    .and_then(|inference| inference.tick_ms)
                    .unwrap_or(DEFAULT_TICK_MS),
            ),
            timeout: Duration::from_millis(
                file.inference
                    .as_ref()
                    .and_then(|inference| inference.timeout_ms)
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        };
        let capture = CaptureSettings {
            url: file
                .capture
                .as_ref()
                .and_then(|capture| capture.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: file
                .capture
                .as_ref()
                .and_then(|capture| capture.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
            send_width: file
                .capture
                .as_ref()
                .and_then(|capture| capture.send_width)
                .unwrap_or(DEFAULT_SEND_WIDTH),
            send_height: file
                .capture
                .as_ref()
                .and_then(|capture| capture.send_height)
                .unwrap_or(DEFAULT_SEND_HEIGHT),
            jpeg_quality: file
                .capture
                .as_ref()
                .and_then(|capture| capture.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        };
        let display = DisplaySettings {
            width: file
                .display
                .as_ref()
                .and_then(|display| display.width)
                .unwrap_or(DEFAULT_DISPLAY_WIDTH),
            height: file
                .display
                .as_ref()
                .and_then(|display| display.height)
                .unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            mirrored: file
                .display
                .as_ref()
                .and_then(|display| display.mirrored)
                .unwrap_or(true),
        };
        let stabilizer = StabilizerSettings {
            holdover: file
                .stabilizer
                .as_ref()
                .and_then(|stabilizer| stabilizer.holdover_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_HOLDOVER),
            smoothing: file
                .stabilizer
                .as_ref()
                .and_then(|stabilizer| stabilizer.smoothing)
                .unwrap_or(DEFAULT_SMOOTHING_FACTOR),
        };
        let zones = ZoneSettings {
            movement_threshold: file
                .zones
                .as_ref()
                .and_then(|zones| zones.movement_threshold)
                .unwrap_or(DEFAULT_MOVEMENT_THRESHOLD),
            layout: file
                .zones
                .and_then(|zones| zones.layout)
                .unwrap_or_default(),
        };
        Self {
            inference,
            capture,
            display,
            stabilizer,
            zones,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("HERDSIGHT_ANALYZE_URL") {
            if !url.trim().is_empty() {
                self.inference.url = url;
            }
        }
        if let Ok(url) = std::env::var("HERDSIGHT_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.capture.url = url;
            }
        }
        if let Ok(tick) = std::env::var("HERDSIGHT_TICK_MS") {
            let millis: u64 = tick
                .parse()
                .map_err(|_| anyhow!("HERDSIGHT_TICK_MS must be an integer number of ms"))?;
            self.inference.tick = Duration::from_millis(millis);
        }
        if let Ok(threshold) = std::env::var("HERDSIGHT_MOVEMENT_THRESHOLD") {
            let threshold: u32 = threshold
                .parse()
                .map_err(|_| anyhow!("HERDSIGHT_MOVEMENT_THRESHOLD must be an integer"))?;
            self.zones.movement_threshold = threshold;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.inference.tick.is_zero() {
            return Err(anyhow!("inference tick must be greater than zero"));
        }
        if self.inference.timeout.is_zero() {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }
        if self.capture.send_width == 0 || self.capture.send_height == 0 {
            return Err(anyhow!("capture send size must be non-zero"));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow!("display size must be non-zero"));
        }
        if !(self.stabilizer.smoothing > 0.0 && self.stabilizer.smoothing <= 1.0) {
            return Err(anyhow!("smoothing factor must be in (0, 1]"));
        }
        if self.stabilizer.holdover.is_zero() {
            return Err(anyhow!("holdover must be greater than zero"));
        }
        if self.zones.movement_threshold == 0 {
            return Err(anyhow!("movement threshold must be at least 1"));
        }
        self.zones.layout.validate()?;
        Ok(())
    }

    /// Capture-layer view of the merged settings.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            url: self.capture.url.clone(),
            target_fps: self.capture.target_fps,
            send_width: self.capture.send_width,
            send_height: self.capture.send_height,
            jpeg_quality: self.capture.jpeg_quality,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = Settings::default();
        settings.validate().expect("defaults are valid");
        assert_eq!(settings.inference.tick, Duration::from_millis(150));
        assert_eq!(settings.stabilizer.holdover, Duration::from_millis(1500));
        assert_eq!(settings.zones.movement_threshold, 10);
        assert!(settings.display.mirrored);
    }

    #[test]
    fn file_values_override_defaults() {
        let file: ConfigFile = serde_json::from_str(
            r#"{
                "inference": {"url": "http://barn:8000/api/cv/analyze", "tick_ms": 200},
                "capture": {"url": "http://barn-cam/stream", "target_fps": 5},
                "display": {"mirrored": false},
                "stabilizer": {"holdover_ms": 2000, "smoothing": 0.5},
                "zones": {"movement_threshold": 4}
            }"#,
        )
        .expect("parse config file");
        let settings = Settings::from_file(file);

        assert_eq!(settings.inference.url, "http://barn:8000/api/cv/analyze");
        assert_eq!(settings.inference.tick, Duration::from_millis(200));
        assert_eq!(settings.capture.url, "http://barn-cam/stream");
        assert_eq!(settings.capture.target_fps, 5);
        assert!(!settings.display.mirrored);
        assert_eq!(settings.stabilizer.holdover, Duration::from_millis(2000));
        assert_eq!(settings.stabilizer.smoothing, 0.5);
        assert_eq!(settings.zones.movement_threshold, 4);
        // Unspecified fields keep their defaults.
        assert_eq!(settings.capture.send_width, 640);
        settings.validate().expect("merged settings are valid");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut settings = Settings::default();
        settings.stabilizer.smoothing = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.stabilizer.smoothing = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.inference.tick = Duration::ZERO;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.zones.movement_threshold = 0;
        assert!(settings.validate().is_err());
    }
}
