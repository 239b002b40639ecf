//! herdsightd - livestock monitoring overlay daemon.
//!
//! This daemon:
//! 1. Loads the merged configuration (file + environment)
//! 2. Acquires the configured camera and starts the inference/render loops
//! 3. Logs feeding-trigger edges as they latch
//! 4. Logs pipeline health periodically
//! 5. Shuts the session down in order on SIGINT

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use herdsight::{ConnectivityState, Session, Settings};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about = "Livestock monitoring overlay daemon")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "HERDSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device URL (stub:// or http(s)://).
    #[arg(long, env = "HERDSIGHT_CAMERA_URL")]
    camera_url: Option<String>,

    /// Analyze endpoint of the inference service.
    #[arg(long, env = "HERDSIGHT_ANALYZE_URL")]
    analyze_url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(url) = args.camera_url {
        settings.capture.url = url;
    }
    if let Some(url) = args.analyze_url {
        settings.inference.url = url;
    }

    log::info!(
        "herdsightd starting: camera={} analyze={} tick={:?}",
        settings.capture.url,
        settings.inference.url,
        settings.inference.tick
    );

    let session = Session::start(&settings)?;
    if session.camera_failed() {
        log::error!("camera unavailable; overlay shows the blocking error state");
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    let mut last_health_log = Instant::now();
    while running.load(Ordering::Relaxed) {
        if session.take_feeding_edge() {
            let status = session.status();
            log::warn!(
                "feeding trigger latched (movements={}); dispatch the feeder and acknowledge",
                status.zone.map(|zone| zone.movement_count).unwrap_or(0)
            );
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let status = session.status();
            let connectivity = match status.connectivity {
                ConnectivityState::Unknown => "unknown",
                ConnectivityState::Connected => "connected",
                ConnectivityState::Offline => "offline",
            };
            log::info!(
                "health camera={} frames={} api={} fps={:.1} detections={} zone={:?}",
                session.camera_healthy(),
                session.frames_captured(),
                connectivity,
                status.fps,
                status.detection_count,
                status.zone.map(|zone| zone.zone.label())
            );
            if let Some(diagnostic) = &status.diagnostic {
                log::warn!("inference diagnostic: {}", diagnostic);
            }
            last_health_log = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(200));
    }

    session.shutdown()
}
