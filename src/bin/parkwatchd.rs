//! parkwatchd - parking occupancy daemon
//!
//! This daemon:
//! 1. Opens every configured camera source
//! 2. Runs the detection/occupancy pipeline on a background worker
//! 3. Serves stats, the MJPEG overlay stream, and the control endpoints

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use parkwatch::api::{ApiConfig, ApiServer};
use parkwatch::detect::{DetectionAdapter, DetectorBackend, StubBackend};
use parkwatch::{ParkingSystem, ParkwatchConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file path (overrides the PARKWATCH_CONFIG env var).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    /// Listen address for the HTTP API (overrides config).
    #[arg(long)]
    addr: Option<String>,
    /// Capture source for the primary camera (overrides config).
    #[arg(long)]
    source: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ParkwatchConfig::load_from(Some(path))?,
        None => ParkwatchConfig::load()?,
    };
    if let Some(addr) = args.addr {
        config.api_addr = addr;
    }
    if let Some(source) = args.source {
        if let Some(cam) = config.cameras.first_mut() {
            cam.source = source;
        }
    }

    let adapter = DetectionAdapter::new(build_backend(&config)?);
    log::info!(
        "starting pipeline: {} camera(s), {} backend, threshold {:.2}",
        config.cameras.len(),
        adapter.backend_name(),
        config.detection.threshold
    );

    let system = Arc::new(ParkingSystem::start(&config, adapter)?);
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        system.clone(),
    )
    .spawn()?;
    log::info!("parkwatchd serving on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("parkwatchd running; Ctrl-C to stop");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    api_handle.stop()?;
    system.shutdown();

    Ok(())
}

/// Pick the detector backend for this deployment.
///
/// With `backend-tract` built in and a model configured, inference runs the
/// ONNX model; otherwise the synthetic stub backend keeps the pipeline fully
/// functional against `stub://` scenes.
fn build_backend(config: &ParkwatchConfig) -> Result<Box<dyn DetectorBackend>> {
    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &config.detection.model_path {
        let backend = parkwatch::TractBackend::new(model_path, 640, 480)?;
        return Ok(Box::new(backend));
    }
    #[cfg(not(feature = "backend-tract"))]
    if let Some(model_path) = &config.detection.model_path {
        log::warn!(
            "model {} configured but parkwatch was built without backend-tract; using stub backend",
            model_path.display()
        );
    }
    Ok(Box::new(StubBackend::new()))
}
