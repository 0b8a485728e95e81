//! Parking system coordinator.
//!
//! One `ParkingSystem` owns the only mutable pipeline state. A dedicated
//! background worker runs the per-camera cycle (capture, infer, occupancy
//! update, aggregate, render, publish) and is the single writer; the
//! request-serving side only ever clones the last published `Arc` out of a
//! lock held for the pointer swap. Camera I/O and inference never run on a
//! reader's thread.
//!
//! Control surface: `switch_source` (serialized with the worker through the
//! per-camera session mutex, all-or-nothing) and `update_sensitivity` (an
//! atomic f32-bits cell, so in-flight cycles read the old or new value,
//! never a torn one).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::capture::SourceDescriptor;
use crate::config::{ParkwatchConfig, SourceAliases};
use crate::detect::{ClassFilter, DetectionAdapter};
use crate::render;
use crate::session::CameraSession;
use crate::stats::{self, StatsSnapshot};

/// Fallback pane size for a camera that never delivered a frame.
const DEFAULT_PANE: (u32, u32) = (640, 480);

pub struct ParkingSystem {
    cameras: Vec<Arc<Mutex<CameraSession>>>,
    shared: Arc<SharedState>,
    aliases: SourceAliases,
    target_fps: u32,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct SharedState {
    /// Confidence threshold as f32 bits; updated atomically, read per cycle.
    threshold_bits: AtomicU32,
    classes: Mutex<ClassFilter>,
    stats: Mutex<Arc<StatsSnapshot>>,
    frame_jpeg: Mutex<Option<Arc<Vec<u8>>>>,
    source_label: Mutex<String>,
    shutdown: AtomicBool,
}

impl ParkingSystem {
    /// Open every configured camera and start the background worker.
    ///
    /// Cameras that fail to open at startup are dropped with an error log;
    /// if none opens, startup fails — a system with no capture at all must
    /// not come up silently empty.
    pub fn start(config: &ParkwatchConfig, adapter: DetectionAdapter) -> Result<Self> {
        let mut cameras = Vec::new();
        for cam in &config.cameras {
            let descriptor = config.aliases.resolve(&cam.source);
            match CameraSession::open(
                &cam.label,
                &descriptor,
                cam.slots_path.clone(),
                config.worker.target_fps,
            ) {
                Ok(session) => cameras.push(Arc::new(Mutex::new(session))),
                Err(err) => log::error!("skipping camera '{}': {:#}", cam.label, err),
            }
        }
        if cameras.is_empty() {
            return Err(anyhow!("no configured camera source could be opened"));
        }

        let source_label = lock_unpoisoned(&cameras[0])
            .descriptor()
            .to_string();
        let shared = Arc::new(SharedState {
            threshold_bits: AtomicU32::new(config.detection.threshold.to_bits()),
            classes: Mutex::new(config.detection.classes.clone()),
            stats: Mutex::new(Arc::new(StatsSnapshot::empty(&source_label))),
            frame_jpeg: Mutex::new(None),
            source_label: Mutex::new(source_label),
            shutdown: AtomicBool::new(false),
        });

        let worker_cameras = cameras.clone();
        let worker_shared = shared.clone();
        let cycle = config.worker.cycle;
        let worker = std::thread::Builder::new()
            .name("parkwatch-worker".into())
            .spawn(move || run_worker(worker_cameras, worker_shared, adapter, cycle))
            .map_err(|err| anyhow!("failed to spawn pipeline worker: {}", err))?;

        Ok(Self {
            cameras,
            shared,
            aliases: config.aliases.clone(),
            target_fps: config.worker.target_fps,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The last published snapshot. Never blocks on camera I/O.
    pub fn stats(&self) -> Arc<StatsSnapshot> {
        lock_unpoisoned(&self.shared.stats).clone()
    }

    /// The last published JPEG, `None` before the first completed cycle.
    pub fn latest_jpeg(&self) -> Option<Arc<Vec<u8>>> {
        lock_unpoisoned(&self.shared.frame_jpeg).clone()
    }

    pub fn sensitivity(&self) -> f32 {
        f32::from_bits(self.shared.threshold_bits.load(Ordering::SeqCst))
    }

    /// Update the confidence threshold; takes effect by the next inference.
    pub fn update_sensitivity(&self, threshold: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!("sensitivity {} is outside [0, 1]", threshold));
        }
        self.shared
            .threshold_bits
            .store(threshold.to_bits(), Ordering::SeqCst);
        log::info!("sensitivity updated to {:.2}", threshold);
        Ok(())
    }

    /// Replace the allowed-class set for subsequent cycles.
    pub fn set_class_filter(&self, classes: ClassFilter) {
        *lock_unpoisoned(&self.shared.classes) = classes;
    }

    /// Switch the primary camera's capture source.
    ///
    /// `raw` may be a shorthand ("video", "webcam"), a path, or a device
    /// index. The swap is all-or-nothing: on failure the active source keeps
    /// running, untouched, and the error is returned to the caller.
    pub fn switch_source(&self, raw: &str) -> Result<SourceDescriptor> {
        let descriptor = self.aliases.resolve(raw);
        {
            let mut session = lock_unpoisoned(&self.cameras[0]);
            session.replace_source(&descriptor, self.target_fps)?;
        }
        *lock_unpoisoned(&self.shared.source_label) = descriptor.to_string();
        Ok(descriptor)
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = lock_unpoisoned(&self.worker).take() {
            if worker.join().is_err() {
                log::error!("pipeline worker panicked during shutdown");
            }
        }
    }
}

impl Drop for ParkingSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    cameras: Vec<Arc<Mutex<CameraSession>>>,
    shared: Arc<SharedState>,
    mut adapter: DetectionAdapter,
    cycle: Duration,
) {
    let mut pane_sizes = vec![DEFAULT_PANE; cameras.len()];

    while !shared.shutdown.load(Ordering::SeqCst) {
        let threshold = f32::from_bits(shared.threshold_bits.load(Ordering::SeqCst));
        let classes = lock_unpoisoned(&shared.classes).clone();
        let now = Instant::now();

        let mut views = Vec::with_capacity(cameras.len());
        let mut panes = Vec::with_capacity(cameras.len());

        for (idx, camera) in cameras.iter().enumerate() {
            let mut session = lock_unpoisoned(camera);
            match session.next_frame() {
                Ok(mut frame) => {
                    pane_sizes[idx] = (frame.width, frame.height);
                    let detections = adapter.infer(&frame, threshold, &classes);
                    let flags = session.apply_detections(&detections, now);
                    render::draw_overlays(&mut frame, session.slots(), &flags);
                    views.push(session.view(now));
                    panes.push((session.label().to_string(), frame));
                }
                Err(err) => {
                    // Missed cycle: carried occupancy still counts, only the
                    // pane is replaced by the placeholder.
                    log::warn!("{:#}", err);
                    views.push(session.view(now));
                    let (width, height) = pane_sizes[idx];
                    panes.push((
                        session.label().to_string(),
                        render::placeholder_frame(width, height, session.label()),
                    ));
                }
            }
        }

        let source_label = lock_unpoisoned(&shared.source_label).clone();
        let snapshot = Arc::new(stats::aggregate(&views, &source_label));
        *lock_unpoisoned(&shared.stats) = snapshot;

        let stitched = render::stitch(&panes);
        match render::encode_jpeg(&stitched) {
            Ok(jpeg) => *lock_unpoisoned(&shared.frame_jpeg) = Some(Arc::new(jpeg)),
            Err(err) => log::warn!("failed to encode rendered frame: {}", err),
        }

        std::thread::sleep(cycle);
    }
}

/// Lock a mutex, recovering the value if a panicking thread poisoned it.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraSettings, DetectionSettings, WorkerSettings};
    use crate::detect::StubBackend;
    use crate::slots::save_slots;
    use std::path::PathBuf;

    fn test_config(source: &str, slots_path: PathBuf) -> ParkwatchConfig {
        ParkwatchConfig {
            api_addr: "127.0.0.1:0".to_string(),
            cameras: vec![CameraSettings {
                label: "lot".to_string(),
                source: source.to_string(),
                slots_path,
            }],
            detection: DetectionSettings {
                threshold: 0.3,
                classes: ClassFilter::vehicles(),
                model_path: None,
            },
            aliases: SourceAliases {
                video: source.to_string(),
                webcam: "stub://cam-lot".to_string(),
            },
            worker: WorkerSettings {
                cycle: Duration::from_millis(5),
                target_fps: 10,
            },
        }
    }

    fn adapter() -> DetectionAdapter {
        DetectionAdapter::new(Box::new(StubBackend::new()))
    }

    fn wait_for<F: Fn(&StatsSnapshot) -> bool>(system: &ParkingSystem, pred: F) -> Arc<StatsSnapshot> {
        for _ in 0..400 {
            let snapshot = system.stats();
            if pred(&snapshot) {
                return snapshot;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached; last snapshot: {:?}", system.stats());
    }

    #[test]
    fn startup_fails_with_no_openable_source() {
        let cfg = test_config("stub://offline", PathBuf::from("/nonexistent.json"));
        assert!(ParkingSystem::start(&cfg, adapter()).is_err());
    }

    #[test]
    fn publishes_occupancy_for_the_synthetic_lot() {
        // The lot scene parks a marker at (48,48)-(112,112); slot 0 covers it,
        // slot 1 is elsewhere.
        let file = tempfile::NamedTempFile::new().unwrap();
        save_slots(
            file.path(),
            &[
                vec![[40, 40], [120, 40], [120, 120], [40, 120]],
                vec![[300, 300], [380, 300], [380, 380], [300, 380]],
            ],
        )
        .unwrap();

        let cfg = test_config("stub://lot", file.path().to_path_buf());
        let system = ParkingSystem::start(&cfg, adapter()).unwrap();

        let snapshot = wait_for(&system, |s| s.total == 2 && s.occupied == 1);
        assert_eq!(snapshot.slots, vec![true, false]);
        assert_eq!(snapshot.vacant, 1);
        assert_eq!(snapshot.utilization, 50.0);
        assert!(system.latest_jpeg().is_some());

        system.shutdown();
    }

    #[test]
    fn sensitivity_updates_are_validated_and_visible() {
        let cfg = test_config("stub://empty", PathBuf::from("/nonexistent.json"));
        let system = ParkingSystem::start(&cfg, adapter()).unwrap();

        system.update_sensitivity(0.75).unwrap();
        assert_eq!(system.sensitivity(), 0.75);
        assert!(system.update_sensitivity(1.5).is_err());
        assert_eq!(system.sensitivity(), 0.75);

        system.shutdown();
    }

    #[test]
    fn failed_switch_leaves_published_stats_unchanged() {
        let file = tempfile::NamedTempFile::new().unwrap();
        save_slots(file.path(), &[vec![[40, 40], [120, 40], [120, 120], [40, 120]]]).unwrap();

        let cfg = test_config("stub://lot", file.path().to_path_buf());
        let system = ParkingSystem::start(&cfg, adapter()).unwrap();
        let before = wait_for(&system, |s| s.total == 1 && s.occupied == 1);

        let err = system.switch_source("stub://offline");
        assert!(err.is_err());

        let after = wait_for(&system, |s| s.total == 1);
        assert_eq!(after.slots, before.slots);
        assert_eq!(after.occupied, before.occupied);
        assert_eq!(after.source, before.source);

        system.shutdown();
    }

    #[test]
    fn successful_switch_changes_the_published_source() {
        let file = tempfile::NamedTempFile::new().unwrap();
        save_slots(file.path(), &[vec![[40, 40], [120, 40], [120, 120], [40, 120]]]).unwrap();

        let cfg = test_config("stub://lot", file.path().to_path_buf());
        let system = ParkingSystem::start(&cfg, adapter()).unwrap();
        wait_for(&system, |s| s.occupied == 1);

        system.switch_source("stub://empty").unwrap();
        let snapshot = wait_for(&system, |s| s.occupied == 0 && s.source.contains("empty"));
        assert_eq!(snapshot.total, 1);

        system.shutdown();
    }
}
