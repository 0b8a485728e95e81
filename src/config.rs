use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::SourceDescriptor;
use crate::detect::ClassFilter;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SOURCE: &str = "stub://lot";
const DEFAULT_WEBCAM: &str = "/dev/video0";
const DEFAULT_SLOTS_PATH: &str = "data/slots.json";
const DEFAULT_CAMERA_LABEL: &str = "lot";
const DEFAULT_THRESHOLD: f32 = 0.3;
const DEFAULT_CYCLE_MS: u64 = 10;
const DEFAULT_TARGET_FPS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct ParkwatchConfigFile {
    api: Option<ApiConfigFile>,
    cameras: Option<Vec<CameraConfigFile>>,
    detection: Option<DetectionConfigFile>,
    sources: Option<SourceAliasFile>,
    worker: Option<WorkerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    label: Option<String>,
    source: Option<String>,
    slots: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    threshold: Option<f32>,
    classes: Option<Vec<u32>>,
    all_classes: Option<bool>,
    model: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceAliasFile {
    video: Option<String>,
    webcam: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkerConfigFile {
    cycle_ms: Option<u64>,
    target_fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ParkwatchConfig {
    pub api_addr: String,
    pub cameras: Vec<CameraSettings>,
    pub detection: DetectionSettings,
    pub aliases: SourceAliases,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub label: String,
    pub source: String,
    pub slots_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub threshold: f32,
    pub classes: ClassFilter,
    pub model_path: Option<PathBuf>,
}

/// What the "video" / "webcam" switch-control shorthands resolve to.
#[derive(Debug, Clone)]
pub struct SourceAliases {
    pub video: String,
    pub webcam: String,
}

impl SourceAliases {
    pub fn resolve(&self, raw: &str) -> SourceDescriptor {
        match raw.trim() {
            "video" => SourceDescriptor::parse(&self.video),
            "webcam" => SourceDescriptor::parse(&self.webcam),
            other => SourceDescriptor::parse(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub cycle: Duration,
    pub target_fps: u32,
}

impl ParkwatchConfig {
    /// Load configuration: optional JSON file named by `PARKWATCH_CONFIG`,
    /// then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PARKWATCH_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Same as [`load`], with an explicit config path taking precedence over
    /// the `PARKWATCH_CONFIG` env var (used by the daemon's `--config` flag).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ParkwatchConfigFile) -> Result<Self> {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let cameras: Vec<CameraSettings> = file
            .cameras
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, cam)| CameraSettings {
                label: cam.label.unwrap_or_else(|| format!("cam{}", i)),
                source: cam.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                slots_path: cam
                    .slots
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SLOTS_PATH)),
            })
            .collect();

        let detection_file = file.detection.unwrap_or_default();
        let classes = if detection_file.all_classes.unwrap_or(false) {
            ClassFilter::All
        } else {
            match detection_file.classes {
                Some(ids) => ClassFilter::from_ids(ids),
                None => ClassFilter::vehicles(),
            }
        };
        let detection = DetectionSettings {
            threshold: detection_file.threshold.unwrap_or(DEFAULT_THRESHOLD),
            classes,
            model_path: detection_file.model,
        };

        let alias_file = file.sources.unwrap_or_default();
        let aliases = SourceAliases {
            video: alias_file.video.unwrap_or_else(|| {
                cameras
                    .first()
                    .map(|cam| cam.source.clone())
                    .unwrap_or_else(|| DEFAULT_SOURCE.to_string())
            }),
            webcam: alias_file
                .webcam
                .unwrap_or_else(|| DEFAULT_WEBCAM.to_string()),
        };

        let worker_file = file.worker.unwrap_or_default();
        let worker = WorkerSettings {
            cycle: Duration::from_millis(worker_file.cycle_ms.unwrap_or(DEFAULT_CYCLE_MS)),
            target_fps: worker_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        Ok(Self {
            api_addr,
            cameras,
            detection,
            aliases,
            worker,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("PARKWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(source) = std::env::var("PARKWATCH_SOURCE") {
            if !source.trim().is_empty() {
                match self.cameras.first_mut() {
                    Some(cam) => cam.source = source,
                    None => self.cameras.push(CameraSettings {
                        label: DEFAULT_CAMERA_LABEL.to_string(),
                        source,
                        slots_path: PathBuf::from(DEFAULT_SLOTS_PATH),
                    }),
                }
            }
        }
        if let Ok(slots) = std::env::var("PARKWATCH_SLOTS") {
            if !slots.trim().is_empty() {
                if let Some(cam) = self.cameras.first_mut() {
                    cam.slots_path = PathBuf::from(slots);
                }
            }
        }
        if let Ok(threshold) = std::env::var("PARKWATCH_THRESHOLD") {
            let value: f32 = threshold
                .parse()
                .map_err(|_| anyhow!("PARKWATCH_THRESHOLD must be a number in [0, 1]"))?;
            self.detection.threshold = value;
        }
        if let Ok(classes) = std::env::var("PARKWATCH_CLASSES") {
            let classes = classes.trim();
            if classes.eq_ignore_ascii_case("all") {
                self.detection.classes = ClassFilter::All;
            } else if !classes.is_empty() {
                let ids = split_csv(classes)
                    .iter()
                    .map(|entry| {
                        entry
                            .parse::<u32>()
                            .map_err(|_| anyhow!("PARKWATCH_CLASSES must be 'all' or class ids"))
                    })
                    .collect::<Result<Vec<u32>>>()?;
                self.detection.classes = ClassFilter::from_ids(ids);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.cameras.is_empty() {
            self.cameras.push(CameraSettings {
                label: DEFAULT_CAMERA_LABEL.to_string(),
                source: DEFAULT_SOURCE.to_string(),
                slots_path: PathBuf::from(DEFAULT_SLOTS_PATH),
            });
        }
        if !(0.0..=1.0).contains(&self.detection.threshold) {
            return Err(anyhow!(
                "detection threshold {} is outside [0, 1]",
                self.detection.threshold
            ));
        }
        if let ClassFilter::Only(ids) = &self.detection.classes {
            if ids.is_empty() {
                return Err(anyhow!(
                    "detection class set is empty; use all_classes for the wide-open mode"
                ));
            }
        }
        if self.worker.cycle.is_zero() {
            return Err(anyhow!("worker cycle_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ParkwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
