//! Frame capture sources.
//!
//! Two source families, each with a synthetic `stub://` backend and a
//! feature-gated real backend:
//! - file-backed recordings (`capture-ffmpeg`), which loop on end-of-stream
//! - live webcams (`capture-v4l2`), where a failed read is transient
//!
//! `SourceDescriptor` classifies a raw descriptor string; the config layer
//! resolves the "video"/"webcam" aliases to concrete descriptors before
//! parsing.

pub mod file;
mod scene;
pub mod webcam;

use anyhow::Result;

use crate::frame::Frame;
pub use file::{FileConfig, FileSource};
pub use webcam::{WebcamConfig, WebcamSource};

/// A concrete capture input: a recording to loop or a live device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Video file path (or `stub://<scene>`).
    File(String),
    /// Device path (or `stub://cam-<scene>`).
    Webcam(String),
}

impl SourceDescriptor {
    /// Classify a raw descriptor string.
    ///
    /// A bare integer is a device index (`3` → `/dev/video3`), `/dev/*` and
    /// `stub://cam-*` are devices, everything else is a file path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return SourceDescriptor::Webcam(format!("/dev/video{}", raw));
        }
        if raw.starts_with("/dev/") || raw.starts_with("stub://cam-") {
            return SourceDescriptor::Webcam(raw.to_string());
        }
        SourceDescriptor::File(raw.to_string())
    }

    /// The raw path/device string.
    pub fn target(&self) -> &str {
        match self {
            SourceDescriptor::File(path) => path,
            SourceDescriptor::Webcam(device) => device,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SourceDescriptor::Webcam(_))
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceDescriptor::File(path) => write!(f, "file:{}", path),
            SourceDescriptor::Webcam(device) => write!(f, "webcam:{}", device),
        }
    }
}

/// One open capture handle.
pub enum CaptureSource {
    File(FileSource),
    Webcam(WebcamSource),
}

impl CaptureSource {
    /// Open a capture for `descriptor`. Failure leaves nothing allocated, so
    /// callers can attempt a replacement without touching the active source.
    pub fn open(descriptor: &SourceDescriptor, target_fps: u32) -> Result<Self> {
        match descriptor {
            SourceDescriptor::File(path) => {
                let source = FileSource::new(FileConfig {
                    path: path.clone(),
                    target_fps,
                })?;
                Ok(CaptureSource::File(source))
            }
            SourceDescriptor::Webcam(device) => {
                let source = WebcamSource::new(WebcamConfig {
                    device: device.clone(),
                    target_fps,
                    ..WebcamConfig::default()
                })?;
                Ok(CaptureSource::Webcam(source))
            }
        }
    }

    /// Capture the next frame under the source family's end-of-stream policy.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match self {
            CaptureSource::File(source) => source.next_frame(),
            CaptureSource::Webcam(source) => source.next_frame(),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, CaptureSource::Webcam(_))
    }

    pub fn descriptor(&self) -> SourceDescriptor {
        match self {
            CaptureSource::File(source) => SourceDescriptor::File(source.path().to_string()),
            CaptureSource::Webcam(source) => {
                SourceDescriptor::Webcam(source.device().to_string())
            }
        }
    }

    pub fn frames_captured(&self) -> u64 {
        match self {
            CaptureSource::File(source) => source.frames_captured(),
            CaptureSource::Webcam(source) => source.frames_captured(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_index_is_a_device() {
        assert_eq!(
            SourceDescriptor::parse("2"),
            SourceDescriptor::Webcam("/dev/video2".to_string())
        );
    }

    #[test]
    fn dev_path_is_a_device() {
        assert_eq!(
            SourceDescriptor::parse("/dev/video0"),
            SourceDescriptor::Webcam("/dev/video0".to_string())
        );
    }

    #[test]
    fn cam_stub_is_a_device() {
        assert!(SourceDescriptor::parse("stub://cam-lot").is_live());
    }

    #[test]
    fn everything_else_is_a_file() {
        assert_eq!(
            SourceDescriptor::parse("data/parking.mp4"),
            SourceDescriptor::File("data/parking.mp4".to_string())
        );
        assert!(!SourceDescriptor::parse("stub://lot").is_live());
    }

    #[test]
    fn open_routes_by_descriptor_kind() {
        let file = CaptureSource::open(&SourceDescriptor::parse("stub://lot"), 10).unwrap();
        assert!(!file.is_live());
        let cam = CaptureSource::open(&SourceDescriptor::parse("stub://cam-lot"), 10).unwrap();
        assert!(cam.is_live());
    }
}
