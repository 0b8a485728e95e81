//! Live webcam frame source.
//!
//! A failed read from a live device is transient: the session retries with a
//! short backoff instead of rewinding (there is nothing to rewind) and never
//! tears the session down for a missed frame.
//!
//! Real capture is behind the `capture-v4l2` feature; `stub://cam-*` devices
//! get a synthetic scene for tests.

use anyhow::{anyhow, Result};

use super::scene::{paint_scene, scene_name};
use crate::frame::Frame;

/// Configuration for a webcam source.
#[derive(Clone, Debug)]
pub struct WebcamConfig {
    /// Device path (e.g. "/dev/video0"), or `stub://cam-<scene>`.
    pub device: String,
    /// Target frame rate; the device may decimate to this.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Live webcam frame source.
pub struct WebcamSource {
    backend: WebcamBackend,
}

enum WebcamBackend {
    Synthetic(SyntheticWebcamSource),
    #[cfg(feature = "capture-v4l2")]
    Device(v4l2::DeviceWebcamSource),
}

impl WebcamSource {
    pub fn new(config: WebcamConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            if scene_name(&config.device) == "offline" {
                return Err(anyhow!("synthetic device {} is offline", config.device));
            }
            return Ok(Self {
                backend: WebcamBackend::Synthetic(SyntheticWebcamSource::new(config)),
            });
        }

        #[cfg(feature = "capture-v4l2")]
        {
            Ok(Self {
                backend: WebcamBackend::Device(v4l2::DeviceWebcamSource::open(config)?),
            })
        }
        #[cfg(not(feature = "capture-v4l2"))]
        {
            Err(anyhow!(
                "opening {} requires the capture-v4l2 feature",
                config.device
            ))
        }
    }

    /// Capture the next frame. Errors are transient; the caller retries.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            WebcamBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "capture-v4l2")]
            WebcamBackend::Device(source) => source.next_frame(),
        }
    }

    pub fn device(&self) -> &str {
        match &self.backend {
            WebcamBackend::Synthetic(source) => &source.config.device,
            #[cfg(feature = "capture-v4l2")]
            WebcamBackend::Device(source) => source.device(),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            WebcamBackend::Synthetic(source) => source.frames_captured,
            #[cfg(feature = "capture-v4l2")]
            WebcamBackend::Device(source) => source.frames_captured(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://cam-*) for tests
// ----------------------------------------------------------------------------

struct SyntheticWebcamSource {
    config: WebcamConfig,
    frames_captured: u64,
    reads: u64,
}

impl SyntheticWebcamSource {
    fn new(config: WebcamConfig) -> Self {
        log::info!("WebcamSource: opened {} (synthetic)", config.device);
        Self {
            config,
            frames_captured: 0,
            reads: 0,
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.reads += 1;
        // The "flaky" scene drops every seventh read so the transient-retry
        // path stays covered.
        if scene_name(&self.config.device) == "flaky" && self.reads % 7 == 0 {
            return Err(anyhow!("synthetic device dropped a frame"));
        }
        self.frames_captured += 1;
        Ok(paint_scene(
            scene_name(&self.config.device),
            self.frames_captured,
        ))
    }
}

// ----------------------------------------------------------------------------
// V4L2 backend (feature: capture-v4l2)
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-v4l2")]
mod v4l2 {
    use anyhow::{Context, Result};
    use ouroboros::self_referencing;

    use super::WebcamConfig;
    use crate::frame::Frame;

    pub(super) struct DeviceWebcamSource {
        config: WebcamConfig,
        state: DeviceState,
        frame_count: u64,
        active_width: u32,
        active_height: u32,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceWebcamSource {
        pub(super) fn open(config: WebcamConfig) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&config.device)
                .with_context(|| format!("open webcam device {}", config.device))?;
            let mut format = device.format().context("read webcam format")?;
            format.width = config.width;
            format.height = config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "WebcamSource: failed to set format on {}: {}",
                        config.device,
                        err
                    );
                    device
                        .format()
                        .context("read webcam format after set failure")?
                }
            };

            if config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "WebcamSource: failed to set fps on {}: {}",
                        config.device,
                        err
                    );
                }
            }

            let active_width = format.width;
            let active_height = format.height;

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| {
                            anyhow::Error::new(err).context("create webcam buffer stream")
                        })
                },
            }
            .try_build()?;

            log::info!(
                "WebcamSource: opened {} ({}x{})",
                config.device,
                active_width,
                active_height
            );
            Ok(Self {
                config,
                state,
                frame_count: 0,
                active_width,
                active_height,
            })
        }

        pub(super) fn device(&self) -> &str {
            &self.config.device
        }

        pub(super) fn frames_captured(&self) -> u64 {
            self.frame_count
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let (buf, _meta) = self
                .state
                .with_mut(|fields| fields.stream.next())
                .context("capture webcam frame")?;
            let pixels = buf.to_vec();
            self.frame_count += 1;
            Frame::from_rgb(pixels, self.active_width, self.active_height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> WebcamConfig {
        WebcamConfig {
            device: device.to_string(),
            ..WebcamConfig::default()
        }
    }

    #[test]
    fn synthetic_device_produces_frames() {
        let mut source = WebcamSource::new(stub_config("stub://cam-lot")).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
    }

    #[test]
    fn flaky_device_recovers_after_a_dropped_read() {
        let mut source = WebcamSource::new(stub_config("stub://cam-flaky")).unwrap();
        let mut failures = 0;
        for _ in 0..14 {
            if source.next_frame().is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
        assert!(source.next_frame().is_ok());
    }

    #[test]
    fn offline_device_fails_to_open() {
        assert!(WebcamSource::new(stub_config("stub://cam-offline")).is_err());
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn real_devices_require_the_v4l2_feature() {
        assert!(WebcamSource::new(stub_config("/dev/video0")).is_err());
    }
}
