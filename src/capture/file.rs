//! File-backed frame source.
//!
//! File sources loop forever: end-of-stream rewinds to the first frame and
//! reading continues, so a recorded lot behaves like an endless feed. The
//! rewind is a bounded loop — a source that still yields nothing after a
//! rewind reports an error instead of spinning.
//!
//! Real decoding is behind the `capture-ffmpeg` feature; `stub://` paths get
//! a synthetic scene for tests and demo runs.

use anyhow::{anyhow, Result};

use super::scene::{paint_scene, scene_name};
use crate::frame::Frame;

/// Configuration for a file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or `stub://<scene>` for a synthetic source.
    pub path: String,
    /// Target frame rate; real backends may decimate to this.
    pub target_fps: u32,
}

/// Looping file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "capture-ffmpeg")]
    Ffmpeg(ffmpeg::FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if config.path.starts_with("stub://") {
            if scene_name(&config.path) == "offline" {
                return Err(anyhow!("synthetic source {} is offline", config.path));
            }
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            });
        }

        #[cfg(feature = "capture-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(ffmpeg::FfmpegFileSource::new(config)?),
            })
        }
        #[cfg(not(feature = "capture-ffmpeg"))]
        {
            Err(anyhow!(
                "opening {} requires the capture-ffmpeg feature",
                config.path
            ))
        }
    }

    /// Capture the next frame, rewinding once on end-of-stream.
    pub fn next_frame(&mut self) -> Result<Frame> {
        for _ in 0..2 {
            match self.read_frame()? {
                Some(frame) => return Ok(frame),
                None => {
                    log::debug!("{}: end of stream, rewinding", self.path());
                    self.rewind()?;
                }
            }
        }
        Err(anyhow!("video source {} has no decodable frames", self.path()))
    }

    pub fn path(&self) -> &str {
        match &self.backend {
            FileBackend::Synthetic(source) => &source.config.path,
            #[cfg(feature = "capture-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.path(),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frames_captured,
            #[cfg(feature = "capture-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => Ok(source.read_frame()),
            #[cfg(feature = "capture-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.read_frame(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => {
                source.rewind();
                Ok(())
            }
            #[cfg(feature = "capture-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.rewind(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// Frames per synthetic loop, so the rewind path is exercised in tests.
const SYNTHETIC_LOOP_FRAMES: u64 = 90;

struct SyntheticFileSource {
    config: FileConfig,
    position: u64,
    frames_captured: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        log::info!("FileSource: opened {} (synthetic)", config.path);
        Self {
            config,
            position: 0,
            frames_captured: 0,
        }
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.position >= SYNTHETIC_LOOP_FRAMES {
            return None;
        }
        self.position += 1;
        self.frames_captured += 1;
        Some(paint_scene(scene_name(&self.config.path), self.frames_captured))
    }

    fn rewind(&mut self) {
        self.position = 0;
    }
}

// ----------------------------------------------------------------------------
// FFmpeg backend (feature: capture-ffmpeg)
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-ffmpeg")]
mod ffmpeg {
    use anyhow::{Context, Result};
    use ffmpeg_next as ffmpeg;

    use super::FileConfig;
    use crate::frame::Frame;

    pub(super) struct FfmpegFileSource {
        config: FileConfig,
        input: ffmpeg::format::context::Input,
        stream_index: usize,
        decoder: ffmpeg::codec::decoder::Video,
        scaler: ffmpeg::software::scaling::Context,
        frame_count: u64,
    }

    impl FfmpegFileSource {
        pub(super) fn new(config: FileConfig) -> Result<Self> {
            ffmpeg::init().context("initialize ffmpeg")?;
            let input = ffmpeg::format::input(&config.path)
                .with_context(|| format!("failed to open video file '{}'", config.path))?;
            let input_stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
            let stream_index = input_stream.index();
            let context =
                ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
                    .context("load video decoder parameters")?;
            let decoder = context
                .decoder()
                .video()
                .context("open ffmpeg video decoder")?;

            let scaler = ffmpeg::software::scaling::context::Context::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                ffmpeg::util::format::pixel::Pixel::RGB24,
                decoder.width(),
                decoder.height(),
                ffmpeg::software::scaling::flag::Flags::BILINEAR,
            )
            .context("create ffmpeg scaler")?;

            log::info!("FileSource: opened {} (ffmpeg)", config.path);
            Ok(Self {
                config,
                input,
                stream_index,
                decoder,
                scaler,
                frame_count: 0,
            })
        }

        pub(super) fn path(&self) -> &str {
            &self.config.path
        }

        pub(super) fn frames_captured(&self) -> u64 {
            self.frame_count
        }

        /// Decode the next frame; `None` means the container is exhausted.
        pub(super) fn read_frame(&mut self) -> Result<Option<Frame>> {
            let mut decoded = ffmpeg::frame::Video::empty();
            let mut rgb_frame = ffmpeg::frame::Video::empty();

            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }

                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;

                while self.decoder.receive_frame(&mut decoded).is_ok() {
                    self.scaler
                        .run(&decoded, &mut rgb_frame)
                        .context("scale frame to RGB")?;
                    let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                    self.frame_count += 1;
                    return Ok(Some(Frame::from_rgb(pixels, width, height)?));
                }
            }

            Ok(None)
        }

        /// Seek back to the start of the container for the looping policy.
        pub(super) fn rewind(&mut self) -> Result<()> {
            self.input.seek(0, ..).context("seek to start of file")?;
            self.decoder.flush();
            Ok(())
        }
    }

    fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
        let width = frame.width();
        let height = frame.height();
        let row_bytes = (width as usize) * 3;
        let stride = frame.stride(0);
        let data = frame.data(0);

        if stride == row_bytes {
            return Ok((data.to_vec(), width, height));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            pixels.extend_from_slice(
                data.get(start..end)
                    .context("ffmpeg frame row is out of bounds")?,
            );
        }

        Ok((pixels, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(path: &str) -> FileConfig {
        FileConfig {
            path: path.to_string(),
            target_fps: 10,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() {
        let mut source = FileSource::new(stub_config("stub://lot")).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
    }

    #[test]
    fn end_of_stream_rewinds_instead_of_exhausting() {
        let mut source = FileSource::new(stub_config("stub://lot")).unwrap();
        for _ in 0..(SYNTHETIC_LOOP_FRAMES * 2 + 5) {
            source.next_frame().unwrap();
        }
        assert!(source.frames_captured() > SYNTHETIC_LOOP_FRAMES * 2);
    }

    #[test]
    fn offline_scene_fails_to_open() {
        assert!(FileSource::new(stub_config("stub://offline")).is_err());
    }

    #[cfg(not(feature = "capture-ffmpeg"))]
    #[test]
    fn real_paths_require_the_ffmpeg_feature() {
        assert!(FileSource::new(stub_config("data/parking.mp4")).is_err());
    }
}
