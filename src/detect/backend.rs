use anyhow::Result;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// Backends wrap an opaque detection capability: RGB24 pixels in, candidate
/// boxes out. Implementations must treat the pixel slice as read-only and
/// ephemeral, and must not block on anything other than inference itself —
/// the pipeline worker calls `detect` once per camera per cycle.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    ///
    /// Returns every raw candidate; confidence and class filtering are the
    /// adapter's job, so thresholds stay runtime-adjustable.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook (model load, first-inference compilation).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
