//! Per-camera session state.
//!
//! A session owns exactly one capture handle, the slot collection loaded for
//! it, and the per-slot occupancy states. The three move together: a source
//! replacement swaps all of them or none of them, so the worker's next cycle
//! sees either the fully-old or the fully-new session.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::capture::{CaptureSource, SourceDescriptor};
use crate::detect::Detection;
use crate::frame::Frame;
use crate::occupancy::{duration_label, update_occupancy, SlotState};
use crate::slots::{load_slots, Slot};
use crate::stats::CameraView;

/// Read attempts per cycle for a live source before the cycle is declared
/// missed. File sources handle end-of-stream internally and get one attempt.
const LIVE_READ_ATTEMPTS: u32 = 3;
const LIVE_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct CameraSession {
    label: String,
    source: CaptureSource,
    slots_path: PathBuf,
    slots: Vec<Slot>,
    states: Vec<SlotState>,
}

impl CameraSession {
    /// Open the capture for `descriptor` and load its slot collection.
    ///
    /// Capture failure is an error (the caller decides whether that is fatal);
    /// a missing slot file is not — the session runs with zero slots.
    pub fn open(label: &str, descriptor: &SourceDescriptor, slots_path: PathBuf, target_fps: u32) -> Result<Self> {
        let source = CaptureSource::open(descriptor, target_fps)
            .with_context(|| format!("camera '{}': failed to open {}", label, descriptor))?;
        let slots = load_slots(&slots_path);
        let states = vec![SlotState::default(); slots.len()];
        Ok(Self {
            label: label.to_string(),
            source,
            slots_path,
            slots,
            states,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn descriptor(&self) -> SourceDescriptor {
        self.source.descriptor()
    }

    /// Capture the next frame under the source family's policy.
    ///
    /// File sources loop internally and either produce a frame or fail hard
    /// (zero-length source). Live sources get a bounded retry with backoff;
    /// exhausting it reports a missed cycle, never a dead session.
    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.source.is_live() {
            return self.source.next_frame();
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.source.next_frame() {
                Ok(frame) => return Ok(frame),
                Err(err) if attempt < LIVE_READ_ATTEMPTS => {
                    log::debug!(
                        "camera '{}': transient read failure (attempt {}): {}",
                        self.label,
                        attempt,
                        err
                    );
                    std::thread::sleep(LIVE_RETRY_DELAY);
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "camera '{}': no frame after {} attempts",
                        self.label, LIVE_READ_ATTEMPTS
                    )))
                }
            }
        }
    }

    /// Replace the capture source, all-or-nothing.
    ///
    /// The new capture is opened independently of the active one. Only when
    /// it opens does the session swap handle, reload its slot collection, and
    /// reset occupancy states (duration history does not survive a switch).
    /// On failure the new handle is dropped and the session is untouched.
    pub fn replace_source(&mut self, descriptor: &SourceDescriptor, target_fps: u32) -> Result<()> {
        let new_source = CaptureSource::open(descriptor, target_fps)
            .with_context(|| format!("camera '{}': failed to open {}", self.label, descriptor))?;

        self.source = new_source;
        self.slots = load_slots(&self.slots_path);
        self.states = vec![SlotState::default(); self.slots.len()];
        log::info!("camera '{}': switched to {}", self.label, descriptor);
        Ok(())
    }

    /// Run the occupancy update for one frame's detections.
    pub fn apply_detections(&mut self, detections: &[Detection], now: Instant) -> Vec<bool> {
        update_occupancy(&self.slots, detections, &mut self.states, now)
    }

    /// Current occupancy view for aggregation.
    ///
    /// Also used for cycles where no frame arrived: the carried state is
    /// reported unchanged, so readers keep seeing the last known occupancy.
    pub fn view(&self, now: Instant) -> CameraView {
        CameraView {
            occupancy: self.states.iter().map(SlotState::is_occupied).collect(),
            durations: self
                .states
                .iter()
                .map(|state| duration_label(state, now))
                .collect(),
        }
    }
}
