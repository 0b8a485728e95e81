//! parkwatch
//!
//! Continuous parking-slot occupancy pipeline: pull frames from one or more
//! camera sources, classify detections against user-authored slot polygons,
//! carry per-slot occupancy durations across frames, and publish an
//! aggregated snapshot plus a rendered overlay frame for HTTP readers.
//!
//! # Architecture
//!
//! One background worker owns every mutable piece of pipeline state and runs
//! the cycle `capture → infer → occupancy update → aggregate → render →
//! publish`. Readers only ever clone the last published value; control calls
//! (source switch, sensitivity) serialize with the worker through the same
//! per-camera lock the worker holds for a cycle, so a switch is observed
//! fully-old or fully-new, never mixed.
//!
//! # Module Structure
//!
//! - `geometry`: point-in-polygon containment (pure)
//! - `slots`: slot file load/save, fallback-to-empty on bad input
//! - `frame`: owned RGB24 frames
//! - `capture`: file and webcam sources, synthetic `stub://` backends
//! - `detect`: detector backend trait, filtering adapter, backends
//! - `occupancy`: per-slot state transitions and duration labels
//! - `stats`: published snapshot and cross-camera aggregation
//! - `render`: overlay drawing, stitching, JPEG encoding
//! - `session`: one camera's capture + slots + state as a unit
//! - `system`: the coordinator (worker thread, publish, controls)
//! - `api`: HTTP stats/video/control endpoints
//! - `config`: JSON config file + env overrides

pub mod api;
pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod occupancy;
pub mod render;
pub mod session;
pub mod slots;
pub mod stats;
pub mod system;

pub use capture::{CaptureSource, FileConfig, FileSource, SourceDescriptor, WebcamConfig, WebcamSource};
pub use config::{ParkwatchConfig, SourceAliases};
pub use detect::{
    BoundingBox, ClassFilter, Detection, DetectionAdapter, DetectorBackend, StubBackend,
    VEHICLE_CLASSES,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
pub use geometry::{polygon_centroid, polygon_test, Point, PolygonSide};
pub use occupancy::{check_occupancy, duration_label, update_occupancy, SlotState};
pub use session::CameraSession;
pub use slots::{load_slots, save_slots, Slot};
pub use stats::{aggregate, CameraView, StatsSnapshot};
pub use system::ParkingSystem;
