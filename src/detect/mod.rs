mod adapter;
mod backend;
mod backends;
mod result;

pub use adapter::DetectionAdapter;
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, ClassFilter, Detection, VEHICLE_CLASSES};
