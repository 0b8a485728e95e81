use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassFilter, Detection};
use crate::frame::Frame;

/// Filtering wrapper around the opaque detection capability.
///
/// Applies the confidence threshold and allowed-class set to raw backend
/// output. Both arrive per call so they stay runtime-adjustable. A backend
/// error never escapes: it is logged and the frame contributes an empty
/// detection list, which the occupancy engine reads as "no vehicles seen".
pub struct DetectionAdapter {
    backend: Box<dyn DetectorBackend>,
}

impl DetectionAdapter {
    pub fn new(backend: Box<dyn DetectorBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run model load / first-inference warm-up before the loop starts.
    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.backend.warm_up()
    }

    /// Detections for one frame, filtered by threshold and class set.
    pub fn infer(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        allowed_classes: &ClassFilter,
    ) -> Vec<Detection> {
        let raw = match self.backend.detect(&frame.data, frame.width, frame.height) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("{} backend inference failed: {}", self.backend.name(), err);
                return Vec::new();
            }
        };

        raw.into_iter()
            .filter(|det| {
                det.confidence >= confidence_threshold && allowed_classes.allows(det.class_id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use anyhow::{anyhow, Result};

    struct FixedBackend(Vec<Detection>);

    impl DetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            Err(anyhow!("model exploded"))
        }
    }

    fn det(confidence: f32, class_id: u32) -> Detection {
        Detection {
            bbox: BoundingBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 },
            confidence,
            class_id,
        }
    }

    #[test]
    fn filters_below_threshold() {
        let mut adapter =
            DetectionAdapter::new(Box::new(FixedBackend(vec![det(0.2, 2), det(0.8, 2)])));
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let out = adapter.infer(&frame, 0.5, &ClassFilter::All);
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut adapter = DetectionAdapter::new(Box::new(FixedBackend(vec![det(0.5, 2)])));
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        assert_eq!(adapter.infer(&frame, 0.5, &ClassFilter::All).len(), 1);
    }

    #[test]
    fn filters_disallowed_classes() {
        let mut adapter =
            DetectionAdapter::new(Box::new(FixedBackend(vec![det(0.9, 0), det(0.9, 2)])));
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let out = adapter.infer(&frame, 0.3, &ClassFilter::vehicles());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 2);
    }

    #[test]
    fn wide_open_mode_keeps_every_class() {
        let mut adapter =
            DetectionAdapter::new(Box::new(FixedBackend(vec![det(0.9, 0), det(0.9, 2)])));
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        assert_eq!(adapter.infer(&frame, 0.3, &ClassFilter::All).len(), 2);
    }

    #[test]
    fn backend_failure_yields_empty_list() {
        let mut adapter = DetectionAdapter::new(Box::new(FailingBackend));
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        assert!(adapter.infer(&frame, 0.3, &ClassFilter::All).is_empty());
    }
}
