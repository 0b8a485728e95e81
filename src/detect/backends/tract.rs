#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// IoU threshold for greedy non-maximum suppression.
const IOU_THRESHOLD: f32 = 0.45;

/// Raw-candidate floor; the adapter applies the real runtime threshold.
const CANDIDATE_FLOOR: f32 = 0.05;

/// Tract-based backend for YOLO-family ONNX models.
///
/// Loads a local model file and performs inference on RGB frames. The model
/// is expected to take a `[1, 3, H, W]` float input and emit the usual
/// `[1, 4 + C, N]` head: box center/size rows followed by per-class scores.
/// No network I/O, no writes beyond the initial model load.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, width, height })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode_output(&self, view: tract_ndarray::ArrayViewD<f32>) -> Result<Vec<Detection>> {
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let rows = shape[1];
        let num_classes = rows - 4;
        let num_proposals = shape[2];
        let data = view
            .as_slice()
            .ok_or_else(|| anyhow!("model output tensor is not contiguous"))?;

        // Rows are [cx, cy, w, h, cls0, cls1, ...], column-major over proposals.
        let mut candidates = Vec::new();
        for i in 0..num_proposals {
            let mut best_class = 0usize;
            let mut best_score = 0f32;
            for c in 0..num_classes {
                let score = data[(4 + c) * num_proposals + i];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if best_score < CANDIDATE_FLOOR {
                continue;
            }

            let cx = data[i];
            let cy = data[num_proposals + i];
            let w = data[2 * num_proposals + i];
            let h = data[3 * num_proposals + i];
            candidates.push(Detection {
                bbox: BoundingBox {
                    x1: (cx - w / 2.0).max(0.0),
                    y1: (cy - h / 2.0).max(0.0),
                    x2: (cx + w / 2.0).min(self.width as f32),
                    y2: (cy + h / 2.0).min(self.height as f32),
                },
                confidence: best_score,
                class_id: best_class as u32,
            });
        }

        Ok(nms(candidates, IOU_THRESHOLD))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        self.decode_output(view)
    }
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(mut boxes: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    boxes.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in boxes {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_thresh);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
