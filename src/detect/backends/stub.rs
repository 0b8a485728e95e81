use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// Marker colors the synthetic capture scenes paint, with the class each one
/// stands in for. Solid white blocks read as cars; solid blue blocks read as
/// pedestrians, so class filtering is exercisable end to end.
const MARKERS: [([u8; 3], u32, f32); 2] = [
    ([255, 255, 255], 2, 0.9),
    ([0, 0, 255], 0, 0.85),
];

/// Minimum horizontal run of marker pixels to count as part of a block.
const MIN_RUN: u32 = 4;

/// Stub backend for tests and synthetic sources.
///
/// Scans the frame for solid marker-colored blocks and reports one detection
/// per block. Deterministic: identical pixels produce identical detections.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let mut detections = Vec::new();
        for (color, class_id, confidence) in MARKERS {
            for bbox in find_blocks(pixels, width, height, color) {
                detections.push(Detection {
                    bbox,
                    confidence,
                    class_id,
                });
            }
        }
        Ok(detections)
    }
}

struct Block {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

/// Merge horizontal runs of `color` pixels into axis-aligned blocks.
///
/// The synthetic scenes only paint solid non-overlapping rectangles, so a
/// run belongs to a block when their x-ranges overlap and the block touched
/// the previous row.
fn find_blocks(pixels: &[u8], width: u32, height: u32, color: [u8; 3]) -> Vec<BoundingBox> {
    let mut blocks: Vec<Block> = Vec::new();

    for y in 0..height {
        let mut x = 0;
        while x < width {
            if pixel_at(pixels, width, x, y) != Some(color) {
                x += 1;
                continue;
            }
            let run_start = x;
            while x < width && pixel_at(pixels, width, x, y) == Some(color) {
                x += 1;
            }
            let run_end = x - 1;
            if run_end - run_start + 1 < MIN_RUN {
                continue;
            }

            let merged = blocks.iter_mut().find(|b| {
                b.y2 + 1 >= y && run_start <= b.x2 && run_end >= b.x1
            });
            match merged {
                Some(block) => {
                    block.x1 = block.x1.min(run_start);
                    block.x2 = block.x2.max(run_end);
                    block.y2 = y;
                }
                None => blocks.push(Block {
                    x1: run_start,
                    y1: y,
                    x2: run_end,
                    y2: y,
                }),
            }
        }
    }

    blocks
        .into_iter()
        .map(|b| BoundingBox {
            x1: b.x1 as f32,
            y1: b.y1 as f32,
            x2: (b.x2 + 1) as f32,
            y2: (b.y2 + 1) as f32,
        })
        .collect()
}

fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> Option<[u8; 3]> {
    let idx = ((y * width + x) * 3) as usize;
    pixels
        .get(idx..idx + 3)
        .map(|p| [p[0], p[1], p[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn finds_a_planted_block() {
        let mut frame = Frame::filled(64, 64, [40, 40, 40]);
        frame.fill_rect(10, 20, 16, 8, [255, 255, 255]);

        let mut backend = StubBackend::new();
        let detections = backend.detect(&frame.data, 64, 64).unwrap();

        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_eq!(det.class_id, 2);
        let (cx, cy) = det.bbox.center();
        assert!((cx - 18.0).abs() < 1.0, "cx = {}", cx);
        assert!((cy - 24.0).abs() < 1.0, "cy = {}", cy);
    }

    #[test]
    fn separates_disjoint_blocks() {
        let mut frame = Frame::filled(64, 64, [40, 40, 40]);
        frame.fill_rect(4, 4, 8, 8, [255, 255, 255]);
        frame.fill_rect(40, 40, 8, 8, [255, 255, 255]);

        let mut backend = StubBackend::new();
        let detections = backend.detect(&frame.data, 64, 64).unwrap();
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn marker_color_selects_class() {
        let mut frame = Frame::filled(64, 64, [40, 40, 40]);
        frame.fill_rect(4, 4, 8, 8, [0, 0, 255]);

        let mut backend = StubBackend::new();
        let detections = backend.detect(&frame.data, 64, 64).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 0);
    }

    #[test]
    fn empty_scene_detects_nothing() {
        let frame = Frame::filled(64, 64, [40, 40, 40]);
        let mut backend = StubBackend::new();
        assert!(backend.detect(&frame.data, 64, 64).unwrap().is_empty());
    }
}
