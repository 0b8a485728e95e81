//! Frame visualization.
//!
//! Draws the slot overlay the dashboard shows: translucent polygon fill
//! (red-ish when occupied, green when vacant), polygon outlines, 1-based
//! slot numbers, camera title labels, and the side-by-side stitch for
//! multi-camera deployments. Text uses a small built-in 5x7 glyph set —
//! enough for labels and counters without shipping a font file.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::frame::Frame;
use crate::geometry::{polygon_centroid, polygon_test};
use crate::slots::Slot;

const OCCUPIED_COLOR: [u8; 3] = [255, 75, 75];
const VACANT_COLOR: [u8; 3] = [0, 255, 127];
const LABEL_COLOR: [u8; 3] = [255, 255, 255];
const PLACEHOLDER_BG: [u8; 3] = [24, 24, 28];

const OCCUPIED_ALPHA: f32 = 0.30;
const VACANT_ALPHA: f32 = 0.15;

/// JPEG quality for the published stream.
const JPEG_QUALITY: u8 = 80;

/// Draw slot overlays in place: fill, outline, and slot number per slot.
pub fn draw_overlays(frame: &mut Frame, slots: &[Slot], occupancy: &[bool]) {
    for (i, slot) in slots.iter().enumerate() {
        let occupied = occupancy.get(i).copied().unwrap_or(false);
        let (color, alpha) = if occupied {
            (OCCUPIED_COLOR, OCCUPIED_ALPHA)
        } else {
            (VACANT_COLOR, VACANT_ALPHA)
        };
        blend_polygon(frame, slot, color, alpha);
    }

    outline_slots(frame, slots, occupancy);

    for (i, slot) in slots.iter().enumerate() {
        if let Some((cx, cy)) = polygon_centroid(slot) {
            let text = (i + 1).to_string();
            let x = (cx as i64 - text_width(&text, 2) as i64 / 2).max(0) as u32;
            let y = (cy as i64 - 7).max(0) as u32;
            draw_label(frame, x, y, &text, 2, LABEL_COLOR);
        }
    }
}

/// Placeholder pane for a camera whose frame was unavailable this cycle.
pub fn placeholder_frame(width: u32, height: u32, label: &str) -> Frame {
    let mut frame = Frame::filled(width, height, PLACEHOLDER_BG);
    let text = "CAMERA LOST";
    let x = width.saturating_sub(text_width(text, 2)) / 2;
    let y = height.saturating_sub(7 * 2) / 2;
    draw_label(&mut frame, x, y, text, 2, OCCUPIED_COLOR);
    let lx = width.saturating_sub(text_width(label, 2)) / 2;
    draw_label(&mut frame, lx, y + 20, label, 2, LABEL_COLOR);
    frame
}

/// Stitch camera panes side by side.
///
/// Every pane is scaled to the minimum height among them (aspect preserved),
/// concatenated left to right in camera order, and its title is overlaid at
/// the top-left of its pane.
pub fn stitch(panes: &[(String, Frame)]) -> Frame {
    let Some(min_height) = panes.iter().map(|(_, f)| f.height).min() else {
        return placeholder_frame(320, 240, "NO CAMERAS");
    };

    let scaled: Vec<(&str, Frame)> = panes
        .iter()
        .map(|(label, frame)| (label.as_str(), scale_to_height(frame, min_height)))
        .collect();

    let total_width: u32 = scaled.iter().map(|(_, f)| f.width).sum();
    let mut out = Frame::filled(total_width, min_height, [0, 0, 0]);

    let mut x_offset = 0u32;
    for (label, pane) in scaled {
        for y in 0..pane.height {
            let src = ((y * pane.width) * 3) as usize;
            let dst = ((y * out.width + x_offset) * 3) as usize;
            out.data[dst..dst + (pane.width * 3) as usize]
                .copy_from_slice(&pane.data[src..src + (pane.width * 3) as usize]);
        }
        draw_label(&mut out, x_offset + 8, 8, &label.to_ascii_uppercase(), 2, LABEL_COLOR);
        x_offset += pane.width;
    }

    out
}

/// Encode a frame as JPEG for the published stream.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .context("encode frame as jpeg")?;
    Ok(buf)
}

fn scale_to_height(frame: &Frame, height: u32) -> Frame {
    if frame.height == height {
        return frame.clone();
    }
    let width = ((frame.width as u64 * height as u64) / frame.height as u64).max(1) as u32;
    let img: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone())
            .expect("valid frame dimensions");
    let resized = image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
    Frame {
        data: resized.into_raw(),
        width,
        height,
    }
}

/// Alpha-blend a polygon fill into the frame, clipped to the polygon's
/// bounding box.
fn blend_polygon(frame: &mut Frame, polygon: &Slot, color: [u8; 3], alpha: f32) {
    if polygon.len() < 3 {
        return;
    }
    let min_x = polygon.iter().map(|p| p[0]).min().unwrap_or(0).max(0) as u32;
    let min_y = polygon.iter().map(|p| p[1]).min().unwrap_or(0).max(0) as u32;
    let max_x = polygon.iter().map(|p| p[0]).max().unwrap_or(0).max(0) as u32;
    let max_y = polygon.iter().map(|p| p[1]).max().unwrap_or(0).max(0) as u32;

    for y in min_y..=max_y.min(frame.height.saturating_sub(1)) {
        for x in min_x..=max_x.min(frame.width.saturating_sub(1)) {
            if polygon_test(polygon, (x as f32, y as f32)).is_inside_or_boundary() {
                let old = frame.pixel(x, y);
                let blended = [
                    blend_channel(old[0], color[0], alpha),
                    blend_channel(old[1], color[1], alpha),
                    blend_channel(old[2], color[2], alpha),
                ];
                frame.set_pixel(x, y, blended);
            }
        }
    }
}

fn blend_channel(old: u8, new: u8, alpha: f32) -> u8 {
    (old as f32 * (1.0 - alpha) + new as f32 * alpha).round() as u8
}

fn outline_slots(frame: &mut Frame, slots: &[Slot], occupancy: &[bool]) {
    let mut img: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, std::mem::take(&mut frame.data))
            .expect("valid frame dimensions");

    for (i, slot) in slots.iter().enumerate() {
        let occupied = occupancy.get(i).copied().unwrap_or(false);
        let color = if occupied { OCCUPIED_COLOR } else { VACANT_COLOR };
        for k in 0..slot.len() {
            let a = slot[k];
            let b = slot[(k + 1) % slot.len()];
            draw_line_segment_mut(
                &mut img,
                (a[0] as f32, a[1] as f32),
                (b[0] as f32, b[1] as f32),
                Rgb(color),
            );
        }
    }

    frame.data = img.into_raw();
}

// ----------------------------------------------------------------------------
// Built-in 5x7 glyphs
// ----------------------------------------------------------------------------

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Pixel width of `text` at `scale`, including inter-glyph gaps.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    n * (GLYPH_WIDTH + 1) * scale - scale
}

/// Blit `text` at (`x`, `y`) using the built-in glyph set.
///
/// Characters without a glyph advance the cursor but draw nothing.
pub fn draw_label(frame: &mut Frame, x: u32, y: u32, text: &str, scale: u32, color: [u8; 3]) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch.to_ascii_uppercase()) {
            for (gy, row) in rows.iter().enumerate() {
                for gx in 0..GLYPH_WIDTH {
                    if row & (0x10 >> gx) != 0 {
                        frame.fill_rect(
                            cursor + gx * scale,
                            y + gy as u32 * scale,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
        }
        cursor += (GLYPH_WIDTH + 1) * scale;
    }
}

#[rustfmt::skip]
fn glyph(ch: char) -> Option<[u8; 7]> {
    Some(match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x04, 0x00, 0x00, 0x00, 0x04, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    })
}
