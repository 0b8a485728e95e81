//! Synthetic scenes for `stub://` sources.
//!
//! Scenes paint solid marker blocks that the stub detector backend picks up:
//! white blocks read as cars, blue blocks as pedestrians. Everything is
//! deterministic so pipeline tests can assert exact occupancy.

use crate::frame::Frame;

pub(crate) const SCENE_WIDTH: u32 = 640;
pub(crate) const SCENE_HEIGHT: u32 = 480;

const ASPHALT: [u8; 3] = [38, 38, 42];
const CAR: [u8; 3] = [255, 255, 255];
const PEDESTRIAN: [u8; 3] = [0, 0, 255];

/// Render one frame of a named scene.
///
/// `tick` nudges a non-marker pixel so consecutive frames are not
/// byte-identical, the way a real feed never is.
pub(crate) fn paint_scene(name: &str, tick: u64) -> Frame {
    let mut frame = Frame::filled(SCENE_WIDTH, SCENE_HEIGHT, ASPHALT);
    match name {
        "empty" => {}
        "busy" => {
            frame.fill_rect(48, 48, 64, 64, CAR);
            frame.fill_rect(240, 200, 64, 64, CAR);
            frame.fill_rect(400, 100, 16, 40, PEDESTRIAN);
        }
        // "lot" and anything unrecognized: a single parked car.
        _ => {
            frame.fill_rect(48, 48, 64, 64, CAR);
        }
    }
    let x = (tick % (SCENE_WIDTH as u64 - 4)) as u32;
    frame.fill_rect(x, SCENE_HEIGHT - 4, 4, 4, [60, 60, 66]);
    frame
}

/// Scene name from a `stub://<scene>` URL (webcam stubs use `stub://cam-<scene>`).
pub(crate) fn scene_name(url: &str) -> &str {
    let name = url.strip_prefix("stub://").unwrap_or(url);
    name.strip_prefix("cam-").unwrap_or(name)
}
