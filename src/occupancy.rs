//! Per-slot occupancy state.
//!
//! Occupancy is recomputed from scratch every frame: a slot is occupied when
//! any detection's center lies inside or on the boundary of its polygon.
//! The only state carried across frames is the occupied-since instant, which
//! is what makes displayed durations monotonic during a contiguous run.
//!
//! There is deliberately no debounce: a single frame with no matching
//! detection clears the slot, and the next occupied run restarts at "0m".

use std::time::Instant;

use crate::detect::Detection;
use crate::geometry::polygon_test;
use crate::slots::Slot;

/// Carried state for one slot of one camera.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotState {
    /// When the current occupancy run began; `Some` iff the slot is occupied.
    pub occupied_since: Option<Instant>,
}

impl SlotState {
    pub fn is_occupied(&self) -> bool {
        self.occupied_since.is_some()
    }
}

/// Pure occupancy decision: one boolean per slot, in slot order.
///
/// The first matching detection short-circuits; there is no best-match or
/// overlap weighting. A detection center on a boundary shared by two slots
/// marks both — each slot is tested independently.
pub fn check_occupancy(slots: &[Slot], detections: &[Detection]) -> Vec<bool> {
    slots
        .iter()
        .map(|slot| {
            detections
                .iter()
                .any(|det| polygon_test(slot, det.bbox.center()).is_inside_or_boundary())
        })
        .collect()
}

/// Apply one frame's detections to the carried state.
///
/// Transitions, per slot:
/// - vacant → occupied: `occupied_since = now`
/// - occupied → occupied: `occupied_since` unchanged
/// - occupied → vacant: `occupied_since` cleared immediately
///
/// Returns the frame's occupancy flags. `states` must be index-aligned with
/// `slots`.
pub fn update_occupancy(
    slots: &[Slot],
    detections: &[Detection],
    states: &mut [SlotState],
    now: Instant,
) -> Vec<bool> {
    debug_assert_eq!(slots.len(), states.len());

    let occupancy = check_occupancy(slots, detections);
    for (state, &occupied) in states.iter_mut().zip(&occupancy) {
        if occupied {
            if state.occupied_since.is_none() {
                state.occupied_since = Some(now);
            }
        } else {
            state.occupied_since = None;
        }
    }
    occupancy
}

/// Display string for a slot's current occupancy duration.
///
/// Whole minutes only: sub-minute occupancy reads "0m", as does a vacant
/// slot.
pub fn duration_label(state: &SlotState, now: Instant) -> String {
    match state.occupied_since {
        Some(since) => format!("{}m", now.duration_since(since).as_secs() / 60),
        None => "0m".to_string(),
    }
}
