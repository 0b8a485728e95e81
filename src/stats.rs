//! Published statistics.
//!
//! A `StatsSnapshot` is built once per cycle from every camera's occupancy
//! view, then swapped in wholesale. It is never mutated after construction,
//! so concurrent readers always see internally consistent numbers.

use serde::{Deserialize, Serialize};

/// One camera's contribution to a cycle: occupancy flags and duration
/// strings, index-aligned with the camera's slots.
#[derive(Clone, Debug, Default)]
pub struct CameraView {
    pub occupancy: Vec<bool>,
    pub durations: Vec<String>,
}

/// The published, immutable result of one processing cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub occupied: usize,
    pub vacant: usize,
    /// Percentage in [0, 100]; 0 when there are no slots.
    pub utilization: f64,
    /// Per-slot occupancy, concatenated across cameras in declaration order.
    pub slots: Vec<bool>,
    /// Per-slot duration strings, same order as `slots`.
    pub durations: Vec<String>,
    /// Active source label.
    pub source: String,
}

impl StatsSnapshot {
    /// The pre-first-cycle snapshot: zero slots, nothing occupied.
    pub fn empty(source: &str) -> Self {
        Self {
            total: 0,
            occupied: 0,
            vacant: 0,
            utilization: 0.0,
            slots: Vec::new(),
            durations: Vec::new(),
            source: source.to_string(),
        }
    }
}

/// Aggregate camera views by summation and concatenation, in camera order.
pub fn aggregate(views: &[CameraView], source: &str) -> StatsSnapshot {
    let mut slots = Vec::new();
    let mut durations = Vec::new();
    for view in views {
        slots.extend_from_slice(&view.occupancy);
        durations.extend_from_slice(&view.durations);
    }

    let total = slots.len();
    let occupied = slots.iter().filter(|&&s| s).count();
    let vacant = total - occupied;
    let utilization = if total == 0 {
        0.0
    } else {
        occupied as f64 / total as f64 * 100.0
    };

    StatsSnapshot {
        total,
        occupied,
        vacant,
        utilization,
        slots,
        durations,
        source: source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(occupancy: &[bool]) -> CameraView {
        CameraView {
            occupancy: occupancy.to_vec(),
            durations: occupancy.iter().map(|_| "0m".to_string()).collect(),
        }
    }

    #[test]
    fn two_cameras_sum_and_concatenate() {
        let views = [view(&[true, false]), view(&[true, true, false])];
        let snapshot = aggregate(&views, "file:lot.mp4");

        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.occupied, 3);
        assert_eq!(snapshot.vacant, 2);
        assert_eq!(snapshot.utilization, 60.0);
        assert_eq!(snapshot.slots, vec![true, false, true, true, false]);
        assert_eq!(snapshot.durations.len(), 5);
    }

    #[test]
    fn occupied_plus_vacant_equals_total() {
        let views = [view(&[true, false, false]), view(&[true])];
        let snapshot = aggregate(&views, "x");
        assert_eq!(snapshot.occupied + snapshot.vacant, snapshot.total);
    }

    #[test]
    fn zero_slots_means_zero_utilization() {
        let snapshot = aggregate(&[], "x");
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.utilization, 0.0);
    }

    #[test]
    fn serializes_with_the_wire_field_names() {
        let snapshot = aggregate(&[view(&[true])], "file:lot.mp4");
        let json = serde_json::to_value(&snapshot).unwrap();
        for key in ["total", "occupied", "vacant", "utilization", "slots", "durations", "source"] {
            assert!(json.get(key).is_some(), "missing field {}", key);
        }
        assert_eq!(json["total"], 1);
        assert_eq!(json["utilization"], 100.0);
    }
}
