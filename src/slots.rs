//! Slot collection loading and persistence.
//!
//! The slot file is a JSON array of slots, each slot an array of `[x, y]`
//! integer pairs (four per slot as authored, at least three to be usable).
//! A missing or unparsable file is not fatal: the loader degrades to an empty
//! collection and the pipeline runs with zero slots until a valid file
//! appears at the next source switch.

use std::path::Path;

use anyhow::{Context, Result};

use crate::geometry::Point;

/// One parking slot: an ordered closed polygon in pixel coordinates.
///
/// Identified by its index within the collection (0-based internally,
/// 1-based in overlays). Immutable after load.
pub type Slot = Vec<Point>;

/// Load the slot collection for a source.
///
/// Fails softly: absent file, unreadable file, or malformed JSON all yield an
/// empty collection (logged, never propagated). Individual entries with fewer
/// than three vertices are dropped; the rest of the file still loads.
pub fn load_slots(path: &Path) -> Vec<Slot> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!(
                "slot file {} not readable ({}); running with zero slots",
                path.display(),
                err
            );
            return Vec::new();
        }
    };

    let parsed: Vec<Slot> = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::warn!(
                "slot file {} is malformed ({}); running with zero slots",
                path.display(),
                err
            );
            return Vec::new();
        }
    };

    let total = parsed.len();
    let slots: Vec<Slot> = parsed.into_iter().filter(|slot| slot.len() >= 3).collect();
    if slots.len() < total {
        log::warn!(
            "slot file {}: dropped {} degenerate slot(s) with fewer than 3 vertices",
            path.display(),
            total - slots.len()
        );
    }
    log::info!("loaded {} slot(s) from {}", slots.len(), path.display());
    slots
}

/// Persist a slot collection in the exact on-disk format the loader consumes.
pub fn save_slots(path: &Path, slots: &[Slot]) -> Result<()> {
    let json = serde_json::to_string(slots)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write slot file {}", path.display()))?;
    Ok(())
}
