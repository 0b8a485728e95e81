//! slotctl - slot file tooling
//!
//! Validates and inspects slot files, and appends slots from the command
//! line in the exact format the pipeline consumes: a JSON array of slots,
//! each slot four `[x, y]` integer pairs. The interactive point-and-click
//! selector stays an external tool; this covers the scripted cases.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use parkwatch::geometry::{polygon_centroid, Point};
use parkwatch::slots::{save_slots, Slot};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a slot file parses and every slot is a quadrilateral.
    Validate {
        /// Slot file path.
        path: PathBuf,
    },
    /// Print each slot's vertices and centroid.
    Show {
        /// Slot file path.
        path: PathBuf,
    },
    /// Append one slot given as four "x,y" points; creates the file if absent.
    AddSlot {
        /// Slot file path.
        path: PathBuf,
        /// Exactly four corner points, e.g. 10,20 110,20 110,80 10,80
        #[arg(num_args = 4)]
        points: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Validate { path } => {
            let slots = read_strict(&path)?;
            println!("{}: {} slot(s), all valid", path.display(), slots.len());
            Ok(())
        }
        Command::Show { path } => {
            let slots = read_strict(&path)?;
            for (i, slot) in slots.iter().enumerate() {
                let centroid = polygon_centroid(slot)
                    .map(|(x, y)| format!("({:.1}, {:.1})", x, y))
                    .unwrap_or_else(|| "-".to_string());
                println!("slot {}: {:?} centroid {}", i + 1, slot, centroid);
            }
            Ok(())
        }
        Command::AddSlot { path, points } => {
            let slot = parse_points(&points)?;
            let mut slots = if path.exists() {
                read_strict(&path)?
            } else {
                Vec::new()
            };
            slots.push(slot);
            save_slots(&path, &slots)?;
            println!("{}: now {} slot(s)", path.display(), slots.len());
            Ok(())
        }
    }
}

/// Strict read: unlike the pipeline's fallback-to-empty loader, the tooling
/// surfaces every problem.
fn read_strict(path: &PathBuf) -> Result<Vec<Slot>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let slots: Vec<Slot> =
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))?;
    for (i, slot) in slots.iter().enumerate() {
        if slot.len() != 4 {
            return Err(anyhow!(
                "slot {} has {} points; the format requires exactly 4",
                i + 1,
                slot.len()
            ));
        }
    }
    Ok(slots)
}

fn parse_points(points: &[String]) -> Result<Slot> {
    if points.len() != 4 {
        return Err(anyhow!("a slot needs exactly 4 points, got {}", points.len()));
    }
    points
        .iter()
        .map(|raw| {
            let (x, y) = raw
                .split_once(',')
                .ok_or_else(|| anyhow!("point '{}' is not in x,y form", raw))?;
            let x: i32 = x.trim().parse().with_context(|| format!("bad x in '{}'", raw))?;
            let y: i32 = y.trim().parse().with_context(|| format!("bad y in '{}'", raw))?;
            let point: Point = [x, y];
            Ok(point)
        })
        .collect()
}
