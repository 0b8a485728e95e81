//! sourceprobe - capture source probing
//!
//! Tries to open candidate capture sources and read one frame from each,
//! then reports which are usable. By default it probes the first few webcam
//! device indices; extra descriptors (file paths, stub scenes) can be given
//! on the command line.

use anyhow::Result;
use clap::Parser;

use parkwatch::capture::{CaptureSource, SourceDescriptor};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Probe webcam device indices 0..N.
    #[arg(long, default_value_t = 5)]
    devices: u32,
    /// Additional source descriptors to probe (paths, indices, stub:// URLs).
    extra: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut candidates: Vec<String> = (0..args.devices).map(|i| i.to_string()).collect();
    candidates.extend(args.extra);

    println!("probing {} source(s)...", candidates.len());
    let mut usable = 0;
    for raw in &candidates {
        let descriptor = SourceDescriptor::parse(raw);
        match probe(&descriptor) {
            ProbeResult::Frame(width, height) => {
                usable += 1;
                println!("  {} — OK ({}x{})", descriptor, width, height);
            }
            ProbeResult::OpenedNoFrame(err) => {
                println!("  {} — opens but cannot read frames ({})", descriptor, err);
            }
            ProbeResult::Failed(err) => {
                println!("  {} — not available ({})", descriptor, err);
            }
        }
    }
    println!("{}/{} source(s) usable", usable, candidates.len());
    Ok(())
}

enum ProbeResult {
    Frame(u32, u32),
    OpenedNoFrame(String),
    Failed(String),
}

fn probe(descriptor: &SourceDescriptor) -> ProbeResult {
    let mut source = match CaptureSource::open(descriptor, 10) {
        Ok(source) => source,
        Err(err) => return ProbeResult::Failed(format!("{:#}", err)),
    };
    match source.next_frame() {
        Ok(frame) => ProbeResult::Frame(frame.width, frame.height),
        Err(err) => ProbeResult::OpenedNoFrame(format!("{:#}", err)),
    }
}
