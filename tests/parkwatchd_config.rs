use std::sync::Mutex;

use tempfile::NamedTempFile;

use parkwatch::detect::ClassFilter;
use parkwatch::ParkwatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PARKWATCH_CONFIG",
        "PARKWATCH_API_ADDR",
        "PARKWATCH_SOURCE",
        "PARKWATCH_SLOTS",
        "PARKWATCH_THRESHOLD",
        "PARKWATCH_CLASSES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api": { "addr": "0.0.0.0:9000" },
        "cameras": [
            { "label": "north", "source": "data/north.mp4", "slots": "data/north_slots.json" },
            { "label": "south", "source": "data/south.mp4", "slots": "data/south_slots.json" }
        ],
        "detection": { "threshold": 0.45, "classes": [2, 7] },
        "sources": { "video": "data/north.mp4", "webcam": "/dev/video1" },
        "worker": { "cycle_ms": 25, "target_fps": 15 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PARKWATCH_CONFIG", file.path());
    std::env::set_var("PARKWATCH_API_ADDR", "127.0.0.1:9100");
    std::env::set_var("PARKWATCH_THRESHOLD", "0.6");

    let cfg = ParkwatchConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.cameras.len(), 2);
    assert_eq!(cfg.cameras[0].label, "north");
    assert_eq!(cfg.cameras[1].source, "data/south.mp4");
    assert_eq!(
        cfg.cameras[1].slots_path.to_str().unwrap(),
        "data/south_slots.json"
    );
    assert_eq!(cfg.detection.threshold, 0.6);
    assert_eq!(cfg.detection.classes, ClassFilter::from_ids([2, 7]));
    assert_eq!(cfg.aliases.webcam, "/dev/video1");
    assert_eq!(cfg.worker.cycle.as_millis(), 25);
    assert_eq!(cfg.worker.target_fps, 15);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ParkwatchConfig::load().expect("load defaults");

    assert_eq!(cfg.cameras.len(), 1);
    assert_eq!(cfg.detection.classes, ClassFilter::vehicles());
    assert!((cfg.detection.threshold - 0.3).abs() < 1e-6);

    clear_env();
}

#[test]
fn env_source_override_applies_to_the_primary_camera() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PARKWATCH_SOURCE", "stub://lot");
    std::env::set_var("PARKWATCH_CLASSES", "all");

    let cfg = ParkwatchConfig::load().expect("load config");
    assert_eq!(cfg.cameras[0].source, "stub://lot");
    assert_eq!(cfg.detection.classes, ClassFilter::All);

    clear_env();
}

#[test]
fn out_of_range_threshold_fails_to_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PARKWATCH_THRESHOLD", "2.0");
    assert!(ParkwatchConfig::load().is_err());

    clear_env();
}
