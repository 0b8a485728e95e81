//! End-to-end pipeline scenarios over synthetic sources and the HTTP API.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parkwatch::api::{ApiConfig, ApiServer};
use parkwatch::config::{CameraSettings, DetectionSettings, WorkerSettings};
use parkwatch::detect::{BoundingBox, ClassFilter, Detection, DetectionAdapter, StubBackend};
use parkwatch::{
    aggregate, check_occupancy, save_slots, CameraView, ParkingSystem, ParkwatchConfig, Slot,
    SourceAliases, StatsSnapshot,
};

fn unit_square() -> Slot {
    vec![[0, 0], [10, 0], [10, 10], [0, 10]]
}

fn vehicle_detection(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection {
        bbox: BoundingBox { x1, y1, x2, y2 },
        confidence: 0.9,
        class_id: 2,
    }
}

fn filtered(detections: Vec<Detection>, classes: &ClassFilter) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= 0.3 && classes.allows(d.class_id))
        .collect()
}

#[test]
fn vehicle_centered_in_slot_is_occupied() {
    let slots = vec![unit_square()];
    let detections = filtered(
        vec![vehicle_detection(2.0, 2.0, 8.0, 8.0)],
        &ClassFilter::vehicles(),
    );
    assert_eq!(check_occupancy(&slots, &detections), vec![true]);
}

#[test]
fn vehicle_far_from_slot_leaves_it_vacant() {
    let slots = vec![unit_square()];
    let detections = filtered(
        vec![vehicle_detection(100.0, 100.0, 110.0, 110.0)],
        &ClassFilter::vehicles(),
    );
    assert_eq!(check_occupancy(&slots, &detections), vec![false]);

    let view = CameraView {
        occupancy: check_occupancy(&slots, &detections),
        durations: vec!["0m".to_string()],
    };
    let snapshot = aggregate(&[view], "file:test");
    assert_eq!(snapshot.occupied, 0);
    assert_eq!(snapshot.utilization, 0.0);
}

#[test]
fn two_cameras_aggregate_to_sixty_percent() {
    let views = [
        CameraView {
            occupancy: vec![true, false],
            durations: vec!["3m".to_string(), "0m".to_string()],
        },
        CameraView {
            occupancy: vec![true, true, false],
            durations: vec!["1m".to_string(), "8m".to_string(), "0m".to_string()],
        },
    ];
    let snapshot = aggregate(&views, "file:test");
    assert_eq!(snapshot.total, 5);
    assert_eq!(snapshot.occupied, 3);
    assert_eq!(snapshot.vacant, 2);
    assert_eq!(snapshot.utilization, 60.0);
    assert_eq!(snapshot.durations[3], "8m");
}

// ----------------------------------------------------------------------------
// Full-system scenarios over stub sources
// ----------------------------------------------------------------------------

fn system_config(source: &str, slots_path: std::path::PathBuf) -> ParkwatchConfig {
    ParkwatchConfig {
        api_addr: "127.0.0.1:0".to_string(),
        cameras: vec![CameraSettings {
            label: "lot".to_string(),
            source: source.to_string(),
            slots_path,
        }],
        detection: DetectionSettings {
            threshold: 0.3,
            classes: ClassFilter::vehicles(),
            model_path: None,
        },
        aliases: SourceAliases {
            video: source.to_string(),
            // Resolves to a real device; default builds cannot open it, which
            // is exactly the failed-switch scenario.
            webcam: "/dev/video0".to_string(),
        },
        worker: WorkerSettings {
            cycle: Duration::from_millis(5),
            target_fps: 10,
        },
    }
}

fn start_system(source: &str) -> (Arc<ParkingSystem>, tempfile::NamedTempFile) {
    let file = tempfile::NamedTempFile::new().unwrap();
    // Slot 0 covers the synthetic lot's parked-car marker, slot 1 does not.
    save_slots(
        file.path(),
        &[
            vec![[40, 40], [120, 40], [120, 120], [40, 120]],
            vec![[300, 300], [380, 300], [380, 380], [300, 380]],
        ],
    )
    .unwrap();

    let cfg = system_config(source, file.path().to_path_buf());
    let adapter = DetectionAdapter::new(Box::new(StubBackend::new()));
    let system = Arc::new(ParkingSystem::start(&cfg, adapter).unwrap());
    (system, file)
}

fn wait_for<F: Fn(&StatsSnapshot) -> bool>(system: &ParkingSystem, pred: F) -> Arc<StatsSnapshot> {
    for _ in 0..400 {
        let snapshot = system.stats();
        if pred(&snapshot) {
            return snapshot;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached; last snapshot: {:?}", system.stats());
}

#[test]
fn pipeline_publishes_occupancy_and_frames() {
    let (system, _slots) = start_system("stub://lot");

    let snapshot = wait_for(&system, |s| s.total == 2 && s.occupied == 1);
    assert_eq!(snapshot.slots, vec![true, false]);
    assert_eq!(snapshot.utilization, 50.0);

    let jpeg = system.latest_jpeg().expect("a frame should be published");
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    system.shutdown();
}

#[test]
fn failed_webcam_switch_keeps_the_prior_source_running() {
    let (system, _slots) = start_system("stub://lot");
    let before = wait_for(&system, |s| s.total == 2 && s.occupied == 1);

    #[cfg(not(feature = "capture-v4l2"))]
    {
        let result = system.switch_source("webcam");
        assert!(result.is_err(), "switch to an unopenable webcam must fail");
    }
    let result = system.switch_source("stub://cam-offline");
    assert!(result.is_err());

    let after = wait_for(&system, |s| s.total == 2);
    assert_eq!(after.slots, before.slots);
    assert_eq!(after.occupied, before.occupied);
    assert_eq!(after.source, before.source);

    system.shutdown();
}

#[test]
fn switching_between_scenes_resets_durations() {
    let (system, _slots) = start_system("stub://lot");
    wait_for(&system, |s| s.occupied == 1);

    system.switch_source("stub://empty").unwrap();
    let empty = wait_for(&system, |s| s.occupied == 0);
    assert!(empty.durations.iter().all(|d| d == "0m"));

    system.switch_source("video").unwrap();
    wait_for(&system, |s| s.occupied == 1);

    system.shutdown();
}

// ----------------------------------------------------------------------------
// HTTP API smoke tests
// ----------------------------------------------------------------------------

fn http_request(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn body_of(response: &str) -> &str {
    response
        .split("\r\n\r\n")
        .nth(1)
        .expect("response has a body")
}

#[test]
fn api_serves_health_stats_and_controls() {
    let (system, _slots) = start_system("stub://lot");
    wait_for(&system, |s| s.total == 2);

    let api = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        system.clone(),
    )
    .spawn()
    .unwrap();
    let addr = api.addr;

    let health = http_request(addr, "GET /health HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(health.starts_with("HTTP/1.1 200"));

    let stats = http_request(addr, "GET /stats HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(stats.starts_with("HTTP/1.1 200"));
    let parsed: serde_json::Value = serde_json::from_str(body_of(&stats)).unwrap();
    assert_eq!(parsed["total"], 2);
    assert!(parsed["slots"].is_array());
    assert!(parsed["durations"].is_array());

    let body = r#"{"threshold": 0.55}"#;
    let set = http_request(
        addr,
        &format!(
            "POST /control/sensitivity HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    assert!(set.starts_with("HTTP/1.1 200"), "{}", set);
    assert!((system.sensitivity() - 0.55).abs() < 1e-6);

    let bad = r#"{"threshold": 7.0}"#;
    let rejected = http_request(
        addr,
        &format!(
            "POST /control/sensitivity HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            bad.len(),
            bad
        ),
    );
    assert!(rejected.starts_with("HTTP/1.1 400"), "{}", rejected);

    let switch = r#"{"source": "stub://cam-offline"}"#;
    let conflict = http_request(
        addr,
        &format!(
            "POST /control/source HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            switch.len(),
            switch
        ),
    );
    assert!(conflict.starts_with("HTTP/1.1 409"), "{}", conflict);

    let missing = http_request(addr, "GET /nope HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(missing.starts_with("HTTP/1.1 404"));

    api.stop().unwrap();
    system.shutdown();
}
