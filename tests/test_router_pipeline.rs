//! Router pipeline tests
//!
//! Drives the message router end to end through the in-memory transport,
//! with the schemas shipped in `schema/`.

use scene_tracker::routing::{MessageRouter, SchemaValidator, CAMERA_TOPIC_FILTER};
use scene_tracker::testing::MockTransport;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

const SCENE_TOPIC: &str = "scenescape/data/scene/dummy-scene/thing";

fn schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schema")
}

fn validating_router() -> (Arc<MockTransport>, MessageRouter) {
    let transport = Arc::new(MockTransport::connected());
    let router = MessageRouter::new(transport.clone(), true, &schema_dir());
    router.start();
    (transport, router)
}

fn camera(timestamp: &str) -> Value {
    json!({
        "id": "cam1",
        "timestamp": timestamp,
        "objects": {
            "person": [
                {"id": 7, "bounding_box_px": {"x": 1.0, "y": 2.0, "width": 30.0, "height": 60.0}}
            ]
        }
    })
}

fn published_scenes(transport: &MockTransport) -> Vec<Value> {
    transport
        .published()
        .into_iter()
        .map(|(topic, payload)| {
            assert_eq!(topic, SCENE_TOPIC);
            serde_json::from_slice(&payload).unwrap()
        })
        .collect()
}

#[test]
fn test_valid_camera_message_produces_scene_update() {
    // Arrange
    let (transport, router) = validating_router();
    assert!(router.validates_input());
    assert!(router.validates_output());
    assert_eq!(transport.subscriptions(), vec![CAMERA_TOPIC_FILTER.to_string()]);

    // Act
    let payload = camera("2026-01-27T12:00:00.123Z").to_string();
    assert!(transport.simulate_message("scenescape/data/camera/cam1", payload.as_bytes()));

    // Assert
    let scenes = published_scenes(&transport);
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0]["timestamp"], "2026-01-27T12:00:00.123Z");
    assert_eq!(scenes[0]["id"], "dummy-scene");
    assert_eq!(scenes[0]["name"], "Test Scene");
    assert_eq!(scenes[0]["objects"][0]["id"], "dummy-track-001");

    let scene_schema = SchemaValidator::load(schema_dir().join("scene-data.schema.json")).unwrap();
    assert!(scene_schema.validate(&scenes[0]));

    let counters = router.counters();
    assert_eq!((counters.received, counters.published, counters.rejected), (1, 1, 0));
}

#[test]
fn test_each_accepted_message_keeps_its_timestamp() {
    let (transport, router) = validating_router();

    for timestamp in ["2026-01-27T12:00:00.000Z", "2026-01-27T12:00:00.033Z"] {
        let payload = camera(timestamp).to_string();
        transport.simulate_message("scenescape/data/camera/cam1", payload.as_bytes());
    }

    let timestamps: Vec<Value> = published_scenes(&transport)
        .into_iter()
        .map(|scene| scene["timestamp"].clone())
        .collect();
    assert_eq!(timestamps, vec![json!("2026-01-27T12:00:00.000Z"), json!("2026-01-27T12:00:00.033Z")]);
    assert_eq!(router.counters().published, 2);
}

#[test]
fn test_invalid_messages_are_rejected() {
    // Arrange
    let (transport, router) = validating_router();
    let mut missing_timestamp = camera("ignored");
    missing_timestamp.as_object_mut().unwrap().remove("timestamp");
    let mut wrong_objects = camera("2026-01-27T12:00:00.000Z");
    wrong_objects["objects"] = json!("person");

    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("scenescape/data/camera/", camera("t").to_string().into_bytes()),
        ("other/data/camera/cam1", camera("t").to_string().into_bytes()),
        ("scenescape/data/camera/cam1", b"{not json".to_vec()),
        ("scenescape/data/camera/cam1", missing_timestamp.to_string().into_bytes()),
        ("scenescape/data/camera/cam1", wrong_objects.to_string().into_bytes()),
    ];

    // Act
    for (topic, payload) in &cases {
        transport.simulate_message(topic, payload);
    }

    // Assert
    assert!(transport.published().is_empty());
    let counters = router.counters();
    assert_eq!(counters.received, cases.len() as u64);
    assert_eq!(counters.rejected, cases.len() as u64);
    assert_eq!(counters.published, 0);
}

#[test]
fn test_disabled_validation_only_checks_required_fields() {
    // Arrange
    let transport = Arc::new(MockTransport::connected());
    let router = MessageRouter::new(transport.clone(), false, &schema_dir());
    router.start();
    assert!(!router.validates_input());
    assert!(!router.validates_output());

    // Act: Extra fields pass without a schema
    let loose = json!({"id": "cam9", "timestamp": "t0", "objects": {}, "extra": true});
    transport.simulate_message("scenescape/data/camera/cam9", loose.to_string().as_bytes());
    let no_timestamp = json!({"id": "cam9", "objects": {}});
    transport.simulate_message("scenescape/data/camera/cam9", no_timestamp.to_string().as_bytes());

    // Assert
    let scenes = published_scenes(&transport);
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0]["timestamp"], "t0");
    let counters = router.counters();
    assert_eq!((counters.received, counters.published, counters.rejected), (2, 1, 1));
}

#[test]
fn test_missing_schema_dir_falls_back_to_no_validation() {
    let transport = Arc::new(MockTransport::connected());
    let missing = tempfile::tempdir().unwrap().path().join("absent");

    let router = MessageRouter::new(transport.clone(), true, &missing);
    router.start();

    assert!(!router.validates_input());
    assert!(!router.validates_output());
    let payload = json!({"id": "cam1", "timestamp": "t1", "objects": {}}).to_string();
    transport.simulate_message("scenescape/data/camera/cam1", payload.as_bytes());
    assert_eq!(router.counters().published, 1);
}

#[test]
fn test_stopped_router_ignores_traffic() {
    let (transport, router) = validating_router();

    router.stop();
    let delivered = transport.simulate_message(
        "scenescape/data/camera/cam1",
        camera("2026-01-27T12:00:00.000Z").to_string().as_bytes(),
    );

    assert!(!delivered);
    assert!(transport.subscriptions().is_empty());
    assert_eq!(router.counters().received, 0);
}

fn with_person_detections(detections: Value) -> String {
    json!({
        "id": "cam1",
        "timestamp": "2026-01-27T12:00:00.000Z",
        "objects": {"person": detections}
    })
    .to_string()
}

#[test]
fn test_malformed_detections_are_skipped_but_published() {
    let cases = [
        (
            "missing bounding box height",
            with_person_detections(json!([{"id": 1, "bounding_box_px": {"x": 10, "y": 20, "width": 50}}])),
        ),
        ("no bounding box", with_person_detections(json!([{"id": 1}]))),
        (
            "bounding box is a string",
            with_person_detections(json!([{"id": 1, "bounding_box_px": "not_an_object"}])),
        ),
        (
            "bounding box is an array",
            with_person_detections(json!([{"id": 1, "bounding_box_px": [10, 20, 50, 100]}])),
        ),
        ("category is not an array", with_person_detections(json!("not_an_array"))),
        (
            "detections are not objects",
            with_person_detections(json!(["not_an_object", 123, null])),
        ),
    ];

    for (name, payload) in cases {
        // Arrange
        let transport = Arc::new(MockTransport::connected());
        let router = MessageRouter::new(transport.clone(), false, &schema_dir());
        router.start();

        // Act
        transport.simulate_message("scenescape/data/camera/cam1", payload.as_bytes());

        // Assert
        let counters = router.counters();
        assert_eq!(
            (counters.received, counters.rejected, counters.published),
            (1, 0, 1),
            "case: {name}"
        );
        assert_eq!(transport.published().len(), 1, "case: {name}");
    }
}

#[test]
fn test_partial_detection_passes_shipped_camera_schema() {
    // Arrange
    let (transport, router) = validating_router();
    let payload = with_person_detections(json!([
        {"id": 1, "bounding_box_px": {"x": 10, "y": 20, "width": 50, "height": 100}},
        {"id": 2, "bounding_box_px": {"x": 10, "y": 20, "width": 50}},
        {"id": 3}
    ]));

    // Act
    transport.simulate_message("scenescape/data/camera/cam1", payload.as_bytes());

    // Assert
    let counters = router.counters();
    assert_eq!((counters.received, counters.rejected, counters.published), (1, 0, 1));
    assert_eq!(published_scenes(&transport).len(), 1);
}
