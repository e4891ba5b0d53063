//! Topic layout for camera input and scene output
//!
//! Cameras publish on `scenescape/data/camera/{camera_id}`; the tracker
//! answers on `scenescape/data/scene/{scene_id}/{thing_type}`.

/// Subscription filter covering every camera
pub const CAMERA_TOPIC_FILTER: &str = "scenescape/data/camera/+";

/// Prefix stripped from inbound topics to obtain the camera id
pub const CAMERA_TOPIC_PREFIX: &str = "scenescape/data/camera/";

/// Prefix of every scene output topic
pub const SCENE_TOPIC_PREFIX: &str = "scenescape/data/scene/";

pub const DUMMY_SCENE_ID: &str = "dummy-scene";
pub const DUMMY_SCENE_NAME: &str = "Test Scene";
pub const DUMMY_THING_TYPE: &str = "thing";

/// Extract the camera id from an inbound topic.
///
/// Returns `None` when the prefix does not match or nothing follows it.
pub fn extract_camera_id(topic: &str) -> Option<&str> {
    if topic.len() <= CAMERA_TOPIC_PREFIX.len() {
        return None;
    }
    topic.strip_prefix(CAMERA_TOPIC_PREFIX)
}

/// Build `scenescape/data/scene/{scene_id}/{thing_type}`
pub fn scene_topic(scene_id: &str, thing_type: &str) -> String {
    format!("{SCENE_TOPIC_PREFIX}{scene_id}/{thing_type}")
}

/// Output topic for the synthetic scene
pub fn dummy_scene_topic() -> String {
    scene_topic(DUMMY_SCENE_ID, DUMMY_THING_TYPE)
}
