//! Camera input and scene output message models
//!
//! Camera payloads are read leniently from a parsed [`serde_json::Value`]:
//! the top-level fields are mandatory, while malformed detections are
//! skipped rather than failing the whole message. Scene output is a plain
//! serde model.

use super::router::RouteRejection;
use super::topics::{DUMMY_SCENE_ID, DUMMY_SCENE_NAME, DUMMY_THING_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

pub const DUMMY_TRACK_ID: &str = "dummy-track-001";

/// Pixel-space bounding box of a detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A single detection reported by a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub bounding_box_px: BoundingBox,
}

/// Detections reported by one camera at one instant, grouped by category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMessage {
    pub id: String,
    pub timestamp: String,
    pub objects: BTreeMap<String, Vec<Detection>>,
}

impl CameraMessage {
    /// Extract a camera message from a parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`RouteRejection::MissingField`] if `id` or `timestamp` is not a
    /// string, or `objects` is not an object. A document that is not an object
    /// reports its `id` as missing.
    pub fn from_value(doc: &Value) -> Result<Self, RouteRejection> {
        let id = doc
            .pointer("/id")
            .and_then(Value::as_str)
            .ok_or(RouteRejection::MissingField("id"))?;
        let timestamp = doc
            .pointer("/timestamp")
            .and_then(Value::as_str)
            .ok_or(RouteRejection::MissingField("timestamp"))?;
        let categories = doc
            .pointer("/objects")
            .and_then(Value::as_object)
            .ok_or(RouteRejection::MissingField("objects"))?;

        let mut objects = BTreeMap::new();
        for (category, entries) in categories {
            let Some(entries) = entries.as_array() else {
                warn!(category = %category, "Invalid detections array for category");
                continue;
            };

            let detections: Vec<Detection> =
                entries.iter().filter_map(Detection::from_value).collect();
            if !detections.is_empty() {
                objects.insert(category.clone(), detections);
            }
        }

        Ok(Self {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            objects,
        })
    }

    /// Total number of detections across all categories
    pub fn detection_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }
}

impl Detection {
    /// `None` for entries that are not objects or lack a numeric bounding box
    fn from_value(entry: &Value) -> Option<Self> {
        let entry = entry.as_object()?;
        let bbox = entry.get("bounding_box_px")?.as_object()?;
        let field = |name: &str| bbox.get(name).and_then(Value::as_f64);

        Some(Self {
            id: entry.get("id").and_then(Value::as_i64),
            bounding_box_px: BoundingBox {
                x: field("x")?,
                y: field("y")?,
                width: field("width")?,
                height: field("height")?,
            },
        })
    }
}

/// One tracked object in a scene update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTrack {
    pub id: String,
    pub category: String,
    pub translation: [f64; 3],
    pub velocity: [f64; 3],
    pub size: [f64; 3],
    /// Quaternion `[x, y, z, w]`
    pub rotation: [f64; 4],
}

/// Scene update published for every accepted camera message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMessage {
    pub id: String,
    pub name: String,
    pub timestamp: String,
    pub objects: Vec<SceneTrack>,
}

impl SceneMessage {
    /// Fixed single-track scene carrying the camera's timestamp
    pub fn synthetic(timestamp: &str) -> Self {
        Self {
            id: DUMMY_SCENE_ID.to_string(),
            name: DUMMY_SCENE_NAME.to_string(),
            timestamp: timestamp.to_string(),
            objects: vec![SceneTrack {
                id: DUMMY_TRACK_ID.to_string(),
                category: DUMMY_THING_TYPE.to_string(),
                translation: [1.0, 2.0, 0.0],
                velocity: [0.1, 0.2, 0.0],
                size: [0.5, 0.5, 1.8],
                rotation: [0.0, 0.0, 0.0, 1.0],
            }],
        }
    }
}
