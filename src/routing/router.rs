//! Camera-to-scene message router
//!
//! The router subscribes to every camera topic, gates each payload through
//! topic, JSON, schema and field checks, and answers every accepted message
//! with one synthetic scene update.
//!
//! ```text
//! camera topic → camera id → JSON → camera schema → fields → scene message → publish
//! ```
//!
//! Each failed gate counts as a rejection; nothing propagates back to the
//! transport.

use super::counters::{CounterSnapshot, ProcessingCounters};
use super::messages::{CameraMessage, SceneMessage};
use super::schema::{SchemaValidator, CAMERA_SCHEMA_FILE, SCENE_SCHEMA_FILE};
use super::topics::{dummy_scene_topic, extract_camera_id, CAMERA_TOPIC_FILTER};
use crate::transport::{MessageCallback, Transport};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, enabled, error, info, warn, Level};

/// Why an inbound message was not answered
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteRejection {
    #[error("Failed to extract camera id from topic: {0}")]
    InvalidTopic(String),
    #[error("Malformed JSON payload: {0}")]
    MalformedJson(String),
    #[error("Camera message failed schema validation")]
    SchemaViolation,
    #[error("Missing or invalid '/{0}' field in camera message")]
    MissingField(&'static str),
}

/// State reachable from the transport callback
struct RouterCore {
    transport: Arc<dyn Transport>,
    counters: ProcessingCounters,
    camera_schema: Option<SchemaValidator>,
    scene_schema: Option<SchemaValidator>,
    output_topic: String,
}

/// Routes camera detections to scene updates over a [`Transport`]
pub struct MessageRouter {
    core: Arc<RouterCore>,
    running: AtomicBool,
}

impl MessageRouter {
    /// Build a router, loading schemas from `schema_dir` when validation is on.
    ///
    /// A schema that fails to load disables validation for its direction only.
    pub fn new(transport: Arc<dyn Transport>, schema_validation: bool, schema_dir: &Path) -> Self {
        if !schema_validation {
            info!("Schema validation disabled for MQTT messages");
            return Self::with_validators(transport, None, None);
        }

        let camera_schema = SchemaValidator::load_optional(schema_dir.join(CAMERA_SCHEMA_FILE));
        let scene_schema = SchemaValidator::load_optional(schema_dir.join(SCENE_SCHEMA_FILE));

        if camera_schema.is_none() {
            warn!(schema_dir = %schema_dir.display(), "Camera schema not loaded, input validation disabled");
        }
        if scene_schema.is_none() {
            warn!(schema_dir = %schema_dir.display(), "Scene schema not loaded, output validation disabled");
        }
        if camera_schema.is_some() && scene_schema.is_some() {
            info!("Schema validation enabled for MQTT messages");
        }

        Self::with_validators(transport, camera_schema, scene_schema)
    }

    /// Build a router with already compiled validators
    pub fn with_validators(
        transport: Arc<dyn Transport>,
        camera_schema: Option<SchemaValidator>,
        scene_schema: Option<SchemaValidator>,
    ) -> Self {
        Self {
            core: Arc::new(RouterCore {
                transport,
                counters: ProcessingCounters::new(),
                camera_schema,
                scene_schema,
                output_topic: dummy_scene_topic(),
            }),
            running: AtomicBool::new(false),
        }
    }

    /// Register the inbound handler and subscribe to camera topics. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("Message router already started");
            return;
        }

        info!(topic = CAMERA_TOPIC_FILTER, "Message router starting");

        let core: Weak<RouterCore> = Arc::downgrade(&self.core);
        let callback: MessageCallback = Arc::new(move |topic: &str, payload: &[u8]| {
            if let Some(core) = core.upgrade() {
                core.handle_message(topic, payload);
            }
        });

        self.core.transport.set_message_callback(Some(callback));
        self.core.transport.subscribe(CAMERA_TOPIC_FILTER);
    }

    /// Log totals, unsubscribe and clear the handler. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let totals = self.counters();
        info!(
            received = totals.received,
            published = totals.published,
            rejected = totals.rejected,
            "Message router stopping"
        );

        self.core.transport.unsubscribe(CAMERA_TOPIC_FILTER);
        self.core.transport.set_message_callback(None);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Process one inbound message as if it arrived from the transport
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        self.core.handle_message(topic, payload);
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.core.counters.snapshot()
    }

    pub fn validates_input(&self) -> bool {
        self.core.camera_schema.is_some()
    }

    pub fn validates_output(&self) -> bool {
        self.core.scene_schema.is_some()
    }
}

impl Drop for MessageRouter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RouterCore {
    fn handle_message(&self, topic: &str, payload: &[u8]) {
        let _span = crate::message_span!(topic = %topic).entered();
        self.counters.record_received();

        if let Err(rejection) = self.route(topic, payload) {
            warn!(topic = %topic, reason = %rejection, "Rejected camera message");
            self.counters.record_rejected();
        }
    }

    fn route(&self, topic: &str, payload: &[u8]) -> Result<(), RouteRejection> {
        let camera_id = extract_camera_id(topic)
            .ok_or_else(|| RouteRejection::InvalidTopic(topic.to_string()))?;

        debug!(
            camera_id = %camera_id,
            bytes = payload.len(),
            "Received detection from camera"
        );

        let message = self.parse_camera_message(payload)?;

        if enabled!(Level::DEBUG) {
            debug!(
                camera_id = %message.id,
                timestamp = %message.timestamp,
                detections = message.detection_count(),
                "Parsed camera message"
            );
        }

        self.publish_scene(&message.timestamp);
        Ok(())
    }

    fn parse_camera_message(&self, payload: &[u8]) -> Result<CameraMessage, RouteRejection> {
        let doc: Value = serde_json::from_slice(payload)
            .map_err(|e| RouteRejection::MalformedJson(e.to_string()))?;

        if let Some(schema) = &self.camera_schema {
            if !schema.validate(&doc) {
                return Err(RouteRejection::SchemaViolation);
            }
        }

        CameraMessage::from_value(&doc)
    }

    fn publish_scene(&self, timestamp: &str) {
        let scene = match serde_json::to_value(SceneMessage::synthetic(timestamp)) {
            Ok(scene) => scene,
            Err(e) => {
                error!(error = %e, "Failed to serialize scene message");
                return;
            }
        };

        if let Some(schema) = &self.scene_schema {
            if !schema.validate(&scene) {
                error!("Output message failed schema validation - this is a bug!");
            }
        }

        let payload = scene.to_string().into_bytes();
        let bytes = payload.len();

        self.transport.publish(&self.output_topic, payload);
        self.counters.record_published();

        debug!(topic = %self.output_topic, bytes, "Published scene update");
    }
}
