//! Camera-to-scene routing
//!
//! - [`topics`] - Topic layout and camera id extraction
//! - [`messages`] - Camera input and scene output models
//! - [`schema`] - JSON Schema validation gate
//! - [`counters`] - Received/published/rejected counters
//! - [`router`] - The message router wiring it all to a transport

pub mod counters;
pub mod messages;
pub mod router;
pub mod schema;
pub mod topics;

pub use counters::{CounterSnapshot, ProcessingCounters};
pub use messages::{BoundingBox, CameraMessage, Detection, SceneMessage, SceneTrack};
pub use router::{MessageRouter, RouteRejection};
pub use schema::{SchemaError, SchemaValidator, SchemaViolation};
pub use topics::{extract_camera_id, CAMERA_TOPIC_FILTER};
