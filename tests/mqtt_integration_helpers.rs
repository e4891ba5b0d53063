//! MQTT Integration Test Helpers
//!
//! Provides helper utilities for integration tests with an MQTT broker.
//! Live-broker tests assume a broker at localhost:1883 and are ignored by
//! default; run them with `cargo test -- --ignored`.

use scene_tracker::config::MqttSection;

#[allow(dead_code)]
pub const MQTT_BROKER_HOST: &str = "localhost";
#[allow(dead_code)]
pub const MQTT_BROKER_PORT: u16 = 1883;

/// Create plain-TCP MQTT config pointing to the localhost broker
#[allow(dead_code)]
pub fn mqtt_config() -> MqttSection {
    mqtt_config_with_port(MQTT_BROKER_PORT)
}

/// Create plain-TCP MQTT config for a custom local port
#[allow(dead_code)]
pub fn mqtt_config_with_port(port: u16) -> MqttSection {
    MqttSection {
        host: "127.0.0.1".to_string(),
        port,
        insecure: true,
        tls: None,
    }
}

/// A valid camera payload carrying `timestamp`
#[allow(dead_code)]
pub fn camera_payload(camera_id: &str, timestamp: &str) -> String {
    format!(
        r#"{{"id":"{camera_id}","timestamp":"{timestamp}","objects":{{"person":[{{"id":1,"bounding_box_px":{{"x":10,"y":20,"width":50,"height":100}}}}]}}}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_config_uses_localhost() {
        let config = mqtt_config();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 1883);
        assert!(config.insecure);
    }

    #[test]
    fn test_camera_payload_is_valid_json() {
        let payload = camera_payload("cam1", "2026-01-27T12:00:00.000Z");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["id"], "cam1");
        assert_eq!(value["objects"]["person"][0]["bounding_box_px"]["height"], 100);
    }
}
