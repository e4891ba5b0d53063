//! Pure routing decisions for rumqttc events
//!
//! The session task polls the event loop and asks this module what each
//! event means before touching any shared state.

use bytes::Bytes;
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, SubscribeReasonCode};

/// SubAck return code signalling a rejected filter
pub const SUBACK_FAILURE: u8 = 0x80;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => match &connack.code {
                    ConnectReturnCode::Success => EventRoute::ConnectionAcknowledged {
                        session_present: connack.session_present,
                    },
                    code => EventRoute::ConnectionRefused(format!("{code:?}")),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: suback
                        .return_codes
                        .iter()
                        .map(Self::suback_code)
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    fn suback_code(code: &SubscribeReasonCode) -> u8 {
        match code {
            SubscribeReasonCode::Success(qos) => *qos as u8,
            SubscribeReasonCode::Failure => SUBACK_FAILURE,
        }
    }

    /// True when the broker granted at least one filter in a SubAck (pure function)
    pub fn any_granted(return_codes: &[u8]) -> bool {
        return_codes.iter().any(|&code| code < SUBACK_FAILURE)
    }

    /// Validate subscription success from SubAck (pure function)
    pub fn validate_subscription_success(return_codes: &[u8]) -> Result<(), String> {
        if return_codes.iter().any(|&code| code >= SUBACK_FAILURE) {
            Err(format!(
                "Subscription failed with return codes: {return_codes:?}"
            ))
        } else {
            Ok(())
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged { session_present: bool },
    /// Broker answered CONNECT with a refusal code
    ConnectionRefused(String),
    /// Message received on subscribed topic
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// MQTT broker disconnected
    Disconnected,
    /// Subscription confirmed with return codes
    SubscriptionConfirmed {
        packet_id: u16,
        return_codes: Vec<u8>,
    },
    /// Our own DISCONNECT reached the network
    DisconnectSent,
    /// Infrastructure event (PingResp, PubAck, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
