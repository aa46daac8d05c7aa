//! Telemetry fan-out to subscribers.
//!
//! The transport loop publishes every decoded frame and every local
//! command acknowledgment here. Each subscriber gets its own bounded
//! channel; a slow subscriber loses events rather than stalling the loop.

use crate::protocol::Message;
use crate::types::{Attitude, Command, CommandAck, GlobalPosition, TelemetryFrame};
use crate::{BridgeError, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Acknowledgment either reported by the vehicle or produced locally when
/// an operator command is accepted or rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Ack {
    Vehicle(CommandAck),
    Local {
        command: String,
        status: AckStatus,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Event delivered to telemetry subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TelemetryEvent {
    #[serde(rename = "telemetry")]
    Heartbeat(TelemetryFrame),
    #[serde(rename = "telemetry")]
    Position(GlobalPosition),
    Attitude(Attitude),
    CommandAck(Ack),
}

impl TelemetryEvent {
    /// Wire name of the event kind: `telemetry`, `attitude` or `command_ack`.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Heartbeat(_) | TelemetryEvent::Position(_) => "telemetry",
            TelemetryEvent::Attitude(_) => "attitude",
            TelemetryEvent::CommandAck(_) => "command_ack",
        }
    }

    /// Map a parsed inbound message to an event, if it is one subscribers see.
    pub fn from_message(msg: &Message) -> Option<TelemetryEvent> {
        match msg {
            Message::Heartbeat(hb) => Some(TelemetryEvent::Heartbeat(*hb)),
            Message::GlobalPosition(p) => Some(TelemetryEvent::Position(*p)),
            Message::Attitude(a) => Some(TelemetryEvent::Attitude(*a)),
            Message::CommandAck(ack) => Some(TelemetryEvent::CommandAck(Ack::Vehicle(*ack))),
            _ => None,
        }
    }

    pub fn local_ack(command: Command, accepted: bool, message: impl Into<String>) -> Self {
        TelemetryEvent::CommandAck(Ack::Local {
            command: command.as_str().to_string(),
            status: if accepted {
                AckStatus::Success
            } else {
                AckStatus::Error
            },
            message: message.into(),
        })
    }

    /// `{"type": ..., "data": {...}}`
    pub fn to_json(&self) -> String {
        // Serialization of these plain structs cannot fail; non-finite
        // floats are emitted as null.
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::warn!("Failed to serialize {} event: {}", self.kind(), e);
            format!("{{\"type\":\"{}\",\"data\":null}}", self.kind())
        })
    }
}

/// Fan-out point for telemetry events. Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct TelemetryPublisher {
    subscribers: Arc<Mutex<Vec<Sender<TelemetryEvent>>>>,
}

impl TelemetryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber with its own queue.
    pub fn subscribe(&self, capacity: usize) -> TelemetryStream {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sender);
        TelemetryStream { receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver an event to every subscriber. Full queues drop the event;
    /// disconnected subscribers are removed.
    pub fn publish(&self, event: &TelemetryEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("Subscriber queue full, dropping {} event", event.kind());
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Telemetry subscriber went away");
                false
            }
        });
    }
}

/// Receiving end of a telemetry subscription.
pub struct TelemetryStream {
    receiver: Receiver<TelemetryEvent>,
}

impl TelemetryStream {
    /// Receive the next event (blocks until available).
    pub fn recv(&self) -> Result<TelemetryEvent> {
        self.receiver.recv().map_err(|_| BridgeError::StreamStopped)
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<TelemetryEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<TelemetryEvent> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => BridgeError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => BridgeError::StreamStopped,
        })
    }

    /// Iterate over events until the publisher is dropped.
    pub fn iter(&self) -> impl Iterator<Item = TelemetryEvent> + '_ {
        self.receiver.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(armed: bool) -> TelemetryEvent {
        TelemetryEvent::Heartbeat(TelemetryFrame {
            vehicle_type: 2,
            autopilot: 3,
            custom_mode: 0,
            base_mode: if armed { 0x80 } else { 0 },
            system_status: 4,
            mavlink_version: 3,
            armed,
        })
    }

    #[test]
    fn test_fan_out() {
        let publisher = TelemetryPublisher::new();
        let a = publisher.subscribe(8);
        let b = publisher.subscribe(8);
        publisher.publish(&heartbeat(true));
        assert_eq!(a.try_recv(), Some(heartbeat(true)));
        assert_eq!(b.try_recv(), Some(heartbeat(true)));
    }

    #[test]
    fn test_dropped_subscriber_removed() {
        let publisher = TelemetryPublisher::new();
        let a = publisher.subscribe(8);
        drop(publisher.subscribe(8));
        publisher.publish(&heartbeat(false));
        assert_eq!(publisher.subscriber_count(), 1);
        assert!(a.try_recv().is_some());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let publisher = TelemetryPublisher::new();
        let a = publisher.subscribe(1);
        publisher.publish(&heartbeat(true));
        publisher.publish(&heartbeat(false));
        assert_eq!(a.try_recv(), Some(heartbeat(true)));
        assert_eq!(a.try_recv(), None);
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&heartbeat(true).to_json()).unwrap();
        assert_eq!(json["type"], "telemetry");
        assert_eq!(json["data"]["armed"], true);
        assert_eq!(json["data"]["type"], 2);
        assert_eq!(json["data"]["base_mode"], 128);

        let ack = TelemetryEvent::local_ack(Command::Forward, true, "Command FORWARD executed");
        assert_eq!(ack.kind(), "command_ack");
        let json: serde_json::Value = serde_json::from_str(&ack.to_json()).unwrap();
        assert_eq!(json["type"], "command_ack");
        assert_eq!(json["data"]["source"], "local");
        assert_eq!(json["data"]["status"], "success");
        assert_eq!(json["data"]["command"], "FORWARD");
    }

    #[test]
    fn test_vehicle_ack_json() {
        let ev = TelemetryEvent::from_message(&Message::CommandAck(CommandAck {
            command: 400,
            result: 0,
        }))
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&ev.to_json()).unwrap();
        assert_eq!(json["data"]["source"], "vehicle");
        assert_eq!(json["data"]["command"], 400);
    }

    #[test]
    fn test_recv_timeout() {
        let publisher = TelemetryPublisher::new();
        let a = publisher.subscribe(1);
        assert!(matches!(
            a.recv_timeout(Duration::from_millis(10)),
            Err(BridgeError::Timeout)
        ));
    }
}
