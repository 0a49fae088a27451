//! Application-facing events and callbacks

use std::fmt;

use hopmesh_core::{FrameKind, MacAddress, Payload};

/// Why a confirmed message failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The radio exhausted its tries, or rejected the frame outright
    DeliveryFailure,
    /// The frame went out but no acknowledgement arrived in time
    ConfirmationTimeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::DeliveryFailure => write!(f, "delivery failure"),
            FailureReason::ConfirmationTimeout => write!(f, "confirmation timeout"),
        }
    }
}

/// Terminal outcome of a confirmed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// The destination acknowledged the message
    Success,
    /// The message was not confirmed
    Failed(FailureReason),
}

impl MessageStatus {
    /// Whether the message was confirmed
    pub fn is_success(&self) -> bool {
        matches!(self, MessageStatus::Success)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Success => write!(f, "success"),
            MessageStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Status report for one confirmed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    /// Sequence id returned by `send_confirmed`
    pub id: u8,
    /// Destination the message was sent to
    pub destination: MacAddress,
    /// Outcome
    pub status: MessageStatus,
}

/// Payload delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Frame type as received; unknown types are passed through raw
    pub kind: FrameKind,
    /// Originating node
    pub source: MacAddress,
    /// Sequence id assigned by the source
    pub id: u8,
    /// Application payload
    pub payload: Payload,
}

/// Callback fired for confirmed-message outcomes
pub type StatusCallback = Box<dyn FnMut(StatusEvent) + Send>;

/// Callback fired for delivered payloads
pub type MessageCallback = Box<dyn FnMut(&ReceivedMessage) + Send>;
