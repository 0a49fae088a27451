//! Error types for hopmesh operations
//!
//! Most protocol outcomes (duplicates, exhausted hop budgets, garbage on the
//! air) are handled locally and never surface as errors. The variants here
//! cover what a caller can actually act on: oversized payloads, a full queue,
//! a node that was never started, and driver failures.

use thiserror::Error;

/// Main error type for hopmesh operations
#[derive(Error, Debug)]
pub enum MeshError {
    // ===== Frame Errors =====
    /// Payload exceeds what fits in a single radio frame
    #[error("Payload too large: {size} bytes exceeds frame maximum of {max} bytes")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Buffer shorter than the fixed frame header
    #[error("Frame too short: {len} bytes, header needs {min}")]
    FrameTooShort {
        /// Received length
        len: usize,
        /// Minimum valid length
        min: usize,
    },

    /// Header fields inconsistent with the buffer
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    // ===== Addressing Errors =====
    /// Address string could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Destination not usable for the requested operation
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    // ===== Transport Errors =====
    /// A send is already in flight on the link
    ///
    /// The link reports this as `TryTransmit::Busy`; this variant is its
    /// error form (`TryTransmit::into_result`) and its `TRANSPORT_BUSY` log code.
    #[error("Transport busy: a send is already in flight")]
    TransportBusy,

    /// Outgoing queue reached its bound
    #[error("Outgoing queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Radio driver rejected an operation
    #[error("Radio driver error: {0}")]
    Driver(String),

    // ===== Lifecycle Errors =====
    /// Operation requires `begin()` first
    #[error("Mesh node is not started")]
    NotStarted,

    /// `begin()` called twice
    #[error("Mesh node is already started")]
    AlreadyStarted,

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshError {
    /// Check if the operation may succeed when retried on a later tick
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            MeshError::TransportBusy | MeshError::QueueFull { .. } | MeshError::Driver(_)
        )
    }

    /// Check if this is a protocol error (bad bytes from the air)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            MeshError::FrameTooShort { .. } | MeshError::MalformedFrame(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            MeshError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            MeshError::FrameTooShort { .. } => "FRAME_TOO_SHORT",
            MeshError::MalformedFrame(_) => "MALFORMED_FRAME",
            MeshError::InvalidAddress(_) => "INVALID_ADDRESS",
            MeshError::InvalidDestination(_) => "INVALID_DESTINATION",
            MeshError::TransportBusy => "TRANSPORT_BUSY",
            MeshError::QueueFull { .. } => "QUEUE_FULL",
            MeshError::Driver(_) => "DRIVER_ERROR",
            MeshError::NotStarted => "NOT_STARTED",
            MeshError::AlreadyStarted => "ALREADY_STARTED",
            MeshError::InvalidConfig(_) => "INVALID_CONFIG",
            MeshError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for hopmesh operations
pub type Result<T> = std::result::Result<T, MeshError>;

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::InvalidConfig(err.to_string())
    }
}
