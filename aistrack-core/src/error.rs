//! Error types for decoding, reconciliation and persistence

use thiserror::Error;

/// Errors a payload decoder can report for a completed fragment set
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// No sentences were handed to the decoder
    #[error("No sentences to decode")]
    Empty,

    /// Sentence does not have the AIVDM/AIVDO field layout
    #[error("Malformed sentence: {0}")]
    Malformed(String),

    /// The decoder rejected the payload (bad checksum, bad armoring, short payload)
    #[error("Decoder rejected sentence: {0}")]
    Rejected(String),

    /// All sentences were consumed without producing a message
    #[error("Sentence set did not produce a complete message")]
    Incomplete,

    /// Message type is decodable but carries nothing the tracker uses
    #[error("Unsupported AIS message type {message_type}")]
    Unsupported { message_type: u8 },
}

/// Reasons a position report is not applied to vessel state
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum PositionRejected {
    #[error("latitude not present")]
    MissingLatitude,

    #[error("longitude not present")]
    MissingLongitude,

    /// 91.0 / 181.0, the AIS "position not available" values
    #[error("position not available ({latitude}, {longitude})")]
    NotAvailable { latitude: f64, longitude: f64 },

    #[error("position out of range ({latitude}, {longitude})")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// Errors from a [`crate::store::VesselStore`] implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization failed: {0}")]
    Serialization(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store operation timed out")]
    Timeout,
}
