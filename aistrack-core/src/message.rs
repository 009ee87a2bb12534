//! Decoded AIS message contract.
//!
//! The bit-level payload decoder lives outside this crate. It is plugged in
//! through [`AisDecoder`] and must return every field it knows as a named
//! optional member of [`DecodedAisMessage`]; "field present" always means
//! `Some`.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Message types whose payload is a position report, with or without a
/// usable position: class A (1-3), base station (4), SAR aircraft (9),
/// class B (18, 19), aid to navigation (21), long range (27).
pub const POSITION_REPORT_TYPES: [u8; 9] = [1, 2, 3, 4, 9, 18, 19, 21, 27];

/// Message types carrying static and voyage data
pub const STATIC_DATA_TYPES: [u8; 2] = [5, 24];

/// One decoded AIS message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedAisMessage {
    pub mmsi: String,
    pub message_type: u8,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub course: Option<f64>,
    pub heading: Option<f64>,
    pub navigation_status: Option<u8>,
    pub turn_rate: Option<f64>,
    pub position_accuracy: Option<bool>,

    pub ship_name: Option<String>,
    pub ship_type: Option<u8>,
    pub callsign: Option<String>,
    pub imo: Option<u32>,
    pub destination: Option<String>,
    pub eta_month: Option<u8>,
    pub eta_day: Option<u8>,
    pub eta_hour: Option<u8>,
    pub eta_minute: Option<u8>,
    pub draught: Option<f64>,
    pub to_bow: Option<u16>,
    pub to_stern: Option<u16>,
    pub to_port: Option<u16>,
    pub to_starboard: Option<u16>,
}

/// How a decoded message is applied to vessel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Position,
    StaticData,
    Other,
}

impl DecodedAisMessage {
    pub fn new(mmsi: impl Into<String>, message_type: u8) -> Self {
        DecodedAisMessage {
            mmsi: mmsi.into(),
            message_type,
            ..Default::default()
        }
    }

    /// Position if both coordinates are present or the type is a position
    /// report; static data for types 5 and 24; anything else is ignored.
    pub fn kind(&self) -> MessageKind {
        let has_coordinates = self.latitude.is_some() && self.longitude.is_some();
        if has_coordinates || POSITION_REPORT_TYPES.contains(&self.message_type) {
            MessageKind::Position
        } else if STATIC_DATA_TYPES.contains(&self.message_type) {
            MessageKind::StaticData
        } else {
            MessageKind::Other
        }
    }
}

/// Payload decoder for complete fragment sets.
///
/// `lines` holds every sentence of one message in fragment order (a single
/// sentence for single-part messages). Implementations must report failure
/// through [`DecodeError`], never by panicking.
pub trait AisDecoder: Send {
    fn decode(&mut self, lines: &[String]) -> Result<DecodedAisMessage, DecodeError>;

    fn decode_line(&mut self, line: &str) -> Result<DecodedAisMessage, DecodeError> {
        self.decode(&[line.to_string()])
    }
}
