//! Vessel state model
//!
//! One [`VesselState`] per MMSI, built up from position reports and static
//! data messages. Updates are sparse merges: a field is only ever overwritten
//! by a present, non-empty value, so state is enriched and never erased by a
//! message that lacks the field.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// AIS "latitude not available" value
pub const LATITUDE_NOT_AVAILABLE: f64 = 91.0;

/// AIS "longitude not available" value
pub const LONGITUDE_NOT_AVAILABLE: f64 = 181.0;

/// Padding character used in AIS six-bit text fields
pub const AIS_TEXT_PADDING: char = '@';

/// Navigation status codes treated as stationary: at anchor, moored, aground
pub const STATIONARY_NAVIGATION_STATUS: [u8; 3] = [1, 5, 6];

/// True if the navigation status means the vessel is not under way.
pub fn is_stationary(navigation_status: u8) -> bool {
    STATIONARY_NAVIGATION_STATUS.contains(&navigation_status)
}

/// Display name of an AIS navigation status code.
pub fn navigation_status_name(navigation_status: u8) -> &'static str {
    match navigation_status {
        0 => "Under way using engine",
        1 => "At anchor",
        2 => "Not under command",
        3 => "Restricted manoeuvrability",
        4 => "Constrained by her draught",
        5 => "Moored",
        6 => "Aground",
        7 => "Engaged in fishing",
        8 => "Under way sailing",
        9..=13 => "Reserved",
        14 => "AIS-SART active",
        _ => "Not defined",
    }
}

/// Strip AIS `@` padding and surrounding whitespace. Empty results are `None`.
pub fn clean_text(value: &str) -> Option<String> {
    let cleaned = value.trim().trim_matches(AIS_TEXT_PADDING).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Estimated time of arrival as broadcast (no year, UTC)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<u8>,
}

/// Antenna position relative to the hull, in meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_bow: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_stern: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_starboard: Option<u16>,
}

impl Dimensions {
    /// Overall length, if both bow and stern offsets are known
    pub fn length(&self) -> Option<u16> {
        Some(self.to_bow?.saturating_add(self.to_stern?))
    }

    /// Overall beam, if both port and starboard offsets are known
    pub fn beam(&self) -> Option<u16> {
        Some(self.to_port?.saturating_add(self.to_starboard?))
    }
}

/// Authoritative record for one vessel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselState {
    pub mmsi: String,
    /// Type of the most recent message applied
    pub message_type: u8,

    // Position report fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position_timestamp: Option<DateTime<Utc>>,
    /// Speed over ground in knots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Course over ground in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// True heading in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_status: Option<u8>,
    /// Rate of turn in degrees per minute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_rate: Option<f64>,
    /// true = high accuracy (<= 10 m)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_accuracy: Option<bool>,

    // Static and voyage fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imo: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default)]
    pub eta: Eta,
    /// Draught in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draught: Option<f64>,
    #[serde(default)]
    pub dimensions: Dimensions,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl VesselState {
    /// Empty record for a vessel first seen now
    pub fn new(mmsi: &str, message_type: u8, now: DateTime<Utc>) -> Self {
        VesselState {
            mmsi: mmsi.to_string(),
            message_type,
            latitude: None,
            longitude: None,
            last_position_timestamp: None,
            speed: None,
            course: None,
            heading: None,
            navigation_status: None,
            turn_rate: None,
            position_accuracy: None,
            ship_name: None,
            ship_type: None,
            callsign: None,
            imo: None,
            destination: None,
            eta: Eta::default(),
            draught: None,
            dimensions: Dimensions::default(),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Seen within `window` of `now`
    pub fn is_active(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_seen <= window
    }

    /// Anchored, moored or aground according to the last position report
    pub fn is_stationary(&self) -> bool {
        self.navigation_status.map(is_stationary).unwrap_or(false)
    }

    /// Forget the current position and its kinematics. Identity and static
    /// data are kept.
    pub fn clear_position(&mut self) {
        self.latitude = None;
        self.longitude = None;
        self.last_position_timestamp = None;
        self.speed = None;
        self.course = None;
        self.heading = None;
        self.navigation_status = None;
        self.turn_rate = None;
        self.position_accuracy = None;
    }

    /// Copy the position fields of `other` into this record.
    pub fn take_position_from(&mut self, other: &VesselState) {
        self.latitude = other.latitude;
        self.longitude = other.longitude;
        self.last_position_timestamp = other.last_position_timestamp;
        self.speed = other.speed;
        self.course = other.course;
        self.heading = other.heading;
        self.navigation_status = other.navigation_status;
        self.turn_rate = other.turn_rate;
        self.position_accuracy = other.position_accuracy;
        self.message_type = other.message_type;
        self.last_seen = self.last_seen.max(other.last_seen);
    }

    /// Copy the static and voyage fields of `other` into this record.
    pub fn take_static_from(&mut self, other: &VesselState) {
        self.ship_name = other.ship_name.clone();
        self.ship_type = other.ship_type;
        self.callsign = other.callsign.clone();
        self.imo = other.imo;
        self.destination = other.destination.clone();
        self.eta = other.eta;
        self.draught = other.draught;
        self.dimensions = other.dimensions;
        self.message_type = other.message_type;
        self.last_seen = self.last_seen.max(other.last_seen);
    }

    /// Name to show for the vessel; falls back to the MMSI
    pub fn display_name(&self) -> &str {
        self.ship_name.as_deref().unwrap_or(&self.mmsi)
    }
}
