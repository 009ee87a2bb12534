//! In-memory vessel state shared between ingestion and queries.
//!
//! [`Fleet`] holds two maps: a lightweight MMSI -> lat/lon map for the live
//! chart, and the full [`VesselState`] per MMSI. [`SharedFleet`] is the
//! cloneable handle; the reconciler is its only writer, query code reads
//! snapshots.
//!
//! Updates are applied in arrival order, last write wins. A delayed older
//! report can overwrite a newer one; AIS over UDP gives no ordering to
//! compensate with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::PositionRejected;
use crate::message::DecodedAisMessage;
use crate::store::{sweep_positions, RetentionPolicy};
use crate::vessel::{clean_text, VesselState, LATITUDE_NOT_AVAILABLE, LONGITUDE_NOT_AVAILABLE};

/// Entry of the live chart map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePosition {
    pub lat: f64,
    pub lon: f64,
}

/// Check a reported position. Sentinel, missing, non-finite and out of range
/// coordinates are rejected.
pub fn validate_position(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<(f64, f64), PositionRejected> {
    let latitude = latitude.ok_or(PositionRejected::MissingLatitude)?;
    let longitude = longitude.ok_or(PositionRejected::MissingLongitude)?;

    if latitude == LATITUDE_NOT_AVAILABLE || longitude == LONGITUDE_NOT_AVAILABLE {
        return Err(PositionRejected::NotAvailable {
            latitude,
            longitude,
        });
    }
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        // NaN fails both range checks too
        return Err(PositionRejected::OutOfRange {
            latitude,
            longitude,
        });
    }
    Ok((latitude, longitude))
}

fn merge<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn merge_text(slot: &mut Option<String>, value: Option<&str>) {
    if let Some(cleaned) = value.and_then(clean_text) {
        *slot = Some(cleaned);
    }
}

/// Vessel maps, not synchronized
#[derive(Debug, Default)]
pub struct Fleet {
    live: HashMap<String, LivePosition>,
    vessels: HashMap<String, VesselState>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a position report. On success returns the updated record.
    ///
    /// A rejected position leaves both maps untouched.
    pub fn apply_position(
        &mut self,
        message: &DecodedAisMessage,
        now: DateTime<Utc>,
    ) -> Result<VesselState, PositionRejected> {
        let (latitude, longitude) = validate_position(message.latitude, message.longitude)?;
        let mmsi = message.mmsi.as_str();

        self.live.insert(
            mmsi.to_string(),
            LivePosition {
                lat: latitude,
                lon: longitude,
            },
        );

        let vessel = self
            .vessels
            .entry(mmsi.to_string())
            .or_insert_with(|| VesselState::new(mmsi, message.message_type, now));

        vessel.message_type = message.message_type;
        vessel.latitude = Some(latitude);
        vessel.longitude = Some(longitude);
        vessel.last_position_timestamp = Some(now);
        merge(&mut vessel.speed, message.speed);
        merge(&mut vessel.course, message.course);
        merge(&mut vessel.heading, message.heading);
        merge(&mut vessel.navigation_status, message.navigation_status);
        merge(&mut vessel.turn_rate, message.turn_rate);
        merge(&mut vessel.position_accuracy, message.position_accuracy);
        vessel.last_seen = now;

        Ok(vessel.clone())
    }

    /// Apply static and voyage data. Absent or blank fields never erase what
    /// is already known.
    pub fn apply_static(&mut self, message: &DecodedAisMessage, now: DateTime<Utc>) -> VesselState {
        let mmsi = message.mmsi.as_str();
        let vessel = self
            .vessels
            .entry(mmsi.to_string())
            .or_insert_with(|| VesselState::new(mmsi, message.message_type, now));

        vessel.message_type = message.message_type;
        merge_text(&mut vessel.ship_name, message.ship_name.as_deref());
        merge(&mut vessel.ship_type, message.ship_type);
        merge_text(&mut vessel.callsign, message.callsign.as_deref());
        merge(&mut vessel.imo, message.imo);
        merge_text(&mut vessel.destination, message.destination.as_deref());
        merge(&mut vessel.eta.month, message.eta_month);
        merge(&mut vessel.eta.day, message.eta_day);
        merge(&mut vessel.eta.hour, message.eta_hour);
        merge(&mut vessel.eta.minute, message.eta_minute);
        merge(&mut vessel.draught, message.draught);
        merge(&mut vessel.dimensions.to_bow, message.to_bow);
        merge(&mut vessel.dimensions.to_stern, message.to_stern);
        merge(&mut vessel.dimensions.to_port, message.to_port);
        merge(&mut vessel.dimensions.to_starboard, message.to_starboard);
        vessel.last_seen = now;

        vessel.clone()
    }

    /// Clear positions older than the retention policy allows and drop them
    /// from the live map. Vessel records are kept. Returns the number cleared.
    pub fn expire_positions(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
        let cleared = sweep_positions(self.vessels.values_mut(), policy, now);
        if cleared > 0 {
            let vessels = &self.vessels;
            self.live.retain(|mmsi, _| {
                vessels
                    .get(mmsi)
                    .map(VesselState::has_position)
                    .unwrap_or(false)
            });
        }
        cleared
    }

    pub fn live_positions(&self) -> &HashMap<String, LivePosition> {
        &self.live
    }

    pub fn vessels(&self) -> &HashMap<String, VesselState> {
        &self.vessels
    }

    pub fn vessel(&self, mmsi: &str) -> Option<&VesselState> {
        self.vessels.get(mmsi)
    }
}

/// Cloneable, lock-protected handle to a [`Fleet`]
#[derive(Debug, Clone, Default)]
pub struct SharedFleet {
    inner: Arc<RwLock<Fleet>>,
}

impl SharedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-applied vessel
    // visible to other vessels' queries, so poisoning is ignored.
    pub fn read(&self) -> RwLockReadGuard<'_, Fleet> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Fleet> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the live chart map
    pub fn live_positions(&self) -> HashMap<String, LivePosition> {
        self.read().live_positions().clone()
    }

    /// Copy of all vessel records
    pub fn vessels(&self) -> HashMap<String, VesselState> {
        self.read().vessels().clone()
    }

    pub fn vessel(&self, mmsi: &str) -> Option<VesselState> {
        self.read().vessel(mmsi).cloned()
    }

    pub fn vessel_count(&self) -> usize {
        self.read().vessels.len()
    }

    pub fn live_count(&self) -> usize {
        self.read().live.len()
    }

    /// Vessels whose MMSI, name or callsign contains `query`
    /// (case-insensitive), ordered by MMSI.
    pub fn search(&self, query: &str, limit: usize) -> Vec<VesselState> {
        let needle = query.trim().to_uppercase();
        let fleet = self.read();
        let mut found: Vec<VesselState> = fleet
            .vessels
            .values()
            .filter(|vessel| {
                needle.is_empty()
                    || vessel.mmsi.contains(&needle)
                    || [&vessel.ship_name, &vessel.callsign]
                        .iter()
                        .any(|field| {
                            field
                                .as_deref()
                                .map(|text| text.to_uppercase().contains(&needle))
                                .unwrap_or(false)
                        })
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.mmsi.cmp(&b.mmsi));
        found.truncate(limit);
        found
    }
}
