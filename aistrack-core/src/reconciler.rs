//! Applies decoded AIS messages to vessel state and mirrors them to the store.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::PositionRejected;
use crate::fleet::SharedFleet;
use crate::message::{DecodedAisMessage, MessageKind};
use crate::store::VesselStore;

/// What happened to one decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Position applied to the live map and detail record
    Position { mmsi: String, tracked: bool },
    /// Static and voyage data merged into the detail record
    Static { mmsi: String, tracked: bool },
    /// Position report without a usable position; nothing changed
    Rejected {
        mmsi: String,
        reason: PositionRejected,
    },
    /// Message type the tracker does not use, or no MMSI
    Ignored { message_type: u8 },
}

/// Single writer of the shared fleet state.
///
/// Store failures are logged and do not roll back the in-memory update; the
/// in-memory state stays authoritative for queries.
pub struct VesselStateReconciler {
    fleet: SharedFleet,
    store: Arc<dyn VesselStore>,
}

impl VesselStateReconciler {
    pub fn new(fleet: SharedFleet, store: Arc<dyn VesselStore>) -> Self {
        VesselStateReconciler { fleet, store }
    }

    pub fn fleet(&self) -> &SharedFleet {
        &self.fleet
    }

    pub fn store(&self) -> &Arc<dyn VesselStore> {
        &self.store
    }

    /// Classify and apply one message.
    pub fn process(&self, message: &DecodedAisMessage, now: DateTime<Utc>) -> ReconcileOutcome {
        if message.mmsi.is_empty() {
            log::warn!(
                "Dropping AIS message type {} without MMSI",
                message.message_type
            );
            return ReconcileOutcome::Ignored {
                message_type: message.message_type,
            };
        }

        match message.kind() {
            MessageKind::Position => self.process_position(message, now),
            MessageKind::StaticData => self.process_static(message, now),
            MessageKind::Other => {
                log::debug!(
                    "Ignoring AIS message type {} from {}",
                    message.message_type,
                    message.mmsi
                );
                ReconcileOutcome::Ignored {
                    message_type: message.message_type,
                }
            }
        }
    }

    fn process_position(&self, message: &DecodedAisMessage, now: DateTime<Utc>) -> ReconcileOutcome {
        let mmsi = message.mmsi.clone();

        // Lock is released before the store is called
        let applied = self.fleet.write().apply_position(message, now);
        let vessel = match applied {
            Ok(vessel) => vessel,
            Err(reason) => {
                log::warn!(
                    "Rejected position of {} (type {}): {}",
                    mmsi,
                    message.message_type,
                    reason
                );
                return ReconcileOutcome::Rejected { mmsi, reason };
            }
        };

        if let Err(e) = self.store.save_position(&mmsi, &vessel) {
            log::warn!("Failed to store position of {}: {}", mmsi, e);
        }

        let tracked = self.is_tracked(&mmsi);
        log::debug!(
            "Position {} {:.5},{:.5}{}",
            mmsi,
            vessel.latitude.unwrap_or_default(),
            vessel.longitude.unwrap_or_default(),
            if tracked { " (tracked)" } else { "" }
        );
        ReconcileOutcome::Position { mmsi, tracked }
    }

    fn process_static(&self, message: &DecodedAisMessage, now: DateTime<Utc>) -> ReconcileOutcome {
        let mmsi = message.mmsi.clone();
        let vessel = self.fleet.write().apply_static(message, now);

        if let Err(e) = self.store.save_ship_static_data(&mmsi, &vessel) {
            log::warn!("Failed to store static data of {}: {}", mmsi, e);
        }

        let tracked = self.is_tracked(&mmsi);
        log::debug!(
            "Static data {} '{}' (type {})",
            mmsi,
            vessel.display_name(),
            message.message_type
        );
        ReconcileOutcome::Static { mmsi, tracked }
    }

    fn is_tracked(&self, mmsi: &str) -> bool {
        match self.store.is_tracked(mmsi) {
            Ok(tracked) => tracked,
            Err(e) => {
                log::warn!("Cannot read tracked vessels: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, OldPositionStats, RetentionPolicy, TrackedVessel};
    use crate::vessel::VesselState;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (VesselStateReconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = VesselStateReconciler::new(SharedFleet::new(), store.clone());
        (reconciler, store)
    }

    fn position(mmsi: &str, lat: f64, lon: f64) -> DecodedAisMessage {
        let mut msg = DecodedAisMessage::new(mmsi, 1);
        msg.latitude = Some(lat);
        msg.longitude = Some(lon);
        msg
    }

    fn ship_name(mmsi: &str, name: Option<&str>) -> DecodedAisMessage {
        let mut msg = DecodedAisMessage::new(mmsi, 5);
        msg.ship_name = name.map(str::to_string);
        msg
    }

    /// Store whose every call fails
    struct BrokenStore;

    impl VesselStore for BrokenStore {
        fn save_ship_static_data(&self, _: &str, _: &VesselState) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn save_position(&self, _: &str, _: &VesselState) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }
        fn cleanup_old_positions(
            &self,
            _: &RetentionPolicy,
            _: DateTime<Utc>,
        ) -> Result<usize, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn old_position_stats(
            &self,
            _: &RetentionPolicy,
            _: DateTime<Utc>,
        ) -> Result<OldPositionStats, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn tracked_mmsis(&self) -> Result<HashSet<String>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn track(&self, _: TrackedVessel) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn untrack(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn tracked_vessels(&self) -> Result<Vec<TrackedVessel>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn test_position_update() {
        let (reconciler, store) = setup();
        let mut msg = position("244660000", 51.95, 4.05);
        msg.speed = Some(11.2);

        let outcome = reconciler.process(&msg, t0());
        assert_eq!(
            outcome,
            ReconcileOutcome::Position {
                mmsi: "244660000".to_string(),
                tracked: false
            }
        );
        assert_eq!(store.position_writes(), 1);
        assert_eq!(store.get("244660000").unwrap().speed, Some(11.2));
        assert_eq!(reconciler.fleet().live_count(), 1);
    }

    #[test]
    fn test_sentinel_position_is_not_stored() {
        let (reconciler, store) = setup();

        let outcome = reconciler.process(&position("244660000", 91.0, 4.05), t0());
        assert!(matches!(
            outcome,
            ReconcileOutcome::Rejected {
                reason: PositionRejected::NotAvailable { .. },
                ..
            }
        ));
        let outcome = reconciler.process(&position("244660000", 51.95, 181.0), t0());
        assert!(matches!(outcome, ReconcileOutcome::Rejected { .. }));

        assert_eq!(store.position_writes(), 0);
        assert_eq!(reconciler.fleet().vessel_count(), 0);
        assert_eq!(reconciler.fleet().live_count(), 0);
    }

    #[test]
    fn test_position_type_without_coordinates_is_rejected() {
        let (reconciler, store) = setup();
        let mut msg = DecodedAisMessage::new("244660000", 18);
        msg.speed = Some(0.1);

        let outcome = reconciler.process(&msg, t0());
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected {
                mmsi: "244660000".to_string(),
                reason: PositionRejected::MissingLatitude
            }
        );
        assert_eq!(store.position_writes(), 0);
    }

    #[test]
    fn test_static_merge_is_monotonic() {
        let (reconciler, store) = setup();

        reconciler.process(&ship_name("219000000", Some("MAERSK")), t0());
        reconciler.process(&ship_name("219000000", None), t0());
        reconciler.process(&ship_name("219000000", Some("@@@")), t0());
        assert_eq!(
            reconciler.fleet().vessel("219000000").unwrap().ship_name.as_deref(),
            Some("MAERSK")
        );

        reconciler.process(&ship_name("219000000", Some("MAERSK LINE")), t0());
        assert_eq!(
            reconciler.fleet().vessel("219000000").unwrap().ship_name.as_deref(),
            Some("MAERSK LINE")
        );
        assert_eq!(store.static_writes(), 4);
        assert_eq!(
            store.get("219000000").unwrap().ship_name.as_deref(),
            Some("MAERSK LINE")
        );
    }

    #[test]
    fn test_other_types_ignored() {
        let (reconciler, store) = setup();
        let outcome = reconciler.process(&DecodedAisMessage::new("244660000", 8), t0());
        assert_eq!(outcome, ReconcileOutcome::Ignored { message_type: 8 });
        assert_eq!(reconciler.fleet().vessel_count(), 0);
        assert!(store.is_empty());

        let outcome = reconciler.process(&position("", 51.0, 4.0), t0());
        assert_eq!(outcome, ReconcileOutcome::Ignored { message_type: 1 });
    }

    #[test]
    fn test_tracked_tagging() {
        let (reconciler, store) = setup();
        store
            .track(TrackedVessel {
                mmsi: "244660000".to_string(),
                name: None,
                notes: None,
                added: t0(),
            })
            .unwrap();

        let outcome = reconciler.process(&position("244660000", 51.95, 4.05), t0());
        assert_eq!(
            outcome,
            ReconcileOutcome::Position {
                mmsi: "244660000".to_string(),
                tracked: true
            }
        );
        let outcome = reconciler.process(&ship_name("244660000", Some("FERRY")), t0());
        assert_eq!(
            outcome,
            ReconcileOutcome::Static {
                mmsi: "244660000".to_string(),
                tracked: true
            }
        );
    }

    #[test]
    fn test_store_failure_keeps_memory_state() {
        let reconciler = VesselStateReconciler::new(SharedFleet::new(), Arc::new(BrokenStore));

        let outcome = reconciler.process(&position("244660000", 51.95, 4.05), t0());
        assert_eq!(
            outcome,
            ReconcileOutcome::Position {
                mmsi: "244660000".to_string(),
                tracked: false
            }
        );
        reconciler.process(&ship_name("244660000", Some("FERRY")), t0());

        let vessel = reconciler.fleet().vessel("244660000").unwrap();
        assert!(vessel.has_position());
        assert_eq!(vessel.ship_name.as_deref(), Some("FERRY"));
    }
}
