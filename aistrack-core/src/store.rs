//! Durable vessel store abstraction.
//!
//! The in-memory [`crate::fleet::Fleet`] is the source of truth for live
//! queries; a [`VesselStore`] is a durable mirror written as a side effect of
//! reconciliation. The store keeps one current position per vessel (upsert),
//! and retention sweeps clear positions that have gone stale. Vessels
//! themselves are never deleted by a sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::vessel::{is_stationary, VesselState};

/// Navigation-status-aware position retention.
///
/// Vessels at anchor, moored or aground report rarely and keep their position
/// for `moored_max_age`; everything else expires after `underway_max_age`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub underway_max_age: Duration,
    pub moored_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            underway_max_age: Duration::minutes(2),
            moored_max_age: Duration::hours(2),
        }
    }
}

impl RetentionPolicy {
    pub fn max_age_for(&self, navigation_status: Option<u8>) -> Duration {
        match navigation_status {
            Some(status) if is_stationary(status) => self.moored_max_age,
            _ => self.underway_max_age,
        }
    }

    /// True if the vessel has a position older than its allowed age
    pub fn is_expired(&self, vessel: &VesselState, now: DateTime<Utc>) -> bool {
        match vessel.last_position_timestamp {
            Some(timestamp) => now - timestamp > self.max_age_for(vessel.navigation_status),
            None => false,
        }
    }
}

/// What a retention sweep would remove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OldPositionStats {
    pub old_underway_positions: usize,
    pub old_moored_positions: usize,
    pub total_positions: usize,
    pub total_vessels: usize,
}

impl OldPositionStats {
    pub fn cleanup_needed(&self) -> bool {
        self.old_underway_positions > 0 || self.old_moored_positions > 0
    }
}

/// Count expired positions among `vessels` without changing anything.
pub fn old_position_stats<'a>(
    vessels: impl IntoIterator<Item = &'a VesselState>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> OldPositionStats {
    let mut stats = OldPositionStats::default();
    for vessel in vessels {
        stats.total_vessels += 1;
        if vessel.has_position() {
            stats.total_positions += 1;
        }
        if policy.is_expired(vessel, now) {
            if vessel.is_stationary() {
                stats.old_moored_positions += 1;
            } else {
                stats.old_underway_positions += 1;
            }
        }
    }
    stats
}

/// Clear expired positions in place. Returns the number cleared.
pub fn sweep_positions<'a>(
    vessels: impl IntoIterator<Item = &'a mut VesselState>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> usize {
    let mut cleared = 0;
    for vessel in vessels {
        if policy.is_expired(vessel, now) {
            log::debug!(
                "Clearing stale position of {} (last fix {:?})",
                vessel.mmsi,
                vessel.last_position_timestamp
            );
            vessel.clear_position();
            cleared += 1;
        }
    }
    cleared
}

/// A vessel of interest, flagged for presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedVessel {
    pub mmsi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub added: DateTime<Utc>,
}

/// Durable per-vessel persistence.
///
/// Calls come from the ingestion task while the query side may call the
/// tracking methods, so implementations synchronize internally.
pub trait VesselStore: Send + Sync {
    /// Upsert the static/voyage part of a vessel record.
    fn save_ship_static_data(&self, mmsi: &str, vessel: &VesselState) -> Result<(), StoreError>;

    /// Upsert the current position of a vessel. Replaces the previous position.
    fn save_position(&self, mmsi: &str, vessel: &VesselState) -> Result<(), StoreError>;

    /// Retention sweep. Returns the number of positions removed.
    fn cleanup_old_positions(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    fn old_position_stats(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<OldPositionStats, StoreError>;

    fn tracked_mmsis(&self) -> Result<HashSet<String>, StoreError>;

    fn is_tracked(&self, mmsi: &str) -> Result<bool, StoreError> {
        Ok(self.tracked_mmsis()?.contains(mmsi))
    }

    /// Start tracking a vessel. Returns false if it was already tracked.
    fn track(&self, vessel: TrackedVessel) -> Result<bool, StoreError>;

    /// Stop tracking a vessel. Returns false if it was not tracked.
    fn untrack(&self, mmsi: &str) -> Result<bool, StoreError>;

    fn tracked_vessels(&self) -> Result<Vec<TrackedVessel>, StoreError>;

    /// Make buffered writes durable. A no-op for stores that write through.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    vessels: HashMap<String, VesselState>,
    tracked: HashMap<String, TrackedVessel>,
}

/// Non-durable store, used when persistence is switched off and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
    position_writes: AtomicU64,
    static_writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Stored copy of a vessel
    pub fn get(&self, mmsi: &str) -> Option<VesselState> {
        self.lock().ok()?.vessels.get(mmsi).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.vessels.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `save_position` calls served
    pub fn position_writes(&self) -> u64 {
        self.position_writes.load(Ordering::Relaxed)
    }

    /// Number of `save_ship_static_data` calls served
    pub fn static_writes(&self) -> u64 {
        self.static_writes.load(Ordering::Relaxed)
    }
}

impl VesselStore for MemoryStore {
    fn save_ship_static_data(&self, mmsi: &str, vessel: &VesselState) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .vessels
            .entry(mmsi.to_string())
            .and_modify(|stored| stored.take_static_from(vessel))
            .or_insert_with(|| vessel.clone());
        self.static_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn save_position(&self, mmsi: &str, vessel: &VesselState) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .vessels
            .entry(mmsi.to_string())
            .and_modify(|stored| stored.take_position_from(vessel))
            .or_insert_with(|| vessel.clone());
        self.position_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn cleanup_old_positions(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        Ok(sweep_positions(inner.vessels.values_mut(), policy, now))
    }

    fn old_position_stats(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<OldPositionStats, StoreError> {
        let inner = self.lock()?;
        Ok(old_position_stats(inner.vessels.values(), policy, now))
    }

    fn tracked_mmsis(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.lock()?.tracked.keys().cloned().collect())
    }

    fn is_tracked(&self, mmsi: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.tracked.contains_key(mmsi))
    }

    fn track(&self, vessel: TrackedVessel) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.tracked.contains_key(&vessel.mmsi) {
            return Ok(false);
        }
        inner.tracked.insert(vessel.mmsi.clone(), vessel);
        Ok(true)
    }

    fn untrack(&self, mmsi: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.tracked.remove(mmsi).is_some())
    }

    fn tracked_vessels(&self) -> Result<Vec<TrackedVessel>, StoreError> {
        let mut vessels: Vec<TrackedVessel> = self.lock()?.tracked.values().cloned().collect();
        vessels.sort_by(|a, b| a.mmsi.cmp(&b.mmsi));
        Ok(vessels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn positioned(mmsi: &str, status: u8, fixed_at: DateTime<Utc>) -> VesselState {
        let mut vessel = VesselState::new(mmsi, 1, fixed_at);
        vessel.latitude = Some(57.66);
        vessel.longitude = Some(11.83);
        vessel.navigation_status = Some(status);
        vessel.last_position_timestamp = Some(fixed_at);
        vessel
    }

    #[test]
    fn test_retention_by_navigation_status() {
        let policy = RetentionPolicy::default();
        let underway = positioned("1", 0, t0());
        let moored = positioned("2", 5, t0());

        let later = t0() + Duration::minutes(3);
        assert!(policy.is_expired(&underway, later));
        assert!(!policy.is_expired(&moored, later));

        let much_later = t0() + Duration::hours(3);
        assert!(policy.is_expired(&moored, much_later));

        // No position, nothing to expire
        let bare = VesselState::new("3", 5, t0());
        assert!(!policy.is_expired(&bare, much_later));
    }

    #[test]
    fn test_unknown_status_counts_as_underway() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_age_for(None), policy.underway_max_age);
        assert_eq!(policy.max_age_for(Some(15)), policy.underway_max_age);
        assert_eq!(policy.max_age_for(Some(1)), policy.moored_max_age);
    }

    #[test]
    fn test_position_upsert_keeps_one_record() {
        let store = MemoryStore::new();
        let mut vessel = positioned("244660000", 0, t0());
        store.save_position("244660000", &vessel).unwrap();

        vessel.latitude = Some(57.70);
        store.save_position("244660000", &vessel).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.position_writes(), 2);
        assert_eq!(store.get("244660000").unwrap().latitude, Some(57.70));
    }

    #[test]
    fn test_static_and_position_merge() {
        let store = MemoryStore::new();
        let mut statics = VesselState::new("244660000", 5, t0());
        statics.ship_name = Some("NORDIC STAR".to_string());
        store.save_ship_static_data("244660000", &statics).unwrap();

        let position = positioned("244660000", 0, t0());
        store.save_position("244660000", &position).unwrap();

        let stored = store.get("244660000").unwrap();
        assert_eq!(stored.ship_name.as_deref(), Some("NORDIC STAR"));
        assert_eq!(stored.latitude, Some(57.66));
        assert_eq!(store.static_writes(), 1);
    }

    #[test]
    fn test_cleanup_keeps_vessels() {
        let store = MemoryStore::new();
        store.save_position("1", &positioned("1", 0, t0())).unwrap();
        store.save_position("2", &positioned("2", 5, t0())).unwrap();

        let policy = RetentionPolicy::default();
        let now = t0() + Duration::minutes(10);

        let stats = store.old_position_stats(&policy, now).unwrap();
        assert_eq!(stats.old_underway_positions, 1);
        assert_eq!(stats.old_moored_positions, 0);
        assert_eq!(stats.total_positions, 2);
        assert!(stats.cleanup_needed());

        assert_eq!(store.cleanup_old_positions(&policy, now).unwrap(), 1);
        assert_eq!(store.len(), 2);
        assert!(!store.get("1").unwrap().has_position());
        assert!(store.get("2").unwrap().has_position());

        // Second sweep has nothing left to do
        assert_eq!(store.cleanup_old_positions(&policy, now).unwrap(), 0);
    }

    #[test]
    fn test_tracking() {
        let store = MemoryStore::new();
        let tracked = TrackedVessel {
            mmsi: "244660000".to_string(),
            name: Some("Ferry".to_string()),
            notes: None,
            added: t0(),
        };
        assert!(store.track(tracked.clone()).unwrap());
        assert!(!store.track(tracked).unwrap());
        assert!(store.is_tracked("244660000").unwrap());
        assert!(!store.is_tracked("111111111").unwrap());
        assert_eq!(store.tracked_mmsis().unwrap().len(), 1);
        assert_eq!(store.tracked_vessels().unwrap()[0].name.as_deref(), Some("Ferry"));

        assert!(store.untrack("244660000").unwrap());
        assert!(!store.untrack("244660000").unwrap());
        assert!(store.tracked_mmsis().unwrap().is_empty());
    }
}
