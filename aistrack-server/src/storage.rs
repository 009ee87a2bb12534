//! JSON file backed vessel store.
//!
//! Keeps the current record of every vessel in memory and mirrors it to two
//! files under the data directory:
//!
//! - `vessels.json`: `{ "<mmsi>": VesselState, ... }`
//! - `tracked.json`: `{ "<mmsi>": TrackedVessel, ... }`
//!
//! Store calls from the ingestion path only touch memory. [`VesselStore::flush`]
//! writes changed files atomically (temp file + rename) and is meant to run
//! periodically on the blocking pool.

use aistrack_core::store::{
    old_position_stats, sweep_positions, OldPositionStats, RetentionPolicy, TrackedVessel,
    VesselStore,
};
use aistrack_core::{StoreError, VesselState};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const VESSELS_FILE: &str = "vessels.json";
pub const TRACKED_FILE: &str = "tracked.json";

#[derive(Debug, Default)]
struct StoreInner {
    vessels: BTreeMap<String, VesselState>,
    tracked: BTreeMap<String, TrackedVessel>,
    vessels_dirty: bool,
    tracked_dirty: bool,
}

/// Durable [`VesselStore`] writing JSON files
#[derive(Debug)]
pub struct JsonFileStore {
    base_dir: PathBuf,
    inner: Mutex<StoreInner>,
}

impl JsonFileStore {
    /// Open the store in `base_dir`, creating the directory if needed.
    ///
    /// Existing files are loaded; a file that cannot be parsed is logged and
    /// the store starts without its contents.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        debug!("Vessel store directory: {}", base_dir.display());

        let vessels: BTreeMap<String, VesselState> = load_file(&base_dir.join(VESSELS_FILE));
        let tracked: BTreeMap<String, TrackedVessel> = load_file(&base_dir.join(TRACKED_FILE));
        info!(
            "Loaded {} vessels and {} tracked vessels from {}",
            vessels.len(),
            tracked.len(),
            base_dir.display()
        );

        Ok(JsonFileStore {
            base_dir,
            inner: Mutex::new(StoreInner {
                vessels,
                tracked,
                vessels_dirty: false,
                tracked_dirty: false,
            }),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Stored copy of a vessel
    pub fn vessel(&self, mmsi: &str) -> Option<VesselState> {
        self.lock().ok()?.vessels.get(mmsi).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.vessels.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_file<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        debug!("No store file at {}", path.display());
        return T::default();
    }
    match fs::File::open(path) {
        Ok(file) => match serde_json::from_reader(BufReader::new(file)) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse {}, starting empty: {}", path.display(), e);
                T::default()
            }
        },
        Err(e) => {
            warn!("Failed to open {}, starting empty: {}", path.display(), e);
            T::default()
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl VesselStore for JsonFileStore {
    fn save_ship_static_data(&self, mmsi: &str, vessel: &VesselState) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .vessels
            .entry(mmsi.to_string())
            .and_modify(|stored| stored.take_static_from(vessel))
            .or_insert_with(|| vessel.clone());
        inner.vessels_dirty = true;
        Ok(())
    }

    fn save_position(&self, mmsi: &str, vessel: &VesselState) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .vessels
            .entry(mmsi.to_string())
            .and_modify(|stored| stored.take_position_from(vessel))
            .or_insert_with(|| vessel.clone());
        inner.vessels_dirty = true;
        Ok(())
    }

    fn cleanup_old_positions(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let cleared = sweep_positions(inner.vessels.values_mut(), policy, now);
        if cleared > 0 {
            inner.vessels_dirty = true;
        }
        Ok(cleared)
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
        info!("Tracking vessel {}", vessel.mmsi);
        inner.tracked.insert(vessel.mmsi.clone(), vessel);
        inner.tracked_dirty = true;
        Ok(true)
    }

    fn untrack(&self, mmsi: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let removed = inner.tracked.remove(mmsi).is_some();
        if removed {
            info!("Stopped tracking vessel {}", mmsi);
            inner.tracked_dirty = true;
        }
        Ok(removed)
    }

    fn tracked_vessels(&self) -> Result<Vec<TrackedVessel>, StoreError> {
        Ok(self.lock()?.tracked.values().cloned().collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        // Serialize under the lock, write without it
        let (vessels, tracked) = {
            let mut inner = self.lock()?;
            let vessels = if inner.vessels_dirty {
                Some(to_json(&inner.vessels)?)
            } else {
                None
            };
            let tracked = if inner.tracked_dirty {
                Some(to_json(&inner.tracked)?)
            } else {
                None
            };
            inner.vessels_dirty = false;
            inner.tracked_dirty = false;
            (vessels, tracked)
        };

        let mut result = Ok(());
        if let Some(contents) = vessels {
            if let Err(e) = write_atomic(&self.base_dir.join(VESSELS_FILE), &contents) {
                self.lock()?.vessels_dirty = true;
                result = Err(e);
            } else {
                debug!("Wrote {} ({} bytes)", VESSELS_FILE, contents.len());
            }
        }
        if let Some(contents) = tracked {
            if let Err(e) = write_atomic(&self.base_dir.join(TRACKED_FILE), &contents) {
                self.lock()?.tracked_dirty = true;
                result = Err(e);
            } else {
                debug!("Wrote {}", TRACKED_FILE);
            }
        }
        result
    }
}
