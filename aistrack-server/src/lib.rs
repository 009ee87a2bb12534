//! # AIS Track Server
//!
//! UDP ingestion service for AIS NMEA traffic.
//!
//! This crate provides the runtime around [`aistrack_core`]:
//! - Receives `!AIVDM`/`!AIVDO` sentences over UDP
//! - Reassembles multipart messages and decodes them with `nmea-parser`
//! - Keeps the live vessel map and per-vessel detail records in memory
//! - Mirrors vessel state to a JSON file store with periodic flushes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    aistrack-server                       │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  IngestionLoop (tokio-graceful-shutdown subsystem) │  │
//! │  │  UDP recv -> nmea -> reassembly -> decoder ->      │  │
//! │  │  reconciler; maintenance tickers                   │  │
//! │  └───────────────┬────────────────────────────────────┘  │
//! │                  │ writes                                │
//! │                  ▼                                       │
//! │  ┌────────────────────────────┐   ┌──────────────────┐   │
//! │  │ SharedFleet (Arc<RwLock>)  │   │ VesselStore      │   │
//! │  │ live map + vessel records  │   │ (JSON / memory)  │   │
//! │  └───────────────▲────────────┘   └────────▲─────────┘   │
//! │                  │ reads                   │             │
//! │  ┌───────────────┴─────────────────────────┴──────────┐  │
//! │  │  Tracker (query handle: positions, search, stats)  │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: Starting the Service
//!
//! ```rust,no_run
//! use aistrack_server::decoder::NmeaParserDecoder;
//! use aistrack_server::ingest::IngestionLoop;
//! use aistrack_server::{network, IngestSettings, Tracker};
//! use aistrack_core::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = IngestSettings::default();
//!     let socket = network::create_udp_listen(settings.port).unwrap();
//!     let tracker = Tracker::new(Arc::new(MemoryStore::new()));
//!     let ingestion = IngestionLoop::new(settings, tracker.clone(), NmeaParserDecoder::new());
//!
//!     Toplevel::new(|s| async move {
//!         s.start(SubsystemBuilder::new("Ingestion", |subsys| {
//!             ingestion.run(subsys, socket)
//!         }));
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-p, --port` - UDP listen port (default: 15100, 15200 with `--dev`)
//! - `-v` - Increase verbosity (use multiple times)
//! - `--data-dir` - Vessel store location
//! - `--memory-store` - Run without persistence

use aistrack_core::store::{OldPositionStats, RetentionPolicy, TrackedVessel, VesselStore};
use aistrack_core::{
    BufferStats, FragmentBuffer, LivePosition, SharedFleet, StoreError, VesselState,
};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub mod config;
pub mod decoder;
pub mod ingest;
pub mod network;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Listen port of the production feed
pub const PRODUCTION_PORT: u16 = 15100;
/// Listen port of the development feed
pub const DEVELOPMENT_PORT: u16 = 15200;

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// UDP port to receive NMEA sentences on
    #[arg(short, long, env = "AIS_UDP_PORT")]
    pub port: Option<u16>,

    /// Use the development port when no port is given
    #[arg(long, default_value_t = false)]
    pub dev: bool,

    /// Evict stale multipart fragments every N lines
    #[arg(long, env = "CLEANUP_INTERVAL_MESSAGES", default_value_t = 1000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub cleanup_interval_lines: u64,

    /// Run a store retention sweep every N * multiplier lines
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub store_cleanup_multiplier: u64,

    /// Age in seconds after which an incomplete multipart message is dropped
    #[arg(long, default_value_t = 60)]
    pub fragment_max_age: u64,

    /// Seconds between fragment eviction and throughput log ticks
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub maintenance_interval: u64,

    /// Minutes between navigation-aware position sweeps, at most a week
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=10_080))]
    pub status_cleanup_interval: u64,

    /// Minutes a position of a vessel under way stays current, at most a day
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..=1440))]
    pub underway_timeout: u64,

    /// Hours a position of an anchored, moored or aground vessel stays
    /// current, at most 30 days
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..=720))]
    pub moored_timeout: u64,

    /// Disable the timed navigation-aware position sweep
    #[arg(long, default_value_t = false)]
    pub no_status_cleanup: bool,

    /// Seconds between writes of the vessel store to disk
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub flush_interval: u64,

    /// Directory for the vessel store (default: platform data directory)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Keep vessel state in memory only
    #[arg(long, default_value_t = false)]
    pub memory_store: bool,
}

impl Cli {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.dev {
            DEVELOPMENT_PORT
        } else {
            PRODUCTION_PORT
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(config::default_data_dir)
    }
}

/// Resolved configuration of the ingestion loop
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    pub port: u16,
    /// Fragment eviction every N processed lines
    pub cleanup_interval_lines: u64,
    /// Store retention sweep every N processed lines
    pub store_cleanup_interval_lines: u64,
    pub fragment_max_age: Duration,
    pub maintenance_interval: Duration,
    pub status_cleanup: bool,
    pub status_cleanup_interval: Duration,
    pub retention: RetentionPolicy,
    pub flush_interval: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        IngestSettings {
            port: PRODUCTION_PORT,
            cleanup_interval_lines: 1000,
            store_cleanup_interval_lines: 10_000,
            fragment_max_age: aistrack_core::DEFAULT_MAX_FRAGMENT_AGE,
            maintenance_interval: Duration::from_secs(10),
            status_cleanup: true,
            status_cleanup_interval: Duration::from_secs(5 * 60),
            retention: RetentionPolicy::default(),
            flush_interval: Duration::from_secs(30),
        }
    }
}

impl From<&Cli> for IngestSettings {
    fn from(args: &Cli) -> Self {
        IngestSettings {
            port: args.port(),
            cleanup_interval_lines: args.cleanup_interval_lines,
            store_cleanup_interval_lines: args
                .cleanup_interval_lines
                .saturating_mul(args.store_cleanup_multiplier),
            fragment_max_age: Duration::from_secs(args.fragment_max_age),
            maintenance_interval: Duration::from_secs(args.maintenance_interval),
            status_cleanup: !args.no_status_cleanup,
            status_cleanup_interval: Duration::from_secs(args.status_cleanup_interval * 60),
            retention: RetentionPolicy {
                underway_max_age: chrono::Duration::minutes(args.underway_timeout as i64),
                moored_max_age: chrono::Duration::hours(args.moored_timeout as i64),
            },
            flush_interval: Duration::from_secs(args.flush_interval),
        }
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Ingestion counters, updated by the ingestion loop only
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub datagrams: AtomicU64,
    pub lines: AtomicU64,
    pub messages_decoded: AtomicU64,
    pub decode_failures: AtomicU64,
}

impl IngestCounters {
    pub(crate) fn increment(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Snapshot of service statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub vessels: usize,
    pub live_positions: usize,
    pub datagrams_received: u64,
    pub lines_processed: u64,
    pub messages_decoded: u64,
    pub decode_failures: u64,
    pub fragment_buffer: BufferStats,
}

/// Cloneable handle shared by the ingestion loop and whatever serves queries.
#[derive(Clone)]
pub struct Tracker {
    fleet: SharedFleet,
    buffer: Arc<Mutex<FragmentBuffer>>,
    store: Arc<dyn VesselStore>,
    counters: Arc<IngestCounters>,
}

impl Tracker {
    pub fn new(store: Arc<dyn VesselStore>) -> Self {
        Tracker {
            fleet: SharedFleet::new(),
            buffer: Arc::new(Mutex::new(FragmentBuffer::new())),
            store,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    pub fn fleet(&self) -> &SharedFleet {
        &self.fleet
    }

    pub fn store(&self) -> &Arc<dyn VesselStore> {
        &self.store
    }

    pub fn counters(&self) -> &IngestCounters {
        &self.counters
    }

    pub(crate) fn buffer(&self) -> MutexGuard<'_, FragmentBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// MMSI -> current lat/lon of every vessel with a live position
    pub fn live_positions(&self) -> HashMap<String, LivePosition> {
        self.fleet.live_positions()
    }

    pub fn vessels(&self) -> HashMap<String, VesselState> {
        self.fleet.vessels()
    }

    pub fn vessel(&self, mmsi: &str) -> Option<VesselState> {
        self.fleet.vessel(mmsi)
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<VesselState> {
        self.fleet.search(query, limit)
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer().stats()
    }

    /// Non-blank lines fed to the pipeline so far
    pub fn lines_processed(&self) -> u64 {
        self.counters.lines.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            vessels: self.fleet.vessel_count(),
            live_positions: self.fleet.live_count(),
            datagrams_received: self.counters.datagrams.load(Ordering::Relaxed),
            lines_processed: self.lines_processed(),
            messages_decoded: self.counters.messages_decoded.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            fragment_buffer: self.buffer_stats(),
        }
    }

    /// Start tracking a vessel. The name defaults to the known ship name.
    pub fn track(
        &self,
        mmsi: &str,
        name: Option<String>,
        notes: Option<String>,
    ) -> Result<bool, StoreError> {
        let name = name.or_else(|| self.vessel(mmsi).and_then(|v| v.ship_name));
        self.store.track(TrackedVessel {
            mmsi: mmsi.to_string(),
            name,
            notes,
            added: Utc::now(),
        })
    }

    pub fn untrack(&self, mmsi: &str) -> Result<bool, StoreError> {
        self.store.untrack(mmsi)
    }

    pub fn tracked_vessels(&self) -> Result<Vec<TrackedVessel>, StoreError> {
        self.store.tracked_vessels()
    }

    /// How many stored positions a sweep with `policy` would clear now
    pub fn old_position_stats(&self, policy: &RetentionPolicy) -> Result<OldPositionStats, StoreError> {
        self.store.old_position_stats(policy, Utc::now())
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tracker {{ vessels: {} }}", self.fleet.vessel_count())
    }
}
