//! # AIS Track Core
//!
//! Platform-independent AIS ingestion logic: NMEA fragment parsing, multipart
//! reassembly, vessel state reconciliation and the store contract.
//!
//! This crate has **no I/O dependencies**: no sockets, no async runtime, no
//! clock. Every time-dependent operation takes `now` as a parameter, so the
//! whole pipeline can be driven deterministically from tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  aistrack-core (no tokio, no sockets)                        │
//! │  ├── nmea        (AIVDM/AIVDO field parsing)                 │
//! │  ├── reassembly  (multipart fragment buffer)                 │
//! │  ├── message     (decoded message + AisDecoder trait)        │
//! │  ├── fleet       (shared live map + vessel records)          │
//! │  ├── reconciler  (applies messages, mirrors to the store)    │
//! │  └── store       (VesselStore trait, retention policy)       │
//! └──────────────────────────────────────────────────────────────┘
//!                              ▲
//!               ┌──────────────┴──────────────┐
//!               │  aistrack-server            │
//!               │  (UDP loop, nmea-parser,    │
//!               │   JSON file store)          │
//!               └─────────────────────────────┘
//! ```
//!
//! ## Example: Reassembling a multipart message
//!
//! ```rust
//! use aistrack_core::nmea::parse_fragment_fields;
//! use aistrack_core::FragmentBuffer;
//! use std::time::Instant;
//!
//! let mut buffer = FragmentBuffer::new();
//! let first = "!AIVDM,2,1,3,B,55?MbV02;H;s<HtKR20EHE:0@T4@Dn2222222216L961O5Gf0NSQEp6ClRp8,0*1C";
//! let second = "!AIVDM,2,2,3,B,88888888880,2*27";
//!
//! let now = Instant::now();
//! let meta = parse_fragment_fields(first).unwrap();
//! assert!(buffer.add_fragment(first, &meta, now).is_none());
//!
//! let meta = parse_fragment_fields(second).unwrap();
//! let lines = buffer.add_fragment(second, &meta, now).unwrap();
//! assert_eq!(lines, vec![first.to_string(), second.to_string()]);
//! assert!(buffer.is_empty());
//! ```

pub mod error;
pub mod fleet;
pub mod message;
pub mod nmea;
pub mod reassembly;
pub mod reconciler;
pub mod store;
pub mod vessel;

// Re-export commonly used types
pub use error::{DecodeError, PositionRejected, StoreError};
pub use fleet::{Fleet, LivePosition, SharedFleet};
pub use message::{AisDecoder, DecodedAisMessage, MessageKind};
pub use nmea::FragmentMetadata;
pub use reassembly::{BufferStats, FragmentBuffer, DEFAULT_MAX_FRAGMENT_AGE};
pub use reconciler::{ReconcileOutcome, VesselStateReconciler};
pub use store::{MemoryStore, OldPositionStats, RetentionPolicy, TrackedVessel, VesselStore};
pub use vessel::{Dimensions, Eta, VesselState};
