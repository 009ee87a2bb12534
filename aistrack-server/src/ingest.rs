//! UDP receive loop feeding the AIS pipeline.
//!
//! Each non-blank line goes through fragment parsing, multipart reassembly,
//! payload decoding and reconciliation, in arrival order. Nothing in the
//! per-line path can stop the loop; only shutdown does.

use aistrack_core::nmea::{is_ais_sentence, parse_fragment_fields};
use aistrack_core::{
    AisDecoder, DecodeError, ReconcileOutcome, StoreError, VesselStateReconciler,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::{IngestCounters, IngestSettings, Tracker};

/// Datagram receive buffer. Larger datagrams are truncated by the OS.
pub const RECEIVE_BUFFER_SIZE: usize = 8192;

/// Upper bound for one store flush on the blocking pool
pub const STORE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Cannot bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open vessel store: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Empty after trimming; not counted
    Blank,
    /// Not an `!AIVDM`/`!AIVDO` sentence
    NotAis,
    /// AIS sentence without usable fragment fields
    Malformed,
    /// Fragment stored, message not complete yet
    Buffered,
    /// Decoder produced nothing (e.g. an unpaired type 24 half)
    Incomplete,
    DecodeFailed(DecodeError),
    Reconciled(ReconcileOutcome),
}

/// Bind the listening socket. The one failure that stops the service.
pub fn bind(port: u16) -> Result<UdpSocket, IngestError> {
    let socket =
        crate::network::create_udp_listen(port).map_err(|source| IngestError::Bind { port, source })?;
    log::info!("Listening for AIS NMEA on UDP port {}", port);
    Ok(socket)
}

pub struct IngestionLoop<D: AisDecoder> {
    settings: IngestSettings,
    tracker: Tracker,
    reconciler: VesselStateReconciler,
    decoder: D,
    last_report_lines: u64,
}

impl<D: AisDecoder> IngestionLoop<D> {
    pub fn new(settings: IngestSettings, tracker: Tracker, decoder: D) -> Self {
        let reconciler =
            VesselStateReconciler::new(tracker.fleet().clone(), tracker.store().clone());
        IngestionLoop {
            settings,
            tracker,
            reconciler,
            decoder,
            last_report_lines: 0,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Split a datagram into lines and process each. Returns the number of
    /// non-blank lines.
    pub fn process_datagram(&mut self, data: &[u8]) -> usize {
        self.process_datagram_at(data, Instant::now(), Utc::now())
    }

    pub fn process_datagram_at(
        &mut self,
        data: &[u8],
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> usize {
        let text = String::from_utf8_lossy(data);
        text.split('\n')
            .map(|line| self.process_line(line, now, wall_clock))
            .filter(|outcome| *outcome != LineOutcome::Blank)
            .count()
    }

    /// Run one line through parse, reassembly, decode and reconcile.
    pub fn process_line(
        &mut self,
        line: &str,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }
        let count = IngestCounters::increment(&self.tracker.counters().lines);

        let outcome = self.dispatch(line, now, wall_clock);

        if count % self.settings.cleanup_interval_lines == 0 {
            self.evict_stale(now);
        }
        if count % self.settings.store_cleanup_interval_lines == 0 {
            self.cleanup_store(wall_clock);
        }
        outcome
    }

    fn dispatch(&mut self, line: &str, now: Instant, wall_clock: DateTime<Utc>) -> LineOutcome {
        if !is_ais_sentence(line) {
            log::trace!("Ignoring non-AIS line: {}", line);
            return LineOutcome::NotAis;
        }
        let Some(meta) = parse_fragment_fields(line) else {
            return LineOutcome::Malformed;
        };

        let decoded = if meta.is_multipart() {
            let assembled = self.tracker.buffer().add_fragment(line, &meta, now);
            match assembled {
                Some(lines) => self.decoder.decode(&lines),
                None => return LineOutcome::Buffered,
            }
        } else {
            self.decoder.decode_line(line)
        };

        match decoded {
            Ok(message) => {
                IngestCounters::increment(&self.tracker.counters().messages_decoded);
                LineOutcome::Reconciled(self.reconciler.process(&message, wall_clock))
            }
            Err(DecodeError::Incomplete) => {
                log::debug!("No message yet from {}", line);
                LineOutcome::Incomplete
            }
            Err(DecodeError::Unsupported { message_type }) => {
                log::debug!("Skipping unsupported AIS message type {}", message_type);
                LineOutcome::DecodeFailed(DecodeError::Unsupported { message_type })
            }
            Err(e) => {
                IngestCounters::increment(&self.tracker.counters().decode_failures);
                log::warn!("Failed to decode {}: {}", line, e);
                LineOutcome::DecodeFailed(e)
            }
        }
    }

    /// Drop incomplete multiparts older than the configured age.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let evicted = self
            .tracker
            .buffer()
            .evict_stale(self.settings.fragment_max_age, now);
        if evicted > 0 {
            log::info!("Evicted {} incomplete multipart messages", evicted);
        }
        evicted
    }

    /// Store-layer retention sweep
    pub fn cleanup_store(&self, now: DateTime<Utc>) -> usize {
        match self
            .tracker
            .store()
            .cleanup_old_positions(&self.settings.retention, now)
        {
            Ok(cleared) => {
                if cleared > 0 {
                    log::info!("Store sweep cleared {} stale positions", cleared);
                }
                cleared
            }
            Err(e) => {
                log::warn!("Store sweep failed: {}", e);
                0
            }
        }
    }

    /// Navigation-aware sweep of both the in-memory fleet and the store
    pub fn cleanup_positions(&self, now: DateTime<Utc>) -> usize {
        let expired = self
            .tracker
            .fleet()
            .write()
            .expire_positions(&self.settings.retention, now);
        if expired > 0 {
            log::info!("Expired {} stale live positions", expired);
        }
        match self
            .tracker
            .store()
            .old_position_stats(&self.settings.retention, now)
        {
            Ok(stats) if stats.cleanup_needed() => {
                log::debug!(
                    "Store has {} old underway and {} old moored positions",
                    stats.old_underway_positions,
                    stats.old_moored_positions
                );
                self.cleanup_store(now);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Cannot read store position stats: {}", e),
        }
        expired
    }

    fn log_throughput(&mut self) {
        let lines = self.tracker.lines_processed();
        let delta = lines - self.last_report_lines;
        self.last_report_lines = lines;
        if delta > 0 {
            let stats = self.tracker.stats();
            log::info!(
                "Processed {} lines ({} total), {} vessels, {} live, {} pending multiparts",
                delta,
                lines,
                stats.vessels,
                stats.live_positions,
                stats.fragment_buffer.buffered_message_count
            );
        }
    }

    /// Flush the store on the blocking pool, bounded by [`STORE_FLUSH_TIMEOUT`].
    pub async fn flush_store(&self) {
        let store = self.tracker.store().clone();
        let task = tokio::task::spawn_blocking(move || store.flush());
        match timeout(STORE_FLUSH_TIMEOUT, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => log::warn!("Vessel store flush failed: {}", e),
            Ok(Err(e)) => log::warn!("Vessel store flush task failed: {}", e),
            Err(_) => log::warn!(
                "Vessel store flush did not finish within {:?}",
                STORE_FLUSH_TIMEOUT
            ),
        }
    }

    /// Receive loop. Runs until shutdown is requested, then flushes the store.
    pub async fn run(mut self, subsys: SubsystemHandle, socket: UdpSocket) -> Result<(), IngestError> {
        log::info!("Ingestion loop started on {:?}", socket.local_addr().ok());

        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

        let mut maintenance = interval(self.settings.maintenance_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut status_cleanup = interval(self.settings.status_cleanup_interval);
        status_cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut flush = interval(self.settings.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::info!("Ingestion loop: shutdown requested");
                    break;
                },
                r = socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, addr)) => {
                            IngestCounters::increment(&self.tracker.counters().datagrams);
                            log::trace!("Received {} bytes from {}", len, addr);
                            self.process_datagram(&buf[..len]);
                        }
                        Err(e) => {
                            // e.g. ICMP port unreachable on some platforms
                            log::error!("UDP receive failed: {}", e);
                        }
                    }
                },
                _ = maintenance.tick() => {
                    self.evict_stale(Instant::now());
                    self.log_throughput();
                },
                _ = status_cleanup.tick(), if self.settings.status_cleanup => {
                    self.cleanup_positions(Utc::now());
                },
                _ = flush.tick() => {
                    self.flush_store().await;
                },
            }
        }

        self.flush_store().await;
        log::info!(
            "Ingestion loop finished after {} lines",
            self.tracker.counters().lines.load(Ordering::Relaxed)
        );
        Ok(())
    }
}
